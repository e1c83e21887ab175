//! Remote deletion, one terminator per kind.
//!
//! Every terminator honors the preserve-on-deletion annotation and treats an
//! already missing remote object as deleted.

use std::sync::Arc;

use async_trait::async_trait;
use realmsync_core::kinds::{KeycloakAuthFlowSpec, KeycloakRealmRole, KeycloakRealmRoleBatch};
use realmsync_core::{ObjectMeta, OwnerReference, Resource};
use realmsync_keycloak::{ApiResult, KeycloakApi};
use realmsync_storage::{DynStore, ListParams};
use tracing::{debug, info};

use crate::error::{ReconcileError, ReconcileResult};
use crate::lifecycle::Terminator;

/// Treats a 404 from a delete call as success.
pub(crate) fn tolerate_missing(result: ApiResult<()>, what: &str) -> ReconcileResult<()> {
    match result {
        Err(e) if e.is_not_found() => {
            debug!(what, "Remote object already gone");
            Ok(())
        }
        other => Ok(other?),
    }
}

/// Which remote object a [`RemoteTerminator`] removes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteTarget {
    Realm,
    /// By `clientId`.
    Client(String),
    RealmRole(String),
    /// Top-level group by name.
    Group(String),
    /// By alias.
    IdentityProvider(String),
    ClientScope(String),
    Component(String),
    /// By username.
    User(String),
}

impl RemoteTarget {
    fn describe(&self, realm: &str) -> String {
        match self {
            Self::Realm => format!("realm {realm}"),
            Self::Client(id) => format!("client {id}"),
            Self::RealmRole(name) => format!("realm role {name}"),
            Self::Group(name) => format!("group {name}"),
            Self::IdentityProvider(alias) => format!("identity provider {alias}"),
            Self::ClientScope(name) => format!("client scope {name}"),
            Self::Component(name) => format!("component {name}"),
            Self::User(username) => format!("user {username}"),
        }
    }
}

/// Deletes one object on the Keycloak server.
pub struct RemoteTerminator {
    api: Arc<dyn KeycloakApi>,
    realm: String,
    target: RemoteTarget,
    preserve: bool,
}

impl RemoteTerminator {
    /// `meta` is the declared object being deleted; its annotations decide
    /// whether the remote counterpart is kept.
    pub fn new(
        api: Arc<dyn KeycloakApi>,
        realm: impl Into<String>,
        target: RemoteTarget,
        meta: &ObjectMeta,
    ) -> Self {
        Self {
            api,
            realm: realm.into(),
            target,
            preserve: meta.preserve_on_deletion(),
        }
    }

    /// Deletes the target; a missing remote object counts as deleted.
    async fn delete(&self, what: &str) -> ReconcileResult<()> {
        let api = self.api.as_ref();
        let realm = self.realm.as_str();
        let result = match &self.target {
            RemoteTarget::Realm => api.delete_realm(realm).await,
            RemoteTarget::Client(client_id) => match api.get_client(realm, client_id).await? {
                Some(client) => api.delete_client(realm, &remote_id(client.id, what)?).await,
                None => Ok(()),
            },
            RemoteTarget::RealmRole(name) => api.delete_realm_role(realm, name).await,
            RemoteTarget::Group(name) => match api.find_group(realm, name).await? {
                Some(group) => api.delete_group(realm, &remote_id(group.id, what)?).await,
                None => Ok(()),
            },
            RemoteTarget::IdentityProvider(alias) => {
                api.delete_identity_provider(realm, alias).await
            }
            RemoteTarget::ClientScope(name) => {
                let scopes = api.list_client_scopes(realm).await?;
                match scopes.into_iter().find(|s| &s.name == name) {
                    Some(scope) => api.delete_client_scope(realm, &remote_id(scope.id, what)?).await,
                    None => Ok(()),
                }
            }
            RemoteTarget::Component(name) => match api.find_component(realm, name).await? {
                Some(component) => {
                    api.delete_component(realm, &remote_id(component.id, what)?)
                        .await
                }
                None => Ok(()),
            },
            RemoteTarget::User(username) => match api.find_user(realm, username).await? {
                Some(user) => api.delete_user(realm, &remote_id(user.id, what)?).await,
                None => Ok(()),
            },
        };
        tolerate_missing(result, what)
    }
}

/// The server id of a listed object; Keycloak always returns one, so its
/// absence means the response cannot be acted on.
fn remote_id(id: Option<String>, what: &str) -> ReconcileResult<String> {
    id.filter(|id| !id.is_empty())
        .ok_or_else(|| ReconcileError::validation(format!("{what} has no server id")))
}

#[async_trait]
impl Terminator for RemoteTerminator {
    async fn delete_resource(&self) -> ReconcileResult<()> {
        let what = self.target.describe(&self.realm);
        if self.preserve {
            info!(what = %what, "Preserving remote object on deletion");
            return Ok(());
        }
        info!(what = %what, "Deleting remote object");
        self.delete(&what).await
    }
}

const FALLBACK_BROWSER_FLOW: &str = "browser";

/// Deletes an authentication flow.
///
/// A child flow is removed through its execution in the parent. A top-level
/// flow bound as the realm's browser flow is unbound first, preferring the
/// built-in `browser` flow as replacement.
pub struct AuthFlowTerminator {
    api: Arc<dyn KeycloakApi>,
    realm: String,
    alias: String,
    parent: String,
    preserve: bool,
}

impl AuthFlowTerminator {
    pub fn new(
        api: Arc<dyn KeycloakApi>,
        realm: impl Into<String>,
        spec: &KeycloakAuthFlowSpec,
        meta: &ObjectMeta,
    ) -> Self {
        Self {
            api,
            realm: realm.into(),
            alias: spec.alias.clone(),
            parent: spec.parent_name.clone(),
            preserve: meta.preserve_on_deletion(),
        }
    }

    async fn delete_child(&self, what: &str) -> ReconcileResult<()> {
        let api = self.api.as_ref();
        let executions = match api.list_flow_executions(&self.realm, &self.parent).await {
            Err(e) if e.is_not_found() => {
                debug!(what, parent = %self.parent, "Parent flow already gone");
                return Ok(());
            }
            other => other?,
        };
        let Some(execution) = executions
            .into_iter()
            .find(|e| e.authentication_flow && e.display_name == self.alias)
        else {
            return Ok(());
        };
        let id = remote_id(execution.id, what)?;
        tolerate_missing(api.delete_flow_execution(&self.realm, &id).await, what)
    }

    async fn delete_top_level(&self, what: &str) -> ReconcileResult<()> {
        let api = self.api.as_ref();
        let realm = self.realm.as_str();
        let flows = api.list_auth_flows(realm).await?;
        let Some(flow) = flows.iter().find(|f| f.alias == self.alias) else {
            return Ok(());
        };
        let id = remote_id(flow.id.clone(), what)?;

        if let Some(mut rep) = api.get_realm(realm).await? {
            if rep.browser_flow.as_deref() == Some(self.alias.as_str()) {
                let replacement = flows
                    .iter()
                    .filter(|f| f.alias != self.alias)
                    .min_by_key(|f| f.alias != FALLBACK_BROWSER_FLOW)
                    .ok_or_else(|| {
                        ReconcileError::validation(format!(
                            "unable to delete {what}, no replacement for browser flow found"
                        ))
                    })?;
                info!(what, replacement = %replacement.alias, "Rebinding browser flow");
                rep.browser_flow = Some(replacement.alias.clone());
                api.update_realm(&rep).await?;
            }
        }
        tolerate_missing(api.delete_auth_flow(realm, &id).await, what)
    }
}

#[async_trait]
impl Terminator for AuthFlowTerminator {
    async fn delete_resource(&self) -> ReconcileResult<()> {
        let what = format!("authentication flow {}", self.alias);
        if self.preserve {
            info!(what = %what, "Preserving remote object on deletion");
            return Ok(());
        }
        info!(what = %what, "Deleting remote object");
        if self.parent.is_empty() {
            self.delete_top_level(&what).await
        } else {
            self.delete_child(&what).await
        }
    }
}

/// Deletes the realm roles a batch created in the object store. The roles'
/// own terminators remove them from the server.
pub struct RoleBatchTerminator {
    store: DynStore,
    namespace: String,
    owner: OwnerReference,
}

impl RoleBatchTerminator {
    pub fn new(store: DynStore, batch: &KeycloakRealmRoleBatch) -> Self {
        Self {
            store,
            namespace: batch.namespace().to_string(),
            owner: batch.owner_reference(),
        }
    }
}

#[async_trait]
impl Terminator for RoleBatchTerminator {
    async fn delete_resource(&self) -> ReconcileResult<()> {
        let roles = self
            .store
            .list_objects::<KeycloakRealmRole>(&ListParams::new().in_namespace(&self.namespace))
            .await?;
        for role in roles.iter().filter(|r| r.metadata.is_owned_by(&self.owner)) {
            info!(batch = %self.owner.name, role = %role.name(), "Deleting batch role");
            match self.store.delete_object(role).await {
                Err(e) if e.is_not_found() => {}
                other => other?,
            }
        }
        Ok(())
    }
}
