use async_trait::async_trait;
use realmsync_core::kinds::{KeycloakClientScope, KeycloakClientScopeSpec};
use realmsync_core::names::CLIENT_SCOPE_FINALIZER;
use realmsync_core::{ObjectKey, Resource};
use realmsync_keycloak::KeycloakApi;
use realmsync_keycloak::models::{ClientScopeRepresentation, ProtocolMapperRepresentation};
use tracing::{debug, info};

use super::{Converge, Reconciler, Synced, connect, drive};
use crate::context::Context;
use crate::error::ReconcileResult;
use crate::lifecycle::Action;
use crate::terminators::{RemoteTarget, RemoteTerminator};

pub struct ClientScopeReconciler {
    ctx: Context,
}

impl ClientScopeReconciler {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Reconciler for ClientScopeReconciler {
    fn kind(&self) -> &'static str {
        KeycloakClientScope::KIND
    }

    async fn reconcile(&self, key: &ObjectKey) -> Action {
        drive(self, key).await
    }
}

#[async_trait]
impl Converge for ClientScopeReconciler {
    type Object = KeycloakClientScope;

    fn context(&self) -> &Context {
        &self.ctx
    }

    async fn converge(&self, scope: &mut KeycloakClientScope) -> ReconcileResult<Synced> {
        let Some(conn) = connect(&self.ctx, scope, CLIENT_SCOPE_FINALIZER).await? else {
            return Ok(Synced::Skip(Action::Done));
        };

        let result = async {
            let terminator = RemoteTerminator::new(
                conn.api.clone(),
                conn.realm_name(),
                RemoteTarget::ClientScope(scope.spec.name.clone()),
                &scope.metadata,
            );
            if self
                .ctx
                .lifecycle
                .try_to_delete(scope, &terminator, CLIENT_SCOPE_FINALIZER)
                .await?
            {
                return Ok(Synced::Skip(Action::Done));
            }

            let id = sync_client_scope(conn.api.as_ref(), conn.realm_name(), &scope.spec).await?;
            scope.status.id = Some(id);
            Ok(Synced::Converged)
        }
        .await;
        self.ctx.helper.settle(&conn.keycloak, result).await
    }
}

fn representation(spec: &KeycloakClientScopeSpec) -> ClientScopeRepresentation {
    let mappers = spec
        .protocol_mappers
        .iter()
        .map(|m| ProtocolMapperRepresentation {
            id: None,
            name: m.name.clone(),
            protocol: if m.protocol.is_empty() {
                spec.protocol.clone()
            } else {
                m.protocol.clone()
            },
            protocol_mapper: m.protocol_mapper.clone(),
            config: m.config.clone(),
        })
        .collect();

    ClientScopeRepresentation {
        id: None,
        name: spec.name.clone(),
        protocol: spec.protocol.clone(),
        description: Some(spec.description.clone()).filter(|d| !d.is_empty()),
        attributes: spec.attributes.clone(),
        protocol_mappers: Some(mappers),
    }
}

fn same_mappers(
    declared: &[ProtocolMapperRepresentation],
    current: &[ProtocolMapperRepresentation],
) -> bool {
    declared.len() == current.len()
        && declared
            .iter()
            .all(|d| current.iter().any(|c| c.same_definition(d)))
}

fn is_satisfied_by(desired: &ClientScopeRepresentation, current: &ClientScopeRepresentation) -> bool {
    desired.protocol == current.protocol
        && desired.description == current.description
        && desired.attributes == current.attributes
        && same_mappers(
            desired.protocol_mappers.as_deref().unwrap_or_default(),
            current.protocol_mappers.as_deref().unwrap_or_default(),
        )
}

/// Creates or updates the scope, then aligns realm default membership with
/// the `default` flag. Returns the scope id.
async fn sync_client_scope(
    api: &dyn KeycloakApi,
    realm: &str,
    spec: &KeycloakClientScopeSpec,
) -> ReconcileResult<String> {
    let name = spec.name.as_str();
    let desired = representation(spec);
    let current = api
        .list_client_scopes(realm)
        .await?
        .into_iter()
        .find(|s| s.name == name);

    let id = match current {
        None => {
            info!(realm, scope = name, "Creating client scope");
            api.create_client_scope(realm, &desired).await?
        }
        Some(current) => {
            let id = current.id.clone().unwrap_or_default();
            if is_satisfied_by(&desired, &current) {
                debug!(realm, scope = name, "Client scope up to date");
            } else {
                info!(realm, scope = name, "Updating client scope");
                let update = ClientScopeRepresentation {
                    id: Some(id.clone()),
                    ..desired
                };
                api.update_client_scope(realm, &update).await?;
            }
            id
        }
    };

    let is_default = api
        .list_realm_default_client_scopes(realm)
        .await?
        .iter()
        .any(|s| s.id.as_deref() == Some(id.as_str()));
    match (spec.default, is_default) {
        (true, false) => {
            info!(realm, scope = name, "Adding realm default client scope");
            api.add_realm_default_client_scope(realm, &id).await?;
        }
        (false, true) => {
            info!(realm, scope = name, "Removing realm default client scope");
            api.remove_realm_default_client_scope(realm, &id).await?;
        }
        _ => {}
    }
    Ok(id)
}
