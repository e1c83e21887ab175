use async_trait::async_trait;
use realmsync_core::kinds::{KeycloakRealmGroup, KeycloakRealmGroupSpec};
use realmsync_core::names::REALM_GROUP_FINALIZER;
use realmsync_core::{ObjectKey, Resource};
use realmsync_keycloak::KeycloakApi;
use realmsync_keycloak::models::GroupRepresentation;
use tracing::{debug, info};

use super::{Converge, Reconciler, Synced, connect, drive};
use crate::chain::split_names;
use crate::context::Context;
use crate::error::{ReconcileError, ReconcileResult};
use crate::lifecycle::Action;
use crate::terminators::{RemoteTarget, RemoteTerminator};

pub struct GroupReconciler {
    ctx: Context,
}

impl GroupReconciler {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Reconciler for GroupReconciler {
    fn kind(&self) -> &'static str {
        KeycloakRealmGroup::KIND
    }

    async fn reconcile(&self, key: &ObjectKey) -> Action {
        drive(self, key).await
    }
}

#[async_trait]
impl Converge for GroupReconciler {
    type Object = KeycloakRealmGroup;

    fn context(&self) -> &Context {
        &self.ctx
    }

    async fn converge(&self, group: &mut KeycloakRealmGroup) -> ReconcileResult<Synced> {
        let Some(conn) = connect(&self.ctx, group, REALM_GROUP_FINALIZER).await? else {
            return Ok(Synced::Skip(Action::Done));
        };

        let result = async {
            let terminator = RemoteTerminator::new(
                conn.api.clone(),
                conn.realm_name(),
                RemoteTarget::Group(group.spec.name.clone()),
                &group.metadata,
            );
            if self
                .ctx
                .lifecycle
                .try_to_delete(group, &terminator, REALM_GROUP_FINALIZER)
                .await?
            {
                return Ok(Synced::Skip(Action::Done));
            }

            let id = sync_group(conn.api.as_ref(), conn.realm_name(), &group.spec).await?;
            group.status.id = Some(id);
            Ok(Synced::Converged)
        }
        .await;
        self.ctx.helper.settle(&conn.keycloak, result).await
    }
}

/// Creates or updates the top-level group and grants missing realm roles.
/// Roles granted outside the declaration are left in place.
async fn sync_group(
    api: &dyn KeycloakApi,
    realm: &str,
    spec: &KeycloakRealmGroupSpec,
) -> ReconcileResult<String> {
    let name = spec.name.as_str();
    let id = match api.find_group(realm, name).await? {
        None => {
            info!(realm, group = name, "Creating group");
            let group = GroupRepresentation {
                id: None,
                name: name.to_string(),
                path: Some(spec.path.clone()).filter(|p| !p.is_empty()),
                attributes: spec.attributes.clone(),
            };
            api.create_group(realm, &group).await?
        }
        Some(current) => {
            let id = current.id.clone().unwrap_or_default();
            let mut desired = current.clone();
            desired.attributes = spec.attributes.clone();
            if !spec.path.is_empty() {
                desired.path = Some(spec.path.clone());
            }
            if desired == current {
                debug!(realm, group = name, "Group up to date");
            } else {
                info!(realm, group = name, "Updating group");
                api.update_group(realm, &desired).await?;
            }
            id
        }
    };

    if !spec.realm_roles.is_empty() {
        let granted = api.get_group_realm_roles(realm, &id).await?;
        let (missing, _) = split_names(
            spec.realm_roles.iter().map(String::as_str),
            granted.iter().map(|r| r.name.as_str()),
        );
        if !missing.is_empty() {
            let mut roles = Vec::with_capacity(missing.len());
            for role in missing {
                roles.push(api.get_realm_role(realm, role).await?.ok_or_else(|| {
                    ReconcileError::validation(format!("realm role {role} does not exist"))
                })?);
            }
            info!(realm, group = name, count = roles.len(), "Granting realm roles to group");
            api.add_group_realm_roles(realm, &id, &roles).await?;
        }
    }
    Ok(id)
}
