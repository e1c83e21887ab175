use async_trait::async_trait;
use realmsync_core::kinds::{KeycloakClient, ReconciliationStrategy};
use realmsync_keycloak::KeycloakApi;
use realmsync_keycloak::models::RoleRepresentation;
use tracing::info;

use super::remote_id;
use crate::chain::{Flow, Step, StepContext, split_names};
use crate::error::{ReconcileError, ReconcileResult};
use crate::terminators::tolerate_missing;

/// Makes the client's roles match `spec.clientRoles`.
pub struct PutClientRole;

#[async_trait]
impl Step<KeycloakClient> for PutClientRole {
    fn name(&self) -> &'static str {
        "put_client_role"
    }

    async fn serve(
        &self,
        ctx: &StepContext,
        client: &mut KeycloakClient,
        api: &dyn KeycloakApi,
    ) -> ReconcileResult<Flow> {
        let id = remote_id(client)?;
        let realm = ctx.realm.as_str();

        let remote = api.list_client_roles(realm, &id).await?;
        let (missing, extra) = split_names(
            client.spec.client_roles.iter().map(String::as_str),
            remote.iter().map(|r| r.name.as_str()),
        );

        for name in missing {
            info!(realm, client_id = %client.spec.client_id, role = name, "Creating client role");
            let role = RoleRepresentation {
                client_role: true,
                ..RoleRepresentation::named(name)
            };
            api.create_client_role(realm, &id, &role).await?;
        }

        if client.spec.reconciliation_strategy == ReconciliationStrategy::Full {
            for name in extra {
                info!(realm, client_id = %client.spec.client_id, role = name, "Deleting client role");
                tolerate_missing(api.delete_client_role(realm, &id, name).await, name)?;
            }
        }
        Ok(Flow::Continue)
    }
}

/// Creates the realm roles the client declares and attaches each one to its
/// composite role when one is named.
pub struct PutRealmRole;

#[async_trait]
impl Step<KeycloakClient> for PutRealmRole {
    fn name(&self) -> &'static str {
        "put_realm_role"
    }

    async fn serve(
        &self,
        ctx: &StepContext,
        client: &mut KeycloakClient,
        api: &dyn KeycloakApi,
    ) -> ReconcileResult<Flow> {
        let realm = ctx.realm.as_str();
        for declared in &client.spec.realm_roles {
            let role = match api.get_realm_role(realm, &declared.name).await? {
                Some(role) => role,
                None => {
                    info!(realm, role = %declared.name, "Creating realm role");
                    api.create_realm_role(realm, &RoleRepresentation::named(&declared.name))
                        .await?;
                    api.get_realm_role(realm, &declared.name)
                        .await?
                        .ok_or_else(|| {
                            ReconcileError::validation(format!(
                                "realm role {} was not created",
                                declared.name
                            ))
                        })?
                }
            };

            if declared.composite.is_empty() {
                continue;
            }
            let composites = api
                .get_realm_role_composites(realm, &declared.composite)
                .await?;
            if composites.iter().any(|c| c.name == declared.name) {
                continue;
            }
            info!(
                realm,
                role = %declared.name,
                composite = %declared.composite,
                "Adding role to composite"
            );
            api.add_realm_role_composites(realm, &declared.composite, &[role])
                .await?;
        }
        Ok(Flow::Continue)
    }
}
