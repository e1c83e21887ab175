use std::collections::BTreeMap;

use async_trait::async_trait;
use realmsync_core::kinds::{KeycloakClient, ReconciliationStrategy, UserClientRoles};
use realmsync_core::names::default_roles_name;
use realmsync_keycloak::KeycloakApi;
use realmsync_keycloak::models::RoleRepresentation;
use tracing::info;

use super::remote_id;
use crate::chain::{Flow, Step, StepContext, split_names};
use crate::error::{ReconcileError, ReconcileResult};

/// Grants roles and attributes to the client's service-account user.
pub struct ServiceAccount;

#[async_trait]
impl Step<KeycloakClient> for ServiceAccount {
    fn name(&self) -> &'static str {
        "service_account"
    }

    async fn serve(
        &self,
        ctx: &StepContext,
        client: &mut KeycloakClient,
        api: &dyn KeycloakApi,
    ) -> ReconcileResult<Flow> {
        let Some(sa) = client.spec.service_account.as_ref().filter(|sa| sa.enabled) else {
            return Ok(Flow::Continue);
        };
        if client.spec.public {
            return Err(ReconcileError::validation(
                "service account can not be configured with public client",
            ));
        }
        let id = remote_id(client)?;
        let realm = ctx.realm.as_str();
        let full = client.spec.reconciliation_strategy == ReconciliationStrategy::Full;

        let mut user = api.get_service_account_user(realm, &id).await?;
        let user_id = user.id.clone().unwrap_or_default();

        sync_user_realm_roles(api, realm, &user_id, &sa.realm_roles, full).await?;
        sync_user_client_roles(api, realm, &user_id, &sa.client_roles, full).await?;

        if !sa.attributes.is_empty() {
            let desired = merged_attributes(&user.attributes, &sa.attributes, full);
            if desired != user.attributes {
                info!(realm, user = %user.username, "Updating service account attributes");
                user.attributes = desired;
                api.update_user(realm, &user).await?;
            }
        }
        Ok(Flow::Continue)
    }
}

/// Grants the declared realm roles to a user; `full` also revokes the ones
/// not declared. The realm's default-roles composite is never touched.
pub(crate) async fn sync_user_realm_roles(
    api: &dyn KeycloakApi,
    realm: &str,
    user_id: &str,
    declared: &[String],
    full: bool,
) -> ReconcileResult<()> {
    let granted = api.get_user_realm_roles(realm, user_id).await?;
    // Every user of the realm carries the default composite.
    let default_roles = default_roles_name(realm);
    let (missing, extra) = split_names(
        declared.iter().map(String::as_str),
        granted
            .iter()
            .map(|r| r.name.as_str())
            .filter(|name| *name != default_roles),
    );

    if !missing.is_empty() {
        let mut roles = Vec::with_capacity(missing.len());
        for name in missing {
            let role = api.get_realm_role(realm, name).await?.ok_or_else(|| {
                ReconcileError::validation(format!("realm role {name} does not exist"))
            })?;
            roles.push(role);
        }
        info!(realm, count = roles.len(), "Granting realm roles to user");
        api.add_user_realm_roles(realm, user_id, &roles).await?;
    }

    if full && !extra.is_empty() {
        let revoked: Vec<RoleRepresentation> = granted
            .iter()
            .filter(|r| extra.contains(&r.name.as_str()))
            .cloned()
            .collect();
        info!(realm, count = revoked.len(), "Revoking realm roles from user");
        api.remove_user_realm_roles(realm, user_id, &revoked).await?;
    }
    Ok(())
}

pub(crate) async fn sync_user_client_roles(
    api: &dyn KeycloakApi,
    realm: &str,
    user_id: &str,
    declared: &[UserClientRoles],
    full: bool,
) -> ReconcileResult<()> {
    for entry in declared {
        let target = api
            .get_client(realm, &entry.client_id)
            .await?
            .and_then(|c| c.id)
            .ok_or_else(|| {
                ReconcileError::validation(format!("client {} does not exist", entry.client_id))
            })?;

        let granted = api.get_user_client_roles(realm, user_id, &target).await?;
        let (missing, extra) = split_names(
            entry.roles.iter().map(String::as_str),
            granted.iter().map(|r| r.name.as_str()),
        );

        if !missing.is_empty() {
            let available = api.list_client_roles(realm, &target).await?;
            let mut roles = Vec::with_capacity(missing.len());
            for name in missing {
                let role = available.iter().find(|r| r.name == name).ok_or_else(|| {
                    ReconcileError::validation(format!(
                        "client role {name} of client {} does not exist",
                        entry.client_id
                    ))
                })?;
                roles.push(role.clone());
            }
            info!(
                realm,
                client_id = %entry.client_id,
                count = roles.len(),
                "Granting client roles to user"
            );
            api.add_user_client_roles(realm, user_id, &target, &roles)
                .await?;
        }

        if full && !extra.is_empty() {
            let revoked: Vec<RoleRepresentation> = granted
                .iter()
                .filter(|r| extra.contains(&r.name.as_str()))
                .cloned()
                .collect();
            api.remove_user_client_roles(realm, user_id, &target, &revoked)
                .await?;
        }
    }
    Ok(())
}

/// `Full` replaces the attribute map; `AddOnly` appends missing values.
pub(crate) fn merged_attributes(
    current: &BTreeMap<String, Vec<String>>,
    declared: &BTreeMap<String, Vec<String>>,
    full: bool,
) -> BTreeMap<String, Vec<String>> {
    if full {
        return declared.clone();
    }
    let mut merged = current.clone();
    for (key, values) in declared {
        let slot = merged.entry(key.clone()).or_default();
        for value in values {
            if !slot.contains(value) {
                slot.push(value.clone());
            }
        }
    }
    merged
}
