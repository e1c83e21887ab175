use async_trait::async_trait;
use realmsync_core::kinds::KeycloakRealm;
use realmsync_keycloak::KeycloakApi;
use realmsync_keycloak::models::UserRepresentation;
use tracing::{debug, info};

use crate::chain::{Flow, Step, StepContext, split_names};
use crate::error::{ReconcileError, ReconcileResult};

/// Creates declared users that do not exist yet. Existing users are left alone.
pub struct PutUsers;

#[async_trait]
impl Step<KeycloakRealm> for PutUsers {
    fn name(&self) -> &'static str {
        "put_users"
    }

    async fn serve(
        &self,
        _ctx: &StepContext,
        realm: &mut KeycloakRealm,
        api: &dyn KeycloakApi,
    ) -> ReconcileResult<Flow> {
        let realm_name = realm.spec.realm_name.as_str();
        for user in &realm.spec.users {
            if api.find_user(realm_name, &user.username).await?.is_some() {
                debug!(realm = %realm_name, user = %user.username, "User already exists");
                continue;
            }
            info!(realm = %realm_name, user = %user.username, "Creating user");
            let rep = UserRepresentation {
                username: user.username.clone(),
                enabled: true,
                ..Default::default()
            };
            api.create_user(realm_name, &rep).await?;
        }
        Ok(Flow::Continue)
    }
}

/// Grants declared realm roles to users. Roles granted by other means stay.
pub struct PutUsersRoles;

#[async_trait]
impl Step<KeycloakRealm> for PutUsersRoles {
    fn name(&self) -> &'static str {
        "put_users_roles"
    }

    async fn serve(
        &self,
        _ctx: &StepContext,
        realm: &mut KeycloakRealm,
        api: &dyn KeycloakApi,
    ) -> ReconcileResult<Flow> {
        let realm_name = realm.spec.realm_name.as_str();
        for user in realm.spec.users.iter().filter(|u| !u.realm_roles.is_empty()) {
            let remote = api
                .find_user(realm_name, &user.username)
                .await?
                .ok_or_else(|| {
                    ReconcileError::validation(format!("user {} does not exist", user.username))
                })?;
            let user_id = remote.id.unwrap_or_default();

            let granted = api.get_user_realm_roles(realm_name, &user_id).await?;
            let (missing, _) = split_names(
                user.realm_roles.iter().map(String::as_str),
                granted.iter().map(|r| r.name.as_str()),
            );
            if missing.is_empty() {
                continue;
            }

            let mut roles = Vec::with_capacity(missing.len());
            for name in missing {
                let role = api.get_realm_role(realm_name, name).await?.ok_or_else(|| {
                    ReconcileError::validation(format!("realm role {name} does not exist"))
                })?;
                roles.push(role);
            }
            info!(
                realm = %realm_name,
                user = %user.username,
                count = roles.len(),
                "Granting realm roles"
            );
            api.add_user_realm_roles(realm_name, &user_id, &roles)
                .await?;
        }
        Ok(Flow::Continue)
    }
}
