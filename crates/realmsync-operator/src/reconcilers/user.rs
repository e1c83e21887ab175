use async_trait::async_trait;
use realmsync_core::kinds::{KeycloakRealmUser, KeycloakRealmUserSpec};
use realmsync_core::names::REALM_USER_FINALIZER;
use realmsync_core::{ObjectKey, Resource, Secret};
use realmsync_keycloak::KeycloakApi;
use realmsync_keycloak::models::{CredentialRepresentation, UserRepresentation};
use realmsync_storage::DynStore;
use tracing::{debug, info};

use super::{Converge, Reconciler, Synced, connect, drive};
use crate::chain::client::{merged_attributes, sync_user_client_roles, sync_user_realm_roles};
use crate::context::Context;
use crate::error::{ReconcileError, ReconcileResult};
use crate::lifecycle::Action;
use crate::secretref;
use crate::terminators::{RemoteTarget, RemoteTerminator};

pub struct UserReconciler {
    ctx: Context,
}

impl UserReconciler {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Reconciler for UserReconciler {
    fn kind(&self) -> &'static str {
        KeycloakRealmUser::KIND
    }

    async fn reconcile(&self, key: &ObjectKey) -> Action {
        drive(self, key).await
    }
}

#[async_trait]
impl Converge for UserReconciler {
    type Object = KeycloakRealmUser;

    fn context(&self) -> &Context {
        &self.ctx
    }

    async fn converge(&self, user: &mut KeycloakRealmUser) -> ReconcileResult<Synced> {
        let Some(conn) = connect(&self.ctx, user, REALM_USER_FINALIZER).await? else {
            return Ok(Synced::Skip(Action::Done));
        };

        let result = async {
            if user.spec.keep_resource {
                let terminator = RemoteTerminator::new(
                    conn.api.clone(),
                    conn.realm_name(),
                    RemoteTarget::User(user.spec.username.clone()),
                    &user.metadata,
                );
                if self
                    .ctx
                    .lifecycle
                    .try_to_delete(user, &terminator, REALM_USER_FINALIZER)
                    .await?
                {
                    return Ok(Synced::Skip(Action::Done));
                }
            } else if user.metadata.is_being_deleted() {
                // Users declared without keepResource outlive their object.
                self.ctx.lifecycle.release(user, REALM_USER_FINALIZER).await?;
                return Ok(Synced::Skip(Action::Done));
            }

            let api = conn.api.as_ref();
            let realm = conn.realm_name();
            let full = !user.spec.is_add_only();

            let id = put_user(api, realm, &user.spec).await?;
            user.status.common.id = Some(id.clone());
            set_password(&self.ctx.store, api, realm, &id, user).await?;
            sync_user_realm_roles(api, realm, &id, &user.spec.roles, full).await?;
            sync_user_client_roles(api, realm, &id, &user.spec.client_roles, full).await?;
            sync_groups(api, realm, &id, &user.spec, full).await?;

            if !user.spec.keep_resource {
                info!(user = %user.spec.username, "User is in place, removing its declaration");
                match self.ctx.store.delete_object(user).await {
                    Err(e) if !e.is_not_found() => return Err(e.into()),
                    _ => {}
                }
                return Ok(Synced::Skip(Action::Done));
            }
            Ok(Synced::Converged)
        }
        .await;
        self.ctx.helper.settle(&conn.keycloak, result).await
    }
}

/// Creates the user or aligns its profile; returns the server id.
async fn put_user(
    api: &dyn KeycloakApi,
    realm: &str,
    spec: &KeycloakRealmUserSpec,
) -> ReconcileResult<String> {
    let username = spec.username.as_str();
    let non_empty = |s: &String| Some(s.clone()).filter(|s| !s.is_empty());
    let declared = UserRepresentation {
        id: None,
        username: username.to_string(),
        enabled: spec.enabled,
        email: non_empty(&spec.email),
        first_name: non_empty(&spec.first_name),
        last_name: non_empty(&spec.last_name),
        email_verified: spec.email_verified,
        required_actions: spec.required_user_actions.clone(),
        attributes: spec.attributes.clone(),
    };

    match api.find_user(realm, username).await? {
        None => {
            info!(realm, user = username, "Creating user");
            Ok(api.create_user(realm, &declared).await?)
        }
        Some(current) => {
            let id = current
                .id
                .clone()
                .filter(|id| !id.is_empty())
                .ok_or_else(|| ReconcileError::validation(format!("user {username} has no server id")))?;
            let desired = UserRepresentation {
                id: Some(id.clone()),
                attributes: merged_attributes(&current.attributes, &spec.attributes, !spec.is_add_only()),
                ..declared
            };
            if desired == current {
                debug!(realm, user = username, "User up to date");
            } else {
                info!(realm, user = username, "Updating user");
                api.update_user(realm, &desired).await?;
            }
            Ok(id)
        }
    }
}

/// Sets the password from `passwordSecret` or the plain `password` field.
///
/// A secret-backed password is only reset when the secret changed since the
/// last sync; a temporary one is set once. The plain field is applied on
/// every pass.
async fn set_password(
    store: &DynStore,
    api: &dyn KeycloakApi,
    realm: &str,
    user_id: &str,
    user: &mut KeycloakRealmUser,
) -> ReconcileResult<()> {
    let namespace = user.namespace().to_string();
    let username = user.spec.username.clone();

    if let Some(declared) = user.spec.password_secret.clone() {
        let secret = store.get_object::<Secret>(&namespace, &declared.name).await?;
        let version = secret.metadata.resource_version;
        if declared.temporary && user.status.password_synced {
            debug!(realm, user = %username, "Temporary password already set");
            return Ok(());
        }
        if !declared.temporary && user.status.last_synced_password_secret_version == Some(version) {
            debug!(realm, user = %username, version, "Password secret unchanged");
            return Ok(());
        }
        let value = secretref::secret_value(&secret, &declared.key)?;

        info!(realm, user = %username, temporary = declared.temporary, "Setting password from secret");
        api.reset_user_password(realm, user_id, &CredentialRepresentation::password(value, declared.temporary))
            .await?;
        user.status.password_synced = true;
        user.status.last_synced_password_secret_version = Some(version);
        *user = store.update_object_status(user).await?;
        return Ok(());
    }

    if !user.spec.password.is_empty() {
        debug!(realm, user = %username, "Setting password from spec");
        api.reset_user_password(
            realm,
            user_id,
            &CredentialRepresentation::password(user.spec.password.clone(), false),
        )
        .await?;
        if !user.status.password_synced || user.status.last_synced_password_secret_version.is_some() {
            user.status.password_synced = true;
            user.status.last_synced_password_secret_version = None;
            *user = store.update_object_status(user).await?;
        }
    }
    Ok(())
}

/// Group membership by name, or by full path for entries starting with `/`.
async fn sync_groups(
    api: &dyn KeycloakApi,
    realm: &str,
    user_id: &str,
    spec: &KeycloakRealmUserSpec,
    full: bool,
) -> ReconcileResult<()> {
    if spec.groups.is_empty() && !full {
        return Ok(());
    }

    let mut desired = Vec::with_capacity(spec.groups.len());
    for entry in &spec.groups {
        let group = if entry.starts_with('/') {
            api.find_group_by_path(realm, entry).await?
        } else {
            api.find_group(realm, entry).await?
        };
        let id = group
            .and_then(|g| g.id)
            .ok_or_else(|| ReconcileError::validation(format!("group {entry} does not exist")))?;
        desired.push((entry.as_str(), id));
    }

    let current = api.get_user_groups(realm, user_id).await?;
    let current_ids: Vec<&str> = current.iter().filter_map(|g| g.id.as_deref()).collect();

    for (label, id) in &desired {
        if !current_ids.contains(&id.as_str()) {
            info!(realm, user = %spec.username, group = %label, "Adding user to group");
            api.add_user_to_group(realm, user_id, id).await?;
        }
    }

    if full {
        for group in &current {
            let Some(id) = group.id.as_deref() else {
                continue;
            };
            if !desired.iter().any(|(_, d)| d == id) {
                info!(realm, user = %spec.username, group = %group.name, "Removing user from group");
                api.remove_user_from_group(realm, user_id, id).await?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcilers::test_support::{Harness, harness, realm_ref, seed};
    use realmsync_core::StatusValue;
    use realmsync_core::kinds::ReconciliationStrategy;
    use realmsync_keycloak::models::{GroupRepresentation, RoleRepresentation};
    use serde_json::json;

    async fn user(h: &Harness) -> KeycloakRealmUser {
        h.store
            .get_object::<KeycloakRealmUser>("ns", "alice")
            .await
            .unwrap()
    }

    fn password_resets(h: &Harness) -> usize {
        h.fake
            .operations()
            .into_iter()
            .filter(|op| *op == "reset_user_password")
            .count()
    }

    async fn rotate_password(h: &Harness, value: &str) {
        let mut secret = h.store.get_object::<Secret>("ns", "alice-pw").await.unwrap();
        secret.data.insert("password".to_string(), value.to_string());
        h.store.update_object(&secret).await.unwrap();
    }

    async fn seed_groups(h: &Harness, names: &[&str]) {
        for name in names {
            h.fake
                .create_group(
                    "team",
                    &GroupRepresentation {
                        name: name.to_string(),
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_user_converges_then_stays_quiet() {
        let h = harness().await;
        h.fake
            .create_realm_role("team", &RoleRepresentation::named("developer"))
            .await
            .unwrap();
        seed_groups(&h, &["devs", "ops"]).await;
        h.store
            .create_object(&Secret::new("ns", "alice-pw").with_entry("password", "pa55"))
            .await
            .unwrap();
        seed(
            &h.store,
            "KeycloakRealmUser",
            "alice",
            json!({
                "username": "alice",
                "realmRef": realm_ref(),
                "email": "alice@example.com",
                "firstName": "Alice",
                "enabled": true,
                "requiredUserActions": ["UPDATE_PROFILE"],
                "roles": ["developer"],
                "groups": ["devs", "/ops"],
                "attributes": {"team": ["blue"]},
                "passwordSecret": {"name": "alice-pw", "key": "password"}
            }),
        )
        .await;
        let reconciler = UserReconciler::new(h.ctx.clone());
        let key = ObjectKey::new("ns", "alice");

        reconciler.reconcile(&key).await;
        let stored = user(&h).await;
        assert_eq!(stored.status.common.value, StatusValue::Ok);
        assert!(stored.status.password_synced);
        let remote = h.fake.find_user("team", "alice").await.unwrap().unwrap();
        let id = remote.id.clone().unwrap();
        assert_eq!(stored.status.common.id.as_deref(), Some(id.as_str()));
        assert_eq!(remote.email.as_deref(), Some("alice@example.com"));
        assert_eq!(remote.required_actions, vec!["UPDATE_PROFILE"]);
        assert_eq!(remote.attributes["team"], vec!["blue".to_string()]);

        let state = h.fake.realm_state("team").unwrap();
        assert!(state.user_realm_roles[&id].contains("developer"));
        assert_eq!(state.user_groups[&id].len(), 2);
        let credential = &state.user_passwords[&id];
        assert_eq!(credential.value, "pa55");
        assert!(!credential.temporary);

        h.fake.clear_calls();
        reconciler.reconcile(&key).await;
        assert!(h.fake.mutating_calls().is_empty(), "{:?}", h.fake.mutating_calls());
        assert_eq!(password_resets(&h), 0);
    }

    #[tokio::test]
    async fn test_changed_password_secret_is_reapplied() {
        let h = harness().await;
        h.store
            .create_object(&Secret::new("ns", "alice-pw").with_entry("password", "first"))
            .await
            .unwrap();
        seed(
            &h.store,
            "KeycloakRealmUser",
            "alice",
            json!({
                "username": "alice",
                "realmRef": realm_ref(),
                "passwordSecret": {"name": "alice-pw", "key": "password"}
            }),
        )
        .await;
        let reconciler = UserReconciler::new(h.ctx.clone());
        let key = ObjectKey::new("ns", "alice");
        reconciler.reconcile(&key).await;

        rotate_password(&h, "second").await;
        h.fake.clear_calls();
        reconciler.reconcile(&key).await;

        assert_eq!(password_resets(&h), 1);
        let id = user(&h).await.status.common.id.unwrap();
        assert_eq!(h.fake.realm_state("team").unwrap().user_passwords[&id].value, "second");
    }

    #[tokio::test]
    async fn test_temporary_password_is_set_once() {
        let h = harness().await;
        h.store
            .create_object(&Secret::new("ns", "alice-pw").with_entry("password", "first"))
            .await
            .unwrap();
        seed(
            &h.store,
            "KeycloakRealmUser",
            "alice",
            json!({
                "username": "alice",
                "realmRef": realm_ref(),
                "passwordSecret": {"name": "alice-pw", "key": "password", "temporary": true}
            }),
        )
        .await;
        let reconciler = UserReconciler::new(h.ctx.clone());
        let key = ObjectKey::new("ns", "alice");
        reconciler.reconcile(&key).await;
        assert_eq!(password_resets(&h), 1);

        rotate_password(&h, "second").await;
        h.fake.clear_calls();
        reconciler.reconcile(&key).await;
        assert_eq!(password_resets(&h), 0);
    }

    #[tokio::test]
    async fn test_missing_password_key_is_reported() {
        let h = harness().await;
        h.store
            .create_object(&Secret::new("ns", "alice-pw").with_entry("other", "x"))
            .await
            .unwrap();
        seed(
            &h.store,
            "KeycloakRealmUser",
            "alice",
            json!({
                "username": "alice",
                "realmRef": realm_ref(),
                "passwordSecret": {"name": "alice-pw", "key": "password"}
            }),
        )
        .await;

        UserReconciler::new(h.ctx.clone())
            .reconcile(&ObjectKey::new("ns", "alice"))
            .await;
        assert_eq!(
            user(&h).await.status.common.value,
            StatusValue::Error("secret alice-pw does not contain key password".to_string())
        );
    }

    #[tokio::test]
    async fn test_undeclared_groups_are_removed_unless_add_only() {
        let h = harness().await;
        seed_groups(&h, &["devs", "ops"]).await;
        seed(
            &h.store,
            "KeycloakRealmUser",
            "alice",
            json!({"username": "alice", "realmRef": realm_ref(), "groups": ["devs", "ops"]}),
        )
        .await;
        let reconciler = UserReconciler::new(h.ctx.clone());
        let key = ObjectKey::new("ns", "alice");
        reconciler.reconcile(&key).await;

        let mut stored = user(&h).await;
        stored.spec.groups = vec!["devs".to_string()];
        stored.spec.reconciliation_strategy = ReconciliationStrategy::AddOnly;
        h.store.update_object(&stored).await.unwrap();
        reconciler.reconcile(&key).await;
        let id = user(&h).await.status.common.id.unwrap();
        assert_eq!(h.fake.realm_state("team").unwrap().user_groups[&id].len(), 2);

        let mut stored = user(&h).await;
        stored.spec.reconciliation_strategy = ReconciliationStrategy::Full;
        h.store.update_object(&stored).await.unwrap();
        reconciler.reconcile(&key).await;
        let devs = h.fake.find_group("team", "devs").await.unwrap().unwrap().id.unwrap();
        let groups = &h.fake.realm_state("team").unwrap().user_groups[&id];
        assert_eq!(groups.iter().collect::<Vec<_>>(), vec![&devs]);
    }

    #[tokio::test]
    async fn test_unknown_group_fails() {
        let h = harness().await;
        seed(
            &h.store,
            "KeycloakRealmUser",
            "alice",
            json!({"username": "alice", "realmRef": realm_ref(), "groups": ["/nowhere"]}),
        )
        .await;

        UserReconciler::new(h.ctx.clone())
            .reconcile(&ObjectKey::new("ns", "alice"))
            .await;
        assert_eq!(
            user(&h).await.status.common.value,
            StatusValue::Error("group /nowhere does not exist".to_string())
        );
    }

    #[tokio::test]
    async fn test_deleting_declaration_deletes_remote_user() {
        let h = harness().await;
        seed(
            &h.store,
            "KeycloakRealmUser",
            "alice",
            json!({"username": "alice", "realmRef": realm_ref(), "enabled": true}),
        )
        .await;
        let reconciler = UserReconciler::new(h.ctx.clone());
        let key = ObjectKey::new("ns", "alice");
        reconciler.reconcile(&key).await;
        assert!(user(&h).await.metadata.has_finalizer(REALM_USER_FINALIZER));

        h.store.delete_object(&user(&h).await).await.unwrap();
        assert_eq!(reconciler.reconcile(&key).await, Action::Done);
        assert!(h.fake.find_user("team", "alice").await.unwrap().is_none());
        assert!(
            h.store
                .try_get_object::<KeycloakRealmUser>("ns", "alice")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_declaration_without_keep_resource_is_removed() {
        let h = harness().await;
        seed(
            &h.store,
            "KeycloakRealmUser",
            "alice",
            json!({"username": "alice", "realmRef": realm_ref(), "keepResource": false}),
        )
        .await;

        let action = UserReconciler::new(h.ctx.clone())
            .reconcile(&ObjectKey::new("ns", "alice"))
            .await;
        assert_eq!(action, Action::Done);
        assert!(
            h.store
                .try_get_object::<KeycloakRealmUser>("ns", "alice")
                .await
                .unwrap()
                .is_none()
        );
        assert!(h.fake.find_user("team", "alice").await.unwrap().is_some());
    }
}
