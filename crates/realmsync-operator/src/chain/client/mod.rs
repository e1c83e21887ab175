//! Client pipeline.

mod authorization;
mod put_client;
mod roles;
mod scopes;
mod service_account;

use realmsync_core::kinds::KeycloakClient;

pub use authorization::{ProcessPermissions, ProcessPolicy, ProcessResources, ProcessScope};
pub use put_client::PutClient;
pub use roles::{PutClientRole, PutRealmRole};
pub use scopes::{PutClientScope, PutProtocolMappers};
pub use service_account::ServiceAccount;
pub(crate) use service_account::{merged_attributes, sync_user_client_roles, sync_user_realm_roles};

use super::Chain;
use crate::error::{ReconcileError, ReconcileResult};

pub fn client_chain() -> Chain<KeycloakClient> {
    Chain::new()
        .then(PutClient)
        .then(PutClientRole)
        .then(PutRealmRole)
        .then(PutClientScope)
        .then(PutProtocolMappers)
        .then(ServiceAccount)
        .then(ProcessScope)
        .then(ProcessResources)
        .then(ProcessPolicy)
        .then(ProcessPermissions)
}

/// Server id recorded by [`PutClient`].
fn remote_id(client: &KeycloakClient) -> ReconcileResult<String> {
    client
        .status
        .id
        .clone()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| {
            ReconcileError::validation(format!(
                "client {} has no server id yet",
                client.spec.client_id
            ))
        })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::chain::test_support::step_context;
    use realmsync_core::{Resource, Secret};
    use realmsync_db_memory::InMemoryStore;
    use realmsync_keycloak::KeycloakApi;
    use realmsync_keycloak::models::RoleRepresentation;
    use realmsync_keycloak::testing::FakeKeycloak;
    use realmsync_storage::DynStore;
    use serde_json::{Value, json};

    async fn seed_client(store: &DynStore, name: &str, spec: Value) -> KeycloakClient {
        let value = json!({"metadata": {"name": name, "namespace": "ns"}, "spec": spec});
        KeycloakClient::from_value(store.create("KeycloakClient", value).await.unwrap()).unwrap()
    }

    async fn reload(store: &DynStore, name: &str) -> KeycloakClient {
        store.get_object::<KeycloakClient>("ns", name).await.unwrap()
    }

    fn authorization_spec(resources: Value) -> Value {
        json!({
            "clientId": "api",
            "authorizationServicesEnabled": true,
            "serviceAccount": {"enabled": true},
            "authorization": {
                "scopes": ["read", "write"],
                "resources": resources,
                "policies": [{
                    "name": "admins",
                    "type": "role",
                    "logic": "POSITIVE",
                    "config": {"roles": [{"id": "admin", "required": true}]}
                }],
                "permissions": [{
                    "name": "docs-permission",
                    "type": "resource",
                    "decisionStrategy": "UNANIMOUS",
                    "config": {"resources": ["A"], "policies": ["admins"]}
                }]
            }
        })
    }

    fn resource(name: &str, display: &str) -> Value {
        json!({"name": name, "displayName": display, "scopes": ["read"]})
    }

    #[test]
    fn test_step_order() {
        assert_eq!(
            client_chain().step_names(),
            vec![
                "put_client",
                "put_client_role",
                "put_realm_role",
                "put_client_scope",
                "put_protocol_mappers",
                "service_account",
                "process_scope",
                "process_resources",
                "process_policy",
                "process_permissions",
            ]
        );
    }

    #[tokio::test]
    async fn test_generated_secret_is_created_once_and_reused() {
        let store: DynStore = Arc::new(InMemoryStore::new());
        let fake = Arc::new(FakeKeycloak::with_realm("team"));
        let ctx = step_context(store.clone(), fake.clone(), "team");
        let mut client = seed_client(
            &store,
            "portal",
            json!({"clientId": "portal", "webUrl": "https://portal.example"}),
        )
        .await;

        client_chain()
            .serve(&ctx, &mut client, fake.as_ref())
            .await
            .unwrap();

        let stored = reload(&store, "portal").await;
        assert_eq!(stored.spec.secret, "$keycloak-client-portal-secret:clientSecret");
        assert_eq!(
            stored.status.client_secret_name.as_deref(),
            Some("keycloak-client-portal-secret")
        );
        let remote_id = stored.status.id.clone().unwrap();

        let secret = store
            .get_object::<Secret>("ns", "keycloak-client-portal-secret")
            .await
            .unwrap();
        let value = secret.get("clientSecret").unwrap().to_string();
        assert_eq!(value.len(), 36);
        assert!(secret.metadata.is_owned_by(&stored.owner_reference()));

        let state = fake.realm_state("team").unwrap();
        let remote = &state.clients[&remote_id].rep;
        assert_eq!(remote.secret.as_deref(), Some(value.as_str()));
        assert_eq!(remote.redirect_uris, vec!["https://portal.example/*"]);

        fake.clear_calls();
        let mut client = reload(&store, "portal").await;
        let version = client.metadata.resource_version;
        client_chain()
            .serve(&ctx, &mut client, fake.as_ref())
            .await
            .unwrap();
        assert!(fake.mutating_calls().is_empty(), "{:?}", fake.mutating_calls());
        assert_eq!(client.metadata.resource_version, version);
        let again = store
            .get_object::<Secret>("ns", "keycloak-client-portal-secret")
            .await
            .unwrap();
        assert_eq!(again.get("clientSecret"), Some(value.as_str()));
    }

    #[tokio::test]
    async fn test_declared_secret_is_read_not_generated() {
        let store: DynStore = Arc::new(InMemoryStore::new());
        store
            .create_object(&Secret::new("ns", "portal-creds").with_entry("clientSecret", "given"))
            .await
            .unwrap();
        let fake = Arc::new(FakeKeycloak::with_realm("team"));
        let ctx = step_context(store.clone(), fake.clone(), "team");
        let mut client = seed_client(
            &store,
            "portal",
            json!({"clientId": "portal", "secret": "portal-creds"}),
        )
        .await;

        client_chain()
            .serve(&ctx, &mut client, fake.as_ref())
            .await
            .unwrap();

        let remote = fake.realm_state("team").unwrap();
        let rep = &remote.client_by_client_id("portal").unwrap().rep;
        assert_eq!(rep.secret.as_deref(), Some("given"));
        assert_eq!(reload(&store, "portal").await.spec.secret, "$portal-creds:clientSecret");
        assert!(
            store
                .try_get_object::<Secret>("ns", "keycloak-client-portal-secret")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_secret_reference_with_custom_key() {
        let store: DynStore = Arc::new(InMemoryStore::new());
        store
            .create_object(&Secret::new("ns", "shared").with_entry("portal", "from-shared"))
            .await
            .unwrap();
        let fake = Arc::new(FakeKeycloak::with_realm("team"));
        let ctx = step_context(store.clone(), fake.clone(), "team");
        let mut client = seed_client(
            &store,
            "portal",
            json!({"clientId": "portal", "secret": "$shared:portal"}),
        )
        .await;

        client_chain()
            .serve(&ctx, &mut client, fake.as_ref())
            .await
            .unwrap();

        let remote = fake.realm_state("team").unwrap();
        let rep = &remote.client_by_client_id("portal").unwrap().rep;
        assert_eq!(rep.secret.as_deref(), Some("from-shared"));
        let stored = reload(&store, "portal").await;
        assert_eq!(stored.spec.secret, "$shared:portal");
    }

    #[tokio::test]
    async fn test_secret_reference_to_missing_key_fails() {
        let store: DynStore = Arc::new(InMemoryStore::new());
        store
            .create_object(&Secret::new("ns", "shared").with_entry("other", "x"))
            .await
            .unwrap();
        let fake = Arc::new(FakeKeycloak::with_realm("team"));
        let ctx = step_context(store.clone(), fake.clone(), "team");
        let mut client = seed_client(
            &store,
            "portal",
            json!({"clientId": "portal", "secret": "$shared:portal"}),
        )
        .await;

        let err = client_chain()
            .serve(&ctx, &mut client, fake.as_ref())
            .await
            .unwrap_err();
        assert!(
            err.to_string().contains("secret shared does not contain key portal"),
            "{err}"
        );
        assert!(fake.realm_state("team").unwrap().client_by_client_id("portal").is_none());
    }

    #[tokio::test]
    async fn test_public_client_has_no_secret() {
        let store: DynStore = Arc::new(InMemoryStore::new());
        let fake = Arc::new(FakeKeycloak::with_realm("team"));
        let ctx = step_context(store.clone(), fake.clone(), "team");
        let mut client = seed_client(
            &store,
            "spa",
            json!({"clientId": "spa", "public": true}),
        )
        .await;

        client_chain()
            .serve(&ctx, &mut client, fake.as_ref())
            .await
            .unwrap();

        let rep = fake
            .realm_state("team")
            .unwrap()
            .client_by_client_id("spa")
            .unwrap()
            .rep
            .clone();
        assert!(rep.public_client);
        assert_eq!(rep.secret, None);
        assert!(reload(&store, "spa").await.spec.secret.is_empty());
    }

    #[tokio::test]
    async fn test_roles_scopes_and_mappers() {
        let store: DynStore = Arc::new(InMemoryStore::new());
        let fake = Arc::new(FakeKeycloak::with_realm("team"));
        fake.create_realm_role("team", &RoleRepresentation::named("employee"))
            .await
            .unwrap();
        fake.seed_client_scope("team", "profile").unwrap();
        let ctx = step_context(store.clone(), fake.clone(), "team");
        let mut client = seed_client(
            &store,
            "portal",
            json!({
                "clientId": "portal",
                "public": true,
                "clientRoles": ["viewer", "editor"],
                "realmRoles": [{"name": "portal-user", "composite": "employee"}],
                "defaultClientScopes": ["profile"],
                "protocolMappers": [{
                    "name": "groups",
                    "protocolMapper": "oidc-group-membership-mapper",
                    "config": {"claim.name": "groups"}
                }]
            }),
        )
        .await;

        client_chain()
            .serve(&ctx, &mut client, fake.as_ref())
            .await
            .unwrap();

        let state = fake.realm_state("team").unwrap();
        let remote = state.client_by_client_id("portal").unwrap();
        assert_eq!(
            remote.roles.keys().collect::<Vec<_>>(),
            vec!["editor", "viewer"]
        );
        assert!(state.roles.contains_key("portal-user"));
        assert!(state.composites["employee"].contains("portal-user"));
        assert_eq!(remote.default_scopes.len(), 1);
        assert_eq!(remote.mappers.len(), 1);
        assert_eq!(remote.mappers[0].protocol, "openid-connect");

        // Drop a role and change the mapper.
        client.spec.client_roles = vec!["viewer".into()];
        client.spec.protocol_mappers[0]
            .config
            .insert("claim.name".into(), "teams".into());
        fake.clear_calls();
        client_chain()
            .serve(&ctx, &mut client, fake.as_ref())
            .await
            .unwrap();

        let ops = fake.operations();
        assert!(ops.contains(&"delete_client_role"));
        assert!(ops.contains(&"update_protocol_mapper"));
        assert!(!ops.contains(&"create_protocol_mapper"));
        assert!(!ops.contains(&"add_realm_role_composites"));
        let state = fake.realm_state("team").unwrap();
        let remote = state.client_by_client_id("portal").unwrap();
        assert_eq!(remote.roles.keys().collect::<Vec<_>>(), vec!["viewer"]);
        assert_eq!(remote.mappers[0].config["claim.name"], "teams");
    }

    #[tokio::test]
    async fn test_optional_scopes_are_attached_separately() {
        let store: DynStore = Arc::new(InMemoryStore::new());
        let fake = Arc::new(FakeKeycloak::with_realm("team"));
        fake.seed_client_scope("team", "profile").unwrap();
        let phone = fake.seed_client_scope("team", "phone").unwrap();
        let ctx = step_context(store.clone(), fake.clone(), "team");
        let mut client = seed_client(
            &store,
            "portal",
            json!({
                "clientId": "portal",
                "public": true,
                "defaultClientScopes": ["profile"],
                "optionalClientScopes": ["phone"]
            }),
        )
        .await;

        client_chain()
            .serve(&ctx, &mut client, fake.as_ref())
            .await
            .unwrap();

        let state = fake.realm_state("team").unwrap();
        let remote = state.client_by_client_id("portal").unwrap();
        assert_eq!(remote.optional_scopes.iter().collect::<Vec<_>>(), vec![&phone]);
        assert!(!remote.default_scopes.contains(&phone));

        fake.clear_calls();
        client_chain()
            .serve(&ctx, &mut client, fake.as_ref())
            .await
            .unwrap();
        assert!(!fake.operations().contains(&"add_client_optional_scope"));
    }

    #[tokio::test]
    async fn test_unknown_optional_scope_fails() {
        let store: DynStore = Arc::new(InMemoryStore::new());
        let fake = Arc::new(FakeKeycloak::with_realm("team"));
        let ctx = step_context(store.clone(), fake.clone(), "team");
        let mut client = seed_client(
            &store,
            "portal",
            json!({"clientId": "portal", "public": true, "optionalClientScopes": ["ghost"]}),
        )
        .await;

        let err = client_chain()
            .serve(&ctx, &mut client, fake.as_ref())
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "put_client_scope: client scope ghost does not exist"
        );
    }

    #[tokio::test]
    async fn test_unknown_default_scope_fails() {
        let store: DynStore = Arc::new(InMemoryStore::new());
        let fake = Arc::new(FakeKeycloak::with_realm("team"));
        let ctx = step_context(store.clone(), fake.clone(), "team");
        let mut client = seed_client(
            &store,
            "portal",
            json!({"clientId": "portal", "public": true, "defaultClientScopes": ["ghost"]}),
        )
        .await;

        let err = client_chain()
            .serve(&ctx, &mut client, fake.as_ref())
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "put_client_scope: client scope ghost does not exist"
        );
        assert!(!fake.operations().contains(&"get_service_account_user"));
    }

    #[tokio::test]
    async fn test_service_account_roles_and_attributes() {
        let store: DynStore = Arc::new(InMemoryStore::new());
        let fake = Arc::new(FakeKeycloak::with_realm("team"));
        fake.create_realm_role("team", &RoleRepresentation::named("developer"))
            .await
            .unwrap();
        let ctx = step_context(store.clone(), fake.clone(), "team");
        let mut client = seed_client(
            &store,
            "worker",
            json!({
                "clientId": "worker",
                "clientRoles": ["sync"],
                "serviceAccount": {
                    "enabled": true,
                    "realmRoles": ["developer"],
                    "clientRoles": [{"clientId": "worker", "roles": ["sync"]}],
                    "attributes": {"team": ["platform"]}
                }
            }),
        )
        .await;

        client_chain()
            .serve(&ctx, &mut client, fake.as_ref())
            .await
            .unwrap();

        let state = fake.realm_state("team").unwrap();
        let remote = state.client_by_client_id("worker").unwrap();
        let client_id = remote.rep.id.clone().unwrap();
        let sa_id = remote.service_account_user.clone().unwrap();
        assert!(state.user_realm_roles[&sa_id].contains("developer"));
        assert!(state.user_client_roles[&(sa_id.clone(), client_id)].contains("sync"));
        assert_eq!(state.users[&sa_id].attributes["team"], vec!["platform"]);

        fake.clear_calls();
        client_chain()
            .serve(&ctx, &mut client, fake.as_ref())
            .await
            .unwrap();
        assert!(fake.mutating_calls().is_empty(), "{:?}", fake.mutating_calls());
    }

    #[tokio::test]
    async fn test_service_account_on_public_client_fails() {
        let store: DynStore = Arc::new(InMemoryStore::new());
        let fake = Arc::new(FakeKeycloak::with_realm("team"));
        let ctx = step_context(store.clone(), fake.clone(), "team");
        let mut client = seed_client(
            &store,
            "spa",
            json!({"clientId": "spa", "public": true, "serviceAccount": {"enabled": true}}),
        )
        .await;

        let err = client_chain()
            .serve(&ctx, &mut client, fake.as_ref())
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "service_account: service account can not be configured with public client"
        );
    }

    #[tokio::test]
    async fn test_authorization_full_strategy_converges_by_name() {
        let store: DynStore = Arc::new(InMemoryStore::new());
        let fake = Arc::new(FakeKeycloak::with_realm("team"));
        let ctx = step_context(store.clone(), fake.clone(), "team");
        let mut client = seed_client(
            &store,
            "api",
            authorization_spec(json!([
                resource("A", "A"),
                resource("B", "B"),
                resource("C", "C"),
            ])),
        )
        .await;

        client_chain()
            .serve(&ctx, &mut client, fake.as_ref())
            .await
            .unwrap();

        let names = |fake: &FakeKeycloak| {
            let state = fake.realm_state("team").unwrap();
            let remote = state.client_by_client_id("api").unwrap().clone();
            let resources: Vec<String> =
                remote.authz_resources.iter().map(|r| r.name.clone()).collect();
            let policies: Vec<String> = remote.policies.iter().map(|p| p.name.clone()).collect();
            let permissions: Vec<String> =
                remote.permissions.iter().map(|p| p.name.clone()).collect();
            (resources, policies, permissions)
        };
        let (resources, policies, permissions) = names(&fake);
        assert_eq!(resources, vec!["Default Resource", "A", "B", "C"]);
        assert_eq!(policies, vec!["Default Policy", "admins"]);
        assert_eq!(permissions, vec!["Default Permission", "docs-permission"]);

        // {A, B, C} -> {B, C', D}
        client.spec = serde_json::from_value(authorization_spec(json!([
            resource("B", "B"),
            resource("C", "C changed"),
            resource("D", "D"),
        ])))
        .unwrap();
        fake.clear_calls();
        client_chain()
            .serve(&ctx, &mut client, fake.as_ref())
            .await
            .unwrap();

        let resource_ops: Vec<_> = fake
            .mutating_calls()
            .into_iter()
            .filter(|c| c.operation.ends_with("authz_resource"))
            .map(|c| c.operation)
            .collect();
        assert_eq!(
            resource_ops,
            vec![
                "update_authz_resource",
                "create_authz_resource",
                "delete_authz_resource"
            ]
        );
        let (resources, _, _) = names(&fake);
        assert_eq!(resources, vec!["Default Resource", "B", "C", "D"]);

        fake.clear_calls();
        client_chain()
            .serve(&ctx, &mut client, fake.as_ref())
            .await
            .unwrap();
        assert!(fake.mutating_calls().is_empty(), "{:?}", fake.mutating_calls());
    }

    #[tokio::test]
    async fn test_add_only_keeps_undeclared_entries() {
        let store: DynStore = Arc::new(InMemoryStore::new());
        let fake = Arc::new(FakeKeycloak::with_realm("team"));
        let ctx = step_context(store.clone(), fake.clone(), "team");
        let mut spec = authorization_spec(json!([resource("A", "A"), resource("B", "B")]));
        spec["reconciliationStrategy"] = json!("addOnly");
        spec["clientRoles"] = json!(["viewer", "editor"]);
        let mut client = seed_client(&store, "api", spec).await;

        client_chain()
            .serve(&ctx, &mut client, fake.as_ref())
            .await
            .unwrap();

        client.spec.client_roles = vec!["viewer".into()];
        client.spec.authorization.as_mut().unwrap().resources.truncate(1);
        client.spec.authorization.as_mut().unwrap().policies.clear();
        fake.clear_calls();
        client_chain()
            .serve(&ctx, &mut client, fake.as_ref())
            .await
            .unwrap();

        assert!(
            !fake
                .mutating_calls()
                .iter()
                .any(|c| c.operation.starts_with("delete_")),
            "{:?}",
            fake.mutating_calls()
        );
    }

    #[tokio::test]
    async fn test_authorization_disabled_stops_pipeline() {
        let store: DynStore = Arc::new(InMemoryStore::new());
        let fake = Arc::new(FakeKeycloak::with_realm("team"));
        let ctx = step_context(store.clone(), fake.clone(), "team");
        let mut spec = authorization_spec(json!([resource("A", "A")]));
        spec["authorizationServicesEnabled"] = json!(false);
        let mut client = seed_client(&store, "api", spec).await;

        client_chain()
            .serve(&ctx, &mut client, fake.as_ref())
            .await
            .unwrap();

        let ops = fake.operations();
        assert!(!ops.contains(&"list_authz_scopes"));
        assert!(!ops.contains(&"list_authz_resources"));
        assert!(!ops.contains(&"list_authz_policies"));
    }
}
