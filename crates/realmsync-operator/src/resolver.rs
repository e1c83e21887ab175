//! Owner resolution.
//!
//! Every realm-scoped object has to be tied to a [`KeycloakRealm`], and every
//! realm to a [`Keycloak`] instance, before anything is sent to the server.
//! Objects created before typed references existed name their realm through a
//! free-text field; those are matched by label first and by a linear scan
//! second, and the resolved owner is written back once so later passes take
//! the fast path.

use std::sync::Arc;

use realmsync_auth::SessionCache;
use realmsync_core::kinds::{Keycloak, KeycloakRealm};
use realmsync_core::names::{LEGACY_DEFAULT_REALM, TARGET_REALM_LABEL};
use realmsync_core::{RealmChild, Resource};
use realmsync_keycloak::KeycloakApi;
use realmsync_storage::{DynStore, ListParams};
use tracing::{debug, info, warn};

use crate::error::{ErrorKind, ReconcileError, ReconcileResult};

/// Finds the realm a child object belongs to.
#[derive(Clone)]
pub struct RealmResolver {
    store: DynStore,
}

impl RealmResolver {
    pub fn new(store: DynStore) -> Self {
        Self { store }
    }

    /// Resolves the owning realm of `child`.
    ///
    /// Lookup order:
    /// 1. `realmRef`
    /// 2. the controlling owner reference of kind `KeycloakRealm`
    /// 3. the legacy realm field, through the `targetRealm` label
    /// 4. the legacy realm field, through a scan of all realms
    /// 5. a realm named `main`
    ///
    /// When one of the legacy passes matched, the owner reference is recorded
    /// and the legacy field cleared with a single update of `child`.
    pub async fn resolve<C: RealmChild>(&self, child: &mut C) -> ReconcileResult<KeycloakRealm> {
        let namespace = child.namespace().to_string();

        if let Some(realm_ref) = child.realm_ref() {
            let name = realm_ref.name.clone();
            return self.named(&namespace, &name).await;
        }
        if let Some(owner) = child
            .meta()
            .owner_references
            .iter()
            .find(|o| o.kind == KeycloakRealm::KIND && o.controller)
        {
            let name = owner.name.clone();
            return self.named(&namespace, &name).await;
        }

        let target = child
            .legacy_target_realm()
            .unwrap_or(LEGACY_DEFAULT_REALM)
            .to_string();
        let realm = match self.legacy_lookup(&namespace, &target).await? {
            Some(realm) => realm,
            None => {
                return Err(ReconcileError::owner_not_found(
                    KeycloakRealm::KIND,
                    target,
                ));
            }
        };

        info!(
            kind = C::KIND,
            name = %child.name(),
            realm = %realm.name(),
            "Recording realm owner reference"
        );
        // Non-controlling realm owners only tie the child's lifetime to
        // another realm and stay in place.
        let meta = child.meta_mut();
        meta.owner_references
            .retain(|o| !(o.kind == KeycloakRealm::KIND && o.controller));
        meta.owner_references.push(realm.owner_reference());
        child.clear_legacy_target_realm();
        *child = self.store.update_object(child).await?;
        Ok(realm)
    }

    async fn named(&self, namespace: &str, name: &str) -> ReconcileResult<KeycloakRealm> {
        self.store
            .try_get_object::<KeycloakRealm>(namespace, name)
            .await?
            .ok_or_else(|| ReconcileError::owner_not_found(KeycloakRealm::KIND, name))
    }

    async fn legacy_lookup(
        &self,
        namespace: &str,
        target: &str,
    ) -> ReconcileResult<Option<KeycloakRealm>> {
        let labelled = ListParams::new()
            .in_namespace(namespace)
            .with_label(TARGET_REALM_LABEL, target);
        if let Some(realm) = self
            .store
            .list_objects::<KeycloakRealm>(&labelled)
            .await?
            .into_iter()
            .next()
        {
            return Ok(Some(realm));
        }

        if let Some(realm) = self.scan(namespace, target).await? {
            return Ok(Some(realm));
        }

        if target != LEGACY_DEFAULT_REALM {
            debug!(target, "Falling back to the legacy default realm");
            return self.scan(namespace, LEGACY_DEFAULT_REALM).await;
        }
        Ok(None)
    }

    /// Deprecated: linear scan for realms that predate the `targetRealm` label.
    async fn scan(&self, namespace: &str, target: &str) -> ReconcileResult<Option<KeycloakRealm>> {
        let realms = self
            .store
            .list_objects::<KeycloakRealm>(&ListParams::new().in_namespace(namespace))
            .await?;
        Ok(realms
            .into_iter()
            .find(|r| r.spec.realm_name == target || r.name() == target))
    }
}

/// Finds the Keycloak instance a realm is managed on.
#[derive(Clone)]
pub struct KeycloakResolver {
    store: DynStore,
}

impl KeycloakResolver {
    pub fn new(store: DynStore) -> Self {
        Self { store }
    }

    pub async fn resolve(&self, realm: &KeycloakRealm) -> ReconcileResult<Keycloak> {
        let name = realm
            .spec
            .keycloak_ref
            .as_ref()
            .filter(|r| !r.is_empty())
            .map(|r| r.name.clone())
            .or_else(|| {
                realm
                    .meta()
                    .owner_of_kind(Keycloak::KIND)
                    .map(|o| o.name.clone())
            })
            .ok_or_else(|| {
                ReconcileError::owner_not_found(
                    Keycloak::KIND,
                    format!("for realm {}", realm.name()),
                )
            })?;

        self.store
            .try_get_object::<Keycloak>(realm.namespace(), &name)
            .await?
            .ok_or_else(|| ReconcileError::owner_not_found(Keycloak::KIND, name))
    }
}

/// A live connection to the server a realm lives on.
pub struct Connection {
    pub realm: KeycloakRealm,
    pub keycloak: Keycloak,
    pub api: Arc<dyn KeycloakApi>,
}

impl Connection {
    /// Name of the realm on the server.
    pub fn realm_name(&self) -> &str {
        &self.realm.spec.realm_name
    }
}

/// Resolves owners and hands out authenticated clients.
#[derive(Clone)]
pub struct Helper {
    realms: RealmResolver,
    keycloaks: KeycloakResolver,
    sessions: Arc<SessionCache>,
}

impl Helper {
    pub fn new(store: DynStore, sessions: Arc<SessionCache>) -> Self {
        Self {
            realms: RealmResolver::new(store.clone()),
            keycloaks: KeycloakResolver::new(store),
            sessions,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionCache> {
        &self.sessions
    }

    pub async fn owner_realm<C: RealmChild>(&self, child: &mut C) -> ReconcileResult<KeycloakRealm> {
        self.realms.resolve(child).await
    }

    pub async fn client_for_realm(&self, realm: &KeycloakRealm) -> ReconcileResult<Connection> {
        let keycloak = self.keycloaks.resolve(realm).await?;
        let api = self.sessions.acquire(&keycloak).await?;
        Ok(Connection {
            realm: realm.clone(),
            keycloak,
            api,
        })
    }

    pub async fn client_for_child<C: RealmChild>(&self, child: &mut C) -> ReconcileResult<Connection> {
        let realm = self.owner_realm(child).await?;
        self.client_for_realm(&realm).await
    }

    /// Drops the cached session of `keycloak` when `result` failed on an
    /// expired token, so the next attempt logs in again.
    pub async fn settle<T>(
        &self,
        keycloak: &Keycloak,
        result: ReconcileResult<T>,
    ) -> ReconcileResult<T> {
        if let Err(e) = &result
            && e.kind() == ErrorKind::TokenExpired
        {
            warn!(keycloak = %keycloak.name(), "Session token rejected, invalidating session");
            if let Err(invalidate_err) = self.sessions.invalidate(keycloak).await {
                warn!(error = %invalidate_err, "Failed to invalidate session");
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use realmsync_core::kinds::{KeycloakClient, KeycloakRealmRole};
    use realmsync_core::{ObjectKey, ObjectRef};
    use realmsync_db_memory::InMemoryStore;
    use serde_json::json;

    fn store() -> DynStore {
        Arc::new(InMemoryStore::new())
    }

    async fn seed_realm(store: &DynStore, name: &str, realm_name: &str, labelled: bool) {
        let mut value = json!({
            "metadata": {"name": name, "namespace": "ns"},
            "spec": {"realmName": realm_name}
        });
        if labelled {
            value["metadata"]["labels"] = json!({"targetRealm": realm_name});
        }
        store.create("KeycloakRealm", value).await.unwrap();
    }

    async fn seed_client(store: &DynStore, spec: serde_json::Value) -> KeycloakClient {
        let value = json!({"metadata": {"name": "portal", "namespace": "ns"}, "spec": spec});
        KeycloakClient::from_value(store.create("KeycloakClient", value).await.unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_realm_ref_wins() {
        let store = store();
        seed_realm(&store, "team", "team", true).await;
        seed_realm(&store, "other", "other", true).await;
        let mut client = seed_client(
            &store,
            json!({"clientId": "portal", "targetRealm": "other", "realmRef": {"kind": "KeycloakRealm", "name": "team"}}),
        )
        .await;
        let version = client.metadata.resource_version;

        let realm = RealmResolver::new(store.clone())
            .resolve(&mut client)
            .await
            .unwrap();
        assert_eq!(realm.name(), "team");
        assert_eq!(client.metadata.resource_version, version);
    }

    #[tokio::test]
    async fn test_label_fast_path_records_owner() {
        let store = store();
        seed_realm(&store, "team-realm", "team", true).await;
        let mut client = seed_client(&store, json!({"clientId": "portal", "targetRealm": "team"})).await;

        let realm = RealmResolver::new(store.clone())
            .resolve(&mut client)
            .await
            .unwrap();
        assert_eq!(realm.name(), "team-realm");
        assert_eq!(
            client.metadata.owner_of_kind("KeycloakRealm").unwrap().name,
            "team-realm"
        );
        assert!(client.spec.target_realm.is_empty());

        let stored = store
            .get_object::<KeycloakClient>("ns", "portal")
            .await
            .unwrap();
        assert!(stored.metadata.owner_of_kind("KeycloakRealm").is_some());
        assert!(stored.spec.target_realm.is_empty());
    }

    #[tokio::test]
    async fn test_scan_finds_unlabelled_realm() {
        let store = store();
        seed_realm(&store, "team-realm", "team", false).await;
        let mut client = seed_client(&store, json!({"clientId": "portal", "targetRealm": "team"})).await;

        let realm = RealmResolver::new(store.clone())
            .resolve(&mut client)
            .await
            .unwrap();
        assert_eq!(realm.name(), "team-realm");
    }

    #[tokio::test]
    async fn test_legacy_default_realm() {
        let store = store();
        seed_realm(&store, "main", "main", false).await;
        let role = json!({
            "metadata": {"name": "admin", "namespace": "ns"},
            "spec": {"name": "admin"}
        });
        let mut role =
            KeycloakRealmRole::from_value(store.create("KeycloakRealmRole", role).await.unwrap())
                .unwrap();

        let realm = RealmResolver::new(store.clone())
            .resolve(&mut role)
            .await
            .unwrap();
        assert_eq!(realm.name(), "main");
        assert!(role.metadata.owner_of_kind("KeycloakRealm").is_some());
    }

    #[tokio::test]
    async fn test_unresolvable_owner_fails_without_write() {
        let store = store();
        let mut client = seed_client(&store, json!({"clientId": "portal", "targetRealm": "team"})).await;
        let version = client.metadata.resource_version;

        let err = RealmResolver::new(store.clone())
            .resolve(&mut client)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let stored = store
            .get("KeycloakClient", &ObjectKey::new("ns", "portal"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored["metadata"]["resourceVersion"], version);
    }

    #[tokio::test]
    async fn test_keycloak_resolution() {
        let store = store();
        store
            .create(
                "Keycloak",
                json!({"metadata": {"name": "kc", "namespace": "ns"}, "spec": {"url": "https://kc", "secret": "creds"}}),
            )
            .await
            .unwrap();
        let mut realm: KeycloakRealm = serde_json::from_value(json!({
            "metadata": {"name": "team", "namespace": "ns"},
            "spec": {"realmName": "team"}
        }))
        .unwrap();

        let resolver = KeycloakResolver::new(store);
        assert_eq!(
            resolver.resolve(&realm).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );

        realm.spec.keycloak_ref = Some(ObjectRef::new("Keycloak", "kc"));
        assert_eq!(resolver.resolve(&realm).await.unwrap().name(), "kc");
    }
}
