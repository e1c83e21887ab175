//! End-to-end runs of the manager against the in-memory Keycloak.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use realmsync_auth::SessionCache;
use realmsync_auth::testing::StaticClientFactory;
use realmsync_config::ReconcileConfig;
use realmsync_core::kinds::{Keycloak, KeycloakClient, KeycloakRealm, KeycloakRealmRole};
use realmsync_core::{ObjectKey, Secret, StatusValue};
use realmsync_db_memory::InMemoryStore;
use realmsync_keycloak::KeycloakApi;
use realmsync_keycloak::testing::FakeKeycloak;
use realmsync_operator::{Context, Manager, reconcilers};
use realmsync_storage::{DynStore, EventBroadcaster, EventedStore};
use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinSet;

struct Running {
    store: DynStore,
    fake: Arc<FakeKeycloak>,
    shutdown: watch::Sender<bool>,
    tasks: JoinSet<()>,
}

impl Running {
    async fn stop(mut self) {
        self.shutdown.send(true).unwrap();
        while self.tasks.join_next().await.is_some() {}
    }
}

fn fast_config() -> ReconcileConfig {
    ReconcileConfig {
        success_interval: Duration::from_secs(60),
        failure_backoff_step: Duration::from_millis(20),
        unavailable_retry: Duration::from_millis(20),
        default_requeue: Duration::from_millis(20),
        workers: 3,
        namespace: None,
    }
}

fn start(fake: Arc<FakeKeycloak>) -> Running {
    let events = EventBroadcaster::new_shared();
    let store: DynStore = Arc::new(EventedStore::new(InMemoryStore::new(), events.clone()));
    let sessions = SessionCache::new(store.clone(), Arc::new(StaticClientFactory::new(fake.clone())));
    let config = fast_config();
    let ctx = Context::new(store.clone(), Arc::new(sessions), &config)
        .with_deadline(Duration::from_secs(5));
    let (shutdown, tasks) =
        Manager::new(store.clone(), events, reconcilers::all(&ctx), config.workers).start();
    Running {
        store,
        fake,
        shutdown,
        tasks,
    }
}

async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..250 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for {what}");
}

async fn declare(store: &DynStore, kind: &str, name: &str, spec: serde_json::Value) {
    store
        .create(
            kind,
            json!({"metadata": {"name": name, "namespace": "iam"}, "spec": spec}),
        )
        .await
        .unwrap();
}

async fn declare_instance(store: &DynStore) {
    store
        .create_object(
            &Secret::new("iam", "kc-admin")
                .with_entry("username", "admin")
                .with_entry("password", "admin"),
        )
        .await
        .unwrap();
    declare(
        store,
        "Keycloak",
        "main",
        json!({"url": "https://sso.test", "secret": "kc-admin"}),
    )
    .await;
    declare(
        store,
        "KeycloakRealm",
        "team",
        json!({
            "realmName": "team",
            "keycloakRef": {"kind": "Keycloak", "name": "main"},
            "ssoRealmEnabled": false,
            "displayName": "Team"
        }),
    )
    .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_declared_objects_converge() {
    let running = start(Arc::new(FakeKeycloak::new()));
    let store = &running.store;
    let fake = &running.fake;

    declare_instance(store).await;
    declare(
        store,
        "KeycloakRealmRole",
        "developer",
        json!({
            "name": "developer",
            "realmRef": {"kind": "KeycloakRealm", "name": "team"},
            "description": "Writes code"
        }),
    )
    .await;
    declare(
        store,
        "KeycloakClient",
        "portal",
        json!({
            "clientId": "portal",
            "realmRef": {"kind": "KeycloakRealm", "name": "team"},
            "public": true,
            "webUrl": "https://portal.test"
        }),
    )
    .await;

    eventually("instance to connect", || async move {
        store
            .get_object::<Keycloak>("iam", "main")
            .await
            .is_ok_and(|k| k.status.connected)
    })
    .await;
    eventually("realm to be created", || async move {
        fake.get_realm("team").await.is_ok_and(|r| r.is_some())
    })
    .await;
    eventually("role to converge", || async move {
        store
            .get_object::<KeycloakRealmRole>("iam", "developer")
            .await
            .is_ok_and(|r| r.status.value == StatusValue::Ok)
    })
    .await;
    eventually("client to converge", || async move {
        store
            .get_object::<KeycloakClient>("iam", "portal")
            .await
            .is_ok_and(|c| c.status.value == StatusValue::Ok)
    })
    .await;

    let realm = store.get_object::<KeycloakRealm>("iam", "team").await.unwrap();
    assert_eq!(realm.status.value, StatusValue::Ok);
    let role = fake.get_realm_role("team", "developer").await.unwrap().unwrap();
    assert_eq!(role.description.as_deref(), Some("Writes code"));
    let client = store.get_object::<KeycloakClient>("iam", "portal").await.unwrap();
    assert_eq!(
        client.spec.attributes.get("post.logout.redirect.uris").map(String::as_str),
        Some("+")
    );
    assert!(
        fake.realm_state("team")
            .unwrap()
            .client_by_client_id("portal")
            .is_some()
    );

    running.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_deleted_realm_is_removed_remotely() {
    let running = start(Arc::new(FakeKeycloak::new()));
    let store = &running.store;
    let fake = &running.fake;

    declare_instance(store).await;
    eventually("realm to converge", || async move {
        store
            .get_object::<KeycloakRealm>("iam", "team")
            .await
            .is_ok_and(|r| r.status.value == StatusValue::Ok)
    })
    .await;

    store
        .delete("KeycloakRealm", &ObjectKey::new("iam", "team"))
        .await
        .unwrap();
    eventually("realm object to go away", || async move {
        store
            .get("KeycloakRealm", &ObjectKey::new("iam", "team"))
            .await
            .is_ok_and(|r| r.is_none())
    })
    .await;
    assert!(fake.get_realm("team").await.unwrap().is_none());
    assert!(fake.operations().contains(&"delete_realm"));

    running.stop().await;
}
