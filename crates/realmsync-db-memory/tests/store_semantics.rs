use std::sync::Arc;

use realmsync_core::kinds::{KeycloakClient, KeycloakRealm};
use realmsync_core::{ObjectKey, Resource, Secret, StatusValue};
use realmsync_db_memory::{InMemoryStore, create_store};
use realmsync_storage::{
    DynStore, EventBroadcaster, EventedStore, ListParams, ObjectEventType, ObjectStore,
};
use serde_json::json;

fn realm(name: &str) -> KeycloakRealm {
    serde_json::from_value(json!({
        "metadata": {"name": name, "namespace": "ns"},
        "spec": {"realmName": name}
    }))
    .unwrap()
}

#[tokio::test]
async fn test_create_assigns_uid_and_version() {
    let store = create_store();
    let created = store.create_object(&realm("team")).await.unwrap();

    assert!(!created.metadata.uid.is_empty());
    assert!(created.metadata.resource_version > 0);

    let err = store.create_object(&realm("team")).await.unwrap_err();
    assert!(err.is_already_exists());
}

#[tokio::test]
async fn test_create_rejects_missing_metadata() {
    let store = InMemoryStore::new();
    let err = store
        .create("KeycloakRealm", json!({"spec": {}}))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        realmsync_storage::StorageError::InvalidObject { .. }
    ));
}

#[tokio::test]
async fn test_update_keeps_status_and_update_status_keeps_spec() {
    let store = create_store();
    let mut stored = store.create_object(&realm("team")).await.unwrap();

    stored.status.set_failure("boom");
    let stored = store.update_object_status(&stored).await.unwrap();

    let mut edited = stored.clone();
    edited.spec.display_name = "Team".to_string();
    edited.status.set_success();
    let updated = store.update_object(&edited).await.unwrap();

    assert_eq!(updated.spec.display_name, "Team");
    assert_eq!(updated.status.value, StatusValue::Error("boom".to_string()));

    let mut status_only = updated.clone();
    status_only.spec.display_name = "Ignored".to_string();
    status_only.status.set_success();
    let after = store.update_object_status(&status_only).await.unwrap();

    assert_eq!(after.spec.display_name, "Team");
    assert_eq!(after.status.value, StatusValue::Ok);
}

#[tokio::test]
async fn test_stale_update_conflicts() {
    let store = create_store();
    let first = store.create_object(&realm("team")).await.unwrap();

    let mut newer = first.clone();
    newer.metadata.labels.insert("a".into(), "b".into());
    store.update_object(&newer).await.unwrap();

    let mut stale = first;
    stale.metadata.labels.insert("c".into(), "d".into());
    let err = store.update_object(&stale).await.unwrap_err();
    assert!(err.is_version_conflict());
}

#[tokio::test]
async fn test_noop_update_keeps_version() {
    let store = create_store();
    let created = store.create_object(&realm("team")).await.unwrap();
    let again = store.update_object(&created).await.unwrap();
    assert_eq!(
        created.metadata.resource_version,
        again.metadata.resource_version
    );
}

#[tokio::test]
async fn test_finalizer_gates_deletion() {
    let store = create_store();
    let mut r = realm("team");
    r.metadata.add_finalizer("keycloak.realm.operator.finalizer.name");
    let created = store.create_object(&r).await.unwrap();

    store.delete_object(&created).await.unwrap();
    let marked: KeycloakRealm = store.get_object("ns", "team").await.unwrap();
    assert!(marked.metadata.is_being_deleted());

    // A second delete request is idempotent.
    store.delete_object(&marked).await.unwrap();

    let mut released = marked;
    released
        .metadata
        .remove_finalizer("keycloak.realm.operator.finalizer.name");
    store.update_object(&released).await.unwrap();

    let gone = store
        .try_get_object::<KeycloakRealm>("ns", "team")
        .await
        .unwrap();
    assert!(gone.is_none());
}

#[tokio::test]
async fn test_removal_collects_owned_objects() {
    let store = create_store();
    let parent = store.create_object(&realm("team")).await.unwrap();

    let secret = Secret::new("ns", "owned").with_owner(parent.owner_reference());
    store.create_object(&secret).await.unwrap();
    store
        .create_object(&Secret::new("ns", "unrelated"))
        .await
        .unwrap();

    store.delete_object(&parent).await.unwrap();

    assert!(
        store
            .try_get_object::<Secret>("ns", "owned")
            .await
            .unwrap()
            .is_none()
    );
    assert!(
        store
            .try_get_object::<Secret>("ns", "unrelated")
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn test_owned_object_with_finalizer_is_only_marked() {
    let store = create_store();
    let parent = store.create_object(&realm("team")).await.unwrap();

    let mut client: KeycloakClient = serde_json::from_value(json!({
        "metadata": {"name": "portal", "namespace": "ns"},
        "spec": {"clientId": "portal"}
    }))
    .unwrap();
    client.metadata.set_owner(parent.owner_reference());
    client
        .metadata
        .add_finalizer("keycloak.client.operator.finalizer.name");
    store.create_object(&client).await.unwrap();

    store.delete_object(&parent).await.unwrap();

    let child: KeycloakClient = store.get_object("ns", "portal").await.unwrap();
    assert!(child.metadata.is_being_deleted());
}

#[tokio::test]
async fn test_list_filters_by_label_and_namespace() {
    let store = create_store();
    let mut labelled = realm("team");
    labelled
        .metadata
        .labels
        .insert("targetRealm".into(), "team".into());
    store.create_object(&labelled).await.unwrap();
    store.create_object(&realm("other")).await.unwrap();

    let all: Vec<KeycloakRealm> = store.list_objects(&ListParams::new()).await.unwrap();
    assert_eq!(
        all.iter().map(|r| r.name()).collect::<Vec<_>>(),
        vec!["other", "team"]
    );

    let by_label: Vec<KeycloakRealm> = store
        .list_objects(&ListParams::new().with_label("targetRealm", "team"))
        .await
        .unwrap();
    assert_eq!(by_label.len(), 1);

    let elsewhere: Vec<KeycloakRealm> = store
        .list_objects(&ListParams::new().in_namespace("elsewhere"))
        .await
        .unwrap();
    assert!(elsewhere.is_empty());
}

#[tokio::test]
async fn test_evented_store_emits_on_change_only() {
    let broadcaster = EventBroadcaster::new_shared();
    let store: DynStore = Arc::new(EventedStore::new(
        InMemoryStore::new(),
        broadcaster.clone(),
    ));
    let mut rx = broadcaster.subscribe();

    let created = store.create_object(&realm("team")).await.unwrap();
    let event = rx.recv().await.unwrap();
    assert_eq!(event.event_type, ObjectEventType::Created);
    assert_eq!(event.key, ObjectKey::new("ns", "team"));

    // Unchanged update: no event.
    store.update_object(&created).await.unwrap();

    let mut status = created.clone();
    status.status.set_success();
    store.update_object_status(&status).await.unwrap();
    let event = rx.recv().await.unwrap();
    assert_eq!(event.event_type, ObjectEventType::StatusUpdated);

    store.delete_object(&created).await.unwrap();
    let event = rx.recv().await.unwrap();
    assert_eq!(event.event_type, ObjectEventType::Deleted);
    assert_eq!(event.kind, "KeycloakRealm");
}
