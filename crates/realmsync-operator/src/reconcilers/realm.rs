use async_trait::async_trait;
use realmsync_core::kinds::KeycloakRealm;
use realmsync_core::names::REALM_FINALIZER;
use realmsync_core::{ObjectKey, Resource};
use tracing::warn;

use super::{Converge, Reconciler, Synced, drive};
use crate::chain::realm::realm_chain;
use crate::chain::{Chain, StepContext};
use crate::context::Context;
use crate::error::{ReconcileError, ReconcileResult};
use crate::lifecycle::Action;
use crate::terminators::{RemoteTarget, RemoteTerminator};

pub struct RealmReconciler {
    ctx: Context,
    chain: Chain<KeycloakRealm>,
}

impl RealmReconciler {
    pub fn new(ctx: Context) -> Self {
        Self {
            ctx,
            chain: realm_chain(),
        }
    }
}

#[async_trait]
impl Reconciler for RealmReconciler {
    fn kind(&self) -> &'static str {
        KeycloakRealm::KIND
    }

    async fn reconcile(&self, key: &ObjectKey) -> Action {
        drive(self, key).await
    }
}

#[async_trait]
impl Converge for RealmReconciler {
    type Object = KeycloakRealm;

    fn context(&self) -> &Context {
        &self.ctx
    }

    async fn converge(&self, realm: &mut KeycloakRealm) -> ReconcileResult<Synced> {
        let conn = match self.ctx.helper.client_for_realm(realm).await {
            Ok(conn) => conn,
            Err(e @ ReconcileError::OwnerNotFound { .. }) if realm.metadata.is_being_deleted() => {
                warn!(error = %e, "Keycloak is gone, releasing realm finalizer");
                self.ctx.lifecycle.release(realm, REALM_FINALIZER).await?;
                return Ok(Synced::Skip(Action::Done));
            }
            Err(e) => return Err(e),
        };

        let result = async {
            let terminator = RemoteTerminator::new(
                conn.api.clone(),
                conn.realm_name(),
                RemoteTarget::Realm,
                &realm.metadata,
            );
            if self
                .ctx
                .lifecycle
                .try_to_delete(realm, &terminator, REALM_FINALIZER)
                .await?
            {
                return Ok(Synced::Skip(Action::Done));
            }

            let step_ctx = StepContext {
                store: self.ctx.store.clone(),
                sessions: self.ctx.sessions().clone(),
                keycloak: conn.keycloak.clone(),
                realm: conn.realm_name().to_string(),
            };
            self.chain
                .serve(&step_ctx, realm, conn.api.as_ref())
                .await?;
            Ok(Synced::Converged)
        }
        .await;
        self.ctx.helper.settle(&conn.keycloak, result).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcilers::test_support::harness;
    use realmsync_core::StatusValue;
    use realmsync_core::names::PRESERVE_RESOURCES_ON_DELETION;

    async fn reconcile(reconciler: &RealmReconciler) -> Action {
        reconciler.reconcile(&ObjectKey::new("ns", "team")).await
    }

    #[tokio::test]
    async fn test_converges_then_only_reads() {
        let h = harness().await;
        let reconciler = RealmReconciler::new(h.ctx.clone());

        reconcile(&reconciler).await;
        let realm = h.store.get_object::<KeycloakRealm>("ns", "team").await.unwrap();
        assert_eq!(realm.status.value, StatusValue::Ok);
        assert!(realm.metadata.has_finalizer(REALM_FINALIZER));

        h.fake.clear_calls();
        reconcile(&reconciler).await;
        assert!(h.fake.mutating_calls().is_empty(), "{:?}", h.fake.mutating_calls());
        let realm = h.store.get_object::<KeycloakRealm>("ns", "team").await.unwrap();
        assert_eq!(realm.status.value, StatusValue::Ok);
        assert_eq!(realm.status.failure_count, 0);
    }

    #[tokio::test]
    async fn test_deleting_realm_is_removed_remotely() {
        let h = harness().await;
        let reconciler = RealmReconciler::new(h.ctx.clone());
        reconcile(&reconciler).await;

        let realm = h.store.get_object::<KeycloakRealm>("ns", "team").await.unwrap();
        h.store.delete_object(&realm).await.unwrap();
        h.fake.clear_calls();

        assert_eq!(reconcile(&reconciler).await, Action::Done);
        assert_eq!(h.fake.mutating_calls().len(), 1);
        assert_eq!(h.fake.mutating_calls()[0].operation, "delete_realm");
        assert!(h.fake.realm_state("team").is_none());
        assert!(
            h.store
                .try_get_object::<KeycloakRealm>("ns", "team")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_preserved_realm_keeps_remote() {
        let h = harness().await;
        let reconciler = RealmReconciler::new(h.ctx.clone());
        reconcile(&reconciler).await;

        let mut realm = h.store.get_object::<KeycloakRealm>("ns", "team").await.unwrap();
        realm
            .metadata
            .annotations
            .insert(PRESERVE_RESOURCES_ON_DELETION.to_string(), "true".to_string());
        let realm = h.store.update_object(&realm).await.unwrap();
        h.store.delete_object(&realm).await.unwrap();
        h.fake.clear_calls();

        assert_eq!(reconcile(&reconciler).await, Action::Done);
        assert!(h.fake.mutating_calls().is_empty());
        assert!(h.fake.realm_state("team").is_some());
        assert!(
            h.store
                .try_get_object::<KeycloakRealm>("ns", "team")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_disconnected_keycloak_does_not_count_failures() {
        let h = harness().await;
        let mut kc = h
            .store
            .get_object::<realmsync_core::kinds::Keycloak>("ns", "kc")
            .await
            .unwrap();
        kc.status.connected = false;
        h.store.update_object_status(&kc).await.unwrap();

        let action = reconcile(&RealmReconciler::new(h.ctx.clone())).await;
        assert_eq!(action, Action::Requeue(std::time::Duration::from_secs(60)));
        let realm = h.store.get_object::<KeycloakRealm>("ns", "team").await.unwrap();
        assert_eq!(realm.status.failure_count, 0);
        assert_eq!(realm.status.value, StatusValue::Pending);
        assert!(h.fake.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failure_is_recorded_with_step() {
        let h = harness().await;
        h.fake.fail_on("update_realm_events_config", 500);
        let mut realm = h.store.get_object::<KeycloakRealm>("ns", "team").await.unwrap();
        realm.spec.realm_event_config =
            Some(serde_json::from_value(serde_json::json!({"eventsEnabled": true})).unwrap());
        h.store.update_object(&realm).await.unwrap();

        let action = reconcile(&RealmReconciler::new(h.ctx.clone())).await;
        assert_eq!(action, Action::Requeue(std::time::Duration::from_secs(10)));
        let realm = h.store.get_object::<KeycloakRealm>("ns", "team").await.unwrap();
        assert_eq!(realm.status.failure_count, 1);
        match &realm.status.value {
            StatusValue::Error(text) => assert!(text.starts_with("realm_settings: "), "{text}"),
            other => panic!("unexpected status {other:?}"),
        }
    }
}
