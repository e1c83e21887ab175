use async_trait::async_trait;
use realmsync_core::{ObjectKey, Resource};
use realmsync_core::kinds::Keycloak;
use tracing::{debug, info, warn};

use super::Reconciler;
use crate::context::Context;
use crate::lifecycle::Action;

const CONNECTED: &str = "OK";

/// Probes every Keycloak instance and publishes `status.connected`, which
/// gates all other reconcilers working against that instance.
pub struct KeycloakReconciler {
    ctx: Context,
}

impl KeycloakReconciler {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Reconciler for KeycloakReconciler {
    fn kind(&self) -> &'static str {
        Keycloak::KIND
    }

    async fn reconcile(&self, key: &ObjectKey) -> Action {
        let lifecycle = &self.ctx.lifecycle;
        let mut keycloak = match self
            .ctx
            .store
            .try_get_object::<Keycloak>(&key.namespace, &key.name)
            .await
        {
            Ok(Some(keycloak)) => keycloak,
            Ok(None) => {
                self.ctx.sessions().forget(key);
                return Action::Done;
            }
            Err(e) => {
                warn!(error = %e, "Unable to read Keycloak");
                return Action::Requeue(lifecycle.default_requeue());
            }
        };

        let (connected, value) = match self.ctx.sessions().acquire_unchecked(&keycloak).await {
            Ok(_) => (true, CONNECTED.to_string()),
            Err(e) => {
                warn!(url = %keycloak.spec.url, error = %e, "Keycloak is not reachable");
                (false, e.to_string())
            }
        };

        if keycloak.status.connected != connected || keycloak.status.value != value {
            if connected {
                info!(url = %keycloak.spec.url, "Keycloak connected");
            }
            keycloak.status.connected = connected;
            keycloak.status.value = value;
            if let Err(e) = self.ctx.store.update_object_status(&keycloak).await {
                warn!(error = %e, "Failed to write Keycloak status");
                return Action::Requeue(lifecycle.default_requeue());
            }
        } else {
            debug!(connected, "Keycloak status unchanged");
        }

        if connected {
            Action::Requeue(lifecycle.success_interval())
        } else {
            Action::Requeue(lifecycle.default_requeue())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcilers::test_support::harness;
    use realmsync_core::Secret;
    use std::time::Duration;

    #[tokio::test]
    async fn test_connected_instance() {
        let h = harness().await;
        let reconciler = KeycloakReconciler::new(h.ctx.clone());

        let action = reconciler.reconcile(&ObjectKey::new("ns", "kc")).await;
        assert_eq!(action, Action::Requeue(Duration::from_secs(120)));

        let kc = h.store.get_object::<Keycloak>("ns", "kc").await.unwrap();
        assert!(kc.status.connected);
        assert_eq!(kc.status.value, "OK");
        assert!(
            h.store
                .try_get_object::<Secret>("ns", "kc-token-kc")
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_missing_credentials_disconnects() {
        let h = harness().await;
        let creds = h.store.get_object::<Secret>("ns", "kc-creds").await.unwrap();
        h.store.delete_object(&creds).await.unwrap();

        let action = KeycloakReconciler::new(h.ctx.clone())
            .reconcile(&ObjectKey::new("ns", "kc"))
            .await;
        assert_eq!(action, Action::Requeue(Duration::from_secs(5)));

        let kc = h.store.get_object::<Keycloak>("ns", "kc").await.unwrap();
        assert!(!kc.status.connected);
        assert!(!kc.status.value.is_empty());
    }

    #[tokio::test]
    async fn test_removed_instance_releases_its_session() {
        let h = harness().await;
        let reconciler = KeycloakReconciler::new(h.ctx.clone());
        let key = ObjectKey::new("ns", "kc");

        reconciler.reconcile(&key).await;
        assert!(h.ctx.sessions().has_session(&key));

        let kc = h.store.get_object::<Keycloak>("ns", "kc").await.unwrap();
        h.store.delete_object(&kc).await.unwrap();
        assert_eq!(reconciler.reconcile(&key).await, Action::Done);
        assert!(!h.ctx.sessions().has_session(&key));
    }
}
