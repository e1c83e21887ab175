use async_trait::async_trait;
use realmsync_core::kinds::KeycloakRealm;
use realmsync_core::names::TARGET_REALM_LABEL;
use realmsync_keycloak::KeycloakApi;
use realmsync_keycloak::models::RealmRepresentation;
use tracing::{debug, info};

use crate::chain::{Flow, Step, StepContext};
use crate::error::ReconcileResult;

/// Creates the realm when the server does not have it yet.
pub struct PutRealm;

#[async_trait]
impl Step<KeycloakRealm> for PutRealm {
    fn name(&self) -> &'static str {
        "put_realm"
    }

    async fn serve(
        &self,
        ctx: &StepContext,
        realm: &mut KeycloakRealm,
        api: &dyn KeycloakApi,
    ) -> ReconcileResult<Flow> {
        let name = realm.spec.realm_name.as_str();
        if api.get_realm(name).await?.is_some() {
            debug!(realm = %name, "Realm already exists");
            return Ok(Flow::Continue);
        }

        info!(realm = %name, "Creating realm");
        let rep = RealmRepresentation {
            id: realm.spec.id.clone(),
            ..RealmRepresentation::new(name)
        };
        api.create_realm(&rep).await?;

        // The admin token predates the realm and lacks its roles.
        ctx.sessions.invalidate(&ctx.keycloak).await?;
        Ok(Flow::Continue)
    }
}

/// Labels the realm with its server-side name so children can find it.
pub struct SetLabels;

#[async_trait]
impl Step<KeycloakRealm> for SetLabels {
    fn name(&self) -> &'static str {
        "set_labels"
    }

    async fn serve(
        &self,
        ctx: &StepContext,
        realm: &mut KeycloakRealm,
        _api: &dyn KeycloakApi,
    ) -> ReconcileResult<Flow> {
        let target = realm.spec.realm_name.clone();
        if realm.metadata.labels.get(TARGET_REALM_LABEL) == Some(&target) {
            return Ok(Flow::Continue);
        }

        debug!(realm = %target, "Setting targetRealm label");
        realm
            .metadata
            .labels
            .insert(TARGET_REALM_LABEL.to_string(), target);
        *realm = ctx.store.update_object(realm).await?;
        Ok(Flow::Continue)
    }
}
