use std::collections::BTreeMap;

use async_trait::async_trait;
use realmsync_core::kinds::{KeycloakRealmComponent, KeycloakRealmComponentSpec};
use realmsync_core::names::REALM_COMPONENT_FINALIZER;
use realmsync_core::{ObjectKey, Resource};
use realmsync_keycloak::KeycloakApi;
use realmsync_keycloak::models::ComponentRepresentation;
use tracing::{debug, info};

use super::{Converge, Reconciler, Synced, connect, drive};
use crate::context::Context;
use crate::error::{ReconcileError, ReconcileResult};
use crate::lifecycle::Action;
use crate::secretref;
use crate::terminators::{RemoteTarget, RemoteTerminator};

pub struct ComponentReconciler {
    ctx: Context,
}

impl ComponentReconciler {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Reconciler for ComponentReconciler {
    fn kind(&self) -> &'static str {
        KeycloakRealmComponent::KIND
    }

    async fn reconcile(&self, key: &ObjectKey) -> Action {
        drive(self, key).await
    }
}

#[async_trait]
impl Converge for ComponentReconciler {
    type Object = KeycloakRealmComponent;

    fn context(&self) -> &Context {
        &self.ctx
    }

    async fn converge(&self, component: &mut KeycloakRealmComponent) -> ReconcileResult<Synced> {
        let Some(conn) = connect(&self.ctx, component, REALM_COMPONENT_FINALIZER).await? else {
            return Ok(Synced::Skip(Action::Done));
        };

        let result = async {
            let terminator = RemoteTerminator::new(
                conn.api.clone(),
                conn.realm_name(),
                RemoteTarget::Component(component.spec.name.clone()),
                &component.metadata,
            );
            if self
                .ctx
                .lifecycle
                .try_to_delete(component, &terminator, REALM_COMPONENT_FINALIZER)
                .await?
            {
                return Ok(Synced::Skip(Action::Done));
            }

            let mut config = component.spec.config.clone();
            secretref::resolve_multi_map(&self.ctx.store, component.namespace(), &mut config)
                .await?;
            put_component(conn.api.as_ref(), conn.realm_name(), &component.spec, config).await?;
            Ok(Synced::Converged)
        }
        .await;
        self.ctx.helper.settle(&conn.keycloak, result).await
    }
}

/// Components hang off the realm itself, so new ones get the realm's id as parent.
async fn put_component(
    api: &dyn KeycloakApi,
    realm: &str,
    spec: &KeycloakRealmComponentSpec,
    config: BTreeMap<String, Vec<String>>,
) -> ReconcileResult<()> {
    let name = spec.name.as_str();
    let desired = ComponentRepresentation {
        id: None,
        name: name.to_string(),
        provider_id: spec.provider_id.clone(),
        provider_type: spec.provider_type.clone(),
        parent_id: None,
        config,
    };

    match api.find_component(realm, name).await? {
        None => {
            let parent = api
                .get_realm(realm)
                .await?
                .and_then(|r| r.id)
                .ok_or_else(|| ReconcileError::validation(format!("realm {realm} has no id")))?;
            info!(realm, component = name, provider = %spec.provider_id, "Creating component");
            let create = ComponentRepresentation {
                parent_id: Some(parent),
                ..desired
            };
            api.create_component(realm, &create).await?;
        }
        Some(current) => {
            let update = ComponentRepresentation {
                id: current.id.clone(),
                parent_id: current.parent_id.clone(),
                ..desired
            };
            if update == current {
                debug!(realm, component = name, "Component up to date");
            } else {
                info!(realm, component = name, "Updating component");
                api.update_component(realm, &update).await?;
            }
        }
    }
    Ok(())
}
