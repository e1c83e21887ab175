use std::collections::BTreeMap;

use async_trait::async_trait;
use realmsync_core::kinds::{KeycloakRealmIdentityProvider, KeycloakRealmIdentityProviderSpec};
use realmsync_core::names::REALM_IDP_FINALIZER;
use realmsync_core::{ObjectKey, Resource};
use realmsync_keycloak::KeycloakApi;
use realmsync_keycloak::models::IdentityProviderRepresentation;
use tracing::{debug, info};

use super::{Converge, Reconciler, Synced, connect, drive};
use crate::chain::realm::{mapper_representations, sync_identity_provider_mappers};
use crate::context::Context;
use crate::error::ReconcileResult;
use crate::lifecycle::Action;
use crate::secretref;
use crate::terminators::{RemoteTarget, RemoteTerminator};

pub struct IdentityProviderReconciler {
    ctx: Context,
}

impl IdentityProviderReconciler {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Reconciler for IdentityProviderReconciler {
    fn kind(&self) -> &'static str {
        KeycloakRealmIdentityProvider::KIND
    }

    async fn reconcile(&self, key: &ObjectKey) -> Action {
        drive(self, key).await
    }
}

#[async_trait]
impl Converge for IdentityProviderReconciler {
    type Object = KeycloakRealmIdentityProvider;

    fn context(&self) -> &Context {
        &self.ctx
    }

    async fn converge(&self, idp: &mut KeycloakRealmIdentityProvider) -> ReconcileResult<Synced> {
        let Some(conn) = connect(&self.ctx, idp, REALM_IDP_FINALIZER).await? else {
            return Ok(Synced::Skip(Action::Done));
        };

        let result = async {
            let terminator = RemoteTerminator::new(
                conn.api.clone(),
                conn.realm_name(),
                RemoteTarget::IdentityProvider(idp.spec.alias.clone()),
                &idp.metadata,
            );
            if self
                .ctx
                .lifecycle
                .try_to_delete(idp, &terminator, REALM_IDP_FINALIZER)
                .await?
            {
                return Ok(Synced::Skip(Action::Done));
            }

            let api = conn.api.as_ref();
            let realm = conn.realm_name();
            let mut config = idp.spec.config.clone();
            secretref::resolve_map(&self.ctx.store, idp.namespace(), &mut config).await?;
            put_identity_provider(api, realm, &idp.spec, config).await?;
            let mappers = mapper_representations(&idp.spec.alias, &idp.spec.mappers);
            sync_identity_provider_mappers(api, realm, &idp.spec.alias, &mappers).await?;
            Ok(Synced::Converged)
        }
        .await;
        self.ctx.helper.settle(&conn.keycloak, result).await
    }
}

fn representation(
    spec: &KeycloakRealmIdentityProviderSpec,
    config: BTreeMap<String, String>,
) -> IdentityProviderRepresentation {
    let non_empty = |s: &String| Some(s.clone()).filter(|s| !s.is_empty());
    IdentityProviderRepresentation {
        alias: spec.alias.clone(),
        internal_id: None,
        provider_id: spec.provider_id.clone(),
        enabled: spec.enabled,
        display_name: non_empty(&spec.display_name),
        trust_email: spec.trust_email,
        first_broker_login_flow_alias: non_empty(&spec.first_broker_login_flow_alias),
        config,
    }
}

async fn put_identity_provider(
    api: &dyn KeycloakApi,
    realm: &str,
    spec: &KeycloakRealmIdentityProviderSpec,
    config: BTreeMap<String, String>,
) -> ReconcileResult<()> {
    let alias = spec.alias.as_str();
    let desired = representation(spec, config);

    match api.get_identity_provider(realm, alias).await? {
        None => {
            info!(realm, alias, "Creating identity provider");
            api.create_identity_provider(realm, &desired).await?;
        }
        Some(current) => {
            let desired = IdentityProviderRepresentation {
                internal_id: current.internal_id.clone(),
                ..desired
            };
            if desired == current {
                debug!(realm, alias, "Identity provider up to date");
            } else {
                info!(realm, alias, "Updating identity provider");
                api.update_identity_provider(realm, &desired).await?;
            }
        }
    }
    Ok(())
}
