use async_trait::async_trait;
use realmsync_core::kinds::KeycloakClient;
use realmsync_core::names::{CLIENT_FINALIZER, POST_LOGOUT_REDIRECT_URIS_ATTRIBUTE};
use realmsync_core::{ObjectKey, Resource};
use tracing::debug;

use super::{Converge, Reconciler, Synced, connect, drive};
use crate::chain::client::client_chain;
use crate::chain::{Chain, StepContext};
use crate::context::Context;
use crate::error::ReconcileResult;
use crate::lifecycle::Action;
use crate::terminators::{RemoteTarget, RemoteTerminator};

/// Logout redirect accepted when the client declares none: any valid redirect.
const ANY_REDIRECT: &str = "+";

pub struct ClientReconciler {
    ctx: Context,
    chain: Chain<KeycloakClient>,
}

impl ClientReconciler {
    pub fn new(ctx: Context) -> Self {
        Self {
            ctx,
            chain: client_chain(),
        }
    }

    /// Fills defaults into the declared object. Returns `true` when the
    /// object was rewritten; the rewrite triggers a fresh reconciliation.
    async fn apply_defaults(&self, client: &mut KeycloakClient) -> ReconcileResult<bool> {
        if client.metadata.is_being_deleted()
            || client
                .spec
                .attributes
                .contains_key(POST_LOGOUT_REDIRECT_URIS_ATTRIBUTE)
        {
            return Ok(false);
        }
        debug!(client_id = %client.spec.client_id, "Defaulting post logout redirect");
        client.spec.attributes.insert(
            POST_LOGOUT_REDIRECT_URIS_ATTRIBUTE.to_string(),
            ANY_REDIRECT.to_string(),
        );
        *client = self.ctx.store.update_object(client).await?;
        Ok(true)
    }
}

#[async_trait]
impl Reconciler for ClientReconciler {
    fn kind(&self) -> &'static str {
        KeycloakClient::KIND
    }

    async fn reconcile(&self, key: &ObjectKey) -> Action {
        drive(self, key).await
    }
}

#[async_trait]
impl Converge for ClientReconciler {
    type Object = KeycloakClient;

    fn context(&self) -> &Context {
        &self.ctx
    }

    async fn converge(&self, client: &mut KeycloakClient) -> ReconcileResult<Synced> {
        if self.apply_defaults(client).await? {
            return Ok(Synced::Skip(Action::Requeue(
                self.ctx.lifecycle.default_requeue(),
            )));
        }

        let Some(conn) = connect(&self.ctx, client, CLIENT_FINALIZER).await? else {
            return Ok(Synced::Skip(Action::Done));
        };

        let result = async {
            let terminator = RemoteTerminator::new(
                conn.api.clone(),
                conn.realm_name(),
                RemoteTarget::Client(client.spec.client_id.clone()),
                &client.metadata,
            );
            if self
                .ctx
                .lifecycle
                .try_to_delete(client, &terminator, CLIENT_FINALIZER)
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
                .serve(&step_ctx, client, conn.api.as_ref())
                .await?;
            Ok(Synced::Converged)
        }
        .await;
        self.ctx.helper.settle(&conn.keycloak, result).await
    }
}
