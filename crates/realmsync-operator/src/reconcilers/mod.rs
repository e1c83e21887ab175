//! One reconciler per declared kind.
//!
//! Every realm-scoped reconciler follows the same outline: load the object,
//! skip it when it is in a terminal state, resolve its realm and a session,
//! run finalizer-gated deletion, converge the remote object and record the
//! outcome through [`Lifecycle::finish_since`](crate::lifecycle::Lifecycle::finish_since).
//! [`drive`] owns the load/finish part; the kind-specific part implements
//! [`Converge`].

mod auth_flow;
mod client;
mod client_scope;
mod component;
mod group;
mod identity_provider;
mod keycloak;
mod realm;
mod role;
mod user;

use std::sync::Arc;

use async_trait::async_trait;
use realmsync_core::{HasStatus, ObjectKey, RealmChild, Resource};
use tracing::{debug, info, warn};

use crate::context::Context;
use crate::error::{ReconcileError, ReconcileResult};
use crate::lifecycle::Action;
use crate::resolver::Connection;

pub use auth_flow::AuthFlowReconciler;
pub use client::ClientReconciler;
pub use client_scope::ClientScopeReconciler;
pub use component::ComponentReconciler;
pub use group::GroupReconciler;
pub use identity_provider::IdentityProviderReconciler;
pub use keycloak::KeycloakReconciler;
pub use realm::RealmReconciler;
pub use role::{RealmRoleBatchReconciler, RealmRoleReconciler};
pub use user::UserReconciler;

/// Reconciles objects of one kind, addressed by key.
#[async_trait]
pub trait Reconciler: Send + Sync {
    fn kind(&self) -> &'static str;

    async fn reconcile(&self, key: &ObjectKey) -> Action;
}

/// How a successful pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Synced {
    /// Remote state matches; recorded as success.
    Converged,
    /// Status is not touched and the action is returned as-is, e.g. after the
    /// object left management.
    Skip(Action),
}

/// Kind-specific part of a reconciliation.
#[async_trait]
pub(crate) trait Converge: Send + Sync {
    type Object: HasStatus + Send + Sync;

    fn context(&self) -> &Context;

    async fn converge(&self, object: &mut Self::Object) -> ReconcileResult<Synced>;
}

/// Loads the object behind `key`, converges it and records the outcome.
pub(crate) async fn drive<C: Converge>(converger: &C, key: &ObjectKey) -> Action {
    let ctx = converger.context();
    let kind = C::Object::KIND;

    let mut object = match ctx
        .store
        .try_get_object::<C::Object>(&key.namespace, &key.name)
        .await
    {
        Ok(Some(object)) => object,
        Ok(None) => {
            debug!(kind, "Object is gone");
            return Action::Done;
        }
        Err(e) => {
            warn!(kind, error = %e, "Unable to read object");
            return Action::Requeue(ctx.lifecycle.default_requeue());
        }
    };

    let state = object.sync_state();
    if state.is_terminal() {
        info!(kind, state = %state, "Object is in a terminal state, skipping");
        return Action::Done;
    }
    debug!(kind, state = %state, "Reconciling");

    let before = object.status().clone();
    let outcome = tokio::time::timeout(ctx.deadline, converger.converge(&mut object))
        .await
        .unwrap_or(Err(ReconcileError::Timeout(ctx.deadline)));
    match outcome {
        Ok(Synced::Converged) => ctx.lifecycle.finish_since(&mut object, &before, Ok(())).await,
        Ok(Synced::Skip(action)) => action,
        Err(e) => ctx.lifecycle.finish_since(&mut object, &before, Err(e)).await,
    }
}

/// Resolves the realm and a session for `child`.
///
/// A deleting child whose realm no longer exists has nothing left to clean up
/// remotely: its finalizer is released and `None` is returned.
pub(crate) async fn connect<C: RealmChild>(
    ctx: &Context,
    child: &mut C,
    finalizer: &str,
) -> ReconcileResult<Option<Connection>> {
    match ctx.helper.client_for_child(child).await {
        Ok(conn) => Ok(Some(conn)),
        Err(e @ ReconcileError::OwnerNotFound { .. }) if child.meta().is_being_deleted() => {
            warn!(kind = C::KIND, error = %e, "Owner is gone, releasing finalizer");
            ctx.lifecycle.release(child, finalizer).await?;
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Every reconciler the manager runs, keyed by kind.
pub fn all(ctx: &Context) -> Vec<Arc<dyn Reconciler>> {
    vec![
        Arc::new(KeycloakReconciler::new(ctx.clone())),
        Arc::new(RealmReconciler::new(ctx.clone())),
        Arc::new(ClientReconciler::new(ctx.clone())),
        Arc::new(RealmRoleReconciler::new(ctx.clone())),
        Arc::new(RealmRoleBatchReconciler::new(ctx.clone())),
        Arc::new(GroupReconciler::new(ctx.clone())),
        Arc::new(IdentityProviderReconciler::new(ctx.clone())),
        Arc::new(ClientScopeReconciler::new(ctx.clone())),
        Arc::new(ComponentReconciler::new(ctx.clone())),
        Arc::new(UserReconciler::new(ctx.clone())),
        Arc::new(AuthFlowReconciler::new(ctx.clone())),
    ]
}
