//! Failure accounting, requeue scheduling and finalizer-gated deletion.

use std::time::Duration;

use async_trait::async_trait;
use realmsync_config::ReconcileConfig;
use realmsync_core::{HasStatus, Resource, Status, StatusValue};
use realmsync_storage::DynStore;
use tracing::{debug, error, info, warn};

use crate::error::{ErrorKind, ReconcileError, ReconcileResult};

/// What the manager does with a work item after reconciling it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Requeue(Duration),
    Done,
}

/// Counter-driven backoff: `step * (failureCount + 1)`.
#[derive(Debug, Clone, Copy)]
pub struct FailurePolicy {
    step: Duration,
}

impl FailurePolicy {
    pub fn new(step: Duration) -> Self {
        Self { step }
    }

    /// Delay for an object that has failed `failure_count` times before.
    pub fn delay(&self, failure_count: i64) -> Duration {
        let factor = u32::try_from(failure_count.saturating_add(1).max(1)).unwrap_or(u32::MAX);
        self.step.saturating_mul(factor)
    }

    /// Returns the delay for the current attempt and counts it as a failure.
    pub fn backoff(&self, status: &mut Status) -> Duration {
        let delay = self.delay(status.failure_count);
        status.failure_count = status.failure_count.saturating_add(1);
        delay
    }
}

/// Remote cleanup for one object kind.
#[async_trait]
pub trait Terminator: Send + Sync {
    async fn delete_resource(&self) -> ReconcileResult<()>;
}

/// Turns reconciliation outcomes into status writes and requeue decisions.
#[derive(Clone)]
pub struct Lifecycle {
    store: DynStore,
    policy: FailurePolicy,
    success_interval: Duration,
    unavailable_retry: Duration,
    default_requeue: Duration,
}

impl Lifecycle {
    pub fn new(store: DynStore, config: &ReconcileConfig) -> Self {
        Self {
            store,
            policy: FailurePolicy::new(config.failure_backoff_step),
            success_interval: config.success_interval,
            unavailable_retry: config.unavailable_retry,
            default_requeue: config.default_requeue,
        }
    }

    pub fn success_interval(&self) -> Duration {
        self.success_interval
    }

    pub fn default_requeue(&self) -> Duration {
        self.default_requeue
    }

    /// Records `result` on `object` and decides when to look at it again.
    pub async fn finish<R: HasStatus>(
        &self,
        object: &mut R,
        result: ReconcileResult<()>,
    ) -> Action {
        let before = object.status().clone();
        self.finish_since(object, &before, result).await
    }

    /// Like [`Lifecycle::finish`], but writes the status whenever it differs
    /// from `before`, including fields the pass itself changed.
    pub async fn finish_since<R: HasStatus>(
        &self,
        object: &mut R,
        before: &Status,
        result: ReconcileResult<()>,
    ) -> Action {
        let action = match result {
            Ok(()) => {
                object.status_mut().set_success();
                Action::Requeue(self.success_interval)
            }
            Err(e) => self.record_failure(object, &e),
        };

        if before != object.status()
            && let Err(e) = self.store.update_object_status(object).await
        {
            warn!(
                kind = R::KIND,
                name = %object.name(),
                error = %e,
                "Failed to write status"
            );
            return Action::Requeue(self.default_requeue);
        }
        action
    }

    fn record_failure<R: HasStatus>(&self, object: &mut R, err: &ReconcileError) -> Action {
        match err.kind() {
            ErrorKind::Duplicate => {
                warn!(kind = R::KIND, name = %object.name(), error = %err, "Duplicate remote object, giving up");
                let status = object.status_mut();
                status.value = StatusValue::Duplicated;
                status.available = false;
                Action::Done
            }
            ErrorKind::Unavailable => {
                warn!(
                    kind = R::KIND,
                    name = %object.name(),
                    error = %err,
                    retry_in = ?self.unavailable_retry,
                    "Keycloak unavailable"
                );
                Action::Requeue(self.unavailable_retry)
            }
            ErrorKind::TokenExpired => {
                info!(kind = R::KIND, name = %object.name(), "Session expired, retrying with a new login");
                Action::Requeue(self.default_requeue)
            }
            ErrorKind::NotFound | ErrorKind::Other => {
                let status = object.status_mut();
                status.set_failure(err.to_string());
                let delay = self.policy.backoff(status);
                error!(
                    kind = R::KIND,
                    name = %object.name(),
                    error = %err,
                    failure_count = object.status().failure_count,
                    retry_in = ?delay,
                    "Reconciliation failed"
                );
                Action::Requeue(delay)
            }
        }
    }

    /// Adds the finalizer to a live object, or terminates a deleting one.
    ///
    /// Returns `true` when the object left management: the remote counterpart
    /// is gone (or preserved) and the finalizer was removed.
    pub async fn try_to_delete<R: Resource>(
        &self,
        object: &mut R,
        terminator: &dyn Terminator,
        finalizer: &str,
    ) -> ReconcileResult<bool> {
        if !object.meta().is_being_deleted() {
            if object.meta_mut().add_finalizer(finalizer) {
                debug!(kind = R::KIND, name = %object.name(), finalizer, "Adding finalizer");
                *object = self.store.update_object(object).await?;
            }
            return Ok(false);
        }

        if object.meta().has_finalizer(finalizer) {
            info!(kind = R::KIND, name = %object.name(), "Terminating remote resource");
            terminator.delete_resource().await?;
            self.release(object, finalizer).await?;
        }
        Ok(true)
    }

    /// Removes `finalizer` without touching the remote side, e.g. when the
    /// owner of a deleting object is already gone.
    pub async fn release<R: Resource>(&self, object: &mut R, finalizer: &str) -> ReconcileResult<()> {
        if object.meta_mut().remove_finalizer(finalizer) {
            *object = self.store.update_object(object).await?;
        }
        Ok(())
    }
}
