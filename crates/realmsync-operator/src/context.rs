use std::sync::Arc;
use std::time::Duration;

use realmsync_auth::SessionCache;
use realmsync_config::ReconcileConfig;
use realmsync_storage::DynStore;

use crate::lifecycle::Lifecycle;
use crate::resolver::Helper;

/// Shared collaborators handed to every reconciler.
#[derive(Clone)]
pub struct Context {
    pub store: DynStore,
    pub helper: Helper,
    pub lifecycle: Lifecycle,
    /// Upper bound for one reconciliation attempt.
    pub deadline: Duration,
}

const DEFAULT_DEADLINE: Duration = Duration::from_secs(300);

impl Context {
    pub fn new(store: DynStore, sessions: Arc<SessionCache>, config: &ReconcileConfig) -> Self {
        Self {
            helper: Helper::new(store.clone(), sessions),
            lifecycle: Lifecycle::new(store.clone(), config),
            store,
            deadline: DEFAULT_DEADLINE,
        }
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn sessions(&self) -> &Arc<SessionCache> {
        self.helper.sessions()
    }
}
