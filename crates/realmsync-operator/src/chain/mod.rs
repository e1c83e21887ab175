//! Sync pipelines.
//!
//! A pipeline is a fixed, ordered list of steps. Each step reads the remote
//! state of one narrow concern, applies the minimal difference and either
//! hands over to the next step or ends the pipeline early when the rest does
//! not apply. The first failing step aborts the pipeline; nothing is rolled
//! back, the next attempt converges from wherever the server was left.

use std::sync::Arc;

use async_trait::async_trait;
use rand::Rng;
use rand::distributions::Alphanumeric;
use realmsync_auth::SessionCache;
use realmsync_core::kinds::Keycloak;
use realmsync_keycloak::KeycloakApi;
use realmsync_storage::DynStore;
use tracing::debug;

use crate::error::ReconcileResult;

pub mod client;
pub mod realm;

/// Outcome of a successful step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Skip every remaining step.
    Stop,
}

/// Everything a step may touch besides the object and the remote API.
#[derive(Clone)]
pub struct StepContext {
    pub store: DynStore,
    pub sessions: Arc<SessionCache>,
    pub keycloak: Keycloak,
    /// Realm name on the server.
    pub realm: String,
}

#[async_trait]
pub trait Step<R>: Send + Sync {
    fn name(&self) -> &'static str;

    async fn serve(
        &self,
        ctx: &StepContext,
        resource: &mut R,
        api: &dyn KeycloakApi,
    ) -> ReconcileResult<Flow>;
}

pub struct Chain<R> {
    steps: Vec<Box<dyn Step<R>>>,
}

impl<R: Send + Sync> Default for Chain<R> {
    fn default() -> Self {
        Self { steps: Vec::new() }
    }
}

impl<R: Send + Sync> Chain<R> {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn then(mut self, step: impl Step<R> + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    pub async fn serve(
        &self,
        ctx: &StepContext,
        resource: &mut R,
        api: &dyn KeycloakApi,
    ) -> ReconcileResult<()> {
        for step in &self.steps {
            debug!(step = step.name(), realm = %ctx.realm, "Serving step");
            let flow = step
                .serve(ctx, resource, api)
                .await
                .map_err(|e| e.in_step(step.name()))?;
            if flow == Flow::Stop {
                debug!(step = step.name(), "Remaining steps do not apply");
                break;
            }
        }
        Ok(())
    }
}

const GENERATED_SECRET_LEN: usize = 36;

/// Random alphanumeric client secret.
pub(crate) fn generate_secret() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_SECRET_LEN)
        .map(char::from)
        .collect()
}

/// Names present in `declared` but not in `remote`, and the reverse.
pub(crate) fn split_names<'a>(
    declared: impl IntoIterator<Item = &'a str>,
    remote: impl IntoIterator<Item = &'a str>,
) -> (Vec<&'a str>, Vec<&'a str>) {
    let declared: Vec<&str> = declared.into_iter().collect();
    let remote: Vec<&str> = remote.into_iter().collect();
    let missing = declared
        .iter()
        .filter(|d| !remote.contains(d))
        .copied()
        .collect();
    let extra = remote
        .iter()
        .filter(|r| !declared.contains(r))
        .copied()
        .collect();
    (missing, extra)
}
