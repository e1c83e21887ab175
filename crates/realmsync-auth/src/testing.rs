//! Client factory for tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use realmsync_keycloak::{
    ApiResult, ConnectionParams, Credentials, KeycloakApi, SessionToken, unsigned_jwt,
};
use time::OffsetDateTime;

use crate::factory::ClientFactory;

/// Hands out one preconfigured client and counts logins.
///
/// Issued tokens are unsigned JWTs valid for five minutes.
pub struct StaticClientFactory {
    api: Arc<dyn KeycloakApi>,
    logins: AtomicUsize,
    login_delay: Duration,
}

impl StaticClientFactory {
    pub fn new(api: Arc<dyn KeycloakApi>) -> Self {
        Self {
            api,
            logins: AtomicUsize::new(0),
            login_delay: Duration::ZERO,
        }
    }

    /// Makes every login take `delay`, to widen race windows.
    #[must_use]
    pub fn with_login_delay(mut self, delay: Duration) -> Self {
        self.login_delay = delay;
        self
    }

    pub fn logins(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }

    pub fn valid_token() -> SessionToken {
        SessionToken::bearer(unsigned_jwt(
            OffsetDateTime::now_utc() + time::Duration::minutes(5),
        ))
    }
}

#[async_trait]
impl ClientFactory for StaticClientFactory {
    fn from_token(
        &self,
        _conn: &ConnectionParams,
        _token: &SessionToken,
    ) -> ApiResult<Arc<dyn KeycloakApi>> {
        Ok(self.api.clone())
    }

    async fn login(
        &self,
        _conn: &ConnectionParams,
        _credentials: &Credentials,
    ) -> ApiResult<(Arc<dyn KeycloakApi>, SessionToken)> {
        if !self.login_delay.is_zero() {
            tokio::time::sleep(self.login_delay).await;
        }
        self.logins.fetch_add(1, Ordering::SeqCst);
        Ok((self.api.clone(), Self::valid_token()))
    }
}
