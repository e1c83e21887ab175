use std::sync::Arc;

use async_trait::async_trait;
use realmsync_keycloak::{
    ApiResult, ConnectionParams, Credentials, HttpKeycloakClient, KeycloakApi, SessionToken,
    build_http_client, login,
};

/// Builds authenticated [`KeycloakApi`] handles.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    /// Wraps an already issued token.
    fn from_token(
        &self,
        conn: &ConnectionParams,
        token: &SessionToken,
    ) -> ApiResult<Arc<dyn KeycloakApi>>;

    /// Logs in and returns the client together with the token it carries.
    async fn login(
        &self,
        conn: &ConnectionParams,
        credentials: &Credentials,
    ) -> ApiResult<(Arc<dyn KeycloakApi>, SessionToken)>;
}

/// Factory for the reqwest adapter.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpClientFactory;

#[async_trait]
impl ClientFactory for HttpClientFactory {
    fn from_token(
        &self,
        conn: &ConnectionParams,
        token: &SessionToken,
    ) -> ApiResult<Arc<dyn KeycloakApi>> {
        let http = build_http_client(conn)?;
        Ok(Arc::new(HttpKeycloakClient::new(
            http,
            conn.base_url()?,
            token.clone(),
        )))
    }

    async fn login(
        &self,
        conn: &ConnectionParams,
        credentials: &Credentials,
    ) -> ApiResult<(Arc<dyn KeycloakApi>, SessionToken)> {
        let http = build_http_client(conn)?;
        let token = login(&http, conn, credentials).await?;
        let client = HttpKeycloakClient::new(http, conn.base_url()?, token.clone());
        Ok((Arc::new(client), token))
    }
}
