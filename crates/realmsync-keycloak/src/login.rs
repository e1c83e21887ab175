//! Connection parameters and the token endpoint calls.

use std::time::Duration;

use reqwest::Certificate;
use tracing::debug;
use url::Url;

use crate::error::{ApiError, ApiResult};
use crate::token::SessionToken;

/// Client used for the password grant of human administrators.
pub const ADMIN_CLI_CLIENT: &str = "admin-cli";

/// Everything needed to talk to one Keycloak instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    /// Base URL of the server, e.g. `https://sso.example.com`.
    pub url: String,
    /// Realm the administrator logs into.
    pub realm: String,
    /// PEM bundle trusted in addition to the system roots.
    pub ca_cert: Option<String>,
    pub insecure_skip_verify: bool,
    pub request_timeout: Duration,
}

impl ConnectionParams {
    pub fn new(url: impl Into<String>, realm: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            realm: realm.into(),
            ca_cert: None,
            insecure_skip_verify: false,
            request_timeout: Duration::from_secs(30),
        }
    }

    #[must_use]
    pub fn with_ca_cert(mut self, pem: impl Into<String>) -> Self {
        self.ca_cert = Some(pem.into());
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_insecure_skip_verify(mut self, skip: bool) -> Self {
        self.insecure_skip_verify = skip;
        self
    }

    /// Parsed server URL, usable as a base for path segments.
    pub fn base_url(&self) -> ApiResult<Url> {
        let url = Url::parse(&self.url).map_err(|e| ApiError::InvalidUrl(e.to_string()))?;
        if url.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(format!(
                "{} cannot be used as a base URL",
                self.url
            )));
        }
        Ok(url)
    }

    fn token_url(&self) -> ApiResult<Url> {
        join_segments(
            &self.base_url()?,
            &["realms", &self.realm, "protocol", "openid-connect", "token"],
        )
    }
}

/// Credentials read from the instance's secret.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Password grant through `admin-cli`.
    Password { username: String, password: String },
    /// Client credentials grant of a service account client.
    ClientCredentials {
        client_id: String,
        client_secret: String,
    },
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Password { username, .. } => f
                .debug_struct("Password")
                .field("username", username)
                .finish_non_exhaustive(),
            Self::ClientCredentials { client_id, .. } => f
                .debug_struct("ClientCredentials")
                .field("client_id", client_id)
                .finish_non_exhaustive(),
        }
    }
}

impl Credentials {
    fn form(&self) -> Vec<(&'static str, &str)> {
        match self {
            Self::Password { username, password } => vec![
                ("grant_type", "password"),
                ("client_id", ADMIN_CLI_CLIENT),
                ("username", username),
                ("password", password),
            ],
            Self::ClientCredentials {
                client_id,
                client_secret,
            } => vec![
                ("grant_type", "client_credentials"),
                ("client_id", client_id),
                ("client_secret", client_secret),
            ],
        }
    }
}

/// Builds the HTTP client shared by the login call and the admin API adapter.
pub fn build_http_client(conn: &ConnectionParams) -> ApiResult<reqwest::Client> {
    let mut builder = reqwest::Client::builder().timeout(conn.request_timeout);

    if let Some(pem) = &conn.ca_cert {
        let cert = Certificate::from_pem(pem.as_bytes())
            .map_err(|e| ApiError::InvalidUrl(format!("invalid CA certificate: {e}")))?;
        builder = builder.add_root_certificate(cert);
    }
    if conn.insecure_skip_verify {
        builder = builder.danger_accept_invalid_certs(true);
    }

    Ok(builder.build()?)
}

/// Obtains a fresh session token from the token endpoint.
pub async fn login(
    http: &reqwest::Client,
    conn: &ConnectionParams,
    credentials: &Credentials,
) -> ApiResult<SessionToken> {
    let url = conn.token_url()?;
    debug!(url = %url, "Requesting Keycloak session token");

    let response = http.post(url).form(&credentials.form()).send().await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ApiError::status(status.as_u16(), body));
    }

    response
        .json::<SessionToken>()
        .await
        .map_err(|e| ApiError::decode(format!("token response: {e}")))
}

/// Appends path segments to `base`, escaping each one.
pub(crate) fn join_segments(base: &Url, segments: &[&str]) -> ApiResult<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| ApiError::InvalidUrl(format!("{base} cannot be used as a base URL")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
