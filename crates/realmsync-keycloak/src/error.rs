//! Error types for calls against the Keycloak admin API.

use thiserror::Error;

/// Errors returned by [`crate::KeycloakApi`] implementations and the login calls.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The server answered with a non-success status code.
    #[error("Keycloak returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// The cached session token is past its expiry.
    #[error("Session token expired")]
    TokenExpired,

    /// The session token blob could not be parsed.
    #[error("Invalid session token: {0}")]
    InvalidToken(String),

    /// The request never produced a response.
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response body did not have the expected shape.
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// The configured server URL cannot be used as a base URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The server state does not allow the operation.
    #[error("Unexpected server state: {0}")]
    Unexpected(String),
}

impl ApiError {
    /// Creates a `Status` error.
    #[must_use]
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::status(404, message)
    }

    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::status(409, message)
    }

    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    #[must_use]
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// HTTP status of the failed call, if the server answered.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Returns `true` if the remote object does not exist.
    pub fn is_not_found(&self) -> bool {
        self.status_code() == Some(404)
    }

    /// Returns `true` if the remote object already exists.
    pub fn is_conflict(&self) -> bool {
        self.status_code() == Some(409)
    }

    /// Returns `true` if the session has to be re-established.
    pub fn is_token_expired(&self) -> bool {
        matches!(self, Self::TokenExpired) || self.status_code() == Some(401)
    }

    /// Returns `true` if the server could not be reached or is refusing service.
    pub fn is_unavailable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_connect() || e.is_timeout(),
            Self::Status { status, .. } => matches!(status, 502..=504),
            _ => false,
        }
    }
}

/// Result type for Keycloak API calls.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_predicates() {
        assert!(ApiError::not_found("realm").is_not_found());
        assert!(!ApiError::not_found("realm").is_conflict());
        assert!(ApiError::conflict("role").is_conflict());
        assert!(ApiError::status(401, "expired").is_token_expired());
        assert!(ApiError::TokenExpired.is_token_expired());
        assert!(ApiError::status(503, "maintenance").is_unavailable());
        assert!(!ApiError::status(500, "boom").is_unavailable());
    }

    #[test]
    fn test_error_display() {
        let err = ApiError::status(409, "Role with name admin already exists");
        assert_eq!(
            err.to_string(),
            "Keycloak returned HTTP 409: Role with name admin already exists"
        );
    }
}
