//! Errors of session acquisition.

use realmsync_keycloak::ApiError;
use realmsync_storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The instance reports itself as disconnected; no login is attempted.
    #[error("Keycloak {name} is not connected")]
    KeycloakNotAvailable { name: String },

    #[error("Secret {secret} has no {key} key")]
    MissingSecretKey { secret: String, key: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Keycloak API error: {0}")]
    Api(#[from] ApiError),
}

impl AuthError {
    #[must_use]
    pub fn not_available(name: impl Into<String>) -> Self {
        Self::KeycloakNotAvailable { name: name.into() }
    }

    #[must_use]
    pub fn missing_secret_key(secret: impl Into<String>, key: impl Into<String>) -> Self {
        Self::MissingSecretKey {
            secret: secret.into(),
            key: key.into(),
        }
    }

    /// True when the server cannot be reached right now, either because the
    /// instance is marked disconnected or because the transport failed.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        match self {
            Self::KeycloakNotAvailable { .. } => true,
            Self::Api(e) => e.is_unavailable(),
            _ => false,
        }
    }
}

pub type AuthResult<T> = Result<T, AuthError>;
