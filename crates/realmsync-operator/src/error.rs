//! Reconciliation errors and their classification.

use std::time::Duration;

use realmsync_auth::AuthError;
use realmsync_keycloak::ApiError;
use realmsync_storage::StorageError;
use thiserror::Error;

/// How the reconciliation loop treats a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A remote or stored object is absent.
    NotFound,
    /// The session has to be re-established.
    TokenExpired,
    /// The remote system already holds a conflicting object; never retried.
    Duplicate,
    /// Keycloak cannot be reached; retried without counting as a failure.
    Unavailable,
    Other,
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Failure inside one pipeline step.
    #[error("{step}: {source}")]
    Step {
        step: &'static str,
        #[source]
        source: Box<ReconcileError>,
    },

    #[error("{kind} {name} not found")]
    OwnerNotFound { kind: String, name: String },

    #[error("{0} already exists")]
    Duplicate(String),

    #[error("Keycloak {0} is not connected")]
    KeycloakNotAvailable(String),

    #[error("{0}")]
    Validation(String),

    #[error("Reconciliation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Keycloak API error: {0}")]
    Api(#[from] ApiError),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl ReconcileError {
    #[must_use]
    pub fn owner_not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::OwnerNotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Wraps the error with the name of the step that produced it.
    #[must_use]
    pub fn in_step(self, step: &'static str) -> Self {
        Self::Step {
            step,
            source: Box::new(self),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Step { source, .. } => source.kind(),
            Self::OwnerNotFound { .. } => ErrorKind::NotFound,
            Self::Duplicate(_) => ErrorKind::Duplicate,
            Self::KeycloakNotAvailable(_) => ErrorKind::Unavailable,
            Self::Validation(_) | Self::Timeout(_) => ErrorKind::Other,
            Self::Storage(e) if e.is_not_found() => ErrorKind::NotFound,
            Self::Storage(_) => ErrorKind::Other,
            Self::Api(e) => api_kind(e),
            Self::Auth(AuthError::Api(e)) => api_kind(e),
            Self::Auth(e) if e.is_unavailable() => ErrorKind::Unavailable,
            Self::Auth(AuthError::Storage(e)) if e.is_not_found() => ErrorKind::NotFound,
            Self::Auth(_) => ErrorKind::Other,
        }
    }
}

fn api_kind(e: &ApiError) -> ErrorKind {
    if e.is_unavailable() {
        ErrorKind::Unavailable
    } else if e.is_token_expired() {
        ErrorKind::TokenExpired
    } else if e.is_not_found() {
        ErrorKind::NotFound
    } else {
        ErrorKind::Other
    }
}

pub type ReconcileResult<T> = Result<T, ReconcileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_context_keeps_classification() {
        let err = ReconcileError::Duplicate("role admin".into()).in_step("put_realm_role");
        assert_eq!(err.kind(), ErrorKind::Duplicate);
        assert_eq!(err.to_string(), "put_realm_role: role admin already exists");

        let err = ReconcileError::from(ApiError::status(503, "maintenance")).in_step("put_client");
        assert_eq!(err.kind(), ErrorKind::Unavailable);
    }

    #[test]
    fn test_api_classification() {
        assert_eq!(
            ReconcileError::from(ApiError::not_found("realm")).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            ReconcileError::from(ApiError::status(401, "expired")).kind(),
            ErrorKind::TokenExpired
        );
        assert_eq!(
            ReconcileError::from(ApiError::conflict("client")).kind(),
            ErrorKind::Other
        );
    }

    #[test]
    fn test_auth_classification() {
        assert_eq!(
            ReconcileError::from(AuthError::not_available("kc")).kind(),
            ErrorKind::Unavailable
        );
        assert_eq!(
            ReconcileError::from(AuthError::missing_secret_key("creds", "password")).kind(),
            ErrorKind::Other
        );
        assert_eq!(
            ReconcileError::owner_not_found("KeycloakRealm", "main").kind(),
            ErrorKind::NotFound
        );
    }
}
