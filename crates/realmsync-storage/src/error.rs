//! Storage error types for the declarative object store.

use std::fmt;

/// Errors that can occur during object store operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The requested object was not found.
    #[error("Object not found: {kind} {key}")]
    NotFound {
        /// Kind of the missing object.
        kind: String,
        /// `namespace/name` of the missing object.
        key: String,
    },

    /// Attempted to create an object that already exists.
    #[error("Object already exists: {kind} {key}")]
    AlreadyExists {
        /// Kind of the existing object.
        kind: String,
        /// `namespace/name` of the existing object.
        key: String,
    },

    /// The object was modified since it was read.
    #[error("Version conflict on {key}: expected {expected}, found {actual}")]
    VersionConflict {
        /// `namespace/name` of the object.
        key: String,
        /// Version the caller based its write on.
        expected: u64,
        /// Version currently stored.
        actual: u64,
    },

    /// The object payload is malformed.
    #[error("Invalid object: {message}")]
    InvalidObject {
        /// Description of why the object is invalid.
        message: String,
    },

    /// Failed to convert between a typed object and its stored form.
    #[error("Serialization error: {0}")]
    Serialization(#[from] realmsync_core::CoreError),

    /// An internal storage error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl StorageError {
    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(kind: impl Into<String>, key: impl fmt::Display) -> Self {
        Self::NotFound {
            kind: kind.into(),
            key: key.to_string(),
        }
    }

    /// Creates a new `AlreadyExists` error.
    #[must_use]
    pub fn already_exists(kind: impl Into<String>, key: impl fmt::Display) -> Self {
        Self::AlreadyExists {
            kind: kind.into(),
            key: key.to_string(),
        }
    }

    /// Creates a new `VersionConflict` error.
    #[must_use]
    pub fn version_conflict(key: impl fmt::Display, expected: u64, actual: u64) -> Self {
        Self::VersionConflict {
            key: key.to_string(),
            expected,
            actual,
        }
    }

    /// Creates a new `InvalidObject` error.
    #[must_use]
    pub fn invalid_object(message: impl Into<String>) -> Self {
        Self::InvalidObject {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a not found error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` if this is an already exists error.
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    /// Returns `true` if this is a version conflict error.
    #[must_use]
    pub fn is_version_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }

    /// Returns the error category for logging purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::AlreadyExists { .. } | Self::VersionConflict { .. } => ErrorCategory::Conflict,
            Self::InvalidObject { .. } | Self::Serialization(_) => ErrorCategory::Validation,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

/// Categories of storage errors for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Object not found.
    NotFound,
    /// Conflict (version or existence).
    Conflict,
    /// Validation error.
    Validation,
    /// Internal error.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::Conflict => write!(f, "conflict"),
            Self::Validation => write!(f, "validation"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StorageError::not_found("Secret", "ns/kc-token-kc");
        assert_eq!(err.to_string(), "Object not found: Secret ns/kc-token-kc");

        let err = StorageError::version_conflict("ns/realm", 1, 2);
        assert_eq!(
            err.to_string(),
            "Version conflict on ns/realm: expected 1, found 2"
        );
    }

    #[test]
    fn test_error_predicates() {
        let err = StorageError::not_found("Secret", "ns/a");
        assert!(err.is_not_found());
        assert!(!err.is_already_exists());

        let err = StorageError::already_exists("Secret", "ns/a");
        assert!(err.is_already_exists());
        assert!(!err.is_version_conflict());
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            StorageError::not_found("Secret", "ns/a").category(),
            ErrorCategory::NotFound
        );
        assert_eq!(
            StorageError::version_conflict("ns/a", 1, 2).category(),
            ErrorCategory::Conflict
        );
        assert_eq!(
            StorageError::invalid_object("no metadata").category(),
            ErrorCategory::Validation
        );
        assert_eq!(ErrorCategory::Conflict.to_string(), "conflict");
    }
}
