//! Engine-owned status and the lifecycle state derived from it.
//!
//! The wire contract is a free-text `value` field: `""` before the first
//! attempt, `"OK"` after a successful one, `"duplicated"` for the terminal
//! duplicate condition and the error text otherwise. [`StatusValue`] keeps
//! that contract on the wire while business logic matches on variants.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::meta::ObjectMeta;

pub const STATUS_OK: &str = "OK";
pub const STATUS_DUPLICATED: &str = "duplicated";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StatusValue {
    #[default]
    Pending,
    Ok,
    Duplicated,
    Error(String),
}

impl From<String> for StatusValue {
    fn from(value: String) -> Self {
        match value.as_str() {
            "" => Self::Pending,
            STATUS_OK => Self::Ok,
            STATUS_DUPLICATED => Self::Duplicated,
            _ => Self::Error(value),
        }
    }
}

impl From<StatusValue> for String {
    fn from(value: StatusValue) -> Self {
        match value {
            StatusValue::Pending => String::new(),
            StatusValue::Ok => STATUS_OK.to_string(),
            StatusValue::Duplicated => STATUS_DUPLICATED.to_string(),
            StatusValue::Error(text) => text,
        }
    }
}

impl fmt::Display for StatusValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => Ok(()),
            Self::Ok => f.write_str(STATUS_OK),
            Self::Duplicated => f.write_str(STATUS_DUPLICATED),
            Self::Error(text) => f.write_str(text),
        }
    }
}

/// Status block shared by every reconciled kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    #[serde(default)]
    pub value: StatusValue,
    /// Identifier assigned by the remote system.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub failure_count: i64,
    #[serde(default)]
    pub available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret_name: Option<String>,
}

impl Status {
    pub fn set_success(&mut self) {
        self.value = StatusValue::Ok;
        self.failure_count = 0;
        self.available = true;
    }

    pub fn set_failure(&mut self, message: impl Into<String>) {
        self.value = StatusValue::Error(message.into());
        self.available = false;
    }

    pub fn is_duplicated(&self) -> bool {
        self.value == StatusValue::Duplicated
    }
}

/// Lifecycle state of a declared object as observed from its metadata and status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Pending,
    Synced,
    Failed,
    Duplicate,
    Terminating,
    Deleted,
}

impl SyncState {
    pub fn observe(meta: &ObjectMeta, status: &Status) -> Self {
        if meta.is_being_deleted() {
            return Self::Terminating;
        }
        match status.value {
            StatusValue::Pending => Self::Pending,
            StatusValue::Ok => Self::Synced,
            StatusValue::Duplicated => Self::Duplicate,
            StatusValue::Error(_) => Self::Failed,
        }
    }

    /// Terminal states are never reconciled again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Duplicate | Self::Deleted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Synced => "synced",
            Self::Failed => "failed",
            Self::Duplicate => "duplicate",
            Self::Terminating => "terminating",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    #[test]
    fn test_status_value_wire_contract() {
        for (wire, value) in [
            ("", StatusValue::Pending),
            ("OK", StatusValue::Ok),
            ("duplicated", StatusValue::Duplicated),
            ("boom", StatusValue::Error("boom".to_string())),
        ] {
            let json = serde_json::to_value(&value).unwrap();
            assert_eq!(json, serde_json::json!(wire));
            let back: StatusValue = serde_json::from_value(json).unwrap();
            assert_eq!(back, value);
        }
    }

    #[test]
    fn test_status_serialization() {
        let mut status = Status::default();
        status.set_failure("unable to put realm");
        status.failure_count = 3;

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "value": "unable to put realm",
                "failureCount": 3,
                "available": false
            })
        );
    }

    #[test]
    fn test_success_resets_counter() {
        let mut status = Status {
            failure_count: 7,
            ..Default::default()
        };
        status.set_success();
        assert_eq!(status.failure_count, 0);
        assert!(status.available);
        assert_eq!(status.value, StatusValue::Ok);
    }

    #[test]
    fn test_observe_state() {
        let mut meta = ObjectMeta::new("ns", "role");
        let mut status = Status::default();
        assert_eq!(SyncState::observe(&meta, &status), SyncState::Pending);

        status.set_success();
        assert_eq!(SyncState::observe(&meta, &status), SyncState::Synced);

        status.set_failure("nope");
        assert_eq!(SyncState::observe(&meta, &status), SyncState::Failed);

        status.value = StatusValue::Duplicated;
        let state = SyncState::observe(&meta, &status);
        assert_eq!(state, SyncState::Duplicate);
        assert!(state.is_terminal());

        meta.deletion_timestamp = Some(OffsetDateTime::now_utc());
        assert_eq!(SyncState::observe(&meta, &status), SyncState::Terminating);
    }
}
