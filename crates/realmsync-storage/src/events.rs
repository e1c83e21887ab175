//! Change events emitted by the object store.
//!
//! Reconcilers never read events directly; the work-queue manager subscribes
//! and turns them into work items.

use std::fmt;
use std::sync::Arc;

use realmsync_core::ObjectKey;
use time::OffsetDateTime;
use tokio::sync::broadcast;

/// Default buffer size for the broadcast channel.
/// Slow receivers lose the oldest events beyond this limit.
const DEFAULT_BUFFER_SIZE: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectEventType {
    Created,
    /// Metadata or spec changed.
    Updated,
    /// Only the status changed.
    StatusUpdated,
    Deleted,
}

impl ObjectEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::StatusUpdated => "status_updated",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for ObjectEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEvent {
    pub event_type: ObjectEventType,
    pub kind: String,
    pub key: ObjectKey,
    pub timestamp: OffsetDateTime,
}

impl ObjectEvent {
    pub fn new(event_type: ObjectEventType, kind: impl Into<String>, key: ObjectKey) -> Self {
        Self {
            event_type,
            kind: kind.into(),
            key,
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

/// Broadcaster for object store events.
///
/// Cheap to clone; every clone feeds the same channel.
#[derive(Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<ObjectEvent>,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Returns the number of subscribers that received the event.
    pub fn send(&self, event: ObjectEvent) -> usize {
        self.sender.send(event).unwrap_or_default()
    }

    /// Events sent before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<ObjectEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBroadcaster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBroadcaster")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_without_subscribers() {
        let broadcaster = EventBroadcaster::new();
        let sent = broadcaster.send(ObjectEvent::new(
            ObjectEventType::Created,
            "KeycloakRealm",
            ObjectKey::new("ns", "team"),
        ));
        assert_eq!(sent, 0);
    }

    #[tokio::test]
    async fn test_subscriber_receives_event() {
        let broadcaster = EventBroadcaster::new();
        let mut rx = broadcaster.subscribe();
        assert_eq!(broadcaster.subscriber_count(), 1);

        broadcaster.send(ObjectEvent::new(
            ObjectEventType::Deleted,
            "KeycloakClient",
            ObjectKey::new("ns", "portal"),
        ));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type, ObjectEventType::Deleted);
        assert_eq!(event.kind, "KeycloakClient");
        assert_eq!(event.key.to_string(), "ns/portal");
    }
}
