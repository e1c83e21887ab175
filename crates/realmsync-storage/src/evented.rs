//! EventedStore - an object store wrapper that emits change events.
//!
//! This wrapper delegates all operations to an inner store and publishes an
//! [`ObjectEvent`] after each successful write.
//!
//! # Example
//!
//! ```ignore
//! use realmsync_storage::{EventBroadcaster, EventedStore};
//!
//! let broadcaster = EventBroadcaster::new_shared();
//! let store = EventedStore::new(InMemoryStore::new(), broadcaster.clone());
//! let mut rx = broadcaster.subscribe();
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use realmsync_core::ObjectKey;
use serde_json::Value;
use tracing::debug;

use crate::error::StorageError;
use crate::events::{EventBroadcaster, ObjectEvent, ObjectEventType};
use crate::traits::ObjectStore;
use crate::types::ListParams;

/// A store wrapper that emits events after successful writes.
///
/// Events are emitted **after** the write succeeds. Writes that leave the
/// stored document unchanged (same `resourceVersion`) emit nothing, so a
/// reconciler that converged does not wake itself up again.
pub struct EventedStore<S: ObjectStore> {
    inner: S,
    broadcaster: Arc<EventBroadcaster>,
}

impl<S: ObjectStore> EventedStore<S> {
    pub fn new(inner: S, broadcaster: Arc<EventBroadcaster>) -> Self {
        Self { inner, broadcaster }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn broadcaster(&self) -> &Arc<EventBroadcaster> {
        &self.broadcaster
    }

    fn emit(&self, event_type: ObjectEventType, kind: &str, key: ObjectKey) {
        if self.broadcaster.subscriber_count() == 0 {
            return;
        }
        let count = self
            .broadcaster
            .send(ObjectEvent::new(event_type, kind, key.clone()));
        debug!(
            kind = %kind,
            key = %key,
            event = %event_type,
            subscribers = count,
            "Emitted object event"
        );
    }
}

fn key_of(object: &Value) -> ObjectKey {
    let metadata = &object["metadata"];
    ObjectKey::new(
        metadata["namespace"].as_str().unwrap_or_default(),
        metadata["name"].as_str().unwrap_or_default(),
    )
}

fn version_of(object: &Value) -> u64 {
    object["metadata"]["resourceVersion"]
        .as_u64()
        .unwrap_or_default()
}

#[async_trait]
impl<S: ObjectStore> ObjectStore for EventedStore<S> {
    async fn get(&self, kind: &str, key: &ObjectKey) -> Result<Option<Value>, StorageError> {
        self.inner.get(kind, key).await
    }

    async fn list(&self, kind: &str, params: &ListParams) -> Result<Vec<Value>, StorageError> {
        self.inner.list(kind, params).await
    }

    async fn create(&self, kind: &str, object: Value) -> Result<Value, StorageError> {
        let created = self.inner.create(kind, object).await?;
        self.emit(ObjectEventType::Created, kind, key_of(&created));
        Ok(created)
    }

    async fn update(&self, kind: &str, object: Value) -> Result<Value, StorageError> {
        let key = key_of(&object);
        let before = self.inner.get(kind, &key).await?.map(|v| version_of(&v));
        let updated = self.inner.update(kind, object).await?;

        // The last finalizer going away removes the object.
        if self.inner.get(kind, &key).await?.is_none() {
            self.emit(ObjectEventType::Deleted, kind, key);
        } else if before != Some(version_of(&updated)) {
            self.emit(ObjectEventType::Updated, kind, key);
        }
        Ok(updated)
    }

    async fn update_status(&self, kind: &str, object: Value) -> Result<Value, StorageError> {
        let updated = self.inner.update_status(kind, object).await?;
        self.emit(ObjectEventType::StatusUpdated, kind, key_of(&updated));
        Ok(updated)
    }

    async fn delete(&self, kind: &str, key: &ObjectKey) -> Result<(), StorageError> {
        self.inner.delete(kind, key).await?;
        // Objects held by finalizers stay around marked for deletion.
        let event_type = if self.inner.get(kind, key).await?.is_some() {
            ObjectEventType::Updated
        } else {
            ObjectEventType::Deleted
        };
        self.emit(event_type, kind, key.clone());
        Ok(())
    }
}
