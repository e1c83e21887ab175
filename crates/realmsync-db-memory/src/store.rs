use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use papaya::HashMap as PapayaHashMap;
use realmsync_core::ObjectKey;
use realmsync_storage::{ListParams, ObjectStore, StorageError};
use serde_json::Value;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::sync::Mutex;
use tracing::debug;

pub type StorageKey = (String, ObjectKey);

pub(crate) fn make_storage_key(kind: &str, key: &ObjectKey) -> StorageKey {
    (kind.to_string(), key.clone())
}

/// In-memory object store using papaya lock-free HashMap.
///
/// This store provides:
/// - Lock-free concurrent reads via papaya::HashMap
/// - Serialized writes, so read-modify-write sequences are atomic
/// - Finalizer-aware deletion and owner-reference garbage collection
#[derive(Debug)]
pub struct InMemoryStore {
    /// Main storage keyed by (kind, namespace/name)
    data: PapayaHashMap<StorageKey, Value>,
    /// Held for the duration of every write
    write_lock: Mutex<()>,
    /// Monotonic source of resource versions
    version_counter: AtomicU64,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            data: PapayaHashMap::new(),
            write_lock: Mutex::new(()),
            version_counter: AtomicU64::new(1),
        }
    }

    /// Number of stored objects across all kinds.
    pub fn len(&self) -> usize {
        self.data.pin().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn next_version(&self) -> u64 {
        self.version_counter.fetch_add(1, Ordering::SeqCst)
    }

    fn read(&self, kind: &str, key: &ObjectKey) -> Option<Value> {
        self.data.pin().get(&make_storage_key(kind, key)).cloned()
    }

    fn write(&self, kind: &str, key: &ObjectKey, object: Value) {
        self.data.pin().insert(make_storage_key(kind, key), object);
    }

    /// Removes an object, then everything that names it as owner.
    fn remove_with_dependents(&self, kind: &str, key: &ObjectKey) {
        let Some(removed) = self.data.pin().remove(&make_storage_key(kind, key)).cloned() else {
            return;
        };
        debug!(kind = %kind, key = %key, "Object removed");

        let uid = removed["metadata"]["uid"].as_str().unwrap_or_default().to_string();
        let dependents: Vec<StorageKey> = {
            let guard = self.data.pin();
            guard
                .iter()
                .filter(|((_, child_key), child)| {
                    child_key.namespace == key.namespace && is_owned(child, kind, &key.name, &uid)
                })
                .map(|(k, _)| k.clone())
                .collect()
        };

        for (child_kind, child_key) in dependents {
            // Already gone objects are fine; a cycle of owners ends here.
            let _ = self.delete_locked(&child_kind, &child_key);
        }
    }

    fn delete_locked(&self, kind: &str, key: &ObjectKey) -> Result<(), StorageError> {
        let mut stored = self
            .read(kind, key)
            .ok_or_else(|| StorageError::not_found(kind, key))?;

        let has_finalizers = stored["metadata"]["finalizers"]
            .as_array()
            .is_some_and(|f| !f.is_empty());

        if !has_finalizers {
            self.remove_with_dependents(kind, key);
            return Ok(());
        }

        if stored["metadata"]["deletionTimestamp"].is_string() {
            return Ok(());
        }

        let now = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .map_err(|e| StorageError::internal(format!("timestamp formatting failed: {e}")))?;
        stored["metadata"]["deletionTimestamp"] = Value::String(now);
        stored["metadata"]["resourceVersion"] = Value::from(self.next_version());
        debug!(kind = %kind, key = %key, "Object marked for deletion");
        self.write(kind, key, stored);
        Ok(())
    }
}

fn is_owned(child: &Value, kind: &str, name: &str, uid: &str) -> bool {
    child["metadata"]["ownerReferences"]
        .as_array()
        .is_some_and(|owners| {
            owners.iter().any(|o| {
                o["kind"].as_str() == Some(kind)
                    && o["name"].as_str() == Some(name)
                    && (uid.is_empty() || o["uid"].as_str().is_none_or(|u| u.is_empty() || u == uid))
            })
        })
}

/// Extracts and validates the address of an incoming object.
fn object_key(object: &Value) -> Result<ObjectKey, StorageError> {
    let metadata = object
        .get("metadata")
        .filter(|m| m.is_object())
        .ok_or_else(|| StorageError::invalid_object("object has no metadata"))?;
    let name = metadata["name"].as_str().unwrap_or_default();
    let namespace = metadata["namespace"].as_str().unwrap_or_default();
    if name.is_empty() || namespace.is_empty() {
        return Err(StorageError::invalid_object(
            "metadata.name and metadata.namespace are required",
        ));
    }
    Ok(ObjectKey::new(namespace, name))
}

fn resource_version(object: &Value) -> u64 {
    object["metadata"]["resourceVersion"]
        .as_u64()
        .unwrap_or_default()
}

fn is_marked_and_released(object: &Value) -> bool {
    let metadata = &object["metadata"];
    metadata["deletionTimestamp"].is_string()
        && metadata["finalizers"]
            .as_array()
            .is_none_or(|f| f.is_empty())
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    async fn get(&self, kind: &str, key: &ObjectKey) -> Result<Option<Value>, StorageError> {
        Ok(self.read(kind, key))
    }

    async fn list(&self, kind: &str, params: &ListParams) -> Result<Vec<Value>, StorageError> {
        let mut matched: Vec<(ObjectKey, Value)> = {
            let guard = self.data.pin();
            guard
                .iter()
                .filter(|((k, _), v)| k == kind && params.matches(v))
                .map(|((_, key), v)| (key.clone(), v.clone()))
                .collect()
        };
        matched.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(matched.into_iter().map(|(_, v)| v).collect())
    }

    async fn create(&self, kind: &str, mut object: Value) -> Result<Value, StorageError> {
        let key = object_key(&object)?;
        let _guard = self.write_lock.lock().await;

        if self.read(kind, &key).is_some() {
            return Err(StorageError::already_exists(kind, &key));
        }

        let metadata = &mut object["metadata"];
        if metadata["uid"].as_str().is_none_or(str::is_empty) {
            metadata["uid"] = Value::String(uuid::Uuid::new_v4().to_string());
        }
        metadata["resourceVersion"] = Value::from(self.next_version());
        if let Some(m) = metadata.as_object_mut() {
            m.remove("deletionTimestamp");
        }

        debug!(kind = %kind, key = %key, "Object created");
        self.write(kind, &key, object.clone());
        Ok(object)
    }

    async fn update(&self, kind: &str, mut object: Value) -> Result<Value, StorageError> {
        let key = object_key(&object)?;
        let _guard = self.write_lock.lock().await;

        let stored = self
            .read(kind, &key)
            .ok_or_else(|| StorageError::not_found(kind, &key))?;
        let stored_version = resource_version(&stored);
        let incoming_version = resource_version(&object);
        if incoming_version != 0 && incoming_version != stored_version {
            return Err(StorageError::version_conflict(
                &key,
                incoming_version,
                stored_version,
            ));
        }

        match stored.get("status") {
            Some(status) => object["status"] = status.clone(),
            None => {
                if let Some(o) = object.as_object_mut() {
                    o.remove("status");
                }
            }
        }
        let metadata = &mut object["metadata"];
        metadata["uid"] = stored["metadata"]["uid"].clone();
        metadata["resourceVersion"] = Value::from(stored_version);
        match stored["metadata"].get("deletionTimestamp") {
            Some(ts) => metadata["deletionTimestamp"] = ts.clone(),
            None => {
                if let Some(m) = metadata.as_object_mut() {
                    m.remove("deletionTimestamp");
                }
            }
        }

        if object == stored {
            return Ok(stored);
        }

        object["metadata"]["resourceVersion"] = Value::from(self.next_version());
        if is_marked_and_released(&object) {
            self.remove_with_dependents(kind, &key);
            return Ok(object);
        }

        debug!(kind = %kind, key = %key, "Object updated");
        self.write(kind, &key, object.clone());
        Ok(object)
    }

    async fn update_status(&self, kind: &str, object: Value) -> Result<Value, StorageError> {
        let key = object_key(&object)?;
        let _guard = self.write_lock.lock().await;

        let mut stored = self
            .read(kind, &key)
            .ok_or_else(|| StorageError::not_found(kind, &key))?;
        let status = object.get("status").cloned().unwrap_or(Value::Null);
        if stored.get("status") == Some(&status) {
            return Ok(stored);
        }

        stored["status"] = status;
        stored["metadata"]["resourceVersion"] = Value::from(self.next_version());
        self.write(kind, &key, stored.clone());
        Ok(stored)
    }

    async fn delete(&self, kind: &str, key: &ObjectKey) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        self.delete_locked(kind, key)
    }
}
