use async_trait::async_trait;
use realmsync_core::{ObjectKey, Resource};
use serde_json::Value;

use crate::error::StorageError;
use crate::types::ListParams;

/// The declarative object store the engine reads declared state from.
///
/// Objects are JSON documents with a `metadata` block (see
/// [`realmsync_core::ObjectMeta`]), addressed by kind and `namespace/name`.
/// Implementations must be thread-safe (`Send + Sync`).
///
/// # Example
///
/// ```ignore
/// use realmsync_storage::{DynStore, StorageError};
/// use realmsync_core::kinds::KeycloakRealm;
///
/// async fn realm(store: &DynStore) -> Result<KeycloakRealm, StorageError> {
///     store.get_object::<KeycloakRealm>("ns", "team").await
/// }
/// ```
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Reads an object.
    ///
    /// Returns `None` if the object does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error only for infrastructure issues, not for missing objects.
    async fn get(&self, kind: &str, key: &ObjectKey) -> Result<Option<Value>, StorageError>;

    /// Lists objects of a kind matching `params`, ordered by key.
    async fn list(&self, kind: &str, params: &ListParams) -> Result<Vec<Value>, StorageError>;

    /// Creates an object. The store assigns `uid` and `resourceVersion`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::AlreadyExists` if the key is taken.
    /// Returns `StorageError::InvalidObject` if `metadata` is missing or malformed.
    async fn create(&self, kind: &str, object: Value) -> Result<Value, StorageError>;

    /// Replaces metadata and spec of an object, keeping the stored status.
    ///
    /// An object that is being deleted and has no finalizers left is removed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the object does not exist.
    /// Returns `StorageError::VersionConflict` if a non-zero `resourceVersion`
    /// does not match the stored one.
    async fn update(&self, kind: &str, object: Value) -> Result<Value, StorageError>;

    /// Replaces only the status of an object.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the object does not exist.
    async fn update_status(&self, kind: &str, object: Value) -> Result<Value, StorageError>;

    /// Requests deletion of an object.
    ///
    /// Objects with finalizers are only marked with a deletion timestamp;
    /// the rest are removed along with the objects they own.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the object does not exist.
    async fn delete(&self, kind: &str, key: &ObjectKey) -> Result<(), StorageError>;
}

/// Typed access on top of the JSON contract.
impl dyn ObjectStore {
    pub async fn try_get_object<R: Resource>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<R>, StorageError> {
        let key = ObjectKey::new(namespace, name);
        match self.get(R::KIND, &key).await? {
            Some(value) => Ok(Some(R::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the object does not exist.
    pub async fn get_object<R: Resource>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<R, StorageError> {
        self.try_get_object(namespace, name)
            .await?
            .ok_or_else(|| StorageError::not_found(R::KIND, ObjectKey::new(namespace, name)))
    }

    pub async fn list_objects<R: Resource>(
        &self,
        params: &ListParams,
    ) -> Result<Vec<R>, StorageError> {
        self.list(R::KIND, params)
            .await?
            .into_iter()
            .map(|value| R::from_value(value).map_err(StorageError::from))
            .collect()
    }

    pub async fn create_object<R: Resource>(&self, object: &R) -> Result<R, StorageError> {
        let stored = self.create(R::KIND, object.to_value()?).await?;
        Ok(R::from_value(stored)?)
    }

    pub async fn update_object<R: Resource>(&self, object: &R) -> Result<R, StorageError> {
        let stored = self.update(R::KIND, object.to_value()?).await?;
        Ok(R::from_value(stored)?)
    }

    pub async fn update_object_status<R: Resource>(&self, object: &R) -> Result<R, StorageError> {
        let stored = self.update_status(R::KIND, object.to_value()?).await?;
        Ok(R::from_value(stored)?)
    }

    pub async fn delete_object<R: Resource>(&self, object: &R) -> Result<(), StorageError> {
        self.delete(R::KIND, &object.key()).await
    }
}
