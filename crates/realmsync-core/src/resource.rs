use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::meta::{ObjectKey, ObjectMeta, ObjectRef, OwnerReference};
use crate::status::{Status, SyncState};

/// A declared object addressable in the object store.
pub trait Resource: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const KIND: &'static str;

    fn meta(&self) -> &ObjectMeta;
    fn meta_mut(&mut self) -> &mut ObjectMeta;

    fn key(&self) -> ObjectKey {
        self.meta().key()
    }

    fn name(&self) -> &str {
        &self.meta().name
    }

    fn namespace(&self) -> &str {
        &self.meta().namespace
    }

    /// Owner reference pointing at this object, marked as the controlling owner.
    fn owner_reference(&self) -> OwnerReference {
        OwnerReference {
            kind: Self::KIND.to_string(),
            name: self.meta().name.clone(),
            uid: self.meta().uid.clone(),
            controller: true,
        }
    }

    fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    fn from_value(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }
}

/// A declared object whose status is written by the engine.
pub trait HasStatus: Resource {
    fn status(&self) -> &Status;
    fn status_mut(&mut self) -> &mut Status;

    fn sync_state(&self) -> SyncState {
        SyncState::observe(self.meta(), self.status())
    }
}

/// A declared object that lives inside a realm.
///
/// Older objects name their realm through a free-text field instead of a
/// typed reference; `legacy_target_realm` exposes it for owner resolution.
pub trait RealmChild: HasStatus {
    fn realm_ref(&self) -> Option<&ObjectRef>;

    fn legacy_target_realm(&self) -> Option<&str> {
        None
    }

    /// Drops the legacy realm field once the owner reference is recorded.
    fn clear_legacy_target_realm(&mut self) {}
}

macro_rules! declare_resource {
    ($ty:ty, $kind:literal) => {
        impl $crate::resource::Resource for $ty {
            const KIND: &'static str = $kind;

            fn meta(&self) -> &$crate::meta::ObjectMeta {
                &self.metadata
            }

            fn meta_mut(&mut self) -> &mut $crate::meta::ObjectMeta {
                &mut self.metadata
            }
        }
    };
    ($ty:ty, $kind:literal, status) => {
        declare_resource!($ty, $kind);

        impl $crate::resource::HasStatus for $ty {
            fn status(&self) -> &$crate::status::Status {
                &self.status
            }

            fn status_mut(&mut self) -> &mut $crate::status::Status {
                &mut self.status
            }
        }
    };
}

pub(crate) use declare_resource;

/// Opaque key/value blob kept in the object store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

declare_resource!(Secret, "Secret");

impl Secret {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            data: BTreeMap::new(),
        }
    }

    pub fn with_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn with_owner(mut self, owner: OwnerReference) -> Self {
        self.metadata.set_owner(owner);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }
}

/// One key of a secret in the declaring object's namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretKeySelector {
    pub name: String,
    pub key: String,
}

/// A literal value, or a secret key to read it from. The reference wins when
/// both are set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueOrSecretRef {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key_ref: Option<SecretKeySelector>,
}
