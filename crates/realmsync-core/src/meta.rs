use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::names::PRESERVE_RESOURCES_ON_DELETION;

/// Namespaced address of a declared object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Link from a child object to the object that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerReference {
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub controller: bool,
}

/// Typed (kind, name) pointer written by users in specs, e.g. `realmRef`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub name: String,
}

impl ObjectRef {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    pub namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uid: String,
    #[serde(default)]
    pub resource_version: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub finalizers: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owner_references: Vec<OwnerReference>,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub deletion_timestamp: Option<OffsetDateTime>,
}

impl ObjectMeta {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(&self.namespace, &self.name)
    }

    pub fn is_being_deleted(&self) -> bool {
        self.deletion_timestamp.is_some()
    }

    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.finalizers.iter().any(|f| f == finalizer)
    }

    /// Returns `true` when the finalizer was not present before.
    pub fn add_finalizer(&mut self, finalizer: &str) -> bool {
        if self.has_finalizer(finalizer) {
            return false;
        }
        self.finalizers.push(finalizer.to_string());
        true
    }

    /// Returns `true` when the finalizer was present and got removed.
    pub fn remove_finalizer(&mut self, finalizer: &str) -> bool {
        let before = self.finalizers.len();
        self.finalizers.retain(|f| f != finalizer);
        before != self.finalizers.len()
    }

    pub fn owner_of_kind(&self, kind: &str) -> Option<&OwnerReference> {
        self.owner_references.iter().find(|o| o.kind == kind)
    }

    pub fn is_owned_by(&self, owner: &OwnerReference) -> bool {
        self.owner_references
            .iter()
            .any(|o| o.kind == owner.kind && o.name == owner.name && o.uid == owner.uid)
    }

    /// Sets the owner of `owner.kind`, replacing any previous owner of the same kind.
    pub fn set_owner(&mut self, owner: OwnerReference) {
        self.owner_references.retain(|o| o.kind != owner.kind);
        self.owner_references.push(owner);
    }

    pub fn preserve_on_deletion(&self) -> bool {
        self.annotations
            .get(PRESERVE_RESOURCES_ON_DELETION)
            .is_some_and(|v| v == "true")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner(kind: &str, name: &str) -> OwnerReference {
        OwnerReference {
            kind: kind.to_string(),
            name: name.to_string(),
            uid: format!("{name}-uid"),
            controller: true,
        }
    }

    #[test]
    fn test_finalizer_bookkeeping() {
        let mut meta = ObjectMeta::new("ns", "realm");
        assert!(meta.add_finalizer("f"));
        assert!(!meta.add_finalizer("f"));
        assert!(meta.has_finalizer("f"));
        assert!(meta.remove_finalizer("f"));
        assert!(!meta.remove_finalizer("f"));
        assert!(meta.finalizers.is_empty());
    }

    #[test]
    fn test_set_owner_replaces_same_kind() {
        let mut meta = ObjectMeta::new("ns", "client");
        meta.set_owner(owner("KeycloakRealm", "old"));
        meta.set_owner(owner("KeycloakRealmRoleBatch", "batch"));
        meta.set_owner(owner("KeycloakRealm", "new"));

        assert_eq!(meta.owner_references.len(), 2);
        assert_eq!(meta.owner_of_kind("KeycloakRealm").unwrap().name, "new");
        assert!(meta.is_owned_by(&owner("KeycloakRealmRoleBatch", "batch")));
        assert!(!meta.is_owned_by(&owner("KeycloakRealm", "old")));
    }

    #[test]
    fn test_preserve_on_deletion_requires_true() {
        let mut meta = ObjectMeta::new("ns", "realm");
        assert!(!meta.preserve_on_deletion());

        meta.annotations
            .insert(PRESERVE_RESOURCES_ON_DELETION.to_string(), "yes".to_string());
        assert!(!meta.preserve_on_deletion());

        meta.annotations
            .insert(PRESERVE_RESOURCES_ON_DELETION.to_string(), "true".to_string());
        assert!(meta.preserve_on_deletion());
    }

    #[test]
    fn test_meta_serialization_skips_empty() {
        let meta = ObjectMeta::new("ns", "realm");
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"name": "realm", "namespace": "ns", "resourceVersion": 0})
        );
    }
}
