use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::meta::{ObjectMeta, ObjectRef};
use crate::resource::{RealmChild, declare_resource};
use crate::status::Status;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeycloakRealmRoleSpec {
    pub name: String,
    /// Deprecated: realm object name used before `realmRef` existed.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub realm: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realm_ref: Option<ObjectRef>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub composite: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub composites: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeycloakRealmRole {
    pub metadata: ObjectMeta,
    pub spec: KeycloakRealmRoleSpec,
    #[serde(default)]
    pub status: Status,
}

declare_resource!(KeycloakRealmRole, "KeycloakRealmRole", status);

impl RealmChild for KeycloakRealmRole {
    fn realm_ref(&self) -> Option<&ObjectRef> {
        self.spec.realm_ref.as_ref().filter(|r| !r.is_empty())
    }

    fn legacy_target_realm(&self) -> Option<&str> {
        Some(self.spec.realm.as_str()).filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRole {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub composite: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub composites: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeycloakRealmRoleBatchSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub realm: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realm_ref: Option<ObjectRef>,
    #[serde(default)]
    pub roles: Vec<BatchRole>,
}

/// A set of realm roles materialized as individual `KeycloakRealmRole` objects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeycloakRealmRoleBatch {
    pub metadata: ObjectMeta,
    pub spec: KeycloakRealmRoleBatchSpec,
    #[serde(default)]
    pub status: Status,
}

declare_resource!(KeycloakRealmRoleBatch, "KeycloakRealmRoleBatch", status);

impl KeycloakRealmRoleBatch {
    /// Object name of the child role generated for `role`.
    pub fn child_role_name(&self, role: &str) -> String {
        format!("{}-{role}", self.metadata.name)
    }
}

impl RealmChild for KeycloakRealmRoleBatch {
    fn realm_ref(&self) -> Option<&ObjectRef> {
        self.spec.realm_ref.as_ref().filter(|r| !r.is_empty())
    }

    fn legacy_target_realm(&self) -> Option<&str> {
        Some(self.spec.realm.as_str()).filter(|s| !s.is_empty())
    }
}
