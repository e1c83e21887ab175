use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::meta::{ObjectMeta, ObjectRef};
use crate::resource::{RealmChild, declare_resource};
use crate::status::Status;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeycloakRealmGroupSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub realm: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realm_ref: Option<ObjectRef>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub realm_roles: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeycloakRealmGroup {
    pub metadata: ObjectMeta,
    pub spec: KeycloakRealmGroupSpec,
    #[serde(default)]
    pub status: Status,
}

declare_resource!(KeycloakRealmGroup, "KeycloakRealmGroup", status);

impl RealmChild for KeycloakRealmGroup {
    fn realm_ref(&self) -> Option<&ObjectRef> {
        self.spec.realm_ref.as_ref().filter(|r| !r.is_empty())
    }

    fn legacy_target_realm(&self) -> Option<&str> {
        Some(self.spec.realm.as_str()).filter(|s| !s.is_empty())
    }
}
