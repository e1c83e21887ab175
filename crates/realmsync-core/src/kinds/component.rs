use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::meta::{ObjectMeta, ObjectRef};
use crate::resource::{RealmChild, declare_resource};
use crate::status::Status;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeycloakRealmComponentSpec {
    pub name: String,
    pub realm_ref: ObjectRef,
    pub provider_id: String,
    pub provider_type: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config: BTreeMap<String, Vec<String>>,
}

/// A realm component such as a user federation provider or key provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeycloakRealmComponent {
    pub metadata: ObjectMeta,
    pub spec: KeycloakRealmComponentSpec,
    #[serde(default)]
    pub status: Status,
}

declare_resource!(KeycloakRealmComponent, "KeycloakRealmComponent", status);

impl RealmChild for KeycloakRealmComponent {
    fn realm_ref(&self) -> Option<&ObjectRef> {
        Some(&self.spec.realm_ref).filter(|r| !r.is_empty())
    }
}
