use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::kinds::client::ProtocolMapper;
use crate::meta::{ObjectMeta, ObjectRef};
use crate::resource::{RealmChild, declare_resource};
use crate::status::Status;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeycloakClientScopeSpec {
    pub name: String,
    pub realm_ref: ObjectRef,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    /// Adds the scope to the realm's default client scopes.
    #[serde(default)]
    pub default: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub protocol_mappers: Vec<ProtocolMapper>,
}

fn default_protocol() -> String {
    "openid-connect".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeycloakClientScope {
    pub metadata: ObjectMeta,
    pub spec: KeycloakClientScopeSpec,
    #[serde(default)]
    pub status: Status,
}

declare_resource!(KeycloakClientScope, "KeycloakClientScope", status);

impl RealmChild for KeycloakClientScope {
    fn realm_ref(&self) -> Option<&ObjectRef> {
        Some(&self.spec.realm_ref).filter(|r| !r.is_empty())
    }
}
