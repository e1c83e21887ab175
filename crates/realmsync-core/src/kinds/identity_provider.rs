use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::kinds::realm::IdentityProviderMapperSpec;
use crate::meta::{ObjectMeta, ObjectRef};
use crate::resource::{RealmChild, declare_resource};
use crate::status::Status;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeycloakRealmIdentityProviderSpec {
    pub alias: String,
    pub realm_ref: ObjectRef,
    pub provider_id: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub display_name: String,
    #[serde(default)]
    pub trust_email: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub first_broker_login_flow_alias: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mappers: Vec<IdentityProviderMapperSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeycloakRealmIdentityProvider {
    pub metadata: ObjectMeta,
    pub spec: KeycloakRealmIdentityProviderSpec,
    #[serde(default)]
    pub status: Status,
}

declare_resource!(
    KeycloakRealmIdentityProvider,
    "KeycloakRealmIdentityProvider",
    status
);

impl RealmChild for KeycloakRealmIdentityProvider {
    fn realm_ref(&self) -> Option<&ObjectRef> {
        Some(&self.spec.realm_ref).filter(|r| !r.is_empty())
    }
}
