use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::meta::{ObjectMeta, ObjectRef};
use crate::resource::{RealmChild, declare_resource};
use crate::status::Status;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReconciliationStrategy {
    /// Remote entries not declared are removed.
    #[default]
    Full,
    /// Remote entries are only ever added or updated.
    AddOnly,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolMapper {
    pub name: String,
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub protocol_mapper: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientRealmRole {
    pub name: String,
    /// Composite realm role this role is added to.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub composite: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserClientRoles {
    pub client_id: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAccountSpec {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub realm_roles: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub client_roles: Vec<UserClientRoles>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationResource {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub display_name: String,
    #[serde(default, rename = "type", skip_serializing_if = "String::is_empty")]
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub uris: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub owner_managed_access: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Vec<String>>,
}

/// A policy or permission. `config` carries the type-specific body verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationPolicy {
    pub name: String,
    #[serde(rename = "type")]
    pub policy_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub logic: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub decision_strategy: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub config: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<AuthorizationResource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub policies: Vec<AuthorizationPolicy>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<AuthorizationPolicy>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeycloakClientSpec {
    pub client_id: String,
    /// Deprecated: realm name used before `realmRef` existed.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub target_realm: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realm_ref: Option<ObjectRef>,
    /// Name of the secret holding `clientSecret`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub secret: String,
    #[serde(default)]
    pub public: bool,
    #[serde(default)]
    pub direct_access: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub web_url: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub redirect_uris: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub advanced_protocol_mappers: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub protocol_mappers: Vec<ProtocolMapper>,
    #[serde(default)]
    pub reconciliation_strategy: ReconciliationStrategy,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub client_roles: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub realm_roles: Vec<ClientRealmRole>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub default_client_scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub optional_client_scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account: Option<ServiceAccountSpec>,
    #[serde(default)]
    pub authorization_services_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization: Option<AuthorizationSpec>,
    #[serde(default)]
    pub front_channel_logout: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

impl KeycloakClientSpec {
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    pub fn service_account_enabled(&self) -> bool {
        self.service_account.as_ref().is_some_and(|sa| sa.enabled)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeycloakClient {
    pub metadata: ObjectMeta,
    pub spec: KeycloakClientSpec,
    #[serde(default)]
    pub status: Status,
}

declare_resource!(KeycloakClient, "KeycloakClient", status);

impl RealmChild for KeycloakClient {
    fn realm_ref(&self) -> Option<&ObjectRef> {
        self.spec.realm_ref.as_ref().filter(|r| !r.is_empty())
    }

    fn legacy_target_realm(&self) -> Option<&str> {
        Some(self.spec.target_realm.as_str()).filter(|s| !s.is_empty())
    }

    fn clear_legacy_target_realm(&mut self) {
        self.spec.target_realm.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_spec_defaults() {
        let client: KeycloakClient = serde_json::from_value(serde_json::json!({
            "metadata": {"name": "portal", "namespace": "ns"},
            "spec": {"clientId": "portal", "targetRealm": "team"}
        }))
        .unwrap();

        assert!(client.spec.is_enabled());
        assert!(!client.spec.public);
        assert!(!client.spec.service_account_enabled());
        assert_eq!(
            client.spec.reconciliation_strategy,
            ReconciliationStrategy::Full
        );
        assert_eq!(client.legacy_target_realm(), Some("team"));
        assert!(client.realm_ref().is_none());
    }

    #[test]
    fn test_reconciliation_strategy_wire_names() {
        let strategy: ReconciliationStrategy =
            serde_json::from_value(serde_json::json!("addOnly")).unwrap();
        assert_eq!(strategy, ReconciliationStrategy::AddOnly);
    }
}
