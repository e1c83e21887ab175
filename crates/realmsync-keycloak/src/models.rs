//! Representations exchanged with the Keycloak admin API.
//!
//! Only the fields the engine reads or writes are modelled. Optional server
//! fields are `Option` so a partial representation never overwrites settings
//! it does not mention.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealmRepresentation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub realm: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_theme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_theme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_theme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_theme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internationalization_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser_security_headers: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_policy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brute_force_protected: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permanent_lockout: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_failure_wait_seconds: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_quick_login_wait_seconds: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_increment_seconds: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quick_login_check_milli_seconds: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_delta_time_seconds: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_factor: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser_flow: Option<String>,
    /// Outgoing mail settings, keyed as the server names them (`host`,
    /// `port`, `from`, `auth`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smtp_server: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

impl RealmRepresentation {
    pub fn new(realm: impl Into<String>) -> Self {
        Self {
            realm: realm.into(),
            enabled: Some(true),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealmEventsConfig {
    #[serde(default)]
    pub admin_events_details_enabled: bool,
    #[serde(default)]
    pub admin_events_enabled: bool,
    #[serde(default)]
    pub enabled_event_types: Vec<String>,
    #[serde(default)]
    pub events_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events_expiration: Option<i64>,
    #[serde(default)]
    pub events_listeners: Vec<String>,
}

/// Declarative user profile of a realm. Entries are kept as raw objects so
/// fields the engine does not know survive a read-modify-write.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unmanaged_attribute_policy: Option<String>,
    #[serde(default)]
    pub attributes: Vec<Map<String, Value>>,
    #[serde(default)]
    pub groups: Vec<Map<String, Value>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleRepresentation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub composite: bool,
    #[serde(default)]
    pub client_role: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Vec<String>>,
}

impl RoleRepresentation {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRepresentation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub username: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub required_actions: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Vec<String>>,
}

/// Body of a password reset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRepresentation {
    #[serde(rename = "type")]
    pub credential_type: String,
    pub value: String,
    pub temporary: bool,
}

impl CredentialRepresentation {
    pub fn password(value: impl Into<String>, temporary: bool) -> Self {
        Self {
            credential_type: "password".to_string(),
            value: value.into(),
            temporary,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolMapperRepresentation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub protocol_mapper: String,
    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

impl ProtocolMapperRepresentation {
    /// Same mapper ignoring the server-assigned id.
    pub fn same_definition(&self, other: &Self) -> bool {
        self.name == other.name
            && self.protocol == other.protocol
            && self.protocol_mapper == other.protocol_mapper
            && self.config == other.config
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientRepresentation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub public_client: bool,
    #[serde(default)]
    pub direct_access_grants_enabled: bool,
    #[serde(default)]
    pub service_accounts_enabled: bool,
    #[serde(default)]
    pub authorization_services_enabled: bool,
    #[serde(default)]
    pub frontchannel_logout: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_url: Option<String>,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    #[serde(default)]
    pub web_origins: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientScopeRepresentation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub protocol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol_mappers: Option<Vec<ProtocolMapperRepresentation>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupRepresentation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityProviderRepresentation {
    pub alias: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_id: Option<String>,
    pub provider_id: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub trust_email: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_broker_login_flow_alias: Option<String>,
    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityProviderMapperRepresentation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub identity_provider_alias: String,
    pub identity_provider_mapper: String,
    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

impl IdentityProviderMapperRepresentation {
    pub fn same_definition(&self, other: &Self) -> bool {
        self.name == other.name
            && self.identity_provider_mapper == other.identity_provider_mapper
            && self.config == other.config
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentRepresentation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub provider_id: String,
    pub provider_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub config: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationFlowRepresentation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub alias: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub provider_id: String,
    #[serde(default)]
    pub top_level: bool,
    #[serde(default)]
    pub built_in: bool,
}

/// One row of a flow's flattened execution tree. `level` is the nesting depth
/// below the listed flow; child flows carry `authentication_flow` and their
/// alias as `display_name`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationExecutionInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    #[serde(default)]
    pub requirement: String,
    #[serde(default)]
    pub level: i64,
    #[serde(default)]
    pub index: i64,
    #[serde(default)]
    pub authentication_flow: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication_config: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorConfigRepresentation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub alias: String,
    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

/// Body for nesting a new flow under a parent flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildFlowRepresentation {
    pub alias: String,
    /// `basic-flow` or `form-flow`.
    #[serde(rename = "type")]
    pub flow_type: String,
    #[serde(default)]
    pub description: String,
    /// Form provider for `form-flow` children.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

/// Authorization scope of a resource server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeRepresentation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
}

/// Authorization resource of a resource server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRepresentation {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(default)]
    pub uris: Vec<String>,
    #[serde(default)]
    pub scopes: Vec<ScopeRepresentation>,
    #[serde(default)]
    pub owner_managed_access: bool,
    #[serde(default)]
    pub attributes: BTreeMap<String, Vec<String>>,
}

impl ResourceRepresentation {
    /// Same resource ignoring server-assigned ids.
    pub fn same_definition(&self, other: &Self) -> bool {
        let scope_names = |r: &Self| r.scopes.iter().map(|s| s.name.clone()).collect::<Vec<_>>();
        self.name == other.name
            && self.display_name == other.display_name
            && self.resource_type == other.resource_type
            && self.uris == other.uris
            && self.owner_managed_access == other.owner_managed_access
            && self.attributes == other.attributes
            && scope_names(self) == scope_names(other)
    }
}

/// Authorization policies and permissions share one representation; the
/// type-specific settings (`roles`, `resources`, `code`, ...) are kept as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRepresentation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(rename = "type")]
    pub policy_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision_strategy: Option<String>,
    #[serde(flatten)]
    pub settings: Map<String, Value>,
}

impl PolicyRepresentation {
    /// True when every field declared on `self` already holds on `remote`.
    pub fn is_satisfied_by(&self, remote: &Self) -> bool {
        let declared = |mine: &Option<String>, theirs: &Option<String>| {
            mine.is_none() || mine == theirs
        };
        self.name == remote.name
            && self.policy_type == remote.policy_type
            && declared(&self.description, &remote.description)
            && declared(&self.logic, &remote.logic)
            && declared(&self.decision_strategy, &remote.decision_strategy)
            && self
                .settings
                .iter()
                .all(|(k, v)| remote.settings.get(k) == Some(v))
    }
}

/// Which authorization endpoint family a policy lives under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolicyKind {
    Policy,
    Permission,
}

impl PolicyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Policy => "policy",
            Self::Permission => "permission",
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_json_diff::assert_json_eq;
    use serde_json::json;

    #[test]
    fn test_partial_realm_serializes_only_set_fields() {
        let mut realm = RealmRepresentation::new("team");
        realm.display_name = Some("Team".to_string());

        assert_json_eq!(
            serde_json::to_value(&realm).unwrap(),
            json!({"realm": "team", "enabled": true, "displayName": "Team"})
        );
    }

    #[test]
    fn test_resource_id_wire_name() {
        let resource: ResourceRepresentation = serde_json::from_value(json!({
            "_id": "r-1",
            "name": "orders",
            "type": "urn:orders",
            "scopes": [{"id": "s-1", "name": "read"}]
        }))
        .unwrap();

        assert_eq!(resource.id.as_deref(), Some("r-1"));
        assert_eq!(resource.resource_type.as_deref(), Some("urn:orders"));
        assert_eq!(resource.scopes[0].name, "read");
    }

    #[test]
    fn test_policy_settings_are_flattened() {
        let policy: PolicyRepresentation = serde_json::from_value(json!({
            "id": "p-1",
            "name": "admins",
            "type": "role",
            "logic": "POSITIVE",
            "roles": [{"id": "admin", "required": true}]
        }))
        .unwrap();
        assert_eq!(policy.settings["roles"][0]["id"], "admin");

        let declared = PolicyRepresentation {
            id: None,
            name: "admins".to_string(),
            policy_type: "role".to_string(),
            description: None,
            logic: None,
            decision_strategy: None,
            settings: policy.settings.clone(),
        };
        assert!(declared.is_satisfied_by(&policy));

        let mut changed = declared.clone();
        changed.logic = Some("NEGATIVE".to_string());
        assert!(!changed.is_satisfied_by(&policy));
    }
}
