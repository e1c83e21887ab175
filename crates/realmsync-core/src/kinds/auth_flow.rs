use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::meta::{ObjectMeta, ObjectRef};
use crate::resource::{RealmChild, declare_resource};
use crate::status::Status;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorConfig {
    pub alias: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config: BTreeMap<String, String>,
}

/// One step of a flow: an authenticator, or a child flow declared by its own
/// object (`authenticatorFlow: true`, matched by `alias`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationExecution {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub authenticator: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticator_config: Option<AuthenticatorConfig>,
    #[serde(default)]
    pub authenticator_flow: bool,
    #[serde(default)]
    pub priority: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub requirement: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub alias: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeycloakAuthFlowSpec {
    pub alias: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub realm: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realm_ref: Option<ObjectRef>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub provider_id: String,
    #[serde(default)]
    pub top_level: bool,
    #[serde(default)]
    pub built_in: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authentication_executions: Vec<AuthenticationExecution>,
    /// Alias of the flow this one is nested in; empty for top-level flows.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub parent_name: String,
    /// `basic-flow` or `form-flow`, for child flows.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub child_type: String,
    /// Requirement of the child flow's execution inside its parent.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub child_requirement: String,
}

impl KeycloakAuthFlowSpec {
    pub fn is_child(&self) -> bool {
        !self.parent_name.is_empty()
    }

    /// Authenticator executions, ordered by priority.
    pub fn authenticators(&self) -> Vec<&AuthenticationExecution> {
        let mut executions: Vec<_> = self
            .authentication_executions
            .iter()
            .filter(|e| !e.authenticator_flow)
            .collect();
        executions.sort_by_key(|e| e.priority);
        executions
    }

    pub fn child_flows(&self) -> impl Iterator<Item = &AuthenticationExecution> {
        self.authentication_executions
            .iter()
            .filter(|e| e.authenticator_flow)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeycloakAuthFlow {
    pub metadata: ObjectMeta,
    pub spec: KeycloakAuthFlowSpec,
    #[serde(default)]
    pub status: Status,
}

declare_resource!(KeycloakAuthFlow, "KeycloakAuthFlow", status);

impl RealmChild for KeycloakAuthFlow {
    fn realm_ref(&self) -> Option<&ObjectRef> {
        self.spec.realm_ref.as_ref().filter(|r| !r.is_empty())
    }

    fn legacy_target_realm(&self) -> Option<&str> {
        Some(self.spec.realm.as_str()).filter(|s| !s.is_empty())
    }
}
