use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::meta::{ObjectMeta, ObjectRef};
use crate::resource::{SecretKeySelector, ValueOrSecretRef, declare_resource};
use crate::status::Status;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealmUser {
    pub username: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub realm_roles: Vec<String>,
}

/// Outgoing mail settings of a realm.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmtpSettings {
    pub template: SmtpTemplate,
    pub connection: SmtpConnection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmtpTemplate {
    pub from: String,
    #[serde(default)]
    pub from_display_name: String,
    #[serde(default)]
    pub reply_to: String,
    #[serde(default)]
    pub reply_to_display_name: String,
    #[serde(default)]
    pub envelope_from: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmtpConnection {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default, rename = "enableSSL")]
    pub enable_ssl: bool,
    #[serde(default, rename = "enableStartTLS")]
    pub enable_start_tls: bool,
    /// Unset means the server accepts mail without login.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<SmtpAuthentication>,
}

fn default_smtp_port() -> u16 {
    25
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmtpAuthentication {
    pub username: ValueOrSecretRef,
    pub password: SecretKeySelector,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityProviderMapperSpec {
    pub name: String,
    #[serde(default)]
    pub identity_provider_mapper: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealmThemes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_theme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_theme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_console_theme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_theme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internationalization_enabled: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealmEventConfig {
    #[serde(default)]
    pub admin_events_details_enabled: bool,
    #[serde(default)]
    pub admin_events_enabled: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enabled_event_types: Vec<String>,
    #[serde(default)]
    pub events_enabled: bool,
    #[serde(default)]
    pub events_expiration: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events_listeners: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordPolicy {
    #[serde(rename = "type")]
    pub policy_type: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BruteForceSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub permanent_lockout: bool,
    #[serde(default)]
    pub max_failure_wait_seconds: i64,
    #[serde(default)]
    pub minimum_quick_login_wait_seconds: i64,
    #[serde(default)]
    pub wait_increment_seconds: i64,
    #[serde(default)]
    pub quick_login_check_milli_seconds: i64,
    #[serde(default)]
    pub max_delta_time_seconds: i64,
    #[serde(default)]
    pub failure_factor: i64,
}

/// A user profile attribute or group, keyed by name; everything else is kept verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NamedEntry {
    pub name: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfileConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unmanaged_attribute_policy: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<NamedEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<NamedEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeycloakRealmSpec {
    pub realm_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keycloak_ref: Option<ObjectRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<RealmUser>,
    /// Unset means enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sso_realm_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sso_realm_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sso_auto_redirect_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sso_realm_mappers: Vec<IdentityProviderMapperSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub themes: Option<RealmThemes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser_security_headers: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realm_event_config: Option<RealmEventConfig>,
    #[serde(
        default,
        rename = "passwordPolicy",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub password_policies: Vec<PasswordPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brute_force: Option<BruteForceSettings>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub frontend_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_profile_config: Option<UserProfileConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser_flow: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smtp: Option<SmtpSettings>,
}

impl KeycloakRealmSpec {
    pub fn sso_enabled(&self) -> bool {
        self.sso_realm_enabled.unwrap_or(true)
    }

    pub fn sso_auto_redirect_enabled(&self) -> bool {
        self.sso_auto_redirect_enabled.unwrap_or(true)
    }

    /// Whether any setting handled after the events configuration is declared.
    pub fn has_extra_settings(&self) -> bool {
        self.themes.is_some()
            || self.browser_security_headers.is_some()
            || !self.password_policies.is_empty()
            || self.brute_force.is_some()
            || !self.display_name.is_empty()
            || !self.frontend_url.is_empty()
            || self.smtp.is_some()
    }

    /// Distinct realm role names referenced by declared users, in first-seen order.
    pub fn user_realm_roles(&self) -> Vec<String> {
        let mut roles: Vec<String> = Vec::new();
        for role in self.users.iter().flat_map(|u| u.realm_roles.iter()) {
            if !roles.contains(role) {
                roles.push(role.clone());
            }
        }
        roles
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeycloakRealm {
    pub metadata: ObjectMeta,
    pub spec: KeycloakRealmSpec,
    #[serde(default)]
    pub status: Status,
}

declare_resource!(KeycloakRealm, "KeycloakRealm", status);
