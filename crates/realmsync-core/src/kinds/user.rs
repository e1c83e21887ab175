use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::kinds::client::{ReconciliationStrategy, UserClientRoles};
use crate::meta::{ObjectMeta, ObjectRef};
use crate::resource::{HasStatus, RealmChild, declare_resource};
use crate::status::Status;

/// Secret key holding a user's password.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordSecret {
    pub name: String,
    pub key: String,
    /// The user must change the password at the next login. A temporary
    /// password is set once and never overwritten afterwards.
    #[serde(default)]
    pub temporary: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeycloakRealmUserSpec {
    pub username: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub realm: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realm_ref: Option<ObjectRef>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub email: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub first_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_name: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_user_actions: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub client_roles: Vec<UserClientRoles>,
    /// Group names, or paths starting with `/`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub reconciliation_strategy: ReconciliationStrategy,
    /// Deprecated: plain-text password, set on every pass.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_secret: Option<PasswordSecret>,
    /// When false the declared object is removed once the user exists and the
    /// user is never deleted remotely.
    #[serde(default = "default_true")]
    pub keep_resource: bool,
}

impl Default for KeycloakRealmUserSpec {
    fn default() -> Self {
        Self {
            username: String::new(),
            realm: String::new(),
            realm_ref: None,
            email: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            enabled: false,
            email_verified: false,
            required_user_actions: Vec::new(),
            roles: Vec::new(),
            client_roles: Vec::new(),
            groups: Vec::new(),
            attributes: BTreeMap::new(),
            reconciliation_strategy: ReconciliationStrategy::Full,
            password: String::new(),
            password_secret: None,
            keep_resource: true,
        }
    }
}

impl KeycloakRealmUserSpec {
    pub fn is_add_only(&self) -> bool {
        self.reconciliation_strategy == ReconciliationStrategy::AddOnly
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeycloakRealmUserStatus {
    #[serde(flatten)]
    pub common: Status,
    /// Resource version of the password secret last applied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_synced_password_secret_version: Option<u64>,
    #[serde(default)]
    pub password_synced: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeycloakRealmUser {
    pub metadata: ObjectMeta,
    pub spec: KeycloakRealmUserSpec,
    #[serde(default)]
    pub status: KeycloakRealmUserStatus,
}

declare_resource!(KeycloakRealmUser, "KeycloakRealmUser");

impl HasStatus for KeycloakRealmUser {
    fn status(&self) -> &Status {
        &self.status.common
    }

    fn status_mut(&mut self) -> &mut Status {
        &mut self.status.common
    }
}

impl RealmChild for KeycloakRealmUser {
    fn realm_ref(&self) -> Option<&ObjectRef> {
        self.spec.realm_ref.as_ref().filter(|r| !r.is_empty())
    }

    fn legacy_target_realm(&self) -> Option<&str> {
        Some(self.spec.realm.as_str()).filter(|s| !s.is_empty())
    }
}
