use serde::{Deserialize, Serialize};

use crate::meta::ObjectMeta;
use crate::resource::declare_resource;

/// How the engine authenticates against a Keycloak instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AdminType {
    /// Password grant with the `admin-cli` client.
    #[default]
    User,
    /// Client credentials grant; the secret holds client id and secret.
    ServiceAccount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeycloakSpec {
    pub url: String,
    /// Secret with `username` and `password` keys.
    pub secret: String,
    #[serde(default = "default_login_realm")]
    pub realm: String,
    #[serde(default)]
    pub admin_type: AdminType,
    /// Secret with a PEM bundle under `ca.crt`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert_secret: Option<String>,
    #[serde(default)]
    pub insecure_skip_verify: bool,
}

fn default_login_realm() -> String {
    "master".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeycloakStatus {
    #[serde(default)]
    pub connected: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub value: String,
}

/// A managed Keycloak server instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keycloak {
    pub metadata: ObjectMeta,
    pub spec: KeycloakSpec,
    #[serde(default)]
    pub status: KeycloakStatus,
}

declare_resource!(Keycloak, "Keycloak");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keycloak_defaults() {
        let kc: Keycloak = serde_json::from_value(serde_json::json!({
            "metadata": {"name": "kc", "namespace": "ns"},
            "spec": {"url": "https://sso.example.com", "secret": "kc-admin"}
        }))
        .unwrap();

        assert_eq!(kc.spec.realm, "master");
        assert_eq!(kc.spec.admin_type, AdminType::User);
        assert!(!kc.status.connected);
    }

    #[test]
    fn test_admin_type_wire_names() {
        assert_eq!(
            serde_json::to_value(AdminType::ServiceAccount).unwrap(),
            serde_json::json!("serviceAccount")
        );
    }
}
