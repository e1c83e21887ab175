//! Well-known names shared between the engine and the declared objects it manages.

/// Annotation that keeps the remote counterpart alive when the declared object is deleted.
pub const PRESERVE_RESOURCES_ON_DELETION: &str = "edp.epam.com/preserve-resources-on-deletion";

/// Annotation holding the realm's OpenID discovery document.
pub const OPENID_CONFIGURATION_ANNOTATION: &str = "openid-configuration";

/// Label put on every realm so children can find it without a linear scan.
pub const TARGET_REALM_LABEL: &str = "targetRealm";

/// Realm name assumed for objects created before owner references existed.
pub const LEGACY_DEFAULT_REALM: &str = "main";

pub const REALM_FINALIZER: &str = "keycloak.realm.operator.finalizer.name";
pub const CLIENT_FINALIZER: &str = "keycloak.client.operator.finalizer.name";
pub const REALM_ROLE_FINALIZER: &str = "keycloak.realmrole.operator.finalizer.name";
pub const REALM_ROLE_BATCH_FINALIZER: &str = "keycloak.realmrolebatch.operator.finalizer.name";
pub const REALM_GROUP_FINALIZER: &str = "keycloak.realmgroup.operator.finalizer.name";
pub const REALM_IDP_FINALIZER: &str = "keycloak.realmidp.operator.finalizer.name";
pub const CLIENT_SCOPE_FINALIZER: &str = "keycloak.clientscope.operator.finalizer.name";
pub const REALM_COMPONENT_FINALIZER: &str = "keycloak.realmcomponent.operator.finalizer.name";
pub const REALM_USER_FINALIZER: &str = "keycloak.realmuser.operator.finalizer.name";
pub const AUTH_FLOW_FINALIZER: &str = "keycloak.authflow.operator.finalizer.name";

pub const SECRET_USERNAME_KEY: &str = "username";
pub const SECRET_PASSWORD_KEY: &str = "password";
pub const SECRET_TOKEN_KEY: &str = "token";
pub const SECRET_CLIENT_SECRET_KEY: &str = "clientSecret";
pub const SECRET_CA_CERT_KEY: &str = "ca.crt";

/// Client attribute defaulted on every declared client.
pub const POST_LOGOUT_REDIRECT_URIS_ATTRIBUTE: &str = "post.logout.redirect.uris";

/// Authorization resource Keycloak creates for every resource server; never deleted.
pub const DEFAULT_AUTHZ_RESOURCE: &str = "Default Resource";
pub const DEFAULT_AUTHZ_POLICY: &str = "Default Policy";
pub const DEFAULT_AUTHZ_PERMISSION: &str = "Default Permission";

/// Secret that caches the admin session token of a Keycloak instance.
pub fn token_secret_name(keycloak: &str) -> String {
    format!("kc-token-{keycloak}")
}

/// Secret holding the SSO client credentials of a realm.
pub fn realm_sso_client_secret_name(realm: &str) -> String {
    format!("keycloak-client.{realm}.secret")
}

/// Secret generated for a confidential client that declares no secret.
pub fn generated_client_secret_name(client: &str) -> String {
    format!("keycloak-client-{client}-secret")
}

/// Composite role that aggregates the default roles of a realm.
pub fn default_roles_name(realm: &str) -> String {
    format!("default-roles-{realm}")
}
