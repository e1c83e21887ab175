//! Declared resource kinds reconciled by the engine.

pub mod auth_flow;
pub mod client;
pub mod client_scope;
pub mod component;
pub mod group;
pub mod identity_provider;
pub mod keycloak;
pub mod realm;
pub mod role;
pub mod user;

pub use auth_flow::{
    AuthenticationExecution, AuthenticatorConfig, KeycloakAuthFlow, KeycloakAuthFlowSpec,
};
pub use client::{
    AuthorizationPolicy, AuthorizationResource, AuthorizationSpec, ClientRealmRole,
    KeycloakClient, KeycloakClientSpec, ProtocolMapper, ReconciliationStrategy,
    ServiceAccountSpec, UserClientRoles,
};
pub use client_scope::{KeycloakClientScope, KeycloakClientScopeSpec};
pub use component::{KeycloakRealmComponent, KeycloakRealmComponentSpec};
pub use group::{KeycloakRealmGroup, KeycloakRealmGroupSpec};
pub use identity_provider::{KeycloakRealmIdentityProvider, KeycloakRealmIdentityProviderSpec};
pub use keycloak::{AdminType, Keycloak, KeycloakSpec, KeycloakStatus};
pub use realm::{
    BruteForceSettings, IdentityProviderMapperSpec, KeycloakRealm, KeycloakRealmSpec, NamedEntry,
    PasswordPolicy, RealmEventConfig, RealmThemes, RealmUser, SmtpAuthentication, SmtpConnection,
    SmtpSettings, SmtpTemplate, UserProfileConfig,
};
pub use role::{
    BatchRole, KeycloakRealmRole, KeycloakRealmRoleBatch, KeycloakRealmRoleBatchSpec,
    KeycloakRealmRoleSpec,
};
pub use user::{KeycloakRealmUser, KeycloakRealmUserSpec, KeycloakRealmUserStatus, PasswordSecret};
