use async_trait::async_trait;

use crate::error::ApiResult;
use crate::models::{
    AuthenticationExecutionInfo, AuthenticationFlowRepresentation,
    AuthenticatorConfigRepresentation, ChildFlowRepresentation, ClientRepresentation,
    ClientScopeRepresentation, ComponentRepresentation, CredentialRepresentation,
    GroupRepresentation, IdentityProviderMapperRepresentation, IdentityProviderRepresentation, PolicyKind,
    PolicyRepresentation, ProtocolMapperRepresentation, RealmEventsConfig, RealmRepresentation,
    ResourceRepresentation, RoleRepresentation, ScopeRepresentation, UserProfile,
    UserRepresentation,
};

/// The slice of the Keycloak admin API the engine converges through.
///
/// Lookups by name return `Ok(None)` when the object is absent; every other
/// failure, including 404 on calls addressed by server id, is an
/// [`crate::ApiError`]. Calls that take `client` expect the server-assigned
/// client id, not the `clientId`.
#[async_trait]
pub trait KeycloakApi: Send + Sync {
    // Realms

    async fn get_realm(&self, realm: &str) -> ApiResult<Option<RealmRepresentation>>;
    async fn create_realm(&self, realm: &RealmRepresentation) -> ApiResult<()>;
    async fn update_realm(&self, realm: &RealmRepresentation) -> ApiResult<()>;
    async fn delete_realm(&self, realm: &str) -> ApiResult<()>;

    async fn get_realm_events_config(&self, realm: &str) -> ApiResult<RealmEventsConfig>;
    async fn update_realm_events_config(
        &self,
        realm: &str,
        config: &RealmEventsConfig,
    ) -> ApiResult<()>;

    /// Raw OpenID discovery document of the realm.
    async fn get_openid_configuration(&self, realm: &str) -> ApiResult<String>;

    async fn get_user_profile(&self, realm: &str) -> ApiResult<UserProfile>;
    async fn update_user_profile(&self, realm: &str, profile: &UserProfile) -> ApiResult<()>;

    /// Provider the browser flow redirects to, if one is configured.
    async fn get_default_identity_provider(&self, realm: &str) -> ApiResult<Option<String>>;
    async fn set_default_identity_provider(&self, realm: &str, alias: &str) -> ApiResult<()>;

    // Realm roles

    async fn get_realm_role(&self, realm: &str, name: &str)
    -> ApiResult<Option<RoleRepresentation>>;
    async fn create_realm_role(&self, realm: &str, role: &RoleRepresentation) -> ApiResult<()>;
    /// Updates the role addressed by `role.name`.
    async fn update_realm_role(&self, realm: &str, role: &RoleRepresentation) -> ApiResult<()>;
    async fn delete_realm_role(&self, realm: &str, name: &str) -> ApiResult<()>;
    async fn get_realm_role_composites(
        &self,
        realm: &str,
        name: &str,
    ) -> ApiResult<Vec<RoleRepresentation>>;
    async fn add_realm_role_composites(
        &self,
        realm: &str,
        name: &str,
        roles: &[RoleRepresentation],
    ) -> ApiResult<()>;
    async fn remove_realm_role_composites(
        &self,
        realm: &str,
        name: &str,
        roles: &[RoleRepresentation],
    ) -> ApiResult<()>;

    // Users

    async fn find_user(&self, realm: &str, username: &str)
    -> ApiResult<Option<UserRepresentation>>;
    async fn create_user(&self, realm: &str, user: &UserRepresentation) -> ApiResult<String>;
    async fn update_user(&self, realm: &str, user: &UserRepresentation) -> ApiResult<()>;
    async fn delete_user(&self, realm: &str, user_id: &str) -> ApiResult<()>;
    async fn reset_user_password(
        &self,
        realm: &str,
        user_id: &str,
        credential: &CredentialRepresentation,
    ) -> ApiResult<()>;
    async fn get_user_groups(&self, realm: &str, user_id: &str)
    -> ApiResult<Vec<GroupRepresentation>>;
    async fn add_user_to_group(&self, realm: &str, user_id: &str, group_id: &str)
    -> ApiResult<()>;
    async fn remove_user_from_group(
        &self,
        realm: &str,
        user_id: &str,
        group_id: &str,
    ) -> ApiResult<()>;
    async fn get_user_realm_roles(
        &self,
        realm: &str,
        user_id: &str,
    ) -> ApiResult<Vec<RoleRepresentation>>;
    async fn add_user_realm_roles(
        &self,
        realm: &str,
        user_id: &str,
        roles: &[RoleRepresentation],
    ) -> ApiResult<()>;
    async fn remove_user_realm_roles(
        &self,
        realm: &str,
        user_id: &str,
        roles: &[RoleRepresentation],
    ) -> ApiResult<()>;
    async fn get_user_client_roles(
        &self,
        realm: &str,
        user_id: &str,
        client: &str,
    ) -> ApiResult<Vec<RoleRepresentation>>;
    async fn add_user_client_roles(
        &self,
        realm: &str,
        user_id: &str,
        client: &str,
        roles: &[RoleRepresentation],
    ) -> ApiResult<()>;
    async fn remove_user_client_roles(
        &self,
        realm: &str,
        user_id: &str,
        client: &str,
        roles: &[RoleRepresentation],
    ) -> ApiResult<()>;

    // Clients

    /// Looks a client up by its `clientId`.
    async fn get_client(&self, realm: &str, client_id: &str)
    -> ApiResult<Option<ClientRepresentation>>;
    /// Returns the server-assigned id.
    async fn create_client(&self, realm: &str, client: &ClientRepresentation) -> ApiResult<String>;
    async fn update_client(&self, realm: &str, client: &ClientRepresentation) -> ApiResult<()>;
    async fn delete_client(&self, realm: &str, client: &str) -> ApiResult<()>;

    async fn list_client_roles(&self, realm: &str, client: &str)
    -> ApiResult<Vec<RoleRepresentation>>;
    async fn create_client_role(
        &self,
        realm: &str,
        client: &str,
        role: &RoleRepresentation,
    ) -> ApiResult<()>;
    async fn delete_client_role(&self, realm: &str, client: &str, name: &str) -> ApiResult<()>;

    async fn list_protocol_mappers(
        &self,
        realm: &str,
        client: &str,
    ) -> ApiResult<Vec<ProtocolMapperRepresentation>>;
    async fn create_protocol_mapper(
        &self,
        realm: &str,
        client: &str,
        mapper: &ProtocolMapperRepresentation,
    ) -> ApiResult<()>;
    async fn update_protocol_mapper(
        &self,
        realm: &str,
        client: &str,
        mapper: &ProtocolMapperRepresentation,
    ) -> ApiResult<()>;
    async fn delete_protocol_mapper(&self, realm: &str, client: &str, id: &str) -> ApiResult<()>;

    async fn list_client_default_scopes(
        &self,
        realm: &str,
        client: &str,
    ) -> ApiResult<Vec<ClientScopeRepresentation>>;
    async fn add_client_default_scope(
        &self,
        realm: &str,
        client: &str,
        scope_id: &str,
    ) -> ApiResult<()>;

    async fn list_client_optional_scopes(
        &self,
        realm: &str,
        client: &str,
    ) -> ApiResult<Vec<ClientScopeRepresentation>>;
    async fn add_client_optional_scope(
        &self,
        realm: &str,
        client: &str,
        scope_id: &str,
    ) -> ApiResult<()>;

    async fn get_service_account_user(
        &self,
        realm: &str,
        client: &str,
    ) -> ApiResult<UserRepresentation>;

    // Client authorization services

    async fn list_authz_scopes(
        &self,
        realm: &str,
        client: &str,
    ) -> ApiResult<Vec<ScopeRepresentation>>;
    async fn create_authz_scope(
        &self,
        realm: &str,
        client: &str,
        scope: &ScopeRepresentation,
    ) -> ApiResult<()>;
    async fn delete_authz_scope(&self, realm: &str, client: &str, id: &str) -> ApiResult<()>;

    async fn list_authz_resources(
        &self,
        realm: &str,
        client: &str,
    ) -> ApiResult<Vec<ResourceRepresentation>>;
    async fn create_authz_resource(
        &self,
        realm: &str,
        client: &str,
        resource: &ResourceRepresentation,
    ) -> ApiResult<()>;
    async fn update_authz_resource(
        &self,
        realm: &str,
        client: &str,
        resource: &ResourceRepresentation,
    ) -> ApiResult<()>;
    async fn delete_authz_resource(&self, realm: &str, client: &str, id: &str) -> ApiResult<()>;

    async fn list_authz_policies(
        &self,
        realm: &str,
        client: &str,
        kind: PolicyKind,
    ) -> ApiResult<Vec<PolicyRepresentation>>;
    async fn create_authz_policy(
        &self,
        realm: &str,
        client: &str,
        kind: PolicyKind,
        policy: &PolicyRepresentation,
    ) -> ApiResult<()>;
    async fn update_authz_policy(
        &self,
        realm: &str,
        client: &str,
        kind: PolicyKind,
        policy: &PolicyRepresentation,
    ) -> ApiResult<()>;
    async fn delete_authz_policy(
        &self,
        realm: &str,
        client: &str,
        kind: PolicyKind,
        id: &str,
    ) -> ApiResult<()>;

    // Client scopes

    async fn list_client_scopes(&self, realm: &str) -> ApiResult<Vec<ClientScopeRepresentation>>;
    async fn create_client_scope(
        &self,
        realm: &str,
        scope: &ClientScopeRepresentation,
    ) -> ApiResult<String>;
    async fn update_client_scope(
        &self,
        realm: &str,
        scope: &ClientScopeRepresentation,
    ) -> ApiResult<()>;
    async fn delete_client_scope(&self, realm: &str, id: &str) -> ApiResult<()>;
    async fn list_realm_default_client_scopes(
        &self,
        realm: &str,
    ) -> ApiResult<Vec<ClientScopeRepresentation>>;
    async fn add_realm_default_client_scope(&self, realm: &str, id: &str) -> ApiResult<()>;
    async fn remove_realm_default_client_scope(&self, realm: &str, id: &str) -> ApiResult<()>;

    // Groups

    /// Looks a top-level group up by name.
    async fn find_group(&self, realm: &str, name: &str) -> ApiResult<Option<GroupRepresentation>>;
    /// Looks a group up by its full path, e.g. `/staff/devs`.
    async fn find_group_by_path(
        &self,
        realm: &str,
        path: &str,
    ) -> ApiResult<Option<GroupRepresentation>>;
    async fn create_group(&self, realm: &str, group: &GroupRepresentation) -> ApiResult<String>;
    async fn update_group(&self, realm: &str, group: &GroupRepresentation) -> ApiResult<()>;
    async fn delete_group(&self, realm: &str, id: &str) -> ApiResult<()>;
    async fn get_group_realm_roles(
        &self,
        realm: &str,
        group_id: &str,
    ) -> ApiResult<Vec<RoleRepresentation>>;
    async fn add_group_realm_roles(
        &self,
        realm: &str,
        group_id: &str,
        roles: &[RoleRepresentation],
    ) -> ApiResult<()>;

    // Identity providers

    async fn get_identity_provider(
        &self,
        realm: &str,
        alias: &str,
    ) -> ApiResult<Option<IdentityProviderRepresentation>>;
    async fn create_identity_provider(
        &self,
        realm: &str,
        idp: &IdentityProviderRepresentation,
    ) -> ApiResult<()>;
    async fn update_identity_provider(
        &self,
        realm: &str,
        idp: &IdentityProviderRepresentation,
    ) -> ApiResult<()>;
    async fn delete_identity_provider(&self, realm: &str, alias: &str) -> ApiResult<()>;
    async fn list_identity_provider_mappers(
        &self,
        realm: &str,
        alias: &str,
    ) -> ApiResult<Vec<IdentityProviderMapperRepresentation>>;
    async fn create_identity_provider_mapper(
        &self,
        realm: &str,
        alias: &str,
        mapper: &IdentityProviderMapperRepresentation,
    ) -> ApiResult<()>;
    async fn delete_identity_provider_mapper(
        &self,
        realm: &str,
        alias: &str,
        id: &str,
    ) -> ApiResult<()>;

    // Components

    async fn find_component(
        &self,
        realm: &str,
        name: &str,
    ) -> ApiResult<Option<ComponentRepresentation>>;
    async fn create_component(
        &self,
        realm: &str,
        component: &ComponentRepresentation,
    ) -> ApiResult<()>;
    async fn update_component(
        &self,
        realm: &str,
        component: &ComponentRepresentation,
    ) -> ApiResult<()>;
    async fn delete_component(&self, realm: &str, id: &str) -> ApiResult<()>;

    // Authentication flows

    async fn list_auth_flows(&self, realm: &str)
    -> ApiResult<Vec<AuthenticationFlowRepresentation>>;
    /// Creates a top-level flow and returns its id.
    async fn create_auth_flow(
        &self,
        realm: &str,
        flow: &AuthenticationFlowRepresentation,
    ) -> ApiResult<String>;
    async fn delete_auth_flow(&self, realm: &str, id: &str) -> ApiResult<()>;
    /// Nests a new flow under the flow aliased `parent`.
    async fn add_child_flow(
        &self,
        realm: &str,
        parent: &str,
        child: &ChildFlowRepresentation,
    ) -> ApiResult<()>;
    /// The whole execution tree below the flow aliased `flow`, in order.
    async fn list_flow_executions(
        &self,
        realm: &str,
        flow: &str,
    ) -> ApiResult<Vec<AuthenticationExecutionInfo>>;
    /// Appends an authenticator to `flow`; new executions start disabled.
    /// Returns the execution id.
    async fn add_flow_execution(
        &self,
        realm: &str,
        flow: &str,
        provider: &str,
    ) -> ApiResult<String>;
    /// Updates the requirement of an execution of `flow`.
    async fn update_flow_execution(
        &self,
        realm: &str,
        flow: &str,
        execution: &AuthenticationExecutionInfo,
    ) -> ApiResult<()>;
    /// Deletes an execution; a child flow execution takes its flow with it.
    async fn delete_flow_execution(&self, realm: &str, id: &str) -> ApiResult<()>;
    async fn create_execution_config(
        &self,
        realm: &str,
        execution_id: &str,
        config: &AuthenticatorConfigRepresentation,
    ) -> ApiResult<String>;
    async fn get_authenticator_config(
        &self,
        realm: &str,
        id: &str,
    ) -> ApiResult<Option<AuthenticatorConfigRepresentation>>;
}
