//! In-memory [`KeycloakApi`] for tests.
//!
//! `FakeKeycloak` keeps a small model of the server (realms, roles, clients,
//! scopes, groups, identity providers, components, authorization objects,
//! authentication flows),
//! records every call it receives and can be told to fail a given operation.
//! It mimics the server where the engine depends on it: duplicate creates
//! answer 409, unknown ids answer 404, new realms carry a
//! `default-roles-<realm>` role and clients with authorization services get
//! the default resource, policy and permission.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::api::KeycloakApi;
use crate::error::{ApiError, ApiResult};
use crate::models::{
    AuthenticationExecutionInfo, AuthenticationFlowRepresentation,
    AuthenticatorConfigRepresentation, ChildFlowRepresentation, ClientRepresentation,
    ClientScopeRepresentation, ComponentRepresentation, CredentialRepresentation,
    GroupRepresentation, IdentityProviderMapperRepresentation, IdentityProviderRepresentation, PolicyKind,
    PolicyRepresentation, ProtocolMapperRepresentation, RealmEventsConfig, RealmRepresentation,
    ResourceRepresentation, RoleRepresentation, ScopeRepresentation, UserProfile,
    UserRepresentation,
};

const MUTATING_PREFIXES: [&str; 6] = ["create_", "update_", "delete_", "add_", "remove_", "set_"];

/// One recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiCall {
    pub operation: &'static str,
    pub target: String,
}

impl ApiCall {
    pub fn is_mutating(&self) -> bool {
        MUTATING_PREFIXES
            .iter()
            .any(|p| self.operation.starts_with(p))
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeClient {
    pub rep: ClientRepresentation,
    pub roles: BTreeMap<String, RoleRepresentation>,
    pub mappers: Vec<ProtocolMapperRepresentation>,
    pub default_scopes: BTreeSet<String>,
    pub optional_scopes: BTreeSet<String>,
    pub service_account_user: Option<String>,
    pub authz_scopes: Vec<ScopeRepresentation>,
    pub authz_resources: Vec<ResourceRepresentation>,
    pub policies: Vec<PolicyRepresentation>,
    pub permissions: Vec<PolicyRepresentation>,
}

impl FakeClient {
    fn policies_mut(&mut self, kind: PolicyKind) -> &mut Vec<PolicyRepresentation> {
        match kind {
            PolicyKind::Policy => &mut self.policies,
            PolicyKind::Permission => &mut self.permissions,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeRealm {
    pub rep: RealmRepresentation,
    pub events: RealmEventsConfig,
    pub user_profile: UserProfile,
    pub default_idp: Option<String>,
    pub roles: BTreeMap<String, RoleRepresentation>,
    /// Composite role name to the names of its children.
    pub composites: BTreeMap<String, BTreeSet<String>>,
    /// Users by id.
    pub users: BTreeMap<String, UserRepresentation>,
    pub user_realm_roles: BTreeMap<String, BTreeSet<String>>,
    /// (user id, client id) to client role names.
    pub user_client_roles: BTreeMap<(String, String), BTreeSet<String>>,
    /// User id to group ids.
    pub user_groups: BTreeMap<String, BTreeSet<String>>,
    /// User id to the last credential set.
    pub user_passwords: BTreeMap<String, CredentialRepresentation>,
    /// Clients by server id.
    pub clients: BTreeMap<String, FakeClient>,
    /// Client scopes by id.
    pub client_scopes: BTreeMap<String, ClientScopeRepresentation>,
    pub default_client_scopes: BTreeSet<String>,
    /// Groups by id.
    pub groups: BTreeMap<String, GroupRepresentation>,
    pub group_realm_roles: BTreeMap<String, BTreeSet<String>>,
    pub identity_providers: BTreeMap<String, IdentityProviderRepresentation>,
    pub identity_provider_mappers: BTreeMap<String, Vec<IdentityProviderMapperRepresentation>>,
    /// Components by id.
    pub components: BTreeMap<String, ComponentRepresentation>,
    /// Authentication flows by id.
    pub auth_flows: BTreeMap<String, AuthenticationFlowRepresentation>,
    pub executions: Vec<FakeExecution>,
    /// Authenticator configs by id.
    pub authenticator_configs: BTreeMap<String, AuthenticatorConfigRepresentation>,
}

/// An execution and the id of the flow holding it. Child flow executions
/// point at their flow through `info.flow_id`.
#[derive(Debug, Clone, Default)]
pub struct FakeExecution {
    pub parent_flow: String,
    pub info: AuthenticationExecutionInfo,
}

impl FakeRealm {
    pub fn client_by_client_id(&self, client_id: &str) -> Option<&FakeClient> {
        self.clients.values().find(|c| c.rep.client_id == client_id)
    }

    fn client_mut(&mut self, id: &str) -> ApiResult<&mut FakeClient> {
        self.clients
            .get_mut(id)
            .ok_or_else(|| ApiError::not_found(format!("client {id}")))
    }

    fn user_mut(&mut self, id: &str) -> ApiResult<&mut UserRepresentation> {
        self.users
            .get_mut(id)
            .ok_or_else(|| ApiError::not_found(format!("user {id}")))
    }

    fn roles_named(&self, names: &BTreeSet<String>) -> Vec<RoleRepresentation> {
        names
            .iter()
            .filter_map(|n| self.roles.get(n).cloned())
            .collect()
    }

    pub fn flow_by_alias(&self, alias: &str) -> Option<&AuthenticationFlowRepresentation> {
        self.auth_flows.values().find(|f| f.alias == alias)
    }

    fn flow_id(&self, alias: &str) -> ApiResult<String> {
        self.flow_by_alias(alias)
            .and_then(|f| f.id.clone())
            .ok_or_else(|| ApiError::not_found(format!("flow {alias}")))
    }

    /// Depth-first listing of the executions below `flow_id`.
    fn flatten_executions(&self, flow_id: &str, level: i64, out: &mut Vec<AuthenticationExecutionInfo>) {
        let children = self.executions.iter().filter(|e| e.parent_flow == flow_id);
        for (index, execution) in children.enumerate() {
            let mut info = execution.info.clone();
            info.level = level;
            info.index = index as i64;
            out.push(info);
            if let Some(child) = execution.info.flow_id.as_deref() {
                self.flatten_executions(child, level + 1, out);
            }
        }
    }

    /// Removes an execution with its config and, for a child flow, the
    /// flow and everything below it.
    fn remove_execution(&mut self, id: &str) -> bool {
        let Some(pos) = self
            .executions
            .iter()
            .position(|e| e.info.id.as_deref() == Some(id))
        else {
            return false;
        };
        let removed = self.executions.remove(pos);
        if let Some(config) = &removed.info.authentication_config {
            self.authenticator_configs.remove(config);
        }
        if let Some(flow) = &removed.info.flow_id {
            self.remove_flow(flow);
        }
        true
    }

    fn remove_flow(&mut self, flow_id: &str) {
        self.auth_flows.remove(flow_id);
        let nested: Vec<String> = self
            .executions
            .iter()
            .filter(|e| e.parent_flow == flow_id)
            .filter_map(|e| e.info.id.clone())
            .collect();
        for id in nested {
            self.remove_execution(&id);
        }
    }

    fn require_roles(&self, roles: &[RoleRepresentation]) -> ApiResult<()> {
        match roles.iter().find(|r| !self.roles.contains_key(&r.name)) {
            Some(missing) => Err(ApiError::not_found(format!("role {}", missing.name))),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Default)]
struct FakeState {
    realms: BTreeMap<String, FakeRealm>,
    calls: Vec<ApiCall>,
    failures: BTreeMap<String, u16>,
    next_id: u64,
}

impl FakeState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    fn realm_mut(&mut self, realm: &str) -> ApiResult<&mut FakeRealm> {
        self.realms
            .get_mut(realm)
            .ok_or_else(|| ApiError::not_found(format!("realm {realm}")))
    }

    fn realm(&self, realm: &str) -> ApiResult<&FakeRealm> {
        self.realms
            .get(realm)
            .ok_or_else(|| ApiError::not_found(format!("realm {realm}")))
    }

    fn add_realm(&mut self, name: &str) {
        let id = self.next_id("realm");
        let default_roles = format!("default-roles-{name}");
        let role_id = self.next_id("role");
        let mut realm = FakeRealm {
            rep: RealmRepresentation {
                id: Some(id),
                ..RealmRepresentation::new(name)
            },
            ..Default::default()
        };
        for alias in ["browser", "direct grant"] {
            let flow_id = self.next_id("flow");
            realm.auth_flows.insert(
                flow_id.clone(),
                AuthenticationFlowRepresentation {
                    id: Some(flow_id),
                    alias: alias.to_string(),
                    description: None,
                    provider_id: "basic-flow".to_string(),
                    top_level: true,
                    built_in: true,
                },
            );
        }
        realm.rep.browser_flow = Some("browser".to_string());
        realm.roles.insert(
            default_roles.clone(),
            RoleRepresentation {
                id: Some(role_id),
                composite: true,
                ..RoleRepresentation::named(default_roles)
            },
        );
        self.realms.insert(name.to_string(), realm);
    }
}

/// Recording in-memory Keycloak.
#[derive(Debug, Default)]
pub struct FakeKeycloak {
    state: Mutex<FakeState>,
}

impl FakeKeycloak {
    pub fn new() -> Self {
        Self::default()
    }

    /// A server that already has `realm`.
    pub fn with_realm(realm: &str) -> Self {
        let fake = Self::new();
        fake.lock().add_realm(realm);
        fake
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Records the call and applies injected failures.
    fn begin(
        &self,
        operation: &'static str,
        target: impl Into<String>,
    ) -> ApiResult<MutexGuard<'_, FakeState>> {
        let mut state = self.lock();
        state.calls.push(ApiCall {
            operation,
            target: target.into(),
        });
        if let Some(status) = state.failures.get(operation) {
            return Err(ApiError::status(
                *status,
                format!("injected failure in {operation}"),
            ));
        }
        Ok(state)
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.lock().calls.clone()
    }

    pub fn mutating_calls(&self) -> Vec<ApiCall> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.is_mutating())
            .cloned()
            .collect()
    }

    pub fn operations(&self) -> Vec<&'static str> {
        self.lock().calls.iter().map(|c| c.operation).collect()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Makes every later call of `operation` fail with `status`.
    pub fn fail_on(&self, operation: &str, status: u16) {
        self.lock().failures.insert(operation.to_string(), status);
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    /// Snapshot of a realm's server-side state.
    pub fn realm_state(&self, realm: &str) -> Option<FakeRealm> {
        self.lock().realms.get(realm).cloned()
    }

    /// Seeds a client and returns its server id.
    pub fn seed_client(&self, realm: &str, client: ClientRepresentation) -> Option<String> {
        let mut state = self.lock();
        let id = state.next_id("client");
        let realm = state.realms.get_mut(realm)?;
        realm.clients.insert(
            id.clone(),
            FakeClient {
                rep: ClientRepresentation {
                    id: Some(id.clone()),
                    ..client
                },
                ..Default::default()
            },
        );
        Some(id)
    }

    /// Seeds a client scope and returns its id.
    pub fn seed_client_scope(&self, realm: &str, name: &str) -> Option<String> {
        let mut state = self.lock();
        let id = state.next_id("scope");
        let realm = state.realms.get_mut(realm)?;
        realm.client_scopes.insert(
            id.clone(),
            ClientScopeRepresentation {
                id: Some(id.clone()),
                name: name.to_string(),
                protocol: "openid-connect".to_string(),
                ..Default::default()
            },
        );
        Some(id)
    }

    /// Sets the flow bound as the realm's browser flow.
    pub fn bind_browser_flow(&self, realm: &str, alias: &str) {
        if let Some(realm) = self.lock().realms.get_mut(realm) {
            realm.rep.browser_flow = Some(alias.to_string());
        }
    }

    /// Blanks the id the server reports for a client scope.
    pub fn clear_client_scope_id(&self, realm: &str, name: &str) {
        let mut state = self.lock();
        if let Some(scope) = state
            .realms
            .get_mut(realm)
            .and_then(|r| r.client_scopes.values_mut().find(|s| s.name == name))
        {
            scope.id = None;
        }
    }
}

fn conflict(what: &str, name: &str) -> ApiError {
    ApiError::conflict(format!("{what} with name {name} already exists"))
}

#[async_trait]
impl KeycloakApi for FakeKeycloak {
    async fn get_realm(&self, realm: &str) -> ApiResult<Option<RealmRepresentation>> {
        let state = self.begin("get_realm", realm)?;
        Ok(state.realms.get(realm).map(|r| r.rep.clone()))
    }

    async fn create_realm(&self, realm: &RealmRepresentation) -> ApiResult<()> {
        let mut state = self.begin("create_realm", &realm.realm)?;
        if state.realms.contains_key(&realm.realm) {
            return Err(conflict("realm", &realm.realm));
        }
        state.add_realm(&realm.realm);
        let stored = state.realm_mut(&realm.realm)?;
        let id = stored.rep.id.clone();
        let browser_flow = realm.browser_flow.clone().or(stored.rep.browser_flow.take());
        stored.rep = RealmRepresentation {
            id,
            browser_flow,
            ..realm.clone()
        };
        Ok(())
    }

    async fn update_realm(&self, realm: &RealmRepresentation) -> ApiResult<()> {
        let mut state = self.begin("update_realm", &realm.realm)?;
        let stored = state.realm_mut(&realm.realm)?;
        let id = stored.rep.id.clone();
        stored.rep = RealmRepresentation {
            id,
            ..realm.clone()
        };
        Ok(())
    }

    async fn delete_realm(&self, realm: &str) -> ApiResult<()> {
        let mut state = self.begin("delete_realm", realm)?;
        state
            .realms
            .remove(realm)
            .map(drop)
            .ok_or_else(|| ApiError::not_found(format!("realm {realm}")))
    }

    async fn get_realm_events_config(&self, realm: &str) -> ApiResult<RealmEventsConfig> {
        let state = self.begin("get_realm_events_config", realm)?;
        Ok(state.realm(realm)?.events.clone())
    }

    async fn update_realm_events_config(
        &self,
        realm: &str,
        config: &RealmEventsConfig,
    ) -> ApiResult<()> {
        let mut state = self.begin("update_realm_events_config", realm)?;
        state.realm_mut(realm)?.events = config.clone();
        Ok(())
    }

    async fn get_openid_configuration(&self, realm: &str) -> ApiResult<String> {
        let state = self.begin("get_openid_configuration", realm)?;
        state.realm(realm)?;
        Ok(format!(
            r#"{{"issuer":"https://keycloak.test/realms/{realm}"}}"#
        ))
    }

    async fn get_user_profile(&self, realm: &str) -> ApiResult<UserProfile> {
        let state = self.begin("get_user_profile", realm)?;
        Ok(state.realm(realm)?.user_profile.clone())
    }

    async fn update_user_profile(&self, realm: &str, profile: &UserProfile) -> ApiResult<()> {
        let mut state = self.begin("update_user_profile", realm)?;
        state.realm_mut(realm)?.user_profile = profile.clone();
        Ok(())
    }

    async fn get_default_identity_provider(&self, realm: &str) -> ApiResult<Option<String>> {
        let state = self.begin("get_default_identity_provider", realm)?;
        Ok(state.realm(realm)?.default_idp.clone())
    }

    async fn set_default_identity_provider(&self, realm: &str, alias: &str) -> ApiResult<()> {
        let mut state = self.begin("set_default_identity_provider", realm)?;
        state.realm_mut(realm)?.default_idp = Some(alias.to_string());
        Ok(())
    }

    async fn get_realm_role(
        &self,
        realm: &str,
        name: &str,
    ) -> ApiResult<Option<RoleRepresentation>> {
        let state = self.begin("get_realm_role", name)?;
        Ok(state.realm(realm)?.roles.get(name).cloned())
    }

    async fn create_realm_role(&self, realm: &str, role: &RoleRepresentation) -> ApiResult<()> {
        let mut state = self.begin("create_realm_role", &role.name)?;
        let id = state.next_id("role");
        let stored = state.realm_mut(realm)?;
        if stored.roles.contains_key(&role.name) {
            return Err(conflict("role", &role.name));
        }
        stored.roles.insert(
            role.name.clone(),
            RoleRepresentation {
                id: Some(id),
                ..role.clone()
            },
        );
        Ok(())
    }

    async fn update_realm_role(&self, realm: &str, role: &RoleRepresentation) -> ApiResult<()> {
        let mut state = self.begin("update_realm_role", &role.name)?;
        let stored = state
            .realm_mut(realm)?
            .roles
            .get_mut(&role.name)
            .ok_or_else(|| ApiError::not_found(format!("role {}", role.name)))?;
        let id = stored.id.clone();
        *stored = RoleRepresentation {
            id,
            ..role.clone()
        };
        Ok(())
    }

    async fn delete_realm_role(&self, realm: &str, name: &str) -> ApiResult<()> {
        let mut state = self.begin("delete_realm_role", name)?;
        let stored = state.realm_mut(realm)?;
        stored.composites.remove(name);
        for children in stored.composites.values_mut() {
            children.remove(name);
        }
        stored
            .roles
            .remove(name)
            .map(drop)
            .ok_or_else(|| ApiError::not_found(format!("role {name}")))
    }

    async fn get_realm_role_composites(
        &self,
        realm: &str,
        name: &str,
    ) -> ApiResult<Vec<RoleRepresentation>> {
        let state = self.begin("get_realm_role_composites", name)?;
        let stored = state.realm(realm)?;
        if !stored.roles.contains_key(name) {
            return Err(ApiError::not_found(format!("role {name}")));
        }
        Ok(stored
            .composites
            .get(name)
            .map(|c| stored.roles_named(c))
            .unwrap_or_default())
    }

    async fn add_realm_role_composites(
        &self,
        realm: &str,
        name: &str,
        roles: &[RoleRepresentation],
    ) -> ApiResult<()> {
        let mut state = self.begin("add_realm_role_composites", name)?;
        let stored = state.realm_mut(realm)?;
        stored.require_roles(roles)?;
        let parent = stored
            .roles
            .get_mut(name)
            .ok_or_else(|| ApiError::not_found(format!("role {name}")))?;
        parent.composite = true;
        stored
            .composites
            .entry(name.to_string())
            .or_default()
            .extend(roles.iter().map(|r| r.name.clone()));
        Ok(())
    }

    async fn remove_realm_role_composites(
        &self,
        realm: &str,
        name: &str,
        roles: &[RoleRepresentation],
    ) -> ApiResult<()> {
        let mut state = self.begin("remove_realm_role_composites", name)?;
        let stored = state.realm_mut(realm)?;
        if let Some(children) = stored.composites.get_mut(name) {
            for role in roles {
                children.remove(&role.name);
            }
        }
        Ok(())
    }

    async fn find_user(
        &self,
        realm: &str,
        username: &str,
    ) -> ApiResult<Option<UserRepresentation>> {
        let state = self.begin("find_user", username)?;
        Ok(state
            .realm(realm)?
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn create_user(&self, realm: &str, user: &UserRepresentation) -> ApiResult<String> {
        let mut state = self.begin("create_user", &user.username)?;
        let id = state.next_id("user");
        let stored = state.realm_mut(realm)?;
        if stored.users.values().any(|u| u.username == user.username) {
            return Err(conflict("user", &user.username));
        }
        stored.users.insert(
            id.clone(),
            UserRepresentation {
                id: Some(id.clone()),
                ..user.clone()
            },
        );
        Ok(id)
    }

    async fn update_user(&self, realm: &str, user: &UserRepresentation) -> ApiResult<()> {
        let mut state = self.begin("update_user", &user.username)?;
        let id = user
            .id
            .clone()
            .ok_or_else(|| ApiError::unexpected("user has no id"))?;
        let stored = state.realm_mut(realm)?.user_mut(&id)?;
        *stored = user.clone();
        Ok(())
    }

    async fn delete_user(&self, realm: &str, user_id: &str) -> ApiResult<()> {
        let mut state = self.begin("delete_user", user_id)?;
        let stored = state.realm_mut(realm)?;
        stored.user_realm_roles.remove(user_id);
        stored.user_groups.remove(user_id);
        stored.user_passwords.remove(user_id);
        stored
            .users
            .remove(user_id)
            .map(drop)
            .ok_or_else(|| ApiError::not_found(format!("user {user_id}")))
    }

    async fn reset_user_password(
        &self,
        realm: &str,
        user_id: &str,
        credential: &CredentialRepresentation,
    ) -> ApiResult<()> {
        let mut state = self.begin("reset_user_password", user_id)?;
        let stored = state.realm_mut(realm)?;
        stored.user_mut(user_id)?;
        stored
            .user_passwords
            .insert(user_id.to_string(), credential.clone());
        Ok(())
    }

    async fn get_user_groups(
        &self,
        realm: &str,
        user_id: &str,
    ) -> ApiResult<Vec<GroupRepresentation>> {
        let state = self.begin("get_user_groups", user_id)?;
        let stored = state.realm(realm)?;
        if !stored.users.contains_key(user_id) {
            return Err(ApiError::not_found(format!("user {user_id}")));
        }
        Ok(stored
            .user_groups
            .get(user_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| stored.groups.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn add_user_to_group(
        &self,
        realm: &str,
        user_id: &str,
        group_id: &str,
    ) -> ApiResult<()> {
        let mut state = self.begin("add_user_to_group", group_id)?;
        let stored = state.realm_mut(realm)?;
        stored.user_mut(user_id)?;
        if !stored.groups.contains_key(group_id) {
            return Err(ApiError::not_found(format!("group {group_id}")));
        }
        stored
            .user_groups
            .entry(user_id.to_string())
            .or_default()
            .insert(group_id.to_string());
        Ok(())
    }

    async fn remove_user_from_group(
        &self,
        realm: &str,
        user_id: &str,
        group_id: &str,
    ) -> ApiResult<()> {
        let mut state = self.begin("remove_user_from_group", group_id)?;
        if let Some(groups) = state.realm_mut(realm)?.user_groups.get_mut(user_id) {
            groups.remove(group_id);
        }
        Ok(())
    }

    async fn get_user_realm_roles(
        &self,
        realm: &str,
        user_id: &str,
    ) -> ApiResult<Vec<RoleRepresentation>> {
        let state = self.begin("get_user_realm_roles", user_id)?;
        let stored = state.realm(realm)?;
        Ok(stored
            .user_realm_roles
            .get(user_id)
            .map(|names| stored.roles_named(names))
            .unwrap_or_default())
    }

    async fn add_user_realm_roles(
        &self,
        realm: &str,
        user_id: &str,
        roles: &[RoleRepresentation],
    ) -> ApiResult<()> {
        let mut state = self.begin("add_user_realm_roles", user_id)?;
        let stored = state.realm_mut(realm)?;
        stored.require_roles(roles)?;
        stored.user_mut(user_id)?;
        stored
            .user_realm_roles
            .entry(user_id.to_string())
            .or_default()
            .extend(roles.iter().map(|r| r.name.clone()));
        Ok(())
    }

    async fn remove_user_realm_roles(
        &self,
        realm: &str,
        user_id: &str,
        roles: &[RoleRepresentation],
    ) -> ApiResult<()> {
        let mut state = self.begin("remove_user_realm_roles", user_id)?;
        if let Some(names) = state.realm_mut(realm)?.user_realm_roles.get_mut(user_id) {
            for role in roles {
                names.remove(&role.name);
            }
        }
        Ok(())
    }

    async fn get_user_client_roles(
        &self,
        realm: &str,
        user_id: &str,
        client: &str,
    ) -> ApiResult<Vec<RoleRepresentation>> {
        let state = self.begin("get_user_client_roles", user_id)?;
        let stored = state.realm(realm)?;
        let Some(fake_client) = stored.clients.get(client) else {
            return Err(ApiError::not_found(format!("client {client}")));
        };
        Ok(stored
            .user_client_roles
            .get(&(user_id.to_string(), client.to_string()))
            .map(|names| {
                names
                    .iter()
                    .filter_map(|n| fake_client.roles.get(n).cloned())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn add_user_client_roles(
        &self,
        realm: &str,
        user_id: &str,
        client: &str,
        roles: &[RoleRepresentation],
    ) -> ApiResult<()> {
        let mut state = self.begin("add_user_client_roles", user_id)?;
        let stored = state.realm_mut(realm)?;
        let fake_client = stored.client_mut(client)?;
        if let Some(missing) = roles.iter().find(|r| !fake_client.roles.contains_key(&r.name)) {
            return Err(ApiError::not_found(format!("client role {}", missing.name)));
        }
        stored
            .user_client_roles
            .entry((user_id.to_string(), client.to_string()))
            .or_default()
            .extend(roles.iter().map(|r| r.name.clone()));
        Ok(())
    }

    async fn remove_user_client_roles(
        &self,
        realm: &str,
        user_id: &str,
        client: &str,
        roles: &[RoleRepresentation],
    ) -> ApiResult<()> {
        let mut state = self.begin("remove_user_client_roles", user_id)?;
        if let Some(names) = state
            .realm_mut(realm)?
            .user_client_roles
            .get_mut(&(user_id.to_string(), client.to_string()))
        {
            for role in roles {
                names.remove(&role.name);
            }
        }
        Ok(())
    }

    async fn get_client(
        &self,
        realm: &str,
        client_id: &str,
    ) -> ApiResult<Option<ClientRepresentation>> {
        let state = self.begin("get_client", client_id)?;
        Ok(state
            .realm(realm)?
            .client_by_client_id(client_id)
            .map(|c| c.rep.clone()))
    }

    async fn create_client(
        &self,
        realm: &str,
        client: &ClientRepresentation,
    ) -> ApiResult<String> {
        let mut state = self.begin("create_client", &client.client_id)?;
        let id = state.next_id("client");
        let sa_user = state.next_id("user");
        let stored = state.realm_mut(realm)?;
        if stored.client_by_client_id(&client.client_id).is_some() {
            return Err(conflict("client", &client.client_id));
        }

        let mut fake_client = FakeClient {
            rep: ClientRepresentation {
                id: Some(id.clone()),
                ..client.clone()
            },
            ..Default::default()
        };
        if client.service_accounts_enabled {
            stored.users.insert(
                sa_user.clone(),
                UserRepresentation {
                    id: Some(sa_user.clone()),
                    username: format!("service-account-{}", client.client_id),
                    enabled: true,
                    ..Default::default()
                },
            );
            fake_client.service_account_user = Some(sa_user);
        }
        if client.authorization_services_enabled {
            fake_client.authz_resources.push(ResourceRepresentation {
                id: Some(format!("{id}-default-resource")),
                name: "Default Resource".to_string(),
                ..Default::default()
            });
            fake_client.policies.push(PolicyRepresentation {
                id: Some(format!("{id}-default-policy")),
                name: "Default Policy".to_string(),
                policy_type: "js".to_string(),
                ..Default::default()
            });
            fake_client.permissions.push(PolicyRepresentation {
                id: Some(format!("{id}-default-permission")),
                name: "Default Permission".to_string(),
                policy_type: "resource".to_string(),
                ..Default::default()
            });
        }
        stored.clients.insert(id.clone(), fake_client);
        Ok(id)
    }

    async fn update_client(&self, realm: &str, client: &ClientRepresentation) -> ApiResult<()> {
        let mut state = self.begin("update_client", &client.client_id)?;
        let id = client
            .id
            .clone()
            .ok_or_else(|| ApiError::unexpected("client has no id"))?;
        state.realm_mut(realm)?.client_mut(&id)?.rep = client.clone();
        Ok(())
    }

    async fn delete_client(&self, realm: &str, client: &str) -> ApiResult<()> {
        let mut state = self.begin("delete_client", client)?;
        state
            .realm_mut(realm)?
            .clients
            .remove(client)
            .map(drop)
            .ok_or_else(|| ApiError::not_found(format!("client {client}")))
    }

    async fn list_client_roles(
        &self,
        realm: &str,
        client: &str,
    ) -> ApiResult<Vec<RoleRepresentation>> {
        let mut state = self.begin("list_client_roles", client)?;
        Ok(state
            .realm_mut(realm)?
            .client_mut(client)?
            .roles
            .values()
            .cloned()
            .collect())
    }

    async fn create_client_role(
        &self,
        realm: &str,
        client: &str,
        role: &RoleRepresentation,
    ) -> ApiResult<()> {
        let mut state = self.begin("create_client_role", &role.name)?;
        let id = state.next_id("role");
        let fake_client = state.realm_mut(realm)?.client_mut(client)?;
        if fake_client.roles.contains_key(&role.name) {
            return Err(conflict("client role", &role.name));
        }
        fake_client.roles.insert(
            role.name.clone(),
            RoleRepresentation {
                id: Some(id),
                client_role: true,
                ..role.clone()
            },
        );
        Ok(())
    }

    async fn delete_client_role(&self, realm: &str, client: &str, name: &str) -> ApiResult<()> {
        let mut state = self.begin("delete_client_role", name)?;
        state
            .realm_mut(realm)?
            .client_mut(client)?
            .roles
            .remove(name)
            .map(drop)
            .ok_or_else(|| ApiError::not_found(format!("client role {name}")))
    }

    async fn list_protocol_mappers(
        &self,
        realm: &str,
        client: &str,
    ) -> ApiResult<Vec<ProtocolMapperRepresentation>> {
        let mut state = self.begin("list_protocol_mappers", client)?;
        Ok(state.realm_mut(realm)?.client_mut(client)?.mappers.clone())
    }

    async fn create_protocol_mapper(
        &self,
        realm: &str,
        client: &str,
        mapper: &ProtocolMapperRepresentation,
    ) -> ApiResult<()> {
        let mut state = self.begin("create_protocol_mapper", &mapper.name)?;
        let id = state.next_id("mapper");
        let fake_client = state.realm_mut(realm)?.client_mut(client)?;
        if fake_client.mappers.iter().any(|m| m.name == mapper.name) {
            return Err(conflict("protocol mapper", &mapper.name));
        }
        fake_client.mappers.push(ProtocolMapperRepresentation {
            id: Some(id),
            ..mapper.clone()
        });
        Ok(())
    }

    async fn update_protocol_mapper(
        &self,
        realm: &str,
        client: &str,
        mapper: &ProtocolMapperRepresentation,
    ) -> ApiResult<()> {
        let mut state = self.begin("update_protocol_mapper", &mapper.name)?;
        let fake_client = state.realm_mut(realm)?.client_mut(client)?;
        let stored = fake_client
            .mappers
            .iter_mut()
            .find(|m| m.id.is_some() && m.id == mapper.id)
            .ok_or_else(|| ApiError::not_found(format!("protocol mapper {}", mapper.name)))?;
        *stored = mapper.clone();
        Ok(())
    }

    async fn delete_protocol_mapper(&self, realm: &str, client: &str, id: &str) -> ApiResult<()> {
        let mut state = self.begin("delete_protocol_mapper", id)?;
        let fake_client = state.realm_mut(realm)?.client_mut(client)?;
        let before = fake_client.mappers.len();
        fake_client.mappers.retain(|m| m.id.as_deref() != Some(id));
        if fake_client.mappers.len() == before {
            return Err(ApiError::not_found(format!("protocol mapper {id}")));
        }
        Ok(())
    }

    async fn list_client_default_scopes(
        &self,
        realm: &str,
        client: &str,
    ) -> ApiResult<Vec<ClientScopeRepresentation>> {
        let state = self.begin("list_client_default_scopes", client)?;
        let stored = state.realm(realm)?;
        let fake_client = stored
            .clients
            .get(client)
            .ok_or_else(|| ApiError::not_found(format!("client {client}")))?;
        Ok(fake_client
            .default_scopes
            .iter()
            .filter_map(|id| stored.client_scopes.get(id).cloned())
            .collect())
    }

    async fn add_client_default_scope(
        &self,
        realm: &str,
        client: &str,
        scope_id: &str,
    ) -> ApiResult<()> {
        let mut state = self.begin("add_client_default_scope", scope_id)?;
        let stored = state.realm_mut(realm)?;
        if !stored.client_scopes.contains_key(scope_id) {
            return Err(ApiError::not_found(format!("client scope {scope_id}")));
        }
        stored
            .client_mut(client)?
            .default_scopes
            .insert(scope_id.to_string());
        Ok(())
    }

    async fn list_client_optional_scopes(
        &self,
        realm: &str,
        client: &str,
    ) -> ApiResult<Vec<ClientScopeRepresentation>> {
        let state = self.begin("list_client_optional_scopes", client)?;
        let stored = state.realm(realm)?;
        let fake_client = stored
            .clients
            .get(client)
            .ok_or_else(|| ApiError::not_found(format!("client {client}")))?;
        Ok(fake_client
            .optional_scopes
            .iter()
            .filter_map(|id| stored.client_scopes.get(id).cloned())
            .collect())
    }

    async fn add_client_optional_scope(
        &self,
        realm: &str,
        client: &str,
        scope_id: &str,
    ) -> ApiResult<()> {
        let mut state = self.begin("add_client_optional_scope", scope_id)?;
        let stored = state.realm_mut(realm)?;
        if !stored.client_scopes.contains_key(scope_id) {
            return Err(ApiError::not_found(format!("client scope {scope_id}")));
        }
        stored
            .client_mut(client)?
            .optional_scopes
            .insert(scope_id.to_string());
        Ok(())
    }

    async fn get_service_account_user(
        &self,
        realm: &str,
        client: &str,
    ) -> ApiResult<UserRepresentation> {
        let mut state = self.begin("get_service_account_user", client)?;
        let stored = state.realm_mut(realm)?;
        let user_id = stored
            .client_mut(client)?
            .service_account_user
            .clone()
            .ok_or_else(|| ApiError::not_found(format!("service account of client {client}")))?;
        stored.user_mut(&user_id).map(|u| u.clone())
    }

    async fn list_authz_scopes(
        &self,
        realm: &str,
        client: &str,
    ) -> ApiResult<Vec<ScopeRepresentation>> {
        let mut state = self.begin("list_authz_scopes", client)?;
        Ok(state
            .realm_mut(realm)?
            .client_mut(client)?
            .authz_scopes
            .clone())
    }

    async fn create_authz_scope(
        &self,
        realm: &str,
        client: &str,
        scope: &ScopeRepresentation,
    ) -> ApiResult<()> {
        let mut state = self.begin("create_authz_scope", &scope.name)?;
        let id = state.next_id("authz-scope");
        let fake_client = state.realm_mut(realm)?.client_mut(client)?;
        if fake_client.authz_scopes.iter().any(|s| s.name == scope.name) {
            return Err(conflict("scope", &scope.name));
        }
        fake_client.authz_scopes.push(ScopeRepresentation {
            id: Some(id),
            name: scope.name.clone(),
        });
        Ok(())
    }

    async fn delete_authz_scope(&self, realm: &str, client: &str, id: &str) -> ApiResult<()> {
        let mut state = self.begin("delete_authz_scope", id)?;
        let fake_client = state.realm_mut(realm)?.client_mut(client)?;
        let before = fake_client.authz_scopes.len();
        fake_client
            .authz_scopes
            .retain(|s| s.id.as_deref() != Some(id));
        if fake_client.authz_scopes.len() == before {
            return Err(ApiError::not_found(format!("scope {id}")));
        }
        Ok(())
    }

    async fn list_authz_resources(
        &self,
        realm: &str,
        client: &str,
    ) -> ApiResult<Vec<ResourceRepresentation>> {
        let mut state = self.begin("list_authz_resources", client)?;
        Ok(state
            .realm_mut(realm)?
            .client_mut(client)?
            .authz_resources
            .clone())
    }

    async fn create_authz_resource(
        &self,
        realm: &str,
        client: &str,
        resource: &ResourceRepresentation,
    ) -> ApiResult<()> {
        let mut state = self.begin("create_authz_resource", &resource.name)?;
        let id = state.next_id("resource");
        let fake_client = state.realm_mut(realm)?.client_mut(client)?;
        if fake_client
            .authz_resources
            .iter()
            .any(|r| r.name == resource.name)
        {
            return Err(conflict("resource", &resource.name));
        }
        fake_client.authz_resources.push(ResourceRepresentation {
            id: Some(id),
            ..resource.clone()
        });
        Ok(())
    }

    async fn update_authz_resource(
        &self,
        realm: &str,
        client: &str,
        resource: &ResourceRepresentation,
    ) -> ApiResult<()> {
        let mut state = self.begin("update_authz_resource", &resource.name)?;
        let fake_client = state.realm_mut(realm)?.client_mut(client)?;
        let stored = fake_client
            .authz_resources
            .iter_mut()
            .find(|r| r.id.is_some() && r.id == resource.id)
            .ok_or_else(|| ApiError::not_found(format!("resource {}", resource.name)))?;
        *stored = resource.clone();
        Ok(())
    }

    async fn delete_authz_resource(&self, realm: &str, client: &str, id: &str) -> ApiResult<()> {
        let mut state = self.begin("delete_authz_resource", id)?;
        let fake_client = state.realm_mut(realm)?.client_mut(client)?;
        let before = fake_client.authz_resources.len();
        fake_client
            .authz_resources
            .retain(|r| r.id.as_deref() != Some(id));
        if fake_client.authz_resources.len() == before {
            return Err(ApiError::not_found(format!("resource {id}")));
        }
        Ok(())
    }

    async fn list_authz_policies(
        &self,
        realm: &str,
        client: &str,
        kind: PolicyKind,
    ) -> ApiResult<Vec<PolicyRepresentation>> {
        let mut state = self.begin("list_authz_policies", format!("{client}/{kind}"))?;
        Ok(state
            .realm_mut(realm)?
            .client_mut(client)?
            .policies_mut(kind)
            .clone())
    }

    async fn create_authz_policy(
        &self,
        realm: &str,
        client: &str,
        kind: PolicyKind,
        policy: &PolicyRepresentation,
    ) -> ApiResult<()> {
        let mut state = self.begin("create_authz_policy", &policy.name)?;
        let id = state.next_id(kind.as_str());
        let policies = state
            .realm_mut(realm)?
            .client_mut(client)?
            .policies_mut(kind);
        if policies.iter().any(|p| p.name == policy.name) {
            return Err(conflict(kind.as_str(), &policy.name));
        }
        policies.push(PolicyRepresentation {
            id: Some(id),
            ..policy.clone()
        });
        Ok(())
    }

    async fn update_authz_policy(
        &self,
        realm: &str,
        client: &str,
        kind: PolicyKind,
        policy: &PolicyRepresentation,
    ) -> ApiResult<()> {
        let mut state = self.begin("update_authz_policy", &policy.name)?;
        let stored = state
            .realm_mut(realm)?
            .client_mut(client)?
            .policies_mut(kind)
            .iter_mut()
            .find(|p| p.id.is_some() && p.id == policy.id)
            .ok_or_else(|| ApiError::not_found(format!("{kind} {}", policy.name)))?;
        *stored = policy.clone();
        Ok(())
    }

    async fn delete_authz_policy(
        &self,
        realm: &str,
        client: &str,
        kind: PolicyKind,
        id: &str,
    ) -> ApiResult<()> {
        let mut state = self.begin("delete_authz_policy", id)?;
        let policies = state
            .realm_mut(realm)?
            .client_mut(client)?
            .policies_mut(kind);
        let before = policies.len();
        policies.retain(|p| p.id.as_deref() != Some(id));
        if policies.len() == before {
            return Err(ApiError::not_found(format!("{kind} {id}")));
        }
        Ok(())
    }

    async fn list_client_scopes(&self, realm: &str) -> ApiResult<Vec<ClientScopeRepresentation>> {
        let state = self.begin("list_client_scopes", realm)?;
        Ok(state.realm(realm)?.client_scopes.values().cloned().collect())
    }

    async fn create_client_scope(
        &self,
        realm: &str,
        scope: &ClientScopeRepresentation,
    ) -> ApiResult<String> {
        let mut state = self.begin("create_client_scope", &scope.name)?;
        let id = state.next_id("scope");
        let stored = state.realm_mut(realm)?;
        if stored.client_scopes.values().any(|s| s.name == scope.name) {
            return Err(conflict("client scope", &scope.name));
        }
        stored.client_scopes.insert(
            id.clone(),
            ClientScopeRepresentation {
                id: Some(id.clone()),
                ..scope.clone()
            },
        );
        Ok(id)
    }

    async fn update_client_scope(
        &self,
        realm: &str,
        scope: &ClientScopeRepresentation,
    ) -> ApiResult<()> {
        let mut state = self.begin("update_client_scope", &scope.name)?;
        let id = scope.id.clone().unwrap_or_default();
        let stored = state
            .realm_mut(realm)?
            .client_scopes
            .get_mut(&id)
            .ok_or_else(|| ApiError::not_found(format!("client scope {}", scope.name)))?;
        *stored = scope.clone();
        Ok(())
    }

    async fn delete_client_scope(&self, realm: &str, id: &str) -> ApiResult<()> {
        let mut state = self.begin("delete_client_scope", id)?;
        let stored = state.realm_mut(realm)?;
        stored.default_client_scopes.remove(id);
        stored
            .client_scopes
            .remove(id)
            .map(drop)
            .ok_or_else(|| ApiError::not_found(format!("client scope {id}")))
    }

    async fn list_realm_default_client_scopes(
        &self,
        realm: &str,
    ) -> ApiResult<Vec<ClientScopeRepresentation>> {
        let state = self.begin("list_realm_default_client_scopes", realm)?;
        let stored = state.realm(realm)?;
        Ok(stored
            .default_client_scopes
            .iter()
            .filter_map(|id| stored.client_scopes.get(id).cloned())
            .collect())
    }

    async fn add_realm_default_client_scope(&self, realm: &str, id: &str) -> ApiResult<()> {
        let mut state = self.begin("add_realm_default_client_scope", id)?;
        let stored = state.realm_mut(realm)?;
        if !stored.client_scopes.contains_key(id) {
            return Err(ApiError::not_found(format!("client scope {id}")));
        }
        stored.default_client_scopes.insert(id.to_string());
        Ok(())
    }

    async fn remove_realm_default_client_scope(&self, realm: &str, id: &str) -> ApiResult<()> {
        let mut state = self.begin("remove_realm_default_client_scope", id)?;
        state.realm_mut(realm)?.default_client_scopes.remove(id);
        Ok(())
    }

    async fn find_group(&self, realm: &str, name: &str) -> ApiResult<Option<GroupRepresentation>> {
        let state = self.begin("find_group", name)?;
        Ok(state
            .realm(realm)?
            .groups
            .values()
            .find(|g| g.name == name)
            .cloned())
    }

    async fn find_group_by_path(
        &self,
        realm: &str,
        path: &str,
    ) -> ApiResult<Option<GroupRepresentation>> {
        let state = self.begin("find_group_by_path", path)?;
        Ok(state
            .realm(realm)?
            .groups
            .values()
            .find(|g| g.path.as_deref() == Some(path))
            .cloned())
    }

    async fn create_group(&self, realm: &str, group: &GroupRepresentation) -> ApiResult<String> {
        let mut state = self.begin("create_group", &group.name)?;
        let id = state.next_id("group");
        let stored = state.realm_mut(realm)?;
        if stored.groups.values().any(|g| g.name == group.name) {
            return Err(conflict("group", &group.name));
        }
        stored.groups.insert(
            id.clone(),
            GroupRepresentation {
                id: Some(id.clone()),
                path: Some(format!("/{}", group.name)),
                ..group.clone()
            },
        );
        Ok(id)
    }

    async fn update_group(&self, realm: &str, group: &GroupRepresentation) -> ApiResult<()> {
        let mut state = self.begin("update_group", &group.name)?;
        let id = group.id.clone().unwrap_or_default();
        let stored = state
            .realm_mut(realm)?
            .groups
            .get_mut(&id)
            .ok_or_else(|| ApiError::not_found(format!("group {}", group.name)))?;
        *stored = group.clone();
        Ok(())
    }

    async fn delete_group(&self, realm: &str, id: &str) -> ApiResult<()> {
        let mut state = self.begin("delete_group", id)?;
        let stored = state.realm_mut(realm)?;
        stored.group_realm_roles.remove(id);
        stored
            .groups
            .remove(id)
            .map(drop)
            .ok_or_else(|| ApiError::not_found(format!("group {id}")))
    }

    async fn get_group_realm_roles(
        &self,
        realm: &str,
        group_id: &str,
    ) -> ApiResult<Vec<RoleRepresentation>> {
        let state = self.begin("get_group_realm_roles", group_id)?;
        let stored = state.realm(realm)?;
        Ok(stored
            .group_realm_roles
            .get(group_id)
            .map(|names| stored.roles_named(names))
            .unwrap_or_default())
    }

    async fn add_group_realm_roles(
        &self,
        realm: &str,
        group_id: &str,
        roles: &[RoleRepresentation],
    ) -> ApiResult<()> {
        let mut state = self.begin("add_group_realm_roles", group_id)?;
        let stored = state.realm_mut(realm)?;
        stored.require_roles(roles)?;
        if !stored.groups.contains_key(group_id) {
            return Err(ApiError::not_found(format!("group {group_id}")));
        }
        stored
            .group_realm_roles
            .entry(group_id.to_string())
            .or_default()
            .extend(roles.iter().map(|r| r.name.clone()));
        Ok(())
    }

    async fn get_identity_provider(
        &self,
        realm: &str,
        alias: &str,
    ) -> ApiResult<Option<IdentityProviderRepresentation>> {
        let state = self.begin("get_identity_provider", alias)?;
        Ok(state.realm(realm)?.identity_providers.get(alias).cloned())
    }

    async fn create_identity_provider(
        &self,
        realm: &str,
        idp: &IdentityProviderRepresentation,
    ) -> ApiResult<()> {
        let mut state = self.begin("create_identity_provider", &idp.alias)?;
        let id = state.next_id("idp");
        let stored = state.realm_mut(realm)?;
        if stored.identity_providers.contains_key(&idp.alias) {
            return Err(conflict("identity provider", &idp.alias));
        }
        stored.identity_providers.insert(
            idp.alias.clone(),
            IdentityProviderRepresentation {
                internal_id: Some(id),
                ..idp.clone()
            },
        );
        Ok(())
    }

    async fn update_identity_provider(
        &self,
        realm: &str,
        idp: &IdentityProviderRepresentation,
    ) -> ApiResult<()> {
        let mut state = self.begin("update_identity_provider", &idp.alias)?;
        let stored = state
            .realm_mut(realm)?
            .identity_providers
            .get_mut(&idp.alias)
            .ok_or_else(|| ApiError::not_found(format!("identity provider {}", idp.alias)))?;
        let internal_id = stored.internal_id.clone();
        *stored = IdentityProviderRepresentation {
            internal_id,
            ..idp.clone()
        };
        Ok(())
    }

    async fn delete_identity_provider(&self, realm: &str, alias: &str) -> ApiResult<()> {
        let mut state = self.begin("delete_identity_provider", alias)?;
        let stored = state.realm_mut(realm)?;
        stored.identity_provider_mappers.remove(alias);
        stored
            .identity_providers
            .remove(alias)
            .map(drop)
            .ok_or_else(|| ApiError::not_found(format!("identity provider {alias}")))
    }

    async fn list_identity_provider_mappers(
        &self,
        realm: &str,
        alias: &str,
    ) -> ApiResult<Vec<IdentityProviderMapperRepresentation>> {
        let state = self.begin("list_identity_provider_mappers", alias)?;
        let stored = state.realm(realm)?;
        if !stored.identity_providers.contains_key(alias) {
            return Err(ApiError::not_found(format!("identity provider {alias}")));
        }
        Ok(stored
            .identity_provider_mappers
            .get(alias)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_identity_provider_mapper(
        &self,
        realm: &str,
        alias: &str,
        mapper: &IdentityProviderMapperRepresentation,
    ) -> ApiResult<()> {
        let mut state = self.begin("create_identity_provider_mapper", &mapper.name)?;
        let id = state.next_id("idp-mapper");
        let stored = state.realm_mut(realm)?;
        if !stored.identity_providers.contains_key(alias) {
            return Err(ApiError::not_found(format!("identity provider {alias}")));
        }
        stored
            .identity_provider_mappers
            .entry(alias.to_string())
            .or_default()
            .push(IdentityProviderMapperRepresentation {
                id: Some(id),
                ..mapper.clone()
            });
        Ok(())
    }

    async fn delete_identity_provider_mapper(
        &self,
        realm: &str,
        alias: &str,
        id: &str,
    ) -> ApiResult<()> {
        let mut state = self.begin("delete_identity_provider_mapper", id)?;
        let mappers = state
            .realm_mut(realm)?
            .identity_provider_mappers
            .entry(alias.to_string())
            .or_default();
        let before = mappers.len();
        mappers.retain(|m| m.id.as_deref() != Some(id));
        if mappers.len() == before {
            return Err(ApiError::not_found(format!("mapper {id}")));
        }
        Ok(())
    }

    async fn find_component(
        &self,
        realm: &str,
        name: &str,
    ) -> ApiResult<Option<ComponentRepresentation>> {
        let state = self.begin("find_component", name)?;
        Ok(state
            .realm(realm)?
            .components
            .values()
            .find(|c| c.name == name)
            .cloned())
    }

    async fn create_component(
        &self,
        realm: &str,
        component: &ComponentRepresentation,
    ) -> ApiResult<()> {
        let mut state = self.begin("create_component", &component.name)?;
        let id = state.next_id("component");
        let stored = state.realm_mut(realm)?;
        if stored.components.values().any(|c| c.name == component.name) {
            return Err(conflict("component", &component.name));
        }
        stored.components.insert(
            id.clone(),
            ComponentRepresentation {
                id: Some(id),
                ..component.clone()
            },
        );
        Ok(())
    }

    async fn update_component(
        &self,
        realm: &str,
        component: &ComponentRepresentation,
    ) -> ApiResult<()> {
        let mut state = self.begin("update_component", &component.name)?;
        let id = component.id.clone().unwrap_or_default();
        let stored = state
            .realm_mut(realm)?
            .components
            .get_mut(&id)
            .ok_or_else(|| ApiError::not_found(format!("component {}", component.name)))?;
        *stored = component.clone();
        Ok(())
    }

    async fn delete_component(&self, realm: &str, id: &str) -> ApiResult<()> {
        let mut state = self.begin("delete_component", id)?;
        state
            .realm_mut(realm)?
            .components
            .remove(id)
            .map(drop)
            .ok_or_else(|| ApiError::not_found(format!("component {id}")))
    }

    async fn list_auth_flows(
        &self,
        realm: &str,
    ) -> ApiResult<Vec<AuthenticationFlowRepresentation>> {
        let state = self.begin("list_auth_flows", realm)?;
        Ok(state
            .realm(realm)?
            .auth_flows
            .values()
            .filter(|f| f.top_level)
            .cloned()
            .collect())
    }

    async fn create_auth_flow(
        &self,
        realm: &str,
        flow: &AuthenticationFlowRepresentation,
    ) -> ApiResult<String> {
        let mut state = self.begin("create_auth_flow", &flow.alias)?;
        let id = state.next_id("flow");
        let stored = state.realm_mut(realm)?;
        if stored.flow_by_alias(&flow.alias).is_some() {
            return Err(conflict("flow", &flow.alias));
        }
        stored.auth_flows.insert(
            id.clone(),
            AuthenticationFlowRepresentation {
                id: Some(id.clone()),
                ..flow.clone()
            },
        );
        Ok(id)
    }

    async fn delete_auth_flow(&self, realm: &str, id: &str) -> ApiResult<()> {
        let mut state = self.begin("delete_auth_flow", id)?;
        let stored = state.realm_mut(realm)?;
        let flow = stored
            .auth_flows
            .get(id)
            .ok_or_else(|| ApiError::not_found(format!("flow {id}")))?;
        if stored.rep.browser_flow.as_deref() == Some(flow.alias.as_str()) {
            return Err(ApiError::status(
                400,
                format!("Cannot delete flow {}, it is bound to the realm", flow.alias),
            ));
        }
        stored.remove_flow(id);
        Ok(())
    }

    async fn add_child_flow(
        &self,
        realm: &str,
        parent: &str,
        child: &ChildFlowRepresentation,
    ) -> ApiResult<()> {
        let mut state = self.begin("add_child_flow", &child.alias)?;
        let flow_id = state.next_id("flow");
        let execution_id = state.next_id("execution");
        let stored = state.realm_mut(realm)?;
        let parent_id = stored.flow_id(parent)?;
        if stored.flow_by_alias(&child.alias).is_some() {
            return Err(conflict("flow", &child.alias));
        }
        stored.auth_flows.insert(
            flow_id.clone(),
            AuthenticationFlowRepresentation {
                id: Some(flow_id.clone()),
                alias: child.alias.clone(),
                description: Some(child.description.clone()),
                provider_id: child.flow_type.clone(),
                top_level: false,
                built_in: false,
            },
        );
        stored.executions.push(FakeExecution {
            parent_flow: parent_id,
            info: AuthenticationExecutionInfo {
                id: Some(execution_id),
                display_name: child.alias.clone(),
                requirement: "DISABLED".to_string(),
                authentication_flow: true,
                flow_id: Some(flow_id),
                ..Default::default()
            },
        });
        Ok(())
    }

    async fn list_flow_executions(
        &self,
        realm: &str,
        flow: &str,
    ) -> ApiResult<Vec<AuthenticationExecutionInfo>> {
        let state = self.begin("list_flow_executions", flow)?;
        let stored = state.realm(realm)?;
        let flow_id = stored.flow_id(flow)?;
        let mut executions = Vec::new();
        stored.flatten_executions(&flow_id, 0, &mut executions);
        Ok(executions)
    }

    async fn add_flow_execution(
        &self,
        realm: &str,
        flow: &str,
        provider: &str,
    ) -> ApiResult<String> {
        let mut state = self.begin("add_flow_execution", provider)?;
        let id = state.next_id("execution");
        let stored = state.realm_mut(realm)?;
        let parent_flow = stored.flow_id(flow)?;
        stored.executions.push(FakeExecution {
            parent_flow,
            info: AuthenticationExecutionInfo {
                id: Some(id.clone()),
                display_name: provider.to_string(),
                provider_id: Some(provider.to_string()),
                requirement: "DISABLED".to_string(),
                ..Default::default()
            },
        });
        Ok(id)
    }

    async fn update_flow_execution(
        &self,
        realm: &str,
        flow: &str,
        execution: &AuthenticationExecutionInfo,
    ) -> ApiResult<()> {
        let mut state = self.begin("update_flow_execution", flow)?;
        let stored = state.realm_mut(realm)?;
        stored.flow_id(flow)?;
        let found = stored
            .executions
            .iter_mut()
            .find(|e| e.info.id.is_some() && e.info.id == execution.id)
            .ok_or_else(|| ApiError::not_found(format!("execution in flow {flow}")))?;
        found.info.requirement = execution.requirement.clone();
        Ok(())
    }

    async fn delete_flow_execution(&self, realm: &str, id: &str) -> ApiResult<()> {
        let mut state = self.begin("delete_flow_execution", id)?;
        if state.realm_mut(realm)?.remove_execution(id) {
            Ok(())
        } else {
            Err(ApiError::not_found(format!("execution {id}")))
        }
    }

    async fn create_execution_config(
        &self,
        realm: &str,
        execution_id: &str,
        config: &AuthenticatorConfigRepresentation,
    ) -> ApiResult<String> {
        let mut state = self.begin("create_execution_config", &config.alias)?;
        let id = state.next_id("config");
        let stored = state.realm_mut(realm)?;
        let execution = stored
            .executions
            .iter_mut()
            .find(|e| e.info.id.as_deref() == Some(execution_id))
            .ok_or_else(|| ApiError::not_found(format!("execution {execution_id}")))?;
        execution.info.authentication_config = Some(id.clone());
        stored.authenticator_configs.insert(
            id.clone(),
            AuthenticatorConfigRepresentation {
                id: Some(id.clone()),
                ..config.clone()
            },
        );
        Ok(id)
    }

    async fn get_authenticator_config(
        &self,
        realm: &str,
        id: &str,
    ) -> ApiResult<Option<AuthenticatorConfigRepresentation>> {
        let state = self.begin("get_authenticator_config", id)?;
        Ok(state.realm(realm)?.authenticator_configs.get(id).cloned())
    }
}
