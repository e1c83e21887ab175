//! reqwest-backed [`KeycloakApi`] implementation.

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;
use url::Url;

use crate::api::KeycloakApi;
use crate::error::{ApiError, ApiResult};
use crate::login::join_segments;
use crate::models::{
    AuthenticationExecutionInfo, AuthenticationFlowRepresentation,
    AuthenticatorConfigRepresentation, ChildFlowRepresentation, ClientRepresentation,
    ClientScopeRepresentation, ComponentRepresentation, CredentialRepresentation,
    GroupRepresentation, IdentityProviderMapperRepresentation, IdentityProviderRepresentation, PolicyKind,
    PolicyRepresentation, ProtocolMapperRepresentation, RealmEventsConfig, RealmRepresentation,
    ResourceRepresentation, RoleRepresentation, ScopeRepresentation, UserProfile,
    UserRepresentation,
};
use crate::token::SessionToken;

const REDIRECTOR_PROVIDER: &str = "identity-provider-redirector";
const DEFAULT_IDP_CONFIG_ALIAS: &str = "default-idp";

/// Admin API client bound to one session token.
pub struct HttpKeycloakClient {
    http: reqwest::Client,
    base: Url,
    token: SessionToken,
}

impl HttpKeycloakClient {
    pub fn new(http: reqwest::Client, base: Url, token: SessionToken) -> Self {
        Self { http, base, token }
    }

    pub fn token(&self) -> &SessionToken {
        &self.token
    }

    fn admin(&self, realm: &str, rest: &[&str]) -> ApiResult<Url> {
        let mut segments = vec!["admin", "realms", realm];
        segments.extend_from_slice(rest);
        join_segments(&self.base, &segments)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http
            .request(method, url)
            .bearer_auth(&self.token.access_token)
            .header("Accept", "application/json")
    }

    async fn send(&self, request: RequestBuilder) -> ApiResult<Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::status(status.as_u16(), error_message(&body)))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> ApiResult<T> {
        debug!(url = %url, "GET");
        let response = self.send(self.request(Method::GET, url)).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::decode(e.to_string()))
    }

    async fn get_optional<T: DeserializeOwned>(&self, url: Url) -> ApiResult<Option<T>> {
        match self.get_json(url).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn write<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: Url,
        body: &B,
    ) -> ApiResult<Response> {
        debug!(method = %method, url = %url, "Mutating call");
        self.send(self.request(method, url).json(body)).await
    }

    async fn post<B: Serialize + ?Sized>(&self, url: Url, body: &B) -> ApiResult<()> {
        self.write(Method::POST, url, body).await.map(drop)
    }

    /// POSTs and returns the id from the `Location` header.
    async fn post_created<B: Serialize + ?Sized>(&self, url: Url, body: &B) -> ApiResult<String> {
        let response = self.write(Method::POST, url, body).await?;
        created_id(&response)
    }

    async fn put<B: Serialize + ?Sized>(&self, url: Url, body: &B) -> ApiResult<()> {
        self.write(Method::PUT, url, body).await.map(drop)
    }

    async fn delete(&self, url: Url) -> ApiResult<()> {
        debug!(url = %url, "DELETE");
        self.send(self.request(Method::DELETE, url)).await.map(drop)
    }

    async fn delete_with<B: Serialize + ?Sized>(&self, url: Url, body: &B) -> ApiResult<()> {
        self.write(Method::DELETE, url, body).await.map(drop)
    }

    /// Execution of the identity provider redirector in the browser flow.
    async fn redirector_execution(&self, realm: &str) -> ApiResult<Value> {
        let executions: Vec<Value> = self
            .get_json(self.admin(
                realm,
                &["authentication", "flows", "browser", "executions"],
            )?)
            .await?;
        executions
            .into_iter()
            .find(|e| e["providerId"] == REDIRECTOR_PROVIDER)
            .ok_or_else(|| {
                ApiError::unexpected(format!(
                    "browser flow of realm {realm} has no {REDIRECTOR_PROVIDER} execution"
                ))
            })
    }
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            ["errorMessage", "error_description", "error"]
                .iter()
                .find_map(|k| v.get(*k).and_then(Value::as_str).map(str::to_string))
        })
        .unwrap_or_else(|| body.to_string())
}

fn created_id(response: &Response) -> ApiResult<String> {
    response
        .headers()
        .get(reqwest::header::LOCATION)
        .and_then(|l| l.to_str().ok())
        .and_then(|l| l.rsplit('/').next())
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::decode("created response has no Location header"))
}

fn require_id<'a>(id: &'a Option<String>, what: &str) -> ApiResult<&'a str> {
    id.as_deref()
        .ok_or_else(|| ApiError::unexpected(format!("{what} has no id")))
}

#[async_trait]
impl KeycloakApi for HttpKeycloakClient {
    async fn get_realm(&self, realm: &str) -> ApiResult<Option<RealmRepresentation>> {
        self.get_optional(self.admin(realm, &[])?).await
    }

    async fn create_realm(&self, realm: &RealmRepresentation) -> ApiResult<()> {
        let url = join_segments(&self.base, &["admin", "realms"])?;
        self.post(url, realm).await
    }

    async fn update_realm(&self, realm: &RealmRepresentation) -> ApiResult<()> {
        self.put(self.admin(&realm.realm, &[])?, realm).await
    }

    async fn delete_realm(&self, realm: &str) -> ApiResult<()> {
        self.delete(self.admin(realm, &[])?).await
    }

    async fn get_realm_events_config(&self, realm: &str) -> ApiResult<RealmEventsConfig> {
        self.get_json(self.admin(realm, &["events", "config"])?)
            .await
    }

    async fn update_realm_events_config(
        &self,
        realm: &str,
        config: &RealmEventsConfig,
    ) -> ApiResult<()> {
        self.put(self.admin(realm, &["events", "config"])?, config)
            .await
    }

    async fn get_openid_configuration(&self, realm: &str) -> ApiResult<String> {
        let url = join_segments(
            &self.base,
            &["realms", realm, ".well-known", "openid-configuration"],
        )?;
        let response = self.send(self.request(Method::GET, url)).await?;
        Ok(response.text().await?)
    }

    async fn get_user_profile(&self, realm: &str) -> ApiResult<UserProfile> {
        self.get_json(self.admin(realm, &["users", "profile"])?)
            .await
    }

    async fn update_user_profile(&self, realm: &str, profile: &UserProfile) -> ApiResult<()> {
        self.put(self.admin(realm, &["users", "profile"])?, profile)
            .await
    }

    async fn get_default_identity_provider(&self, realm: &str) -> ApiResult<Option<String>> {
        let execution = self.redirector_execution(realm).await?;
        let Some(config_id) = execution["authenticationConfig"].as_str() else {
            return Ok(None);
        };
        let config: Value = self
            .get_json(self.admin(realm, &["authentication", "config", config_id])?)
            .await?;
        Ok(config["config"]["defaultProvider"]
            .as_str()
            .map(str::to_string))
    }

    async fn set_default_identity_provider(&self, realm: &str, alias: &str) -> ApiResult<()> {
        let execution = self.redirector_execution(realm).await?;
        match execution["authenticationConfig"].as_str() {
            Some(config_id) => {
                let url = self.admin(realm, &["authentication", "config", config_id])?;
                let mut config: Value = self.get_json(url.clone()).await?;
                config["config"]["defaultProvider"] = json!(alias);
                self.put(url, &config).await
            }
            None => {
                let execution_id = execution["id"]
                    .as_str()
                    .ok_or_else(|| ApiError::decode("redirector execution has no id"))?;
                let url = self.admin(
                    realm,
                    &["authentication", "executions", execution_id, "config"],
                )?;
                let body = json!({
                    "alias": DEFAULT_IDP_CONFIG_ALIAS,
                    "config": {"defaultProvider": alias},
                });
                self.post(url, &body).await
            }
        }
    }

    async fn get_realm_role(
        &self,
        realm: &str,
        name: &str,
    ) -> ApiResult<Option<RoleRepresentation>> {
        self.get_optional(self.admin(realm, &["roles", name])?)
            .await
    }

    async fn create_realm_role(&self, realm: &str, role: &RoleRepresentation) -> ApiResult<()> {
        self.post(self.admin(realm, &["roles"])?, role).await
    }

    async fn update_realm_role(&self, realm: &str, role: &RoleRepresentation) -> ApiResult<()> {
        self.put(self.admin(realm, &["roles", &role.name])?, role)
            .await
    }

    async fn delete_realm_role(&self, realm: &str, name: &str) -> ApiResult<()> {
        self.delete(self.admin(realm, &["roles", name])?).await
    }

    async fn get_realm_role_composites(
        &self,
        realm: &str,
        name: &str,
    ) -> ApiResult<Vec<RoleRepresentation>> {
        self.get_json(self.admin(realm, &["roles", name, "composites"])?)
            .await
    }

    async fn add_realm_role_composites(
        &self,
        realm: &str,
        name: &str,
        roles: &[RoleRepresentation],
    ) -> ApiResult<()> {
        self.post(self.admin(realm, &["roles", name, "composites"])?, roles)
            .await
    }

    async fn remove_realm_role_composites(
        &self,
        realm: &str,
        name: &str,
        roles: &[RoleRepresentation],
    ) -> ApiResult<()> {
        self.delete_with(self.admin(realm, &["roles", name, "composites"])?, roles)
            .await
    }

    async fn find_user(
        &self,
        realm: &str,
        username: &str,
    ) -> ApiResult<Option<UserRepresentation>> {
        let mut url = self.admin(realm, &["users"])?;
        url.query_pairs_mut()
            .append_pair("username", username)
            .append_pair("exact", "true");
        let users: Vec<UserRepresentation> = self.get_json(url).await?;
        Ok(users.into_iter().find(|u| u.username == username))
    }

    async fn create_user(&self, realm: &str, user: &UserRepresentation) -> ApiResult<String> {
        self.post_created(self.admin(realm, &["users"])?, user)
            .await
    }

    async fn update_user(&self, realm: &str, user: &UserRepresentation) -> ApiResult<()> {
        let id = require_id(&user.id, "user")?;
        self.put(self.admin(realm, &["users", id])?, user).await
    }

    async fn delete_user(&self, realm: &str, user_id: &str) -> ApiResult<()> {
        self.delete(self.admin(realm, &["users", user_id])?).await
    }

    async fn reset_user_password(
        &self,
        realm: &str,
        user_id: &str,
        credential: &CredentialRepresentation,
    ) -> ApiResult<()> {
        self.put(
            self.admin(realm, &["users", user_id, "reset-password"])?,
            credential,
        )
        .await
    }

    async fn get_user_groups(
        &self,
        realm: &str,
        user_id: &str,
    ) -> ApiResult<Vec<GroupRepresentation>> {
        self.get_json(self.admin(realm, &["users", user_id, "groups"])?)
            .await
    }

    async fn add_user_to_group(
        &self,
        realm: &str,
        user_id: &str,
        group_id: &str,
    ) -> ApiResult<()> {
        self.put(
            self.admin(realm, &["users", user_id, "groups", group_id])?,
            &json!({}),
        )
        .await
    }

    async fn remove_user_from_group(
        &self,
        realm: &str,
        user_id: &str,
        group_id: &str,
    ) -> ApiResult<()> {
        self.delete(self.admin(realm, &["users", user_id, "groups", group_id])?)
            .await
    }

    async fn get_user_realm_roles(
        &self,
        realm: &str,
        user_id: &str,
    ) -> ApiResult<Vec<RoleRepresentation>> {
        self.get_json(self.admin(realm, &["users", user_id, "role-mappings", "realm"])?)
            .await
    }

    async fn add_user_realm_roles(
        &self,
        realm: &str,
        user_id: &str,
        roles: &[RoleRepresentation],
    ) -> ApiResult<()> {
        self.post(
            self.admin(realm, &["users", user_id, "role-mappings", "realm"])?,
            roles,
        )
        .await
    }

    async fn remove_user_realm_roles(
        &self,
        realm: &str,
        user_id: &str,
        roles: &[RoleRepresentation],
    ) -> ApiResult<()> {
        self.delete_with(
            self.admin(realm, &["users", user_id, "role-mappings", "realm"])?,
            roles,
        )
        .await
    }

    async fn get_user_client_roles(
        &self,
        realm: &str,
        user_id: &str,
        client: &str,
    ) -> ApiResult<Vec<RoleRepresentation>> {
        self.get_json(self.admin(
            realm,
            &["users", user_id, "role-mappings", "clients", client],
        )?)
        .await
    }

    async fn add_user_client_roles(
        &self,
        realm: &str,
        user_id: &str,
        client: &str,
        roles: &[RoleRepresentation],
    ) -> ApiResult<()> {
        self.post(
            self.admin(
                realm,
                &["users", user_id, "role-mappings", "clients", client],
            )?,
            roles,
        )
        .await
    }

    async fn remove_user_client_roles(
        &self,
        realm: &str,
        user_id: &str,
        client: &str,
        roles: &[RoleRepresentation],
    ) -> ApiResult<()> {
        self.delete_with(
            self.admin(
                realm,
                &["users", user_id, "role-mappings", "clients", client],
            )?,
            roles,
        )
        .await
    }

    async fn get_client(
        &self,
        realm: &str,
        client_id: &str,
    ) -> ApiResult<Option<ClientRepresentation>> {
        let mut url = self.admin(realm, &["clients"])?;
        url.query_pairs_mut().append_pair("clientId", client_id);
        let clients: Vec<ClientRepresentation> = self.get_json(url).await?;
        Ok(clients.into_iter().find(|c| c.client_id == client_id))
    }

    async fn create_client(
        &self,
        realm: &str,
        client: &ClientRepresentation,
    ) -> ApiResult<String> {
        self.post_created(self.admin(realm, &["clients"])?, client)
            .await
    }

    async fn update_client(&self, realm: &str, client: &ClientRepresentation) -> ApiResult<()> {
        let id = require_id(&client.id, "client")?;
        self.put(self.admin(realm, &["clients", id])?, client).await
    }

    async fn delete_client(&self, realm: &str, client: &str) -> ApiResult<()> {
        self.delete(self.admin(realm, &["clients", client])?).await
    }

    async fn list_client_roles(
        &self,
        realm: &str,
        client: &str,
    ) -> ApiResult<Vec<RoleRepresentation>> {
        self.get_json(self.admin(realm, &["clients", client, "roles"])?)
            .await
    }

    async fn create_client_role(
        &self,
        realm: &str,
        client: &str,
        role: &RoleRepresentation,
    ) -> ApiResult<()> {
        self.post(self.admin(realm, &["clients", client, "roles"])?, role)
            .await
    }

    async fn delete_client_role(&self, realm: &str, client: &str, name: &str) -> ApiResult<()> {
        self.delete(self.admin(realm, &["clients", client, "roles", name])?)
            .await
    }

    async fn list_protocol_mappers(
        &self,
        realm: &str,
        client: &str,
    ) -> ApiResult<Vec<ProtocolMapperRepresentation>> {
        self.get_json(self.admin(realm, &["clients", client, "protocol-mappers", "models"])?)
            .await
    }

    async fn create_protocol_mapper(
        &self,
        realm: &str,
        client: &str,
        mapper: &ProtocolMapperRepresentation,
    ) -> ApiResult<()> {
        self.post(
            self.admin(realm, &["clients", client, "protocol-mappers", "models"])?,
            mapper,
        )
        .await
    }

    async fn update_protocol_mapper(
        &self,
        realm: &str,
        client: &str,
        mapper: &ProtocolMapperRepresentation,
    ) -> ApiResult<()> {
        let id = require_id(&mapper.id, "protocol mapper")?;
        self.put(
            self.admin(realm, &["clients", client, "protocol-mappers", "models", id])?,
            mapper,
        )
        .await
    }

    async fn delete_protocol_mapper(&self, realm: &str, client: &str, id: &str) -> ApiResult<()> {
        self.delete(self.admin(realm, &["clients", client, "protocol-mappers", "models", id])?)
            .await
    }

    async fn list_client_default_scopes(
        &self,
        realm: &str,
        client: &str,
    ) -> ApiResult<Vec<ClientScopeRepresentation>> {
        self.get_json(self.admin(realm, &["clients", client, "default-client-scopes"])?)
            .await
    }

    async fn add_client_default_scope(
        &self,
        realm: &str,
        client: &str,
        scope_id: &str,
    ) -> ApiResult<()> {
        self.put(
            self.admin(
                realm,
                &["clients", client, "default-client-scopes", scope_id],
            )?,
            &json!({}),
        )
        .await
    }

    async fn list_client_optional_scopes(
        &self,
        realm: &str,
        client: &str,
    ) -> ApiResult<Vec<ClientScopeRepresentation>> {
        self.get_json(self.admin(realm, &["clients", client, "optional-client-scopes"])?)
            .await
    }

    async fn add_client_optional_scope(
        &self,
        realm: &str,
        client: &str,
        scope_id: &str,
    ) -> ApiResult<()> {
        self.put(
            self.admin(
                realm,
                &["clients", client, "optional-client-scopes", scope_id],
            )?,
            &json!({}),
        )
        .await
    }

    async fn get_service_account_user(
        &self,
        realm: &str,
        client: &str,
    ) -> ApiResult<UserRepresentation> {
        self.get_json(self.admin(realm, &["clients", client, "service-account-user"])?)
            .await
    }

    async fn list_authz_scopes(
        &self,
        realm: &str,
        client: &str,
    ) -> ApiResult<Vec<ScopeRepresentation>> {
        self.get_json(self.admin(
            realm,
            &["clients", client, "authz", "resource-server", "scope"],
        )?)
        .await
    }

    async fn create_authz_scope(
        &self,
        realm: &str,
        client: &str,
        scope: &ScopeRepresentation,
    ) -> ApiResult<()> {
        self.post(
            self.admin(
                realm,
                &["clients", client, "authz", "resource-server", "scope"],
            )?,
            scope,
        )
        .await
    }

    async fn delete_authz_scope(&self, realm: &str, client: &str, id: &str) -> ApiResult<()> {
        self.delete(self.admin(
            realm,
            &["clients", client, "authz", "resource-server", "scope", id],
        )?)
        .await
    }

    async fn list_authz_resources(
        &self,
        realm: &str,
        client: &str,
    ) -> ApiResult<Vec<ResourceRepresentation>> {
        self.get_json(self.admin(
            realm,
            &["clients", client, "authz", "resource-server", "resource"],
        )?)
        .await
    }

    async fn create_authz_resource(
        &self,
        realm: &str,
        client: &str,
        resource: &ResourceRepresentation,
    ) -> ApiResult<()> {
        self.post(
            self.admin(
                realm,
                &["clients", client, "authz", "resource-server", "resource"],
            )?,
            resource,
        )
        .await
    }

    async fn update_authz_resource(
        &self,
        realm: &str,
        client: &str,
        resource: &ResourceRepresentation,
    ) -> ApiResult<()> {
        let id = require_id(&resource.id, "authorization resource")?;
        self.put(
            self.admin(
                realm,
                &["clients", client, "authz", "resource-server", "resource", id],
            )?,
            resource,
        )
        .await
    }

    async fn delete_authz_resource(&self, realm: &str, client: &str, id: &str) -> ApiResult<()> {
        self.delete(self.admin(
            realm,
            &["clients", client, "authz", "resource-server", "resource", id],
        )?)
        .await
    }

    async fn list_authz_policies(
        &self,
        realm: &str,
        client: &str,
        kind: PolicyKind,
    ) -> ApiResult<Vec<PolicyRepresentation>> {
        let mut url = self.admin(
            realm,
            &["clients", client, "authz", "resource-server", kind.as_str()],
        )?;
        if kind == PolicyKind::Policy {
            url.query_pairs_mut().append_pair("permission", "false");
        }
        self.get_json(url).await
    }

    async fn create_authz_policy(
        &self,
        realm: &str,
        client: &str,
        kind: PolicyKind,
        policy: &PolicyRepresentation,
    ) -> ApiResult<()> {
        self.post(
            self.admin(
                realm,
                &[
                    "clients",
                    client,
                    "authz",
                    "resource-server",
                    kind.as_str(),
                    &policy.policy_type,
                ],
            )?,
            policy,
        )
        .await
    }

    async fn update_authz_policy(
        &self,
        realm: &str,
        client: &str,
        kind: PolicyKind,
        policy: &PolicyRepresentation,
    ) -> ApiResult<()> {
        let id = require_id(&policy.id, "authorization policy")?;
        self.put(
            self.admin(
                realm,
                &[
                    "clients",
                    client,
                    "authz",
                    "resource-server",
                    kind.as_str(),
                    &policy.policy_type,
                    id,
                ],
            )?,
            policy,
        )
        .await
    }

    async fn delete_authz_policy(
        &self,
        realm: &str,
        client: &str,
        kind: PolicyKind,
        id: &str,
    ) -> ApiResult<()> {
        self.delete(self.admin(
            realm,
            &["clients", client, "authz", "resource-server", kind.as_str(), id],
        )?)
        .await
    }

    async fn list_client_scopes(&self, realm: &str) -> ApiResult<Vec<ClientScopeRepresentation>> {
        self.get_json(self.admin(realm, &["client-scopes"])?).await
    }

    async fn create_client_scope(
        &self,
        realm: &str,
        scope: &ClientScopeRepresentation,
    ) -> ApiResult<String> {
        self.post_created(self.admin(realm, &["client-scopes"])?, scope)
            .await
    }

    async fn update_client_scope(
        &self,
        realm: &str,
        scope: &ClientScopeRepresentation,
    ) -> ApiResult<()> {
        let id = require_id(&scope.id, "client scope")?;
        self.put(self.admin(realm, &["client-scopes", id])?, scope)
            .await
    }

    async fn delete_client_scope(&self, realm: &str, id: &str) -> ApiResult<()> {
        self.delete(self.admin(realm, &["client-scopes", id])?)
            .await
    }

    async fn list_realm_default_client_scopes(
        &self,
        realm: &str,
    ) -> ApiResult<Vec<ClientScopeRepresentation>> {
        self.get_json(self.admin(realm, &["default-default-client-scopes"])?)
            .await
    }

    async fn add_realm_default_client_scope(&self, realm: &str, id: &str) -> ApiResult<()> {
        self.put(
            self.admin(realm, &["default-default-client-scopes", id])?,
            &json!({}),
        )
        .await
    }

    async fn remove_realm_default_client_scope(&self, realm: &str, id: &str) -> ApiResult<()> {
        self.delete(self.admin(realm, &["default-default-client-scopes", id])?)
            .await
    }

    async fn find_group(&self, realm: &str, name: &str) -> ApiResult<Option<GroupRepresentation>> {
        let mut url = self.admin(realm, &["groups"])?;
        url.query_pairs_mut()
            .append_pair("search", name)
            .append_pair("exact", "true");
        let groups: Vec<GroupRepresentation> = self.get_json(url).await?;
        Ok(groups.into_iter().find(|g| g.name == name))
    }

    async fn find_group_by_path(
        &self,
        realm: &str,
        path: &str,
    ) -> ApiResult<Option<GroupRepresentation>> {
        let mut segments = vec!["group-by-path"];
        segments.extend(path.split('/').filter(|s| !s.is_empty()));
        self.get_optional(self.admin(realm, &segments)?).await
    }

    async fn create_group(&self, realm: &str, group: &GroupRepresentation) -> ApiResult<String> {
        self.post_created(self.admin(realm, &["groups"])?, group)
            .await
    }

    async fn update_group(&self, realm: &str, group: &GroupRepresentation) -> ApiResult<()> {
        let id = require_id(&group.id, "group")?;
        self.put(self.admin(realm, &["groups", id])?, group).await
    }

    async fn delete_group(&self, realm: &str, id: &str) -> ApiResult<()> {
        self.delete(self.admin(realm, &["groups", id])?).await
    }

    async fn get_group_realm_roles(
        &self,
        realm: &str,
        group_id: &str,
    ) -> ApiResult<Vec<RoleRepresentation>> {
        self.get_json(self.admin(realm, &["groups", group_id, "role-mappings", "realm"])?)
            .await
    }

    async fn add_group_realm_roles(
        &self,
        realm: &str,
        group_id: &str,
        roles: &[RoleRepresentation],
    ) -> ApiResult<()> {
        self.post(
            self.admin(realm, &["groups", group_id, "role-mappings", "realm"])?,
            roles,
        )
        .await
    }

    async fn get_identity_provider(
        &self,
        realm: &str,
        alias: &str,
    ) -> ApiResult<Option<IdentityProviderRepresentation>> {
        self.get_optional(self.admin(realm, &["identity-provider", "instances", alias])?)
            .await
    }

    async fn create_identity_provider(
        &self,
        realm: &str,
        idp: &IdentityProviderRepresentation,
    ) -> ApiResult<()> {
        self.post(self.admin(realm, &["identity-provider", "instances"])?, idp)
            .await
    }

    async fn update_identity_provider(
        &self,
        realm: &str,
        idp: &IdentityProviderRepresentation,
    ) -> ApiResult<()> {
        self.put(
            self.admin(realm, &["identity-provider", "instances", &idp.alias])?,
            idp,
        )
        .await
    }

    async fn delete_identity_provider(&self, realm: &str, alias: &str) -> ApiResult<()> {
        self.delete(self.admin(realm, &["identity-provider", "instances", alias])?)
            .await
    }

    async fn list_identity_provider_mappers(
        &self,
        realm: &str,
        alias: &str,
    ) -> ApiResult<Vec<IdentityProviderMapperRepresentation>> {
        self.get_json(self.admin(
            realm,
            &["identity-provider", "instances", alias, "mappers"],
        )?)
        .await
    }

    async fn create_identity_provider_mapper(
        &self,
        realm: &str,
        alias: &str,
        mapper: &IdentityProviderMapperRepresentation,
    ) -> ApiResult<()> {
        self.post(
            self.admin(
                realm,
                &["identity-provider", "instances", alias, "mappers"],
            )?,
            mapper,
        )
        .await
    }

    async fn delete_identity_provider_mapper(
        &self,
        realm: &str,
        alias: &str,
        id: &str,
    ) -> ApiResult<()> {
        self.delete(self.admin(
            realm,
            &["identity-provider", "instances", alias, "mappers", id],
        )?)
        .await
    }

    async fn find_component(
        &self,
        realm: &str,
        name: &str,
    ) -> ApiResult<Option<ComponentRepresentation>> {
        let mut url = self.admin(realm, &["components"])?;
        url.query_pairs_mut().append_pair("name", name);
        let components: Vec<ComponentRepresentation> = self.get_json(url).await?;
        Ok(components.into_iter().find(|c| c.name == name))
    }

    async fn create_component(
        &self,
        realm: &str,
        component: &ComponentRepresentation,
    ) -> ApiResult<()> {
        self.post(self.admin(realm, &["components"])?, component)
            .await
    }

    async fn update_component(
        &self,
        realm: &str,
        component: &ComponentRepresentation,
    ) -> ApiResult<()> {
        let id = require_id(&component.id, "component")?;
        self.put(self.admin(realm, &["components", id])?, component)
            .await
    }

    async fn delete_component(&self, realm: &str, id: &str) -> ApiResult<()> {
        self.delete(self.admin(realm, &["components", id])?).await
    }

    async fn list_auth_flows(
        &self,
        realm: &str,
    ) -> ApiResult<Vec<AuthenticationFlowRepresentation>> {
        self.get_json(self.admin(realm, &["authentication", "flows"])?)
            .await
    }

    async fn create_auth_flow(
        &self,
        realm: &str,
        flow: &AuthenticationFlowRepresentation,
    ) -> ApiResult<String> {
        self.post_created(self.admin(realm, &["authentication", "flows"])?, flow)
            .await
    }

    async fn delete_auth_flow(&self, realm: &str, id: &str) -> ApiResult<()> {
        self.delete(self.admin(realm, &["authentication", "flows", id])?)
            .await
    }

    async fn add_child_flow(
        &self,
        realm: &str,
        parent: &str,
        child: &ChildFlowRepresentation,
    ) -> ApiResult<()> {
        self.post(
            self.admin(
                realm,
                &["authentication", "flows", parent, "executions", "flow"],
            )?,
            child,
        )
        .await
    }

    async fn list_flow_executions(
        &self,
        realm: &str,
        flow: &str,
    ) -> ApiResult<Vec<AuthenticationExecutionInfo>> {
        self.get_json(self.admin(realm, &["authentication", "flows", flow, "executions"])?)
            .await
    }

    async fn add_flow_execution(
        &self,
        realm: &str,
        flow: &str,
        provider: &str,
    ) -> ApiResult<String> {
        self.post_created(
            self.admin(
                realm,
                &["authentication", "flows", flow, "executions", "execution"],
            )?,
            &json!({"provider": provider}),
        )
        .await
    }

    async fn update_flow_execution(
        &self,
        realm: &str,
        flow: &str,
        execution: &AuthenticationExecutionInfo,
    ) -> ApiResult<()> {
        self.put(
            self.admin(realm, &["authentication", "flows", flow, "executions"])?,
            execution,
        )
        .await
    }

    async fn delete_flow_execution(&self, realm: &str, id: &str) -> ApiResult<()> {
        self.delete(self.admin(realm, &["authentication", "executions", id])?)
            .await
    }

    async fn create_execution_config(
        &self,
        realm: &str,
        execution_id: &str,
        config: &AuthenticatorConfigRepresentation,
    ) -> ApiResult<String> {
        self.post_created(
            self.admin(
                realm,
                &["authentication", "executions", execution_id, "config"],
            )?,
            config,
        )
        .await
    }

    async fn get_authenticator_config(
        &self,
        realm: &str,
        id: &str,
    ) -> ApiResult<Option<AuthenticatorConfigRepresentation>> {
        self.get_optional(self.admin(realm, &["authentication", "config", id])?)
            .await
    }
}
