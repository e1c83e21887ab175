//! Authorization services of a client: scopes, resources, policies and
//! permissions, synced in that order since each level references the
//! previous one by name.
//!
//! Entries are matched by name. Under the `Full` strategy remote entries the
//! client does not declare are deleted, except the defaults Keycloak creates
//! with every resource server.

use async_trait::async_trait;
use realmsync_core::kinds::{
    AuthorizationPolicy, AuthorizationResource, AuthorizationSpec, KeycloakClient,
    ReconciliationStrategy,
};
use realmsync_core::names::{
    DEFAULT_AUTHZ_PERMISSION, DEFAULT_AUTHZ_POLICY, DEFAULT_AUTHZ_RESOURCE,
};
use realmsync_keycloak::KeycloakApi;
use realmsync_keycloak::models::{
    PolicyKind, PolicyRepresentation, ResourceRepresentation, ScopeRepresentation,
};
use serde_json::{Map, Value};
use tracing::{debug, info};

use super::remote_id;
use crate::chain::{Flow, Step, StepContext, split_names};
use crate::error::{ReconcileError, ReconcileResult};
use crate::terminators::tolerate_missing;

fn authorization(client: &KeycloakClient) -> Option<&AuthorizationSpec> {
    client
        .spec
        .authorization
        .as_ref()
        .filter(|_| client.spec.authorization_services_enabled)
}

fn is_full(client: &KeycloakClient) -> bool {
    client.spec.reconciliation_strategy == ReconciliationStrategy::Full
}

/// Syncs authorization scopes. Ends the pipeline when the client has no
/// authorization services.
pub struct ProcessScope;

#[async_trait]
impl Step<KeycloakClient> for ProcessScope {
    fn name(&self) -> &'static str {
        "process_scope"
    }

    async fn serve(
        &self,
        ctx: &StepContext,
        client: &mut KeycloakClient,
        api: &dyn KeycloakApi,
    ) -> ReconcileResult<Flow> {
        let Some(authz) = authorization(client) else {
            return Ok(Flow::Stop);
        };
        let id = remote_id(client)?;
        let realm = ctx.realm.as_str();

        let remote = api.list_authz_scopes(realm, &id).await?;
        let (missing, extra) = split_names(
            authz.scopes.iter().map(String::as_str),
            remote.iter().map(|s| s.name.as_str()),
        );

        for name in missing {
            info!(realm, client_id = %client.spec.client_id, scope = name, "Creating authorization scope");
            let scope = ScopeRepresentation {
                id: None,
                name: name.to_string(),
            };
            api.create_authz_scope(realm, &id, &scope).await?;
        }

        if is_full(client) {
            for scope in remote.iter().filter(|s| extra.contains(&s.name.as_str())) {
                let Some(scope_id) = &scope.id else {
                    continue;
                };
                info!(realm, client_id = %client.spec.client_id, scope = %scope.name, "Deleting authorization scope");
                tolerate_missing(api.delete_authz_scope(realm, &id, scope_id).await, &scope.name)?;
            }
        }
        Ok(Flow::Continue)
    }
}

/// Syncs authorization resources.
pub struct ProcessResources;

#[async_trait]
impl Step<KeycloakClient> for ProcessResources {
    fn name(&self) -> &'static str {
        "process_resources"
    }

    async fn serve(
        &self,
        ctx: &StepContext,
        client: &mut KeycloakClient,
        api: &dyn KeycloakApi,
    ) -> ReconcileResult<Flow> {
        let Some(authz) = authorization(client) else {
            return Ok(Flow::Continue);
        };
        let id = remote_id(client)?;
        let realm = ctx.realm.as_str();

        let scopes = api.list_authz_scopes(realm, &id).await?;
        let remote = api.list_authz_resources(realm, &id).await?;

        let mut declared = Vec::with_capacity(authz.resources.len());
        for resource in &authz.resources {
            declared.push(resource_representation(resource, &scopes)?);
        }

        for resource in &declared {
            match remote.iter().find(|r| r.name == resource.name) {
                None => {
                    info!(realm, resource = %resource.name, "Creating authorization resource");
                    api.create_authz_resource(realm, &id, resource).await?;
                }
                Some(current) if !resource.same_definition(current) => {
                    info!(realm, resource = %resource.name, "Updating authorization resource");
                    let update = ResourceRepresentation {
                        id: current.id.clone(),
                        ..resource.clone()
                    };
                    api.update_authz_resource(realm, &id, &update).await?;
                }
                Some(_) => debug!(resource = %resource.name, "Authorization resource up to date"),
            }
        }

        if is_full(client) {
            let stale = remote.iter().filter(|r| {
                r.name != DEFAULT_AUTHZ_RESOURCE && !declared.iter().any(|d| d.name == r.name)
            });
            for resource in stale {
                let Some(resource_id) = &resource.id else {
                    continue;
                };
                info!(realm, resource = %resource.name, "Deleting authorization resource");
                tolerate_missing(
                    api.delete_authz_resource(realm, &id, resource_id).await,
                    &resource.name,
                )?;
            }
        }
        Ok(Flow::Continue)
    }
}

fn resource_representation(
    resource: &AuthorizationResource,
    scopes: &[ScopeRepresentation],
) -> ReconcileResult<ResourceRepresentation> {
    let mut resolved = Vec::with_capacity(resource.scopes.len());
    for name in &resource.scopes {
        let scope = scopes.iter().find(|s| &s.name == name).ok_or_else(|| {
            ReconcileError::validation(format!("scope {name} does not exist"))
        })?;
        resolved.push(scope.clone());
    }
    let non_empty = |s: &String| Some(s.clone()).filter(|s| !s.is_empty());

    Ok(ResourceRepresentation {
        id: None,
        name: resource.name.clone(),
        display_name: non_empty(&resource.display_name),
        resource_type: non_empty(&resource.resource_type),
        uris: resource.uris.clone(),
        scopes: resolved,
        owner_managed_access: resource.owner_managed_access,
        attributes: resource.attributes.clone(),
    })
}

/// Syncs authorization policies.
pub struct ProcessPolicy;

#[async_trait]
impl Step<KeycloakClient> for ProcessPolicy {
    fn name(&self) -> &'static str {
        "process_policy"
    }

    async fn serve(
        &self,
        ctx: &StepContext,
        client: &mut KeycloakClient,
        api: &dyn KeycloakApi,
    ) -> ReconcileResult<Flow> {
        let Some(authz) = authorization(client) else {
            return Ok(Flow::Continue);
        };
        let sync = PolicySync {
            realm: &ctx.realm,
            client: remote_id(client)?,
            kind: PolicyKind::Policy,
            protected: DEFAULT_AUTHZ_POLICY,
            full: is_full(client),
        };
        sync.run(api, &authz.policies).await?;
        Ok(Flow::Continue)
    }
}

/// Syncs authorization permissions.
pub struct ProcessPermissions;

#[async_trait]
impl Step<KeycloakClient> for ProcessPermissions {
    fn name(&self) -> &'static str {
        "process_permissions"
    }

    async fn serve(
        &self,
        ctx: &StepContext,
        client: &mut KeycloakClient,
        api: &dyn KeycloakApi,
    ) -> ReconcileResult<Flow> {
        let Some(authz) = authorization(client) else {
            return Ok(Flow::Continue);
        };
        let sync = PolicySync {
            realm: &ctx.realm,
            client: remote_id(client)?,
            kind: PolicyKind::Permission,
            protected: DEFAULT_AUTHZ_PERMISSION,
            full: is_full(client),
        };
        sync.run(api, &authz.permissions).await?;
        Ok(Flow::Continue)
    }
}

struct PolicySync<'a> {
    realm: &'a str,
    client: String,
    kind: PolicyKind,
    /// Default entry that is never deleted.
    protected: &'static str,
    full: bool,
}

impl PolicySync<'_> {
    async fn run(&self, api: &dyn KeycloakApi, declared: &[AuthorizationPolicy]) -> ReconcileResult<()> {
        let (realm, client, kind) = (self.realm, self.client.as_str(), self.kind);
        let remote = api.list_authz_policies(realm, client, kind).await?;

        let mut wanted = Vec::with_capacity(declared.len());
        for policy in declared {
            wanted.push(policy_representation(policy)?);
        }

        for policy in &wanted {
            match remote.iter().find(|r| r.name == policy.name) {
                None => {
                    info!(realm, %kind, name = %policy.name, "Creating authorization {kind}");
                    api.create_authz_policy(realm, client, kind, policy).await?;
                }
                Some(current) if !policy.is_satisfied_by(current) => {
                    info!(realm, %kind, name = %policy.name, "Updating authorization {kind}");
                    let update = PolicyRepresentation {
                        id: current.id.clone(),
                        ..policy.clone()
                    };
                    api.update_authz_policy(realm, client, kind, &update).await?;
                }
                Some(_) => debug!(%kind, name = %policy.name, "Authorization entry up to date"),
            }
        }

        if self.full {
            let stale = remote.iter().filter(|r| {
                r.name != self.protected && !wanted.iter().any(|w| w.name == r.name)
            });
            for policy in stale {
                let Some(policy_id) = &policy.id else {
                    continue;
                };
                info!(realm, %kind, name = %policy.name, "Deleting authorization {kind}");
                tolerate_missing(
                    api.delete_authz_policy(realm, client, kind, policy_id).await,
                    &policy.name,
                )?;
            }
        }
        Ok(())
    }
}

fn policy_representation(policy: &AuthorizationPolicy) -> ReconcileResult<PolicyRepresentation> {
    let settings = match &policy.config {
        Value::Null => Map::new(),
        Value::Object(map) => map.clone(),
        _ => {
            return Err(ReconcileError::validation(format!(
                "config of {} must be an object",
                policy.name
            )));
        }
    };
    let non_empty = |s: &String| Some(s.clone()).filter(|s| !s.is_empty());

    Ok(PolicyRepresentation {
        id: None,
        name: policy.name.clone(),
        policy_type: policy.policy_type.clone(),
        description: non_empty(&policy.description),
        logic: non_empty(&policy.logic),
        decision_strategy: non_empty(&policy.decision_strategy),
        settings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resource_scopes_resolve_by_name() {
        let scopes = vec![ScopeRepresentation {
            id: Some("s-1".into()),
            name: "read".into(),
        }];
        let resource = AuthorizationResource {
            name: "docs".into(),
            scopes: vec!["read".into()],
            ..Default::default()
        };
        let rep = resource_representation(&resource, &scopes).unwrap();
        assert_eq!(rep.scopes, scopes);
        assert_eq!(rep.display_name, None);

        let unknown = AuthorizationResource {
            scopes: vec!["write".into()],
            ..resource
        };
        assert_eq!(
            resource_representation(&unknown, &scopes)
                .unwrap_err()
                .to_string(),
            "scope write does not exist"
        );
    }

    #[test]
    fn test_policy_config_becomes_settings() {
        let policy = AuthorizationPolicy {
            name: "admins".into(),
            policy_type: "role".into(),
            logic: "POSITIVE".into(),
            config: json!({"roles": [{"id": "admin", "required": true}]}),
            ..Default::default()
        };
        let rep = policy_representation(&policy).unwrap();
        assert_eq!(rep.logic.as_deref(), Some("POSITIVE"));
        assert_eq!(rep.description, None);
        assert_eq!(rep.settings["roles"][0]["id"], "admin");

        let bad = AuthorizationPolicy {
            config: json!("roles"),
            ..policy
        };
        assert!(policy_representation(&bad).is_err());
    }
}
