//! Authentication flows.
//!
//! A flow object owns its authenticator executions. Child flows are declared
//! by their own objects (`parentName`) and only referenced by the parent,
//! which checks that they exist and sets their requirement. Executions are
//! rebuilt only when the declared list differs from the server's.

use async_trait::async_trait;
use realmsync_core::kinds::{AuthenticationExecution, KeycloakAuthFlow, KeycloakAuthFlowSpec};
use realmsync_core::names::AUTH_FLOW_FINALIZER;
use realmsync_core::{ObjectKey, Resource};
use realmsync_keycloak::KeycloakApi;
use realmsync_keycloak::models::{
    AuthenticationExecutionInfo, AuthenticationFlowRepresentation, AuthenticatorConfigRepresentation,
    ChildFlowRepresentation,
};
use tracing::{debug, info};

use super::{Converge, Reconciler, Synced, connect, drive};
use crate::context::Context;
use crate::error::{ReconcileError, ReconcileResult};
use crate::lifecycle::Action;
use crate::terminators::AuthFlowTerminator;

const DEFAULT_CHILD_TYPE: &str = "basic-flow";

pub struct AuthFlowReconciler {
    ctx: Context,
}

impl AuthFlowReconciler {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Reconciler for AuthFlowReconciler {
    fn kind(&self) -> &'static str {
        KeycloakAuthFlow::KIND
    }

    async fn reconcile(&self, key: &ObjectKey) -> Action {
        drive(self, key).await
    }
}

#[async_trait]
impl Converge for AuthFlowReconciler {
    type Object = KeycloakAuthFlow;

    fn context(&self) -> &Context {
        &self.ctx
    }

    async fn converge(&self, flow: &mut KeycloakAuthFlow) -> ReconcileResult<Synced> {
        let Some(conn) = connect(&self.ctx, flow, AUTH_FLOW_FINALIZER).await? else {
            return Ok(Synced::Skip(Action::Done));
        };

        let result = async {
            let terminator = AuthFlowTerminator::new(
                conn.api.clone(),
                conn.realm_name(),
                &flow.spec,
                &flow.metadata,
            );
            if self
                .ctx
                .lifecycle
                .try_to_delete(flow, &terminator, AUTH_FLOW_FINALIZER)
                .await?
            {
                return Ok(Synced::Skip(Action::Done));
            }

            let id = sync_auth_flow(conn.api.as_ref(), conn.realm_name(), &flow.spec).await?;
            flow.status.id = Some(id);
            Ok(Synced::Converged)
        }
        .await;
        self.ctx.helper.settle(&conn.keycloak, result).await
    }
}

/// Converges one flow and returns its server id.
async fn sync_auth_flow(
    api: &dyn KeycloakApi,
    realm: &str,
    spec: &KeycloakAuthFlowSpec,
) -> ReconcileResult<String> {
    let id = if spec.is_child() {
        put_child_flow(api, realm, spec).await?
    } else {
        put_top_level_flow(api, realm, spec).await?
    };

    let executions = api.list_flow_executions(realm, &spec.alias).await?;
    if authenticators_differ(api, realm, &executions, &spec.authenticators()).await? {
        rebuild_authenticators(api, realm, spec, &executions).await?;
    } else {
        debug!(realm, flow = %spec.alias, "Flow executions up to date");
    }
    sync_child_flows(api, realm, spec, &executions).await?;
    Ok(id)
}

async fn put_top_level_flow(
    api: &dyn KeycloakApi,
    realm: &str,
    spec: &KeycloakAuthFlowSpec,
) -> ReconcileResult<String> {
    let existing = api
        .list_auth_flows(realm)
        .await?
        .into_iter()
        .find(|f| f.alias == spec.alias);
    if let Some(id) = existing.and_then(|f| f.id) {
        return Ok(id);
    }

    info!(realm, flow = %spec.alias, "Creating authentication flow");
    let flow = AuthenticationFlowRepresentation {
        id: None,
        alias: spec.alias.clone(),
        description: Some(spec.description.clone()).filter(|d| !d.is_empty()),
        provider_id: spec.provider_id.clone(),
        top_level: true,
        built_in: spec.built_in,
    };
    Ok(api.create_auth_flow(realm, &flow).await?)
}

/// The execution that nests `alias` directly under the listed flow.
fn child_execution<'a>(
    executions: &'a [AuthenticationExecutionInfo],
    alias: &str,
) -> Option<&'a AuthenticationExecutionInfo> {
    executions
        .iter()
        .find(|e| e.authentication_flow && e.level == 0 && e.display_name == alias)
}

async fn put_child_flow(
    api: &dyn KeycloakApi,
    realm: &str,
    spec: &KeycloakAuthFlowSpec,
) -> ReconcileResult<String> {
    let parent = spec.parent_name.as_str();
    let mut siblings = api.list_flow_executions(realm, parent).await?;
    if child_execution(&siblings, &spec.alias).is_none() {
        info!(realm, flow = %spec.alias, parent, "Creating child authentication flow");
        let child = ChildFlowRepresentation {
            alias: spec.alias.clone(),
            flow_type: Some(spec.child_type.clone())
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| DEFAULT_CHILD_TYPE.to_string()),
            description: spec.description.clone(),
            provider: Some(spec.provider_id.clone()).filter(|p| !p.is_empty()),
        };
        api.add_child_flow(realm, parent, &child).await?;
        siblings = api.list_flow_executions(realm, parent).await?;
    }

    let execution = child_execution(&siblings, &spec.alias).ok_or_else(|| {
        ReconcileError::validation(format!("child flow {} not found in {parent}", spec.alias))
    })?;
    if !spec.child_requirement.is_empty() && execution.requirement != spec.child_requirement {
        info!(realm, flow = %spec.alias, requirement = %spec.child_requirement, "Updating child flow requirement");
        let updated = AuthenticationExecutionInfo {
            requirement: spec.child_requirement.clone(),
            ..execution.clone()
        };
        api.update_flow_execution(realm, parent, &updated).await?;
    }
    execution
        .flow_id
        .clone()
        .ok_or_else(|| ReconcileError::validation(format!("child flow {} has no server id", spec.alias)))
}

/// Compares the flow's own authenticators, in order, with the declared ones.
async fn authenticators_differ(
    api: &dyn KeycloakApi,
    realm: &str,
    executions: &[AuthenticationExecutionInfo],
    declared: &[&AuthenticationExecution],
) -> ReconcileResult<bool> {
    let remote: Vec<_> = executions
        .iter()
        .filter(|e| e.level == 0 && !e.authentication_flow)
        .collect();
    if remote.len() != declared.len() {
        return Ok(true);
    }

    for (current, wanted) in remote.iter().zip(declared) {
        if current.provider_id.as_deref() != Some(wanted.authenticator.as_str())
            || current.requirement != wanted.requirement
        {
            return Ok(true);
        }
        let config = match current.authentication_config.as_deref() {
            Some(id) => api.get_authenticator_config(realm, id).await?,
            None => None,
        };
        let same_config = match (&config, &wanted.authenticator_config) {
            (None, None) => true,
            (Some(have), Some(want)) => have.alias == want.alias && have.config == want.config,
            _ => false,
        };
        if !same_config {
            return Ok(true);
        }
    }
    Ok(false)
}

async fn rebuild_authenticators(
    api: &dyn KeycloakApi,
    realm: &str,
    spec: &KeycloakAuthFlowSpec,
    executions: &[AuthenticationExecutionInfo],
) -> ReconcileResult<()> {
    let flow = spec.alias.as_str();
    info!(realm, flow, "Rebuilding flow executions");

    for execution in executions.iter().filter(|e| e.level == 0 && !e.authentication_flow) {
        if let Some(id) = execution.id.as_deref() {
            api.delete_flow_execution(realm, id).await?;
        }
    }

    for declared in spec.authenticators() {
        let id = api
            .add_flow_execution(realm, flow, &declared.authenticator)
            .await?;
        let execution = AuthenticationExecutionInfo {
            id: Some(id.clone()),
            provider_id: Some(declared.authenticator.clone()),
            requirement: declared.requirement.clone(),
            ..Default::default()
        };
        api.update_flow_execution(realm, flow, &execution).await?;

        if let Some(config) = &declared.authenticator_config {
            let config = AuthenticatorConfigRepresentation {
                id: None,
                alias: config.alias.clone(),
                config: config.config.clone(),
            };
            api.create_execution_config(realm, &id, &config).await?;
        }
    }
    Ok(())
}

/// Every direct child flow on the server must be declared here and gets the
/// requirement declared for it; declared children must exist.
async fn sync_child_flows(
    api: &dyn KeycloakApi,
    realm: &str,
    spec: &KeycloakAuthFlowSpec,
    executions: &[AuthenticationExecutionInfo],
) -> ReconcileResult<()> {
    let flow = spec.alias.as_str();
    let children: Vec<_> = executions
        .iter()
        .filter(|e| e.level == 0 && e.authentication_flow)
        .collect();

    for execution in &children {
        let declared = spec
            .child_flows()
            .find(|c| c.alias == execution.display_name)
            .ok_or_else(|| {
                ReconcileError::validation(format!(
                    "unable to find child flow with name: {}",
                    execution.display_name
                ))
            })?;
        if !declared.requirement.is_empty() && declared.requirement != execution.requirement {
            info!(realm, flow, child = %declared.alias, "Updating child flow requirement");
            let updated = AuthenticationExecutionInfo {
                requirement: declared.requirement.clone(),
                ..(*execution).clone()
            };
            api.update_flow_execution(realm, flow, &updated).await?;
        }
    }

    if let Some(missing) = spec
        .child_flows()
        .find(|c| !children.iter().any(|e| e.display_name == c.alias))
    {
        return Err(ReconcileError::validation(format!(
            "child flow {} of {flow} is not created yet",
            missing.alias
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcilers::test_support::{Harness, harness, realm_ref, seed};
    use realmsync_core::StatusValue;
    use serde_json::{Value, json};

    fn browser_2fa(otp_requirement: &str) -> Value {
        json!({
            "alias": "browser-2fa",
            "realmRef": realm_ref(),
            "providerId": "basic-flow",
            "topLevel": true,
            "authenticationExecutions": [
                {"authenticator": "auth-cookie", "priority": 0, "requirement": "ALTERNATIVE"},
                {
                    "authenticator": "identity-provider-redirector",
                    "priority": 1,
                    "requirement": "ALTERNATIVE",
                    "authenticatorConfig": {"alias": "to-github", "config": {"defaultProvider": "github"}}
                },
                {"authenticator": "auth-otp-form", "priority": 2, "requirement": otp_requirement}
            ]
        })
    }

    async fn flow(h: &Harness, name: &str) -> KeycloakAuthFlow {
        h.store
            .get_object::<KeycloakAuthFlow>("ns", name)
            .await
            .unwrap()
    }

    fn level0(h: &Harness, alias: &str) -> Vec<(String, String)> {
        let state = h.fake.realm_state("team").unwrap();
        let id = state.flow_by_alias(alias).unwrap().id.clone().unwrap();
        state
            .executions
            .iter()
            .filter(|e| e.parent_flow == id)
            .map(|e| (e.info.display_name.clone(), e.info.requirement.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_flow_converges_then_stays_quiet() {
        let h = harness().await;
        seed(&h.store, "KeycloakAuthFlow", "browser-2fa", browser_2fa("REQUIRED")).await;
        let reconciler = AuthFlowReconciler::new(h.ctx.clone());
        let key = ObjectKey::new("ns", "browser-2fa");

        reconciler.reconcile(&key).await;
        let stored = flow(&h, "browser-2fa").await;
        assert_eq!(stored.status.value, StatusValue::Ok);
        let state = h.fake.realm_state("team").unwrap();
        let remote = state.flow_by_alias("browser-2fa").unwrap();
        assert_eq!(stored.status.id, remote.id);
        assert!(remote.top_level);
        assert_eq!(
            level0(&h, "browser-2fa"),
            vec![
                ("auth-cookie".to_string(), "ALTERNATIVE".to_string()),
                ("identity-provider-redirector".to_string(), "ALTERNATIVE".to_string()),
                ("auth-otp-form".to_string(), "REQUIRED".to_string()),
            ]
        );
        let config = state.authenticator_configs.values().next().unwrap();
        assert_eq!(config.alias, "to-github");
        assert_eq!(config.config["defaultProvider"], "github");

        h.fake.clear_calls();
        reconciler.reconcile(&key).await;
        assert!(h.fake.mutating_calls().is_empty(), "{:?}", h.fake.mutating_calls());
    }

    #[tokio::test]
    async fn test_changed_requirement_rebuilds_executions() {
        let h = harness().await;
        seed(&h.store, "KeycloakAuthFlow", "browser-2fa", browser_2fa("REQUIRED")).await;
        let reconciler = AuthFlowReconciler::new(h.ctx.clone());
        let key = ObjectKey::new("ns", "browser-2fa");
        reconciler.reconcile(&key).await;

        let mut stored = flow(&h, "browser-2fa").await;
        stored.spec.authentication_executions[2].requirement = "CONDITIONAL".to_string();
        h.store.update_object(&stored).await.unwrap();
        reconciler.reconcile(&key).await;

        let executions = level0(&h, "browser-2fa");
        assert_eq!(executions.len(), 3);
        assert_eq!(executions[2], ("auth-otp-form".to_string(), "CONDITIONAL".to_string()));
        assert_eq!(h.fake.realm_state("team").unwrap().authenticator_configs.len(), 1);
    }

    #[tokio::test]
    async fn test_child_flow_is_nested_under_its_parent() {
        let h = harness().await;
        seed(
            &h.store,
            "KeycloakAuthFlow",
            "parent",
            json!({
                "alias": "parent",
                "realmRef": realm_ref(),
                "providerId": "basic-flow",
                "topLevel": true,
                "authenticationExecutions": [
                    {"authenticatorFlow": true, "alias": "forms", "priority": 0, "requirement": "ALTERNATIVE"}
                ]
            }),
        )
        .await;
        seed(
            &h.store,
            "KeycloakAuthFlow",
            "forms",
            json!({
                "alias": "forms",
                "realmRef": realm_ref(),
                "providerId": "basic-flow",
                "parentName": "parent",
                "childRequirement": "REQUIRED",
                "authenticationExecutions": [
                    {"authenticator": "auth-username-password-form", "priority": 0, "requirement": "REQUIRED"}
                ]
            }),
        )
        .await;
        let reconciler = AuthFlowReconciler::new(h.ctx.clone());
        let parent = ObjectKey::new("ns", "parent");
        let child = ObjectKey::new("ns", "forms");

        reconciler.reconcile(&parent).await;
        assert_eq!(
            flow(&h, "parent").await.status.value,
            StatusValue::Error("child flow forms of parent is not created yet".to_string())
        );

        reconciler.reconcile(&child).await;
        assert_eq!(flow(&h, "forms").await.status.value, StatusValue::Ok);
        assert_eq!(
            level0(&h, "parent"),
            vec![("forms".to_string(), "REQUIRED".to_string())]
        );
        assert_eq!(
            level0(&h, "forms"),
            vec![("auth-username-password-form".to_string(), "REQUIRED".to_string())]
        );

        reconciler.reconcile(&parent).await;
        assert_eq!(flow(&h, "parent").await.status.value, StatusValue::Ok);
        assert_eq!(
            level0(&h, "parent"),
            vec![("forms".to_string(), "ALTERNATIVE".to_string())]
        );

        let stored = flow(&h, "forms").await;
        h.store.delete_object(&stored).await.unwrap();
        assert_eq!(reconciler.reconcile(&child).await, Action::Done);
        let state = h.fake.realm_state("team").unwrap();
        assert!(state.flow_by_alias("forms").is_none());
        assert!(state.flow_by_alias("parent").is_some());
    }

    #[tokio::test]
    async fn test_undeclared_child_flow_fails() {
        let h = harness().await;
        seed(&h.store, "KeycloakAuthFlow", "browser-2fa", browser_2fa("REQUIRED")).await;
        let reconciler = AuthFlowReconciler::new(h.ctx.clone());
        let key = ObjectKey::new("ns", "browser-2fa");
        reconciler.reconcile(&key).await;
        h.fake
            .add_child_flow(
                "team",
                "browser-2fa",
                &ChildFlowRepresentation {
                    alias: "stray".to_string(),
                    flow_type: DEFAULT_CHILD_TYPE.to_string(),
                    description: String::new(),
                    provider: None,
                },
            )
            .await
            .unwrap();

        reconciler.reconcile(&key).await;
        assert_eq!(
            flow(&h, "browser-2fa").await.status.value,
            StatusValue::Error("unable to find child flow with name: stray".to_string())
        );
    }

    #[tokio::test]
    async fn test_deleting_bound_flow_rebinds_browser_flow() {
        let h = harness().await;
        seed(&h.store, "KeycloakAuthFlow", "browser-2fa", browser_2fa("REQUIRED")).await;
        let reconciler = AuthFlowReconciler::new(h.ctx.clone());
        let key = ObjectKey::new("ns", "browser-2fa");
        reconciler.reconcile(&key).await;
        h.fake.bind_browser_flow("team", "browser-2fa");

        let stored = flow(&h, "browser-2fa").await;
        h.store.delete_object(&stored).await.unwrap();
        assert_eq!(reconciler.reconcile(&key).await, Action::Done);

        let state = h.fake.realm_state("team").unwrap();
        assert!(state.flow_by_alias("browser-2fa").is_none());
        assert_ne!(state.rep.browser_flow.as_deref(), Some("browser-2fa"));
        assert!(state.rep.browser_flow.is_some());
    }
}
