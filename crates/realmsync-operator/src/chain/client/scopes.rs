use async_trait::async_trait;
use realmsync_core::kinds::{KeycloakClient, ProtocolMapper, ReconciliationStrategy};
use realmsync_keycloak::models::{ClientScopeRepresentation, ProtocolMapperRepresentation};
use realmsync_keycloak::{ApiResult, KeycloakApi};
use tracing::{debug, info};

use super::remote_id;
use crate::chain::{Flow, Step, StepContext};
use crate::error::{ReconcileError, ReconcileResult};
use crate::terminators::tolerate_missing;

const DEFAULT_PROTOCOL: &str = "openid-connect";

/// Whether a scope is always applied to the client's tokens or only on
/// request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeBinding {
    Default,
    Optional,
}

impl ScopeBinding {
    fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Optional => "optional",
        }
    }

    fn declared(self, client: &KeycloakClient) -> &[String] {
        match self {
            Self::Default => &client.spec.default_client_scopes,
            Self::Optional => &client.spec.optional_client_scopes,
        }
    }

    async fn attached(
        self,
        api: &dyn KeycloakApi,
        realm: &str,
        client: &str,
    ) -> ApiResult<Vec<ClientScopeRepresentation>> {
        match self {
            Self::Default => api.list_client_default_scopes(realm, client).await,
            Self::Optional => api.list_client_optional_scopes(realm, client).await,
        }
    }

    async fn attach(
        self,
        api: &dyn KeycloakApi,
        realm: &str,
        client: &str,
        scope_id: &str,
    ) -> ApiResult<()> {
        match self {
            Self::Default => api.add_client_default_scope(realm, client, scope_id).await,
            Self::Optional => api.add_client_optional_scope(realm, client, scope_id).await,
        }
    }
}

/// Attaches the declared default and optional client scopes. Scopes attached
/// by other means are left in place.
pub struct PutClientScope;

#[async_trait]
impl Step<KeycloakClient> for PutClientScope {
    fn name(&self) -> &'static str {
        "put_client_scope"
    }

    async fn serve(
        &self,
        ctx: &StepContext,
        client: &mut KeycloakClient,
        api: &dyn KeycloakApi,
    ) -> ReconcileResult<Flow> {
        let bindings: Vec<ScopeBinding> = [ScopeBinding::Default, ScopeBinding::Optional]
            .into_iter()
            .filter(|b| !b.declared(client).is_empty())
            .collect();
        if bindings.is_empty() {
            return Ok(Flow::Continue);
        }
        let id = remote_id(client)?;
        let realm = ctx.realm.as_str();
        let all = api.list_client_scopes(realm).await?;

        for binding in bindings {
            let attached = binding.attached(api, realm, &id).await?;
            for name in binding.declared(client) {
                let scope_id = all
                    .iter()
                    .find(|s| &s.name == name)
                    .and_then(|s| s.id.clone())
                    .ok_or_else(|| {
                        ReconcileError::validation(format!("client scope {name} does not exist"))
                    })?;
                if attached.iter().any(|s| s.id.as_deref() == Some(scope_id.as_str())) {
                    continue;
                }
                info!(
                    realm,
                    client_id = %client.spec.client_id,
                    scope = %name,
                    binding = binding.as_str(),
                    "Attaching client scope"
                );
                binding.attach(api, realm, &id, &scope_id).await?;
            }
        }
        Ok(Flow::Continue)
    }
}

/// Makes the client's protocol mappers match the declared ones by name.
pub struct PutProtocolMappers;

#[async_trait]
impl Step<KeycloakClient> for PutProtocolMappers {
    fn name(&self) -> &'static str {
        "put_protocol_mappers"
    }

    async fn serve(
        &self,
        ctx: &StepContext,
        client: &mut KeycloakClient,
        api: &dyn KeycloakApi,
    ) -> ReconcileResult<Flow> {
        let id = remote_id(client)?;
        let realm = ctx.realm.as_str();
        let spec = &client.spec;

        let remote = api.list_protocol_mappers(realm, &id).await?;
        let declared: Vec<ProtocolMapperRepresentation> =
            spec.protocol_mappers.iter().map(mapper_representation).collect();

        for mapper in &declared {
            match remote.iter().find(|r| r.name == mapper.name) {
                None => {
                    info!(realm, client_id = %spec.client_id, mapper = %mapper.name, "Creating protocol mapper");
                    api.create_protocol_mapper(realm, &id, mapper).await?;
                }
                Some(current) if !current.same_definition(mapper) => {
                    info!(realm, client_id = %spec.client_id, mapper = %mapper.name, "Updating protocol mapper");
                    let update = ProtocolMapperRepresentation {
                        id: current.id.clone(),
                        ..mapper.clone()
                    };
                    api.update_protocol_mapper(realm, &id, &update).await?;
                }
                Some(_) => debug!(mapper = %mapper.name, "Protocol mapper up to date"),
            }
        }

        if spec.reconciliation_strategy == ReconciliationStrategy::Full {
            let stale = remote
                .iter()
                .filter(|r| !declared.iter().any(|d| d.name == r.name));
            for mapper in stale {
                let Some(mapper_id) = &mapper.id else {
                    continue;
                };
                info!(realm, client_id = %spec.client_id, mapper = %mapper.name, "Deleting protocol mapper");
                tolerate_missing(
                    api.delete_protocol_mapper(realm, &id, mapper_id).await,
                    &mapper.name,
                )?;
            }
        }
        Ok(Flow::Continue)
    }
}

fn mapper_representation(mapper: &ProtocolMapper) -> ProtocolMapperRepresentation {
    let protocol = if mapper.protocol.is_empty() {
        DEFAULT_PROTOCOL.to_string()
    } else {
        mapper.protocol.clone()
    };
    ProtocolMapperRepresentation {
        id: None,
        name: mapper.name.clone(),
        protocol,
        protocol_mapper: mapper.protocol_mapper.clone(),
        config: mapper.config.clone(),
    }
}
