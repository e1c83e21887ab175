//! Steps that wire a realm to the central SSO realm.
//!
//! Each of them passes straight through when SSO is disabled on the realm.

use std::collections::BTreeMap;

use async_trait::async_trait;
use realmsync_core::kinds::{
    IdentityProviderMapperSpec, KeycloakClient, KeycloakClientSpec, KeycloakRealm,
};
use realmsync_core::names::{
    OPENID_CONFIGURATION_ANNOTATION, SECRET_CLIENT_SECRET_KEY, realm_sso_client_secret_name,
};
use realmsync_core::{ObjectMeta, OwnerReference, Resource, Secret, Status};
use realmsync_keycloak::KeycloakApi;
use realmsync_keycloak::models::{
    IdentityProviderMapperRepresentation, IdentityProviderRepresentation,
};
use tracing::{debug, info};

use crate::chain::{Flow, Step, StepContext, generate_secret};
use crate::error::{ReconcileError, ReconcileResult};
use crate::secretref;

const CENTRAL_PROVIDER_ID: &str = "keycloak-oidc";

/// Declares the client the realm uses to log in through the SSO realm.
pub struct PutKeycloakClientCr;

#[async_trait]
impl Step<KeycloakRealm> for PutKeycloakClientCr {
    fn name(&self) -> &'static str {
        "put_keycloak_client_cr"
    }

    async fn serve(
        &self,
        ctx: &StepContext,
        realm: &mut KeycloakRealm,
        _api: &dyn KeycloakApi,
    ) -> ReconcileResult<Flow> {
        if !realm.spec.sso_enabled() {
            return Ok(Flow::Continue);
        }
        let name = realm.spec.realm_name.clone();
        if ctx
            .store
            .try_get_object::<KeycloakClient>(realm.namespace(), &name)
            .await?
            .is_some()
        {
            debug!(client = %name, "SSO client already declared");
            return Ok(Flow::Continue);
        }

        info!(client = %name, sso_realm = %realm.spec.sso_realm_name, "Declaring SSO client");
        let mut metadata = ObjectMeta::new(realm.namespace(), &name);
        // The client lives in the SSO realm, this realm only bounds its lifetime.
        metadata.owner_references.push(OwnerReference {
            controller: false,
            ..realm.owner_reference()
        });
        let client = KeycloakClient {
            metadata,
            spec: KeycloakClientSpec {
                client_id: name.clone(),
                target_realm: realm.spec.sso_realm_name.clone(),
                secret: secretref::secret_ref(
                    &realm_sso_client_secret_name(&name),
                    SECRET_CLIENT_SECRET_KEY,
                ),
                client_roles: realm.spec.user_realm_roles(),
                ..Default::default()
            },
            status: Status::default(),
        };
        ctx.store.create_object(&client).await?;
        Ok(Flow::Continue)
    }
}

/// Generates the secret of the SSO client.
pub struct PutKeycloakClientSecret;

#[async_trait]
impl Step<KeycloakRealm> for PutKeycloakClientSecret {
    fn name(&self) -> &'static str {
        "put_keycloak_client_secret"
    }

    async fn serve(
        &self,
        ctx: &StepContext,
        realm: &mut KeycloakRealm,
        _api: &dyn KeycloakApi,
    ) -> ReconcileResult<Flow> {
        if !realm.spec.sso_enabled() {
            return Ok(Flow::Continue);
        }
        let namespace = realm.namespace();
        let secret_name = realm_sso_client_secret_name(&realm.spec.realm_name);
        if ctx
            .store
            .try_get_object::<Secret>(namespace, &secret_name)
            .await?
            .is_some()
        {
            return Ok(Flow::Continue);
        }

        let client = ctx
            .store
            .get_object::<KeycloakClient>(namespace, &realm.spec.realm_name)
            .await?;
        info!(secret = %secret_name, "Generating SSO client secret");
        let secret = Secret::new(namespace, &secret_name)
            .with_entry(SECRET_CLIENT_SECRET_KEY, generate_secret())
            .with_owner(client.owner_reference());
        ctx.store.create_object(&secret).await?;
        Ok(Flow::Continue)
    }
}

/// Publishes the realm's OpenID discovery document as an annotation.
pub struct PutOpenIdConfigAnnotation;

#[async_trait]
impl Step<KeycloakRealm> for PutOpenIdConfigAnnotation {
    fn name(&self) -> &'static str {
        "put_openid_config_annotation"
    }

    async fn serve(
        &self,
        ctx: &StepContext,
        realm: &mut KeycloakRealm,
        api: &dyn KeycloakApi,
    ) -> ReconcileResult<Flow> {
        if !realm.spec.sso_enabled() {
            return Ok(Flow::Continue);
        }
        let config = api.get_openid_configuration(&realm.spec.realm_name).await?;
        if realm.metadata.annotations.get(OPENID_CONFIGURATION_ANNOTATION) == Some(&config) {
            return Ok(Flow::Continue);
        }

        debug!(realm = %realm.spec.realm_name, "Updating openid-configuration annotation");
        realm
            .metadata
            .annotations
            .insert(OPENID_CONFIGURATION_ANNOTATION.to_string(), config);
        *realm = ctx.store.update_object(realm).await?;
        Ok(Flow::Continue)
    }
}

/// Registers the SSO realm as an identity provider of the realm.
pub struct PutIdentityProvider;

#[async_trait]
impl Step<KeycloakRealm> for PutIdentityProvider {
    fn name(&self) -> &'static str {
        "put_identity_provider"
    }

    async fn serve(
        &self,
        ctx: &StepContext,
        realm: &mut KeycloakRealm,
        api: &dyn KeycloakApi,
    ) -> ReconcileResult<Flow> {
        if !realm.spec.sso_enabled() {
            return Ok(Flow::Continue);
        }
        let realm_name = realm.spec.realm_name.as_str();
        let alias = realm.spec.sso_realm_name.as_str();
        if alias.is_empty() {
            return Err(ReconcileError::validation(
                "ssoRealmName is required when SSO is enabled",
            ));
        }

        if api.get_identity_provider(realm_name, alias).await?.is_none() {
            let client = ctx
                .store
                .get_object::<KeycloakClient>(realm.namespace(), realm_name)
                .await?;
            let reference = if secretref::has_secret_ref(&client.spec.secret) {
                client.spec.secret.clone()
            } else {
                secretref::secret_ref(&client.spec.secret, SECRET_CLIENT_SECRET_KEY)
            };
            let client_secret = secretref::resolve(&ctx.store, realm.namespace(), &reference).await?;

            info!(realm = %realm_name, alias, "Creating SSO identity provider");
            let idp = central_identity_provider(
                &ctx.keycloak.spec.url,
                alias,
                &client.spec.client_id,
                &client_secret,
            );
            api.create_identity_provider(realm_name, &idp).await?;
        }

        let mappers = mapper_representations(alias, &realm.spec.sso_realm_mappers);
        sync_identity_provider_mappers(api, realm_name, alias, &mappers).await?;
        Ok(Flow::Continue)
    }
}

/// Makes the SSO identity provider the one the browser flow redirects to.
pub struct PutDefaultIdp;

#[async_trait]
impl Step<KeycloakRealm> for PutDefaultIdp {
    fn name(&self) -> &'static str {
        "put_default_idp"
    }

    async fn serve(
        &self,
        _ctx: &StepContext,
        realm: &mut KeycloakRealm,
        api: &dyn KeycloakApi,
    ) -> ReconcileResult<Flow> {
        if !realm.spec.sso_enabled() || !realm.spec.sso_auto_redirect_enabled() {
            return Ok(Flow::Continue);
        }
        let realm_name = realm.spec.realm_name.as_str();
        let alias = realm.spec.sso_realm_name.as_str();
        let current = api.get_default_identity_provider(realm_name).await?;
        if current.as_deref() != Some(alias) {
            info!(realm = %realm_name, alias, "Setting default identity provider");
            api.set_default_identity_provider(realm_name, alias).await?;
        }
        Ok(Flow::Continue)
    }
}

fn central_identity_provider(
    keycloak_url: &str,
    sso_realm: &str,
    client_id: &str,
    client_secret: &str,
) -> IdentityProviderRepresentation {
    let base = format!(
        "{}/realms/{sso_realm}",
        keycloak_url.trim_end_matches('/')
    );
    let endpoint = |path: &str| format!("{base}/protocol/openid-connect/{path}");
    let config = BTreeMap::from([
        ("authorizationUrl".to_string(), endpoint("auth")),
        ("tokenUrl".to_string(), endpoint("token")),
        ("logoutUrl".to_string(), endpoint("logout")),
        ("userInfoUrl".to_string(), endpoint("userinfo")),
        ("issuer".to_string(), base.clone()),
        ("clientId".to_string(), client_id.to_string()),
        ("clientSecret".to_string(), client_secret.to_string()),
        ("clientAuthMethod".to_string(), "client_secret_post".to_string()),
        ("defaultScope".to_string(), "openid".to_string()),
    ]);

    IdentityProviderRepresentation {
        alias: sso_realm.to_string(),
        internal_id: None,
        provider_id: CENTRAL_PROVIDER_ID.to_string(),
        enabled: true,
        display_name: None,
        trust_email: false,
        first_broker_login_flow_alias: None,
        config,
    }
}

pub(crate) fn mapper_representations(
    alias: &str,
    mappers: &[IdentityProviderMapperSpec],
) -> Vec<IdentityProviderMapperRepresentation> {
    mappers
        .iter()
        .map(|m| IdentityProviderMapperRepresentation {
            id: None,
            name: m.name.clone(),
            identity_provider_alias: alias.to_string(),
            identity_provider_mapper: m.identity_provider_mapper.clone(),
            config: m.config.clone(),
        })
        .collect()
}

/// Replaces the mappers of `alias` with `declared` unless they already match.
///
/// Returns `true` when the remote list was rewritten.
pub(crate) async fn sync_identity_provider_mappers(
    api: &dyn KeycloakApi,
    realm: &str,
    alias: &str,
    declared: &[IdentityProviderMapperRepresentation],
) -> ReconcileResult<bool> {
    let current = api.list_identity_provider_mappers(realm, alias).await?;
    let in_sync = current.len() == declared.len()
        && declared
            .iter()
            .all(|d| current.iter().any(|c| c.same_definition(d)));
    if in_sync {
        debug!(realm, alias, "Identity provider mappers up to date");
        return Ok(false);
    }

    info!(realm, alias, count = declared.len(), "Recreating identity provider mappers");
    for mapper in &current {
        if let Some(id) = mapper.id.as_deref() {
            api.delete_identity_provider_mapper(realm, alias, id).await?;
        }
    }
    for mapper in declared {
        api.create_identity_provider_mapper(realm, alias, mapper)
            .await?;
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use realmsync_keycloak::testing::FakeKeycloak;

    fn mapper(name: &str, claim: &str) -> IdentityProviderMapperRepresentation {
        IdentityProviderMapperRepresentation {
            id: None,
            name: name.to_string(),
            identity_provider_alias: "openshift".to_string(),
            identity_provider_mapper: "oidc-user-attribute-idp-mapper".to_string(),
            config: BTreeMap::from([("claim".to_string(), claim.to_string())]),
        }
    }

    #[test]
    fn test_central_identity_provider_endpoints() {
        let idp = central_identity_provider("https://kc.example/", "openshift", "team", "s3cr3t");
        assert_eq!(idp.alias, "openshift");
        assert_eq!(idp.provider_id, "keycloak-oidc");
        assert_eq!(
            idp.config["tokenUrl"],
            "https://kc.example/realms/openshift/protocol/openid-connect/token"
        );
        assert_eq!(idp.config["clientId"], "team");
        assert_eq!(idp.config["clientSecret"], "s3cr3t");
    }

    #[tokio::test]
    async fn test_mapper_sync_rewrites_only_on_difference() {
        let fake = Arc::new(FakeKeycloak::with_realm("team"));
        fake.create_identity_provider(
            "team",
            &central_identity_provider("https://kc", "openshift", "team", "s"),
        )
        .await
        .unwrap();

        let declared = vec![mapper("email", "email"), mapper("name", "preferred_username")];
        assert!(
            sync_identity_provider_mappers(fake.as_ref(), "team", "openshift", &declared)
                .await
                .unwrap()
        );
        fake.clear_calls();
        assert!(
            !sync_identity_provider_mappers(fake.as_ref(), "team", "openshift", &declared)
                .await
                .unwrap()
        );
        assert!(fake.mutating_calls().is_empty());

        let changed = vec![mapper("email", "mail")];
        sync_identity_provider_mappers(fake.as_ref(), "team", "openshift", &changed)
            .await
            .unwrap();
        let stored = fake.realm_state("team").unwrap().identity_provider_mappers["openshift"].clone();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].config["claim"], "mail");
    }
}
