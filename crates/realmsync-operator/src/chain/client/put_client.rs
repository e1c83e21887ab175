use async_trait::async_trait;
use realmsync_core::kinds::{KeycloakClient, KeycloakClientSpec};
use realmsync_core::names::{SECRET_CLIENT_SECRET_KEY, generated_client_secret_name};
use realmsync_core::{Resource, Secret, SecretKeySelector};
use realmsync_keycloak::models::ClientRepresentation;
use realmsync_keycloak::{ApiError, KeycloakApi};
use tracing::{debug, info};

use crate::chain::{Flow, Step, StepContext, generate_secret};
use crate::error::ReconcileResult;
use crate::secretref;

/// Creates or updates the client and records its server id in the status.
///
/// Confidential clients without a declared secret get a generated one, stored
/// in a secret owned by the client and written back to `spec.secret`.
pub struct PutClient;

#[async_trait]
impl Step<KeycloakClient> for PutClient {
    fn name(&self) -> &'static str {
        "put_client"
    }

    async fn serve(
        &self,
        ctx: &StepContext,
        client: &mut KeycloakClient,
        api: &dyn KeycloakApi,
    ) -> ReconcileResult<Flow> {
        let secret = client_secret(ctx, client).await?;
        let declared = client_representation(&client.spec, secret);
        let realm = ctx.realm.as_str();

        let id = match api.get_client(realm, &client.spec.client_id).await? {
            Some(remote) => {
                let id = remote
                    .id
                    .clone()
                    .ok_or_else(|| ApiError::unexpected("client has no id"))?;
                let desired = merge_remote(declared, &remote);
                if desired == remote {
                    debug!(realm, client_id = %remote.client_id, "Client up to date");
                } else {
                    info!(realm, client_id = %remote.client_id, "Updating client");
                    api.update_client(realm, &desired).await?;
                }
                id
            }
            None => {
                info!(realm, client_id = %declared.client_id, "Creating client");
                api.create_client(realm, &declared).await?
            }
        };

        if client.status.id.as_deref() != Some(id.as_str()) {
            client.status.id = Some(id);
            *client = ctx.store.update_object_status(client).await?;
        }
        Ok(Flow::Continue)
    }
}

/// Secret value for confidential clients, `None` for public ones.
///
/// A `spec.secret` holding a bare secret name predates references and is
/// rewritten to `$name:clientSecret` before being resolved.
async fn client_secret(
    ctx: &StepContext,
    client: &mut KeycloakClient,
) -> ReconcileResult<Option<String>> {
    if client.spec.public {
        return Ok(None);
    }
    let namespace = client.namespace().to_string();

    if !client.spec.secret.is_empty() {
        if !secretref::has_secret_ref(&client.spec.secret) {
            info!(secret = %client.spec.secret, "Converting client secret to a reference");
            client.spec.secret = secretref::secret_ref(&client.spec.secret, SECRET_CLIENT_SECRET_KEY);
            *client = ctx.store.update_object(client).await?;
        }
        return secretref::resolve(&ctx.store, &namespace, &client.spec.secret)
            .await
            .map(Some);
    }

    let name = generated_client_secret_name(client.name());
    if ctx.store.try_get_object::<Secret>(&namespace, &name).await?.is_none() {
        info!(secret = %name, "Generating client secret");
        let secret = Secret::new(&namespace, &name)
            .with_entry(SECRET_CLIENT_SECRET_KEY, generate_secret())
            .with_owner(client.owner_reference());
        ctx.store.create_object(&secret).await?;
    }
    let selector = SecretKeySelector {
        name: name.clone(),
        key: SECRET_CLIENT_SECRET_KEY.to_string(),
    };
    let value = secretref::secret_key(&ctx.store, &namespace, &selector).await?;

    client.spec.secret = secretref::secret_ref(&name, SECRET_CLIENT_SECRET_KEY);
    *client = ctx.store.update_object(client).await?;
    client.status.client_secret_name = Some(name);
    *client = ctx.store.update_object_status(client).await?;
    Ok(Some(value))
}

fn client_representation(spec: &KeycloakClientSpec, secret: Option<String>) -> ClientRepresentation {
    let web_url = Some(spec.web_url.clone()).filter(|u| !u.is_empty());
    let redirect_uris = match (&web_url, spec.redirect_uris.is_empty()) {
        (Some(url), true) => vec![format!("{}/*", url.trim_end_matches('/'))],
        _ => spec.redirect_uris.clone(),
    };

    ClientRepresentation {
        id: None,
        client_id: spec.client_id.clone(),
        secret,
        enabled: spec.is_enabled(),
        public_client: spec.public,
        direct_access_grants_enabled: spec.direct_access,
        service_accounts_enabled: spec.service_account_enabled(),
        authorization_services_enabled: spec.authorization_services_enabled,
        frontchannel_logout: spec.front_channel_logout,
        web_origins: web_url.iter().cloned().collect(),
        root_url: web_url,
        redirect_uris,
        protocol: spec.protocol.clone(),
        attributes: spec.attributes.clone(),
    }
}

/// Declared fields win; server-side attributes and protocol the client does
/// not declare are kept so an unchanged client compares equal.
fn merge_remote(declared: ClientRepresentation, remote: &ClientRepresentation) -> ClientRepresentation {
    let mut attributes = remote.attributes.clone();
    attributes.extend(declared.attributes);
    ClientRepresentation {
        id: remote.id.clone(),
        protocol: declared.protocol.or_else(|| remote.protocol.clone()),
        attributes,
        ..declared
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn test_web_url_fills_redirects_and_origins() {
        let spec = KeycloakClientSpec {
            client_id: "portal".into(),
            web_url: "https://portal.example/".into(),
            ..Default::default()
        };
        let rep = client_representation(&spec, Some("s3cr3t".into()));

        assert_eq!(rep.root_url.as_deref(), Some("https://portal.example/"));
        assert_eq!(rep.redirect_uris, vec!["https://portal.example/*"]);
        assert_eq!(rep.web_origins, vec!["https://portal.example/"]);
        assert!(rep.enabled);
        assert_eq!(rep.secret.as_deref(), Some("s3cr3t"));
    }

    #[test]
    fn test_explicit_redirects_win() {
        let spec = KeycloakClientSpec {
            client_id: "portal".into(),
            web_url: "https://portal.example".into(),
            redirect_uris: vec!["https://portal.example/callback".into()],
            enabled: Some(false),
            ..Default::default()
        };
        let rep = client_representation(&spec, None);
        assert_eq!(rep.redirect_uris, vec!["https://portal.example/callback"]);
        assert!(!rep.enabled);
    }

    #[test]
    fn test_merge_keeps_undeclared_remote_attributes() {
        let declared = ClientRepresentation {
            client_id: "portal".into(),
            attributes: BTreeMap::from([("pkce.code.challenge.method".into(), "S256".into())]),
            ..Default::default()
        };
        let remote = ClientRepresentation {
            id: Some("c-1".into()),
            client_id: "portal".into(),
            protocol: Some("openid-connect".into()),
            attributes: BTreeMap::from([
                ("pkce.code.challenge.method".into(), "plain".into()),
                ("backchannel.logout.session.required".into(), "true".into()),
            ]),
            ..Default::default()
        };

        let merged = merge_remote(declared, &remote);
        assert_eq!(merged.id.as_deref(), Some("c-1"));
        assert_eq!(merged.protocol.as_deref(), Some("openid-connect"));
        assert_eq!(merged.attributes["pkce.code.challenge.method"], "S256");
        assert_eq!(merged.attributes["backchannel.logout.session.required"], "true");
    }
}
