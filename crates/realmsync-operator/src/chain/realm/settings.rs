//! Read-modify-write steps for realm-wide settings.
//!
//! Every step reads the current remote value, applies only what the realm
//! declares and writes back only when something changed.

use std::collections::BTreeMap;

use async_trait::async_trait;
use realmsync_core::Resource;
use realmsync_core::kinds::{
    KeycloakRealm, KeycloakRealmSpec, NamedEntry, RealmEventConfig, SmtpSettings,
};
use realmsync_keycloak::models::{RealmEventsConfig, RealmRepresentation};
use realmsync_keycloak::{ApiError, KeycloakApi};
use realmsync_storage::DynStore;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::chain::{Flow, Step, StepContext};
use crate::error::ReconcileResult;
use crate::secretref;

const FRONTEND_URL_ATTRIBUTE: &str = "frontendUrl";

async fn remote_realm(api: &dyn KeycloakApi, name: &str) -> ReconcileResult<RealmRepresentation> {
    Ok(api
        .get_realm(name)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("realm {name}")))?)
}

/// Events configuration, themes, security headers, password policy,
/// brute-force detection, display name, frontend URL and SMTP server.
pub struct RealmSettings;

#[async_trait]
impl Step<KeycloakRealm> for RealmSettings {
    fn name(&self) -> &'static str {
        "realm_settings"
    }

    async fn serve(
        &self,
        ctx: &StepContext,
        realm: &mut KeycloakRealm,
        api: &dyn KeycloakApi,
    ) -> ReconcileResult<Flow> {
        let spec = &realm.spec;
        let name = spec.realm_name.as_str();

        if let Some(events) = &spec.realm_event_config {
            let desired = events_config(events);
            if api.get_realm_events_config(name).await? != desired {
                info!(realm = %name, "Updating realm events configuration");
                api.update_realm_events_config(name, &desired).await?;
            }
        }

        if !spec.has_extra_settings() {
            return Ok(Flow::Continue);
        }

        let smtp = match &spec.smtp {
            Some(smtp) => Some(smtp_server(&ctx.store, realm.namespace(), smtp).await?),
            None => None,
        };
        let current = remote_realm(api, name).await?;
        let mut desired = current.clone();
        apply_settings(spec, &mut desired);
        if smtp.is_some() {
            desired.smtp_server = smtp;
        }
        if desired == current {
            debug!(realm = %name, "Realm settings up to date");
        } else {
            info!(realm = %name, "Updating realm settings");
            api.update_realm(&desired).await?;
        }
        Ok(Flow::Continue)
    }
}

fn events_config(events: &RealmEventConfig) -> RealmEventsConfig {
    RealmEventsConfig {
        admin_events_details_enabled: events.admin_events_details_enabled,
        admin_events_enabled: events.admin_events_enabled,
        enabled_event_types: events.enabled_event_types.clone(),
        events_enabled: events.events_enabled,
        events_expiration: Some(events.events_expiration).filter(|e| *e > 0),
        events_listeners: events.events_listeners.clone(),
    }
}

/// The realm's `smtpServer` map. Credentials are read from secrets.
async fn smtp_server(
    store: &DynStore,
    namespace: &str,
    smtp: &SmtpSettings,
) -> ReconcileResult<BTreeMap<String, String>> {
    let template = &smtp.template;
    let connection = &smtp.connection;
    let mut server = BTreeMap::from([
        ("from".to_string(), template.from.clone()),
        ("fromDisplayName".to_string(), template.from_display_name.clone()),
        ("replyTo".to_string(), template.reply_to.clone()),
        ("replyToDisplayName".to_string(), template.reply_to_display_name.clone()),
        ("envelopeFrom".to_string(), template.envelope_from.clone()),
        ("host".to_string(), connection.host.clone()),
        ("port".to_string(), connection.port.to_string()),
        ("ssl".to_string(), connection.enable_ssl.to_string()),
        ("starttls".to_string(), connection.enable_start_tls.to_string()),
        ("auth".to_string(), connection.authentication.is_some().to_string()),
    ]);
    if let Some(auth) = &connection.authentication {
        let user = secretref::value_or_secret(store, namespace, &auth.username).await?;
        let password = secretref::secret_key(store, namespace, &auth.password).await?;
        server.insert("user".to_string(), user);
        server.insert("password".to_string(), password);
    }
    Ok(server)
}

/// `type(value) and type(value) ...`
fn password_policy(spec: &KeycloakRealmSpec) -> Option<String> {
    if spec.password_policies.is_empty() {
        return None;
    }
    let parts: Vec<String> = spec
        .password_policies
        .iter()
        .map(|p| format!("{}({})", p.policy_type, p.value))
        .collect();
    Some(parts.join(" and "))
}

fn apply_settings(spec: &KeycloakRealmSpec, rep: &mut RealmRepresentation) {
    if let Some(themes) = &spec.themes {
        let set = |target: &mut Option<String>, value: &Option<String>| {
            if value.is_some() {
                target.clone_from(value);
            }
        };
        set(&mut rep.login_theme, &themes.login_theme);
        set(&mut rep.account_theme, &themes.account_theme);
        set(&mut rep.admin_theme, &themes.admin_console_theme);
        set(&mut rep.email_theme, &themes.email_theme);
        if themes.internationalization_enabled.is_some() {
            rep.internationalization_enabled = themes.internationalization_enabled;
        }
    }

    if let Some(headers) = &spec.browser_security_headers {
        rep.browser_security_headers
            .get_or_insert_with(Default::default)
            .extend(headers.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    if let Some(policy) = password_policy(spec) {
        rep.password_policy = Some(policy);
    }

    if !spec.frontend_url.is_empty() {
        rep.attributes
            .insert(FRONTEND_URL_ATTRIBUTE.to_string(), spec.frontend_url.clone());
    }

    if !spec.display_name.is_empty() {
        rep.display_name = Some(spec.display_name.clone());
    }

    if let Some(bf) = &spec.brute_force {
        rep.brute_force_protected = Some(bf.enabled);
        rep.permanent_lockout = Some(bf.permanent_lockout);
        rep.max_failure_wait_seconds = Some(bf.max_failure_wait_seconds);
        rep.minimum_quick_login_wait_seconds = Some(bf.minimum_quick_login_wait_seconds);
        rep.wait_increment_seconds = Some(bf.wait_increment_seconds);
        rep.quick_login_check_milli_seconds = Some(bf.quick_login_check_milli_seconds);
        rep.max_delta_time_seconds = Some(bf.max_delta_time_seconds);
        rep.failure_factor = Some(bf.failure_factor);
    }
}

/// Merges declared attributes and groups into the realm's user profile.
/// Entries are matched by name; undeclared entries are kept.
pub struct UserProfile;

#[async_trait]
impl Step<KeycloakRealm> for UserProfile {
    fn name(&self) -> &'static str {
        "user_profile"
    }

    async fn serve(
        &self,
        _ctx: &StepContext,
        realm: &mut KeycloakRealm,
        api: &dyn KeycloakApi,
    ) -> ReconcileResult<Flow> {
        let Some(config) = &realm.spec.user_profile_config else {
            return Ok(Flow::Continue);
        };
        let name = realm.spec.realm_name.as_str();

        let current = api.get_user_profile(name).await?;
        let mut desired = current.clone();
        merge_named(&mut desired.attributes, &config.attributes);
        merge_named(&mut desired.groups, &config.groups);
        if config.unmanaged_attribute_policy.is_some() {
            desired
                .unmanaged_attribute_policy
                .clone_from(&config.unmanaged_attribute_policy);
        }

        if desired != current {
            info!(realm = %name, "Updating user profile");
            api.update_user_profile(name, &desired).await?;
        }
        Ok(Flow::Continue)
    }
}

fn merge_named(current: &mut Vec<Map<String, Value>>, declared: &[NamedEntry]) {
    for entry in declared {
        let mut object = entry.fields.clone();
        object.insert("name".to_string(), Value::String(entry.name.clone()));

        let existing = current
            .iter_mut()
            .find(|c| c.get("name").and_then(Value::as_str) == Some(entry.name.as_str()));
        match existing {
            Some(slot) => *slot = object,
            None => current.push(object),
        }
    }
}

/// Binds the realm's browser flow.
pub struct AuthFlow;

#[async_trait]
impl Step<KeycloakRealm> for AuthFlow {
    fn name(&self) -> &'static str {
        "auth_flow"
    }

    async fn serve(
        &self,
        _ctx: &StepContext,
        realm: &mut KeycloakRealm,
        api: &dyn KeycloakApi,
    ) -> ReconcileResult<Flow> {
        let Some(flow) = &realm.spec.browser_flow else {
            return Ok(Flow::Continue);
        };
        let name = realm.spec.realm_name.as_str();

        let mut rep = remote_realm(api, name).await?;
        if rep.browser_flow.as_ref() != Some(flow) {
            info!(realm = %name, flow = %flow, "Setting browser flow");
            rep.browser_flow = Some(flow.clone());
            api.update_realm(&rep).await?;
        }
        Ok(Flow::Continue)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::chain::test_support::step_context;
    use realmsync_core::Secret;
    use realmsync_core::kinds::{BruteForceSettings, PasswordPolicy, RealmThemes};
    use realmsync_db_memory::InMemoryStore;
    use realmsync_keycloak::testing::FakeKeycloak;
    use serde_json::json;

    fn entry(value: Value) -> NamedEntry {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_password_policy_format() {
        let spec = KeycloakRealmSpec {
            password_policies: vec![
                PasswordPolicy {
                    policy_type: "length".into(),
                    value: "8".into(),
                },
                PasswordPolicy {
                    policy_type: "digits".into(),
                    value: "1".into(),
                },
            ],
            ..Default::default()
        };
        assert_eq!(
            password_policy(&spec).as_deref(),
            Some("length(8) and digits(1)")
        );
        assert_eq!(password_policy(&KeycloakRealmSpec::default()), None);
    }

    #[test]
    fn test_apply_settings_touches_only_declared_fields() {
        let mut rep = RealmRepresentation::new("team");
        rep.login_theme = Some("base".into());
        rep.email_theme = Some("mail".into());
        rep.browser_security_headers = Some(BTreeMap::from([
            ("xFrameOptions".to_string(), "SAMEORIGIN".to_string()),
            ("xRobotsTag".to_string(), "none".to_string()),
        ]));

        let spec = KeycloakRealmSpec {
            realm_name: "team".into(),
            themes: Some(RealmThemes {
                login_theme: Some("keycloak".into()),
                ..Default::default()
            }),
            browser_security_headers: Some(BTreeMap::from([(
                "xFrameOptions".to_string(),
                "DENY".to_string(),
            )])),
            frontend_url: "https://sso.example".into(),
            brute_force: Some(BruteForceSettings {
                enabled: true,
                failure_factor: 5,
                ..Default::default()
            }),
            ..Default::default()
        };
        apply_settings(&spec, &mut rep);

        assert_eq!(rep.login_theme.as_deref(), Some("keycloak"));
        assert_eq!(rep.email_theme.as_deref(), Some("mail"));
        let headers = rep.browser_security_headers.unwrap();
        assert_eq!(headers["xFrameOptions"], "DENY");
        assert_eq!(headers["xRobotsTag"], "none");
        assert_eq!(rep.attributes["frontendUrl"], "https://sso.example");
        assert_eq!(rep.brute_force_protected, Some(true));
        assert_eq!(rep.failure_factor, Some(5));
        assert_eq!(rep.display_name, None);
    }

    #[test]
    fn test_merge_named_replaces_and_appends() {
        let mut current: Vec<Map<String, Value>> = vec![
            json!({"name": "username", "displayName": "Username"}),
            json!({"name": "email", "displayName": "Email"}),
        ]
        .into_iter()
        .map(|v| v.as_object().cloned().unwrap())
        .collect();

        merge_named(
            &mut current,
            &[
                entry(json!({"name": "email", "displayName": "E-mail"})),
                entry(json!({"name": "department", "multivalued": false})),
            ],
        );

        let names: Vec<_> = current
            .iter()
            .map(|c| c["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["username", "email", "department"]);
        assert_eq!(current[1]["displayName"], "E-mail");
        assert_eq!(current[0]["displayName"], "Username");
    }

    #[test]
    fn test_events_expiration_zero_is_unset() {
        let config = events_config(&RealmEventConfig {
            events_enabled: true,
            ..Default::default()
        });
        assert!(config.events_enabled);
        assert_eq!(config.events_expiration, None);
    }

    fn realm_with_smtp(smtp: Value) -> KeycloakRealm {
        serde_json::from_value(json!({
            "metadata": {"name": "team", "namespace": "ns"},
            "spec": {"realmName": "team", "smtp": smtp}
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_smtp_server_with_credentials_from_secret() {
        let store: DynStore = Arc::new(InMemoryStore::new());
        store
            .create_object(&Secret::new("ns", "smtp").with_entry("password", "m4il"))
            .await
            .unwrap();
        let fake = Arc::new(FakeKeycloak::with_realm("team"));
        let ctx = step_context(store, fake.clone(), "team");
        let mut realm = realm_with_smtp(json!({
            "template": {"from": "noreply@example.com", "envelopeFrom": "bounce@example.com"},
            "connection": {
                "host": "smtp.example.com",
                "port": 587,
                "enableStartTLS": true,
                "authentication": {
                    "username": {"value": "mailer"},
                    "password": {"name": "smtp", "key": "password"}
                }
            }
        }));

        RealmSettings
            .serve(&ctx, &mut realm, fake.as_ref())
            .await
            .unwrap();
        let server = fake.realm_state("team").unwrap().rep.smtp_server.unwrap();
        assert_eq!(server["from"], "noreply@example.com");
        assert_eq!(server["envelopeFrom"], "bounce@example.com");
        assert_eq!(server["port"], "587");
        assert_eq!(server["ssl"], "false");
        assert_eq!(server["starttls"], "true");
        assert_eq!(server["auth"], "true");
        assert_eq!(server["user"], "mailer");
        assert_eq!(server["password"], "m4il");

        fake.clear_calls();
        RealmSettings
            .serve(&ctx, &mut realm, fake.as_ref())
            .await
            .unwrap();
        assert!(fake.mutating_calls().is_empty(), "{:?}", fake.mutating_calls());
    }

    #[tokio::test]
    async fn test_smtp_without_authentication_has_no_credentials() {
        let store: DynStore = Arc::new(InMemoryStore::new());
        let fake = Arc::new(FakeKeycloak::with_realm("team"));
        let ctx = step_context(store, fake.clone(), "team");
        let mut realm = realm_with_smtp(json!({
            "template": {"from": "noreply@example.com"},
            "connection": {"host": "smtp.example.com"}
        }));

        RealmSettings
            .serve(&ctx, &mut realm, fake.as_ref())
            .await
            .unwrap();
        let server = fake.realm_state("team").unwrap().rep.smtp_server.unwrap();
        assert_eq!(server["port"], "25");
        assert_eq!(server["auth"], "false");
        assert!(!server.contains_key("password"));
    }

    #[tokio::test]
    async fn test_smtp_password_secret_must_exist() {
        let store: DynStore = Arc::new(InMemoryStore::new());
        let fake = Arc::new(FakeKeycloak::with_realm("team"));
        let ctx = step_context(store, fake.clone(), "team");
        let mut realm = realm_with_smtp(json!({
            "template": {"from": "noreply@example.com"},
            "connection": {
                "host": "smtp.example.com",
                "authentication": {
                    "username": {"value": "mailer"},
                    "password": {"name": "smtp", "key": "password"}
                }
            }
        }));

        assert!(
            RealmSettings
                .serve(&ctx, &mut realm, fake.as_ref())
                .await
                .is_err()
        );
        assert!(fake.realm_state("team").unwrap().rep.smtp_server.is_none());
    }
}
