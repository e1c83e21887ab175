//! `$secretName:secretKey` references to values held in stored secrets.
//!
//! Declared config values may point at a secret instead of carrying the
//! value inline. Values starting with `${` are Keycloak's own vault
//! expressions and are sent to the server unchanged.

use std::collections::BTreeMap;

use realmsync_core::{Resource, Secret, SecretKeySelector, ValueOrSecretRef};
use realmsync_storage::DynStore;

use crate::error::{ReconcileError, ReconcileResult};

const PREFIX: &str = "$";
const KEYCLOAK_PREFIX: &str = "${";

pub fn has_secret_ref(value: &str) -> bool {
    value.starts_with(PREFIX)
}

pub fn secret_ref(name: &str, key: &str) -> String {
    format!("{PREFIX}{name}:{key}")
}

/// Splits a reference into secret name and key. Keycloak expressions yield
/// `None`.
pub fn parse(value: &str) -> ReconcileResult<Option<SecretKeySelector>> {
    if value.starts_with(KEYCLOAK_PREFIX) {
        return Ok(None);
    }
    let invalid = || {
        ReconcileError::validation(format!(
            "secret reference {value} is not in format '$secretName:secretKey'"
        ))
    };
    let body = value.strip_prefix(PREFIX).ok_or_else(invalid)?;
    match body.split(':').collect::<Vec<_>>().as_slice() {
        [name, key] if !name.is_empty() && !key.is_empty() => Ok(Some(SecretKeySelector {
            name: (*name).to_string(),
            key: (*key).to_string(),
        })),
        _ => Err(invalid()),
    }
}

/// Reads one key of a secret in `namespace`.
pub async fn secret_key(
    store: &DynStore,
    namespace: &str,
    selector: &SecretKeySelector,
) -> ReconcileResult<String> {
    let secret = store.get_object::<Secret>(namespace, &selector.name).await?;
    secret_value(&secret, &selector.key)
}

pub fn secret_value(secret: &Secret, key: &str) -> ReconcileResult<String> {
    secret.get(key).map(str::to_string).ok_or_else(|| {
        ReconcileError::validation(format!(
            "secret {} does not contain key {key}",
            secret.name()
        ))
    })
}

/// The value a reference points at; Keycloak expressions come back as-is.
pub async fn resolve(store: &DynStore, namespace: &str, value: &str) -> ReconcileResult<String> {
    match parse(value)? {
        Some(selector) => secret_key(store, namespace, &selector).await,
        None => Ok(value.to_string()),
    }
}

/// The literal value, or the referenced secret key when one is set.
pub async fn value_or_secret(
    store: &DynStore,
    namespace: &str,
    source: &ValueOrSecretRef,
) -> ReconcileResult<String> {
    match &source.secret_key_ref {
        Some(selector) => secret_key(store, namespace, selector).await,
        None => Ok(source.value.clone()),
    }
}

/// Replaces every reference among the values of `config`.
pub async fn resolve_map(
    store: &DynStore,
    namespace: &str,
    config: &mut BTreeMap<String, String>,
) -> ReconcileResult<()> {
    for value in config.values_mut() {
        if has_secret_ref(value) {
            *value = resolve(store, namespace, value).await?;
        }
    }
    Ok(())
}

/// Same as [`resolve_map`] for multi-valued configs.
pub async fn resolve_multi_map(
    store: &DynStore,
    namespace: &str,
    config: &mut BTreeMap<String, Vec<String>>,
) -> ReconcileResult<()> {
    for value in config.values_mut().flatten() {
        if has_secret_ref(value) {
            *value = resolve(store, namespace, value).await?;
        }
    }
    Ok(())
}
