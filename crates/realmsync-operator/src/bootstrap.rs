//! Seeds the object store from a manifest file at startup.
//!
//! A manifest lists declared objects under `objects`, each with its `kind`:
//!
//! ```toml
//! [[objects]]
//! kind = "Keycloak"
//! metadata = { name = "main", namespace = "iam" }
//! spec = { url = "https://sso.example.com", secret = "kc-admin" }
//! ```
//!
//! JSON manifests use the same layout. Objects without a namespace land in
//! the default namespace passed to [`load_manifest`].

use std::path::{Path, PathBuf};

use realmsync_core::kinds::{
    Keycloak, KeycloakAuthFlow, KeycloakClient, KeycloakClientScope, KeycloakRealm,
    KeycloakRealmComponent, KeycloakRealmGroup, KeycloakRealmIdentityProvider, KeycloakRealmRole,
    KeycloakRealmRoleBatch, KeycloakRealmUser,
};
use realmsync_core::{Resource, Secret};
use realmsync_storage::{DynStore, StorageError};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

const KNOWN_KINDS: [&str; 12] = [
    Secret::KIND,
    Keycloak::KIND,
    KeycloakRealm::KIND,
    KeycloakClient::KIND,
    KeycloakRealmRole::KIND,
    KeycloakRealmRoleBatch::KIND,
    KeycloakRealmGroup::KIND,
    KeycloakRealmIdentityProvider::KIND,
    KeycloakClientScope::KIND,
    KeycloakRealmComponent::KIND,
    KeycloakRealmUser::KIND,
    KeycloakAuthFlow::KIND,
];

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("Unable to read manifest {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unable to parse manifest {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("Manifest object #{index}: {message}")]
    Invalid { index: usize, message: String },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Default, Deserialize)]
struct Manifest {
    #[serde(default)]
    objects: Vec<Value>,
}

fn parse(path: &Path, raw: &str) -> Result<Manifest, BootstrapError> {
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    let parsed = if is_json {
        serde_json::from_str(raw).map_err(|e| e.to_string())
    } else {
        toml::from_str(raw).map_err(|e| e.to_string())
    };
    parsed.map_err(|message| BootstrapError::Parse {
        path: path.to_path_buf(),
        message,
    })
}

/// Splits a manifest entry into its kind and the stored object.
fn prepare(index: usize, mut object: Value, namespace: &str) -> Result<(String, Value), BootstrapError> {
    let invalid = |message: &str| BootstrapError::Invalid {
        index,
        message: message.to_string(),
    };
    let fields = object
        .as_object_mut()
        .ok_or_else(|| invalid("expected a table"))?;
    let kind = match fields.remove("kind") {
        Some(Value::String(kind)) => kind,
        _ => return Err(invalid("missing kind")),
    };
    if !KNOWN_KINDS.contains(&kind.as_str()) {
        return Err(invalid(&format!("unknown kind {kind}")));
    }

    let metadata = fields
        .get_mut("metadata")
        .and_then(Value::as_object_mut)
        .ok_or_else(|| invalid("missing metadata"))?;
    if metadata
        .get("name")
        .and_then(Value::as_str)
        .is_none_or(str::is_empty)
    {
        return Err(invalid("missing metadata.name"));
    }
    metadata
        .entry("namespace")
        .or_insert_with(|| Value::String(namespace.to_string()));
    Ok((kind, object))
}

/// Creates every object of the manifest at `path` in `store`.
///
/// Objects that already exist are left untouched. Returns how many objects
/// were created.
pub async fn load_manifest(
    store: &DynStore,
    path: &Path,
    namespace: &str,
) -> Result<usize, BootstrapError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| BootstrapError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    let manifest = parse(path, &raw)?;

    let objects = manifest
        .objects
        .into_iter()
        .enumerate()
        .map(|(index, object)| prepare(index, object, namespace))
        .collect::<Result<Vec<_>, _>>()?;

    let mut created = 0;
    for (kind, object) in objects {
        match store.create(&kind, object).await {
            Ok(_) => created += 1,
            Err(e) if e.is_already_exists() => {
                warn!(kind, error = %e, "Manifest object already exists, skipping");
            }
            Err(e) => return Err(e.into()),
        }
    }
    info!(path = %path.display(), created, "Manifest loaded");
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use realmsync_core::ObjectKey;
    use realmsync_db_memory::create_store;
    use std::io::Write;

    fn manifest_file(suffix: &str, content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn test_toml_manifest() {
        let file = manifest_file(
            ".toml",
            r#"
            [[objects]]
            kind = "Secret"
            metadata = { name = "kc-admin" }
            data = { username = "admin", password = "secret" }

            [[objects]]
            kind = "Keycloak"
            metadata = { name = "main", namespace = "iam" }
            spec = { url = "https://sso.example.com", secret = "kc-admin" }
            "#,
        );
        let store = create_store();

        let created = load_manifest(&store, file.path(), "default").await.unwrap();
        assert_eq!(created, 2);
        let secret = store
            .get_object::<Secret>("default", "kc-admin")
            .await
            .unwrap();
        assert_eq!(secret.data["username"], "admin");
        let keycloak = store.get_object::<Keycloak>("iam", "main").await.unwrap();
        assert_eq!(keycloak.spec.url, "https://sso.example.com");
    }

    #[tokio::test]
    async fn test_json_manifest_skips_existing() {
        let file = manifest_file(
            ".json",
            r#"{"objects": [{
                "kind": "KeycloakRealm",
                "metadata": {"name": "team", "namespace": "ns"},
                "spec": {"realmName": "team"}
            }]}"#,
        );
        let store = create_store();

        assert_eq!(load_manifest(&store, file.path(), "default").await.unwrap(), 1);
        assert_eq!(load_manifest(&store, file.path(), "default").await.unwrap(), 0);
        assert!(
            store
                .get(KeycloakRealm::KIND, &ObjectKey::new("ns", "team"))
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_invalid_object_creates_nothing() {
        let file = manifest_file(
            ".json",
            r#"{"objects": [
                {"kind": "KeycloakRealm", "metadata": {"name": "team"}, "spec": {"realmName": "team"}},
                {"kind": "Deployment", "metadata": {"name": "web"}}
            ]}"#,
        );
        let store = create_store();

        let err = load_manifest(&store, file.path(), "default").await.unwrap_err();
        assert_eq!(err.to_string(), "Manifest object #1: unknown kind Deployment");
        assert!(
            store
                .get(KeycloakRealm::KIND, &ObjectKey::new("default", "team"))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_user_and_flow_manifest() {
        let file = manifest_file(
            ".toml",
            r#"
            [[objects]]
            kind = "KeycloakRealmUser"
            metadata = { name = "alice" }
            spec = { username = "alice", realmRef = { kind = "KeycloakRealm", name = "team" } }

            [[objects]]
            kind = "KeycloakAuthFlow"
            metadata = { name = "browser-2fa" }
            spec = { alias = "browser-2fa", providerId = "basic-flow", topLevel = true }
            "#,
        );
        let store = create_store();

        assert_eq!(load_manifest(&store, file.path(), "ns").await.unwrap(), 2);
        let user = store.get_object::<KeycloakRealmUser>("ns", "alice").await.unwrap();
        assert!(user.spec.keep_resource);
        let flow = store
            .get_object::<KeycloakAuthFlow>("ns", "browser-2fa")
            .await
            .unwrap();
        assert!(flow.spec.top_level);
    }
}
