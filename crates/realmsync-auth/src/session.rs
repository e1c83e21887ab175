//! Per-instance session cache.
//!
//! Each managed [`Keycloak`] gets one slot holding the current session behind
//! an `ArcSwapOption`, so callers holding a warm, valid session never block.
//! Refreshes are serialized per slot by an async mutex: the first caller logs
//! in while the rest wait on the lock and then pick up the session it stored.
//! Slots of different instances are independent. A slot lives until its
//! instance is gone and [`SessionCache::forget`] drops it.
//!
//! Tokens survive restarts in the `kc-token-<keycloak>` secret, owned by the
//! instance so it goes away with it.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use dashmap::DashMap;
use realmsync_core::kinds::{AdminType, Keycloak};
use realmsync_core::names::{
    SECRET_CA_CERT_KEY, SECRET_PASSWORD_KEY, SECRET_TOKEN_KEY, SECRET_USERNAME_KEY,
    token_secret_name,
};
use realmsync_core::{ObjectKey, Resource, Secret};
use realmsync_keycloak::{ConnectionParams, Credentials, KeycloakApi, SessionToken};
use realmsync_storage::DynStore;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{AuthError, AuthResult};
use crate::factory::ClientFactory;

struct Session {
    api: Arc<dyn KeycloakApi>,
    token: SessionToken,
    url: String,
}

impl Session {
    fn serves(&self, keycloak: &Keycloak) -> bool {
        self.url == keycloak.spec.url && matches!(self.token.is_expired(), Ok(false))
    }
}

struct Slot {
    current: ArcSwapOption<Session>,
    refresh: Mutex<()>,
}

impl Slot {
    fn new() -> Self {
        Self {
            current: ArcSwapOption::empty(),
            refresh: Mutex::new(()),
        }
    }

    fn warm(&self, keycloak: &Keycloak) -> Option<Arc<dyn KeycloakApi>> {
        self.current
            .load_full()
            .filter(|s| s.serves(keycloak))
            .map(|s| s.api.clone())
    }
}

/// Hands out authenticated clients for managed Keycloak instances.
pub struct SessionCache {
    store: DynStore,
    factory: Arc<dyn ClientFactory>,
    request_timeout: Duration,
    slots: DashMap<ObjectKey, Arc<Slot>>,
}

impl SessionCache {
    pub fn new(store: DynStore, factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            store,
            factory,
            request_timeout: Duration::from_secs(30),
            slots: DashMap::new(),
        }
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn slot(&self, keycloak: &Keycloak) -> Arc<Slot> {
        self.slots
            .entry(keycloak.key())
            .or_insert_with(|| Arc::new(Slot::new()))
            .clone()
    }

    /// Drops the slot of an instance that no longer exists. The persisted
    /// token is left to go away with its owner.
    pub fn forget(&self, key: &ObjectKey) {
        if self.slots.remove(key).is_some() {
            debug!(keycloak = %key.name, "Keycloak session slot dropped");
        }
    }

    pub fn has_session(&self, key: &ObjectKey) -> bool {
        self.slots
            .get(key)
            .is_some_and(|slot| slot.current.load().is_some())
    }

    /// Client for a connected instance.
    ///
    /// Fails with [`AuthError::KeycloakNotAvailable`] without any login when
    /// the instance reports itself as disconnected.
    pub async fn acquire(&self, keycloak: &Keycloak) -> AuthResult<Arc<dyn KeycloakApi>> {
        if !keycloak.status.connected {
            return Err(AuthError::not_available(keycloak.name()));
        }
        self.acquire_unchecked(keycloak).await
    }

    /// Client for an instance regardless of its connection status.
    pub async fn acquire_unchecked(
        &self,
        keycloak: &Keycloak,
    ) -> AuthResult<Arc<dyn KeycloakApi>> {
        let slot = self.slot(keycloak);
        if let Some(api) = slot.warm(keycloak) {
            return Ok(api);
        }

        let _refresh = slot.refresh.lock().await;
        // Another caller may have refreshed while we waited.
        if let Some(api) = slot.warm(keycloak) {
            return Ok(api);
        }

        let conn = self.connection_params(keycloak).await?;
        let session = match self.session_from_stored_token(keycloak, &conn).await? {
            Some(session) => session,
            None => self.login(keycloak, &conn).await?,
        };
        let api = session.api.clone();
        slot.current.store(Some(Arc::new(session)));
        Ok(api)
    }

    /// Drops the cached session and the persisted token.
    pub async fn invalidate(&self, keycloak: &Keycloak) -> AuthResult<()> {
        let slot = self.slot(keycloak);
        let _refresh = slot.refresh.lock().await;
        slot.current.store(None);

        let key = ObjectKey::new(keycloak.namespace(), token_secret_name(keycloak.name()));
        match self.store.delete(Secret::KIND, &key).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }
        info!(keycloak = %keycloak.name(), "Keycloak session invalidated");
        Ok(())
    }

    async fn connection_params(&self, keycloak: &Keycloak) -> AuthResult<ConnectionParams> {
        let spec = &keycloak.spec;
        let mut conn = ConnectionParams::new(&spec.url, &spec.realm)
            .with_request_timeout(self.request_timeout)
            .with_insecure_skip_verify(spec.insecure_skip_verify);

        if let Some(ca_secret) = &spec.ca_cert_secret {
            let secret: Secret = self
                .store
                .get_object(keycloak.namespace(), ca_secret)
                .await?;
            let pem = secret
                .get(SECRET_CA_CERT_KEY)
                .ok_or_else(|| AuthError::missing_secret_key(ca_secret, SECRET_CA_CERT_KEY))?;
            conn = conn.with_ca_cert(pem);
        }
        Ok(conn)
    }

    /// Session built from the persisted token, if there is a usable one.
    async fn session_from_stored_token(
        &self,
        keycloak: &Keycloak,
        conn: &ConnectionParams,
    ) -> AuthResult<Option<Session>> {
        let name = token_secret_name(keycloak.name());
        let Some(secret) = self
            .store
            .try_get_object::<Secret>(keycloak.namespace(), &name)
            .await?
        else {
            debug!(keycloak = %keycloak.name(), "No stored token");
            return Ok(None);
        };

        let Some(blob) = secret.get(SECRET_TOKEN_KEY) else {
            warn!(secret = %name, "Token secret has no token key");
            return Ok(None);
        };
        let token = match SessionToken::from_blob(blob) {
            Ok(token) => token,
            Err(e) => {
                warn!(secret = %name, error = %e, "Unable to parse stored token");
                return Ok(None);
            }
        };
        match token.ensure_valid() {
            Ok(()) => {}
            Err(e) if e.is_token_expired() => {
                debug!(keycloak = %keycloak.name(), "Stored token expired");
                return Ok(None);
            }
            Err(e) => {
                warn!(secret = %name, error = %e, "Stored token is unusable");
                return Ok(None);
            }
        }

        let api = self.factory.from_token(conn, &token)?;
        debug!(keycloak = %keycloak.name(), "Using stored token");
        Ok(Some(Session {
            api,
            token,
            url: keycloak.spec.url.clone(),
        }))
    }

    async fn login(&self, keycloak: &Keycloak, conn: &ConnectionParams) -> AuthResult<Session> {
        let credentials = self.credentials(keycloak).await?;
        let (api, token) = self.factory.login(conn, &credentials).await?;
        info!(keycloak = %keycloak.name(), url = %keycloak.spec.url, "Logged in to Keycloak");

        self.persist_token(keycloak, &token).await?;
        Ok(Session {
            api,
            token,
            url: keycloak.spec.url.clone(),
        })
    }

    async fn credentials(&self, keycloak: &Keycloak) -> AuthResult<Credentials> {
        let secret_name = &keycloak.spec.secret;
        let secret: Secret = self
            .store
            .get_object(keycloak.namespace(), secret_name)
            .await?;
        let value = |key: &str| {
            secret
                .get(key)
                .map(str::to_string)
                .ok_or_else(|| AuthError::missing_secret_key(secret_name, key))
        };

        let username = value(SECRET_USERNAME_KEY)?;
        let password = value(SECRET_PASSWORD_KEY)?;
        Ok(match keycloak.spec.admin_type {
            AdminType::User => Credentials::Password { username, password },
            AdminType::ServiceAccount => Credentials::ClientCredentials {
                client_id: username,
                client_secret: password,
            },
        })
    }

    async fn persist_token(&self, keycloak: &Keycloak, token: &SessionToken) -> AuthResult<()> {
        let name = token_secret_name(keycloak.name());
        let blob = token.to_blob()?;

        match self
            .store
            .try_get_object::<Secret>(keycloak.namespace(), &name)
            .await?
        {
            Some(mut secret) => {
                secret
                    .data
                    .insert(SECRET_TOKEN_KEY.to_string(), blob);
                self.store.update_object(&secret).await?;
            }
            None => {
                let secret = Secret::new(keycloak.namespace(), &name)
                    .with_entry(SECRET_TOKEN_KEY, blob)
                    .with_owner(keycloak.owner_reference());
                self.store.create_object(&secret).await?;
            }
        }
        debug!(secret = %name, "Token persisted");
        Ok(())
    }
}
