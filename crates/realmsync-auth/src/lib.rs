//! # realmsync-auth
//!
//! Obtains and caches authenticated Keycloak clients.
//!
//! [`SessionCache`] owns one session per managed instance. It reuses the
//! in-memory session while the token is valid, falls back to the token
//! persisted in the object store, and logs in with the instance's credentials
//! secret only when neither is usable. How a client is built from a token or a
//! login is behind [`ClientFactory`].

mod error;
mod factory;
mod session;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{AuthError, AuthResult};
pub use factory::{ClientFactory, HttpClientFactory};
pub use session::SessionCache;
