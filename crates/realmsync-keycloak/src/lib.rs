//! # realmsync-keycloak
//!
//! Boundary to the Keycloak admin REST API.
//!
//! The engine never talks HTTP directly. It converges through the
//! [`KeycloakApi`] trait, which has two implementations:
//! - [`HttpKeycloakClient`], a reqwest adapter authenticated with a
//!   [`SessionToken`] obtained by [`login`]
//! - `testing::FakeKeycloak`, an in-memory server behind the `testing` feature
//!
//! Representations in [`models`] carry only the fields the engine compares
//! and writes; unknown fields returned by the server are ignored.

mod api;
mod error;
mod http;
mod login;
pub mod models;
mod token;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use api::KeycloakApi;
pub use error::{ApiError, ApiResult};
pub use http::HttpKeycloakClient;
pub use login::{ADMIN_CLI_CLIENT, ConnectionParams, Credentials, build_http_client, login};
pub use token::{EXPIRY_LEEWAY, SessionToken, decode_expiry};

#[cfg(any(test, feature = "testing"))]
pub use token::unsigned_jwt;
