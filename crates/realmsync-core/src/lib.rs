//! Declared resource model for realmsync.
//!
//! Every object the engine reconciles has the same shape: [`ObjectMeta`],
//! a user-authored `spec` and an engine-authored [`Status`]. The [`Resource`]
//! trait gives the store and the reconcilers uniform access to that shape.

pub mod error;
pub mod kinds;
pub mod meta;
pub mod names;
pub mod resource;
pub mod status;

pub use error::{CoreError, Result};
pub use meta::{ObjectKey, ObjectMeta, ObjectRef, OwnerReference};
pub use resource::{HasStatus, RealmChild, Resource, Secret, SecretKeySelector, ValueOrSecretRef};
pub use status::{Status, StatusValue, SyncState};
