//! # realmsync-storage
//!
//! Boundary to the declarative object store that holds declared resources,
//! their status and the secrets the engine reads and writes.
//!
//! This crate defines the contract only. Backends live in separate crates
//! (`realmsync-db-memory`).
//!
//! ## Overview
//!
//! [`ObjectStore`] is a JSON-level contract with the semantics the engine
//! relies on:
//! - `update` never touches status, `update_status` touches nothing else
//! - `delete` on an object with finalizers only marks it for deletion
//! - removing an object removes everything it owns
//!
//! Typed helpers (`get_object`, `update_object`, ...) are available on
//! `dyn ObjectStore` for any [`realmsync_core::Resource`].

mod error;
pub mod evented;
pub mod events;
mod traits;
mod types;

pub use error::{ErrorCategory, StorageError};
pub use evented::EventedStore;
pub use events::{EventBroadcaster, ObjectEvent, ObjectEventType};
pub use traits::ObjectStore;
pub use types::ListParams;

/// Type alias for a storage result.
pub type StorageResult<T> = Result<T, StorageError>;

/// Type alias for a shared object store.
pub type DynStore = std::sync::Arc<dyn ObjectStore>;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::{DynStore, ListParams, ObjectStore, StorageError, StorageResult};
}
