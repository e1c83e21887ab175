//! In-memory object store backend for realmsync.
//!
//! This crate provides an in-memory implementation of the `ObjectStore` trait
//! from `realmsync-storage`, using papaya lock-free HashMap for concurrent reads.
//!
//! # Example
//!
//! ```ignore
//! use realmsync_db_memory::create_store;
//! use realmsync_core::Secret;
//!
//! let store = create_store();
//! let secret = Secret::new("ns", "kc-admin").with_entry("username", "admin");
//! store.create_object(&secret).await?;
//! ```

pub mod store;

pub use realmsync_storage::{DynStore, ObjectStore, StorageError};
pub use store::{InMemoryStore, StorageKey};

/// Creates a new shared in-memory store.
pub fn create_store() -> DynStore {
    std::sync::Arc::new(InMemoryStore::new())
}
