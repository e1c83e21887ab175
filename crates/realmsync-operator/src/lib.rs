//! # realmsync-operator
//!
//! Converges a Keycloak server towards the objects declared in the store.
//!
//! The [`Manager`] turns store changes into work items and hands each one to
//! the [`Reconciler`] of its kind. Realm-scoped reconcilers resolve their
//! owner through [`resolver`], gate remote deletion on a finalizer through
//! [`lifecycle`] and run the realm or client pipeline in [`chain`].

pub mod bootstrap;
pub mod chain;
pub mod context;
pub mod error;
pub mod lifecycle;
pub mod manager;
pub mod observability;
pub mod reconcilers;
pub mod resolver;
pub mod secretref;
pub mod terminators;

pub use context::Context;
pub use error::{ErrorKind, ReconcileError, ReconcileResult};
pub use lifecycle::Action;
pub use manager::{Manager, WorkItem, WorkQueue};
pub use reconcilers::Reconciler;
