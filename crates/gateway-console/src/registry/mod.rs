//! Service Registry Module
//!
//! The in-memory model of the services registered with the gateway.
//!
//! A [`ServiceRegistry`] is an ordered, copy-on-write sequence of
//! [`ServiceDescriptor`]s. Every mutating operation returns a new registry and
//! queues a full [`RegistrySnapshot`] for delivery to the backend; the value the
//! operation was called on is never changed.
//!
//! # Invariants
//!
//! - Service names are unique within a registry (`add` fails with
//!   [`RegistryError::Conflict`] on collision).
//! - Insertion order is preserved; `add` appends at the tail and no operation
//!   reorders unaffected entries.
//! - Failed operations have no side effects: nothing is changed and nothing is
//!   queued.

mod store;
mod types;

pub use store::{RegistryError, ServiceRegistry};
pub use types::{RegistrySnapshot, ServiceDescriptor, SnapshotVersion};
