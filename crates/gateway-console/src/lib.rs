//! API Gateway Administrative Console
//!
//! This crate manages the catalog of backend services registered with an API
//! gateway. It loads the registry from the gateway backend, applies operator
//! edits as value-semantic registry operations, and pushes every resulting
//! snapshot back to the backend of record.
//!
//! # Architecture
//!
//! ```text
//!   ┌──────────────┐    GET /services     ┌──────────────────┐
//!   │   Console    │◄─────────────────────│                  │
//!   │  (CLI / UI)  │                      │                  │
//!   └──────┬───────┘                      │                  │
//!          │ add / remove / update        │  Gateway Backend │
//!          ▼                              │                  │
//!   ┌──────────────────┐  snapshot queue  │                  │
//!   │ ServiceRegistry  │──────┐           │                  │
//!   └──────────────────┘      ▼           │                  │
//!                      ┌────────────┐     │                  │
//!                      │ SyncWorker │────►│   POST /update   │
//!                      └────────────┘     └──────────────────┘
//! ```
//!
//! Registry operations never mutate the value they are called on: each one
//! returns a new [`ServiceRegistry`] and the caller rebinds to it. Pushes are
//! queued and delivered by the [`SyncWorker`] with retry and backoff; the
//! outcome of each push is reported as a [`SyncEvent`].
//!
//! # Usage
//!
//! ```rust,ignore
//! use gateway_console::{Console, ConsoleConfig};
//!
//! let config = ConsoleConfig::default().with_backend_url("http://localhost:8005");
//! let mut console = Console::connect(&config).await?;
//! console.add("weather", "https://b/api", "swagger/docs/v2")?;
//! for event in console.shutdown().await {
//!     println!("{event}");
//! }
//! ```

pub mod backend;
pub mod config;
pub mod console;
pub mod registry;
pub mod sync;

pub use backend::{BackendClient, BackendError};
pub use config::{ConfigError, ConsoleConfig, SyncConfig};
pub use console::{Console, ConsoleError};
pub use registry::{
    RegistryError, RegistrySnapshot, ServiceDescriptor, ServiceRegistry, SnapshotVersion,
};
pub use sync::{
    SnapshotSink, SyncAck, SyncError, SyncEvent, SyncHandle, SyncWorker, SyncWorkerHandle,
};
