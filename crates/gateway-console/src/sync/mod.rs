//! Snapshot Synchronization Module
//!
//! Delivers registry snapshots to the backend of record.
//!
//! Registry operations only enqueue; a single [`SyncWorker`] task drains the
//! queue in order and hands each snapshot to a [`SnapshotSink`]:
//!
//! ```text
//!   ServiceRegistry ──push──► SyncHandle ══queue══► SyncWorker ──► SnapshotSink
//!                                                       │
//!                                                       └──► SyncEvent channel
//! ```
//!
//! # Delivery
//!
//! - Transport failures, HTTP 5xx and 429 are retried with exponential backoff
//!   until [`SyncConfig::max_attempts`] is reached.
//! - Every push carries the last version acknowledged by the backend. A version
//!   mismatch is reported as [`SyncError::VersionConflict`] and never retried.
//! - A conflict on a retried attempt can mean an earlier attempt was stored
//!   and only its response was lost. The worker then re-reads the backend's
//!   snapshot and counts the push as synchronized if the stored services match.
//! - Terminal failures are logged and published as [`SyncEvent::Failed`]. The
//!   local registry is not rolled back.
//! - After a genuine conflict the worker keeps the last version the backend
//!   acknowledged, so later pushes conflict as well until the registry is
//!   reloaded. Another writer's snapshot is never overwritten silently.

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::SyncConfig;
use crate::registry::{RegistrySnapshot, ServiceDescriptor, SnapshotVersion};

/// Why a snapshot push did not land.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("backend rejected snapshot: HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("snapshot version conflict: HTTP {status}: {body}")]
    VersionConflict { status: u16, body: String },

    #[error("snapshot push failed: {message}")]
    Transport { message: String },
}

impl SyncError {
    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            409 | 412 => SyncError::VersionConflict { status, body },
            _ => SyncError::Rejected { status, body },
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { .. } => true,
            SyncError::Rejected { status, .. } => *status >= 500 || *status == 429,
            SyncError::VersionConflict { .. } => false,
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        SyncError::Transport {
            message: err.to_string(),
        }
    }
}

/// Backend acknowledgement of an accepted snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncAck {
    /// The registry as stored by the backend, when the response echoes it
    pub services: Option<Vec<ServiceDescriptor>>,
    /// Version the backend assigned to the stored snapshot
    pub version: Option<SnapshotVersion>,
}

/// Destination of snapshot pushes.
#[async_trait]
pub trait SnapshotSink: Send + Sync {
    async fn push(&self, snapshot: &RegistrySnapshot) -> Result<SyncAck, SyncError>;

    /// Read back the snapshot the destination currently holds.
    async fn current(&self) -> Result<RegistrySnapshot, SyncError>;
}

/// Outcome of one queued push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    Synced {
        services: usize,
        attempts: u32,
        version: Option<SnapshotVersion>,
    },
    Failed {
        services: usize,
        attempts: u32,
        error: SyncError,
    },
}

impl SyncEvent {
    pub fn is_failure(&self) -> bool {
        matches!(self, SyncEvent::Failed { .. })
    }
}

impl fmt::Display for SyncEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncEvent::Synced {
                services,
                attempts,
                version,
            } => {
                write!(f, "synchronized {} services", services)?;
                if let Some(version) = version {
                    write!(f, " (version {})", version)?;
                }
                if *attempts > 1 {
                    write!(f, " after {} attempts", attempts)?;
                }
                Ok(())
            }
            SyncEvent::Failed {
                services,
                attempts,
                error,
            } => write!(
                f,
                "failed to synchronize {} services after {} attempts: {}",
                services, attempts, error
            ),
        }
    }
}

/// Sending half of the outbound snapshot queue.
#[derive(Debug, Clone)]
pub struct SyncHandle {
    tx: mpsc::UnboundedSender<RegistrySnapshot>,
}

impl SyncHandle {
    /// Create a handle and the queue it feeds.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<RegistrySnapshot>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Enqueue a snapshot. Returns `false` if the worker has stopped, in which
    /// case the snapshot is dropped.
    pub fn push(&self, snapshot: RegistrySnapshot) -> bool {
        let services = snapshot.services.len();
        match self.tx.send(snapshot) {
            Ok(()) => {
                debug!(services, "Queued registry snapshot");
                true
            }
            Err(_) => {
                warn!(services, "Sync worker stopped; snapshot not pushed");
                false
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Control handle for a spawned [`SyncWorker`].
pub struct SyncWorkerHandle {
    join: JoinHandle<()>,
    shutdown: oneshot::Sender<()>,
}

impl SyncWorkerHandle {
    /// Stop accepting snapshots, deliver everything already queued, and wait
    /// for the worker to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.join.await {
            error!("Sync worker panicked: {}", e);
        }
    }
}

/// Drains the snapshot queue into a [`SnapshotSink`].
pub struct SyncWorker<S> {
    sink: S,
    config: SyncConfig,
    version: Option<SnapshotVersion>,
    events: mpsc::UnboundedSender<SyncEvent>,
}

impl<S: SnapshotSink + 'static> SyncWorker<S> {
    /// Spawn a worker on the current runtime.
    ///
    /// `version` is the version of the snapshot the registry was loaded from;
    /// the first push is conditional on it.
    pub fn spawn(
        sink: S,
        version: Option<SnapshotVersion>,
        config: SyncConfig,
    ) -> (
        SyncHandle,
        SyncWorkerHandle,
        mpsc::UnboundedReceiver<SyncEvent>,
    ) {
        let (handle, queue) = SyncHandle::channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let worker = Self {
            sink,
            config,
            version,
            events: events_tx,
        };
        let join = tokio::spawn(worker.run(queue, shutdown_rx));

        (
            handle,
            SyncWorkerHandle {
                join,
                shutdown: shutdown_tx,
            },
            events_rx,
        )
    }

    async fn run(
        mut self,
        mut queue: mpsc::UnboundedReceiver<RegistrySnapshot>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                biased;
                next = queue.recv() => match next {
                    Some(snapshot) => self.deliver(snapshot).await,
                    None => break,
                },
                _ = &mut shutdown => {
                    queue.close();
                    while let Some(snapshot) = queue.recv().await {
                        self.deliver(snapshot).await;
                    }
                    break;
                }
            }
        }
        debug!("Sync worker stopped");
    }

    async fn deliver(&mut self, mut snapshot: RegistrySnapshot) {
        snapshot.version = self.version.clone();
        let services = snapshot.services.len();
        let max_attempts = self.config.max_attempts.max(1);
        let mut backoff = self.config.initial_backoff;
        let mut attempts = 0;

        loop {
            attempts += 1;
            match self.sink.push(&snapshot).await {
                Ok(ack) => {
                    self.synced(services, attempts, ack.version);
                    return;
                }
                Err(e @ SyncError::VersionConflict { .. }) if attempts > 1 => {
                    match self.sink.current().await {
                        Ok(stored) if stored.services == snapshot.services => {
                            debug!(attempts, "Conflicting retry matches the stored snapshot");
                            self.synced(services, attempts, stored.version);
                        }
                        Ok(_) => self.failed(services, attempts, e),
                        Err(read) => {
                            warn!("Could not re-read snapshot after conflict: {}", read);
                            self.failed(services, attempts, e);
                        }
                    }
                    return;
                }
                Err(e) if e.is_retryable() && attempts < max_attempts => {
                    warn!(
                        "Snapshot push attempt {}/{} failed, retrying in {:?}: {}",
                        attempts, max_attempts, backoff, e
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = next_backoff(backoff, self.config.max_backoff);
                }
                Err(e) => {
                    self.failed(services, attempts, e);
                    return;
                }
            }
        }
    }

    fn synced(&mut self, services: usize, attempts: u32, version: Option<SnapshotVersion>) {
        if version.is_some() {
            self.version = version;
        }
        info!(
            services,
            attempts,
            version = ?self.version,
            "Registry snapshot synchronized"
        );
        self.emit(SyncEvent::Synced {
            services,
            attempts,
            version: self.version.clone(),
        });
    }

    fn failed(&self, services: usize, attempts: u32, error: SyncError) {
        error!(
            "Snapshot push of {} services failed after {} attempts: {}",
            services, attempts, error
        );
        self.emit(SyncEvent::Failed {
            services,
            attempts,
            error,
        });
    }

    fn emit(&self, event: SyncEvent) {
        // Nobody listening is fine: the outcome is already logged.
        let _ = self.events.send(event);
    }
}

fn next_backoff(current: Duration, max: Duration) -> Duration {
    current.saturating_mul(2).min(max)
}
