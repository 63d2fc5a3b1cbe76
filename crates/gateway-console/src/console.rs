//! Console session.
//!
//! Owns the registry currently shown to the operator, rebinds it to the result
//! of every operation, and forwards documentation and reachability queries to
//! the backend.

use tokio::sync::mpsc;
use tracing::info;

use crate::backend::{BackendClient, BackendError};
use crate::config::ConsoleConfig;
use crate::registry::{RegistryError, ServiceDescriptor, ServiceRegistry};
use crate::sync::{SyncEvent, SyncWorker, SyncWorkerHandle};

#[derive(Debug, thiserror::Error)]
pub enum ConsoleError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub struct Console {
    backend: BackendClient,
    registry: ServiceRegistry,
    worker: SyncWorkerHandle,
    events: mpsc::UnboundedReceiver<SyncEvent>,
}

impl Console {
    /// Load the registry from the backend and start synchronizing edits.
    ///
    /// Fails with [`RegistryError::Conflict`] if the backend lists a service
    /// name more than once.
    pub async fn connect(config: &ConsoleConfig) -> Result<Self, ConsoleError> {
        let backend = BackendClient::from_config(config)?;
        let snapshot = backend.fetch_snapshot().await?;
        info!(
            backend = %backend.base_url(),
            services = snapshot.services.len(),
            version = ?snapshot.version,
            "Loaded service registry"
        );

        let version = snapshot.version.clone();
        let (sync, worker, events) =
            SyncWorker::spawn(backend.clone(), version, config.sync.clone());
        let registry = match ServiceRegistry::from_snapshot(snapshot, Some(sync)) {
            Ok(registry) => registry,
            Err(e) => {
                worker.shutdown().await;
                return Err(e.into());
            }
        };

        Ok(Self {
            backend,
            registry,
            worker,
            events,
        })
    }

    /// The registry as of the last successful operation.
    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub fn backend(&self) -> &BackendClient {
        &self.backend
    }

    pub fn lookup(&self, name: &str) -> Result<&ServiceDescriptor, RegistryError> {
        self.registry
            .lookup(name)
            .ok_or_else(|| RegistryError::NotFound {
                name: name.to_string(),
            })
    }

    pub fn add(
        &mut self,
        name: &str,
        endpoint: &str,
        swagger: &str,
    ) -> Result<&ServiceRegistry, RegistryError> {
        self.registry = self.registry.add(name, endpoint, swagger)?;
        Ok(&self.registry)
    }

    pub fn remove(&mut self, name: &str) -> &ServiceRegistry {
        self.registry = self.registry.remove(name);
        &self.registry
    }

    pub fn update(
        &mut self,
        name: &str,
        endpoint: &str,
        swagger: &str,
    ) -> Result<&ServiceRegistry, RegistryError> {
        self.registry = self.registry.update(name, endpoint, swagger)?;
        Ok(&self.registry)
    }

    /// Check whether an upstream base URL is reachable.
    pub async fn check(&self, url: &str) -> Result<bool, BackendError> {
        self.backend.check_website(url).await
    }

    /// Fetch the upstream OpenAPI document of a registered service.
    pub async fn service_document(&self, name: &str) -> Result<String, ConsoleError> {
        let descriptor = self.lookup(name)?;
        Ok(self.preview_document(descriptor).await?)
    }

    /// Fetch the upstream OpenAPI document a descriptor points at, registered
    /// or not. Used to vet a service before adding it.
    pub async fn preview_document(
        &self,
        descriptor: &ServiceDescriptor,
    ) -> Result<String, BackendError> {
        self.backend
            .original_swagger(&descriptor.name, &descriptor.document_url())
            .await
    }

    /// Fetch the interactive test page of a registered service.
    pub async fn test_document(&self, name: &str) -> Result<String, ConsoleError> {
        self.lookup(name)?;
        Ok(self.backend.swagger_ui(name).await?)
    }

    /// Fetch the gateway's OpenAPI document of a registered service.
    pub async fn openapi(&self, name: &str) -> Result<serde_json::Value, ConsoleError> {
        self.lookup(name)?;
        Ok(self.backend.gateway_openapi(name).await?)
    }

    pub async fn local_files(&self) -> Result<Vec<String>, BackendError> {
        self.backend.local_files().await
    }

    pub async fn swagger_file(&self, name: &str) -> Result<String, BackendError> {
        self.backend.swagger_file(name).await
    }

    /// Sync outcomes reported since the last call, without waiting.
    pub fn drain_events(&mut self) -> Vec<SyncEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    /// Deliver every queued snapshot, stop the sync worker, and return the
    /// outcomes not yet drained.
    pub async fn shutdown(self) -> Vec<SyncEvent> {
        let Console {
            registry,
            worker,
            mut events,
            ..
        } = self;
        drop(registry);
        worker.shutdown().await;

        let mut remaining = Vec::new();
        while let Some(event) = events.recv().await {
            remaining.push(event);
        }
        remaining
    }
}
