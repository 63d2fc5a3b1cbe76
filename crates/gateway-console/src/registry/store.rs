//! Copy-on-write service registry.

use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::types::{RegistrySnapshot, ServiceDescriptor};
use crate::sync::SyncHandle;

/// Local, synchronous registry failures. None of them has side effects.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("service '{name}' is not registered")]
    NotFound { name: String },

    #[error("service '{name}' is already registered")]
    Conflict { name: String },

    #[error("service {field} must not be empty")]
    Validation { field: &'static str },
}

/// Ordered collection of service descriptors.
///
/// The descriptor list is shared between clones and copied on the first write,
/// so handing a registry to a renderer is cheap and the renderer can never
/// observe a half-applied change. Equality compares descriptors only.
#[derive(Debug, Clone, Default)]
pub struct ServiceRegistry {
    services: Arc<Vec<ServiceDescriptor>>,
    sync: Option<SyncHandle>,
}

impl PartialEq for ServiceRegistry {
    fn eq(&self, other: &Self) -> bool {
        self.services == other.services
    }
}

impl Eq for ServiceRegistry {}

impl ServiceRegistry {
    /// Create a registry whose mutations are pushed through `sync`.
    ///
    /// Fails with [`RegistryError::Conflict`] if a name appears twice.
    pub fn new(
        services: Vec<ServiceDescriptor>,
        sync: SyncHandle,
    ) -> Result<Self, RegistryError> {
        Self::build(services, Some(sync))
    }

    /// Create a registry that never pushes snapshots.
    pub fn detached(services: Vec<ServiceDescriptor>) -> Result<Self, RegistryError> {
        Self::build(services, None)
    }

    /// Rebuild a registry from a backend snapshot. A snapshot naming the same
    /// service twice is rejected with [`RegistryError::Conflict`].
    pub fn from_snapshot(
        snapshot: RegistrySnapshot,
        sync: Option<SyncHandle>,
    ) -> Result<Self, RegistryError> {
        Self::build(snapshot.services, sync)
    }

    fn build(
        services: Vec<ServiceDescriptor>,
        sync: Option<SyncHandle>,
    ) -> Result<Self, RegistryError> {
        if let Some(name) = repeated_name(&services) {
            warn!(service = %name, "Service registered more than once");
            return Err(RegistryError::Conflict { name });
        }

        Ok(Self {
            services: Arc::new(services),
            sync,
        })
    }

    /// Copy the current descriptors into an unversioned snapshot.
    #[must_use]
    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot::new(self.services.as_ref().clone())
    }

    /// Find the first descriptor with the given name.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&ServiceDescriptor> {
        self.services.iter().find(|s| s.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ServiceDescriptor> {
        self.services.iter()
    }

    pub fn as_slice(&self) -> &[ServiceDescriptor] {
        &self.services
    }

    pub fn names(&self) -> Vec<&str> {
        self.services.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Append a new service and queue a snapshot push.
    ///
    /// Fails with [`RegistryError::Validation`] if any field is blank and with
    /// [`RegistryError::Conflict`] if the name is already registered.
    pub fn add(&self, name: &str, endpoint: &str, swagger: &str) -> Result<Self, RegistryError> {
        let name = required("name", name)?;
        let endpoint = required("endpoint", endpoint)?;
        let swagger = required("swagger", swagger)?;

        if self.lookup(name).is_some() {
            return Err(RegistryError::Conflict {
                name: name.to_string(),
            });
        }

        let mut next = self.clone();
        Arc::make_mut(&mut next.services).push(ServiceDescriptor::new(name, endpoint, swagger));
        info!(service = name, endpoint, "Added service");

        next.queue_push();
        Ok(next)
    }

    /// Remove every service with the given name and queue a snapshot push.
    ///
    /// Removing an unknown name leaves the registry unchanged but still pushes.
    #[must_use]
    pub fn remove(&self, name: &str) -> Self {
        let name = name.trim();
        let mut next = self.clone();
        if self.lookup(name).is_some() {
            Arc::make_mut(&mut next.services).retain(|s| s.name != name);
            info!(service = name, "Removed service");
        } else {
            debug!(service = name, "Remove of unknown service");
        }

        next.queue_push();
        next
    }

    /// Rewrite the endpoint and swagger path of a registered service and queue
    /// a snapshot push. The name, backend-only keys and position are kept.
    pub fn update(&self, name: &str, endpoint: &str, swagger: &str) -> Result<Self, RegistryError> {
        let name = required("name", name)?;
        let endpoint = required("endpoint", endpoint)?;
        let swagger = required("swagger", swagger)?;

        let index = self
            .services
            .iter()
            .position(|s| s.name == name)
            .ok_or_else(|| RegistryError::NotFound {
                name: name.to_string(),
            })?;

        let mut next = self.clone();
        let entry = &mut Arc::make_mut(&mut next.services)[index];
        entry.endpoint = endpoint.to_string();
        entry.swagger = swagger.to_string();
        info!(service = name, endpoint, swagger, "Updated service");

        next.queue_push();
        Ok(next)
    }

    fn queue_push(&self) {
        if let Some(sync) = &self.sync {
            sync.push(self.snapshot());
        }
    }
}

fn repeated_name(services: &[ServiceDescriptor]) -> Option<String> {
    let mut seen = HashSet::with_capacity(services.len());
    services
        .iter()
        .find(|s| !seen.insert(s.name.as_str()))
        .map(|s| s.name.clone())
}

fn required<'a>(field: &'static str, value: &'a str) -> Result<&'a str, RegistryError> {
    let value = value.trim();
    if value.is_empty() {
        Err(RegistryError::Validation { field })
    } else {
        Ok(value)
    }
}
