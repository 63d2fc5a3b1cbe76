//! Wire types shared by the registry, the sync worker and the backend client.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// One registered backend service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    /// Operator-assigned identifier, unique within a registry
    pub name: String,
    /// Base URL of the upstream service
    pub endpoint: String,
    /// OpenAPI document location, absolute or relative to `endpoint`
    pub swagger: String,
    /// Backend-only keys (`security`, `securitySchemes`, `gateway_api`, ...).
    ///
    /// The console never edits these but carries them through every snapshot
    /// so a push does not strip gateway configuration.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ServiceDescriptor {
    /// Create a descriptor with no backend-only keys.
    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        swagger: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            swagger: swagger.into(),
            extra: Map::new(),
        }
    }

    /// Resolve the location of this service's OpenAPI document.
    ///
    /// An absolute `http(s)` swagger path is returned unchanged; a relative one
    /// is joined to the endpoint with a single `/`.
    #[must_use]
    pub fn document_url(&self) -> String {
        if is_absolute_url(&self.swagger) {
            return self.swagger.clone();
        }
        format!(
            "{}/{}",
            self.endpoint.trim_end_matches('/'),
            self.swagger.trim_start_matches('/')
        )
    }
}

fn is_absolute_url(value: &str) -> bool {
    let lower = value.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Opaque version token of a backend snapshot (the HTTP `ETag`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SnapshotVersion(String);

impl SnapshotVersion {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SnapshotVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The full ordered set of descriptors at a point in time.
///
/// Serializes as `{"services": [...]}`, the body `POST /update` expects. The
/// version travels in HTTP headers, never in the body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub services: Vec<ServiceDescriptor>,
    #[serde(skip)]
    pub version: Option<SnapshotVersion>,
}

/// Accepted shapes of a snapshot body: the reference backend answers
/// `GET /services` with a bare array, newer ones wrap it in an object.
#[derive(Deserialize)]
#[serde(untagged)]
enum SnapshotBody {
    Bare(Vec<ServiceDescriptor>),
    Wrapped { services: Vec<ServiceDescriptor> },
}

impl RegistrySnapshot {
    pub fn new(services: Vec<ServiceDescriptor>) -> Self {
        Self {
            services,
            version: None,
        }
    }

    #[must_use]
    pub fn with_version(mut self, version: Option<SnapshotVersion>) -> Self {
        self.version = version;
        self
    }

    /// Parse a snapshot body in either the bare-array or wrapped form.
    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        let services = match serde_json::from_slice::<SnapshotBody>(bytes)? {
            SnapshotBody::Bare(services) => services,
            SnapshotBody::Wrapped { services } => services,
        };
        Ok(Self::new(services))
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
