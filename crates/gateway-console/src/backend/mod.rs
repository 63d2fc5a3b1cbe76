//! Gateway Backend Client
//!
//! HTTP client for the backend that persists the registry and proxies
//! OpenAPI documents.
//!
//! # Endpoints
//!
//! - `GET  /services` - Registry snapshot (`ETag` carries its version)
//! - `POST /update` - Replace the registry (`If-Match` guards the version)
//! - `GET  /check-website?url=<base>` - Upstream reachability
//! - `GET  /origswagger/<title>/<url>` - Upstream OpenAPI document, proxied
//! - `GET  /swagger/<name>` - Test UI for a registered service
//! - `GET  /openapi/<name>` - Gateway OpenAPI document for a registered service
//! - `GET  /files` - Locally stored OpenAPI documents
//! - `GET  /swaggerfile/<name>` - One locally stored OpenAPI document

use async_trait::async_trait;
use reqwest::header::{ETAG, IF_MATCH};
use reqwest::{Client, Response, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::ConsoleConfig;
use crate::registry::{RegistrySnapshot, SnapshotVersion};
use crate::sync::{SnapshotSink, SyncAck, SyncError};

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("invalid backend URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("backend request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected backend payload: {0}")]
    Decode(#[from] serde_json::Error),
}

impl From<BackendError> for SyncError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Status { status, body } => SyncError::from_status(status, body),
            BackendError::Transport(e) => e.into(),
            other => SyncError::Transport {
                message: other.to_string(),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct WebsiteCheck {
    exists: bool,
}

/// Client for the gateway backend. Cheap to clone.
#[derive(Debug, Clone)]
pub struct BackendClient {
    client: Client,
    base_url: Url,
}

impl BackendClient {
    /// Create a client for `base_url`. Without a timeout, requests use the
    /// transport default.
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self, BackendError> {
        let parsed = Url::parse(base_url).map_err(|e| BackendError::InvalidUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        if parsed.cannot_be_a_base() {
            return Err(BackendError::InvalidUrl {
                url: base_url.to_string(),
                reason: "not a base URL".to_string(),
            });
        }

        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            base_url: parsed,
        })
    }

    pub fn from_config(config: &ConsoleConfig) -> Result<Self, BackendError> {
        Self::new(&config.backend_url, config.request_timeout)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build `<base>/<segments...>`, percent-encoding each segment.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Load the current registry snapshot and its version.
    pub async fn fetch_snapshot(&self) -> Result<RegistrySnapshot, BackendError> {
        let response = self.client.get(self.endpoint(&["services"])).send().await?;
        let response = ensure_success(response).await?;
        let version = etag(&response);
        let body = response.bytes().await?;
        let snapshot = RegistrySnapshot::from_json(&body)?.with_version(version);
        debug!(
            services = snapshot.services.len(),
            version = ?snapshot.version,
            "Fetched registry snapshot"
        );
        Ok(snapshot)
    }

    /// Replace the backend's registry with `snapshot`.
    ///
    /// A versioned snapshot is sent with `If-Match`, so the backend can refuse
    /// it if another operator pushed in between.
    pub async fn push_snapshot(&self, snapshot: &RegistrySnapshot) -> Result<SyncAck, SyncError> {
        let mut request = self.client.post(self.endpoint(&["update"])).json(snapshot);
        if let Some(version) = &snapshot.version {
            request = request.header(IF_MATCH, version.as_str());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!("Snapshot push rejected: HTTP {}: {}", status, body);
            return Err(SyncError::from_status(status.as_u16(), body));
        }

        let version = etag(&response);
        let body = response.bytes().await?;
        // The ack body is informational; a backend that answers with something
        // other than a snapshot still accepted the push.
        let services = RegistrySnapshot::from_json(&body).ok().map(|s| s.services);
        Ok(SyncAck { services, version })
    }

    /// Ask the backend whether `url` answers with a non-error status.
    pub async fn check_website(&self, url: &str) -> Result<bool, BackendError> {
        let response = self
            .client
            .get(self.endpoint(&["check-website"]))
            .query(&[("url", url)])
            .send()
            .await?;
        let check: WebsiteCheck = decode(response).await?;
        Ok(check.exists)
    }

    /// Fetch an upstream OpenAPI document through the backend proxy.
    pub async fn original_swagger(
        &self,
        title: &str,
        document_url: &str,
    ) -> Result<String, BackendError> {
        self.get_text(&["origswagger", title, document_url]).await
    }

    /// Fetch the interactive test page for a registered service.
    pub async fn swagger_ui(&self, name: &str) -> Result<String, BackendError> {
        self.get_text(&["swagger", name]).await
    }

    /// Fetch the gateway's OpenAPI document for a registered service.
    pub async fn gateway_openapi(&self, name: &str) -> Result<serde_json::Value, BackendError> {
        self.get_json(&["openapi", name]).await
    }

    /// List the OpenAPI documents stored on the backend.
    pub async fn local_files(&self) -> Result<Vec<String>, BackendError> {
        self.get_json(&["files"]).await
    }

    /// Fetch one locally stored OpenAPI document.
    pub async fn swagger_file(&self, name: &str) -> Result<String, BackendError> {
        self.get_text(&["swaggerfile", name]).await
    }

    async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, BackendError> {
        let response = self.client.get(self.endpoint(segments)).send().await?;
        decode(response).await
    }

    async fn get_text(&self, segments: &[&str]) -> Result<String, BackendError> {
        let response = self.client.get(self.endpoint(segments)).send().await?;
        let response = ensure_success(response).await?;
        Ok(response.text().await?)
    }
}

#[async_trait]
impl SnapshotSink for BackendClient {
    async fn push(&self, snapshot: &RegistrySnapshot) -> Result<SyncAck, SyncError> {
        self.push_snapshot(snapshot).await
    }

    async fn current(&self) -> Result<RegistrySnapshot, SyncError> {
        Ok(self.fetch_snapshot().await?)
    }
}

async fn ensure_success(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        let body = response.text().await.unwrap_or_default();
        Err(BackendError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, BackendError> {
    let response = ensure_success(response).await?;
    let body = response.bytes().await?;
    Ok(serde_json::from_slice(&body)?)
}

fn etag(response: &Response) -> Option<SnapshotVersion> {
    response
        .headers()
        .get(ETAG)
        .and_then(|v| v.to_str().ok())
        .map(SnapshotVersion::new)
}
