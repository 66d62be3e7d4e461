//! Internal API client used for self-calls.

use std::time::Instant;

use edge_core::{RequestId, REQUEST_ID_HEADER};
use serde::de::DeserializeOwned;
use url::Url;

use crate::api::{HealthStatus, SlowMessage};

/// Error type for fetch operations.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP error: {status} for {url}")]
    Http { status: u16, url: String },

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Request error: {0}")]
    Request(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() {
            Self::Connection(err.to_string())
        } else {
            Self::Request(err.to_string())
        }
    }
}

/// Typed client for the internal JSON API.
///
/// Each method is one HTTP request: no retries, no caching. The client is cheap
/// to clone and shares the underlying connection pool.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: Url,
    request_id: Option<RequestId>,
}

impl ApiClient {
    /// Create a client rooted at `base`.
    pub fn new(http: reqwest::Client, mut base: Url) -> Self {
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Self {
            http,
            base,
            request_id: None,
        }
    }

    /// Client for the API mounted at `prefix` on `origin`.
    pub fn for_origin(http: reqwest::Client, origin: &Url, prefix: &str) -> Result<Self, FetchError> {
        let base = origin
            .join(prefix)
            .map_err(|e| FetchError::InvalidUrl(format!("{origin} + {prefix}: {e}")))?;
        Ok(Self::new(http, base))
    }

    /// Forward `id` as `x-request-id` on every call.
    pub fn with_request_id(mut self, id: RequestId) -> Self {
        self.request_id = Some(id);
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// `GET /health`
    pub async fn health(&self) -> Result<HealthStatus, FetchError> {
        self.get_json("health").await
    }

    /// `GET /slow`
    pub async fn slow(&self) -> Result<SlowMessage, FetchError> {
        self.get_json("slow").await
    }

    /// GET `path` relative to the API root and decode the JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, FetchError> {
        let url = self
            .base
            .join(path.trim_start_matches('/'))
            .map_err(|e| FetchError::InvalidUrl(format!("{path}: {e}")))?;

        let started = Instant::now();
        let mut request = self.http.get(url.clone());
        if let Some(id) = &self.request_id {
            request = request.header(REQUEST_ID_HEADER, id.as_str());
        }

        let response = request.send().await?;
        let status = response.status();
        tracing::debug!(
            url = %url,
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "internal api call"
        );

        if !status.is_success() {
            return Err(FetchError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| FetchError::Deserialization(e.to_string()))
    }
}
