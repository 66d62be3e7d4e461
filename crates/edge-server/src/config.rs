//! Server configuration.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use edge_api::ApiConfig;
use edge_core::Bindings;
use edge_observability::LogFormat;
use edge_streaming::RenderMode;
use serde::{Deserialize, Serialize};

use crate::error::ServerError;

/// File names searched for, in order, in each directory.
pub const CONFIG_FILE_NAMES: [&str; 3] = ["edge.toml", ".edge.toml", "edge.json"];

/// Server configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to listen on.
    pub listen: SocketAddr,

    /// Path prefix routed to the JSON API.
    pub api_prefix: String,

    /// Bind an internal API client into every request.
    pub internal_api: bool,

    /// Scheme used for self-call origins when the request does not say.
    pub public_scheme: String,

    /// Artificial latency of the `/slow` endpoint.
    pub slow_delay_ms: u64,

    /// `static` forces every document to be fully rendered before responding.
    pub render_mode: RenderMode,

    /// Log output format.
    pub log_format: LogFormat,

    /// Hosts accepted as self-call origins. Empty accepts any `Host` header.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub allowed_hosts: Vec<String>,

    /// Override for the crawler user-agent pattern.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bot_pattern: Option<String>,

    /// Execution bindings exposed to every request.
    pub bindings: Bindings,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 8787)),
            api_prefix: "/api".to_string(),
            internal_api: true,
            public_scheme: "http".to_string(),
            slow_delay_ms: 2000,
            render_mode: RenderMode::Interactive,
            log_format: LogFormat::Json,
            allowed_hosts: Vec::new(),
            bot_pattern: None,
            bindings: Bindings::new(),
        }
    }
}

impl ServerConfig {
    /// Load and validate a config file. `.json` files are JSON, anything else TOML.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display()))?
        } else {
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display()))?
        };

        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        Ok(config)
    }

    /// Find the nearest config file from `start` upwards.
    pub fn find(start: &Path) -> Option<PathBuf> {
        start.ancestors().find_map(|dir| {
            CONFIG_FILE_NAMES
                .iter()
                .map(|name| dir.join(name))
                .find(|candidate| candidate.is_file())
        })
    }

    /// Load the nearest config file from `start` upwards, or defaults if none exists.
    pub fn discover(start: &Path) -> Result<Self> {
        match Self::find(start) {
            Some(path) => {
                tracing::debug!(path = %path.display(), "using config file");
                Self::load(&path)
            }
            None => Ok(Self::default()),
        }
    }

    /// Check invariants serde cannot express.
    pub fn validate(&self) -> Result<(), ServerError> {
        let prefix = &self.api_prefix;
        if !prefix.starts_with('/') {
            return Err(ServerError::Config(format!(
                "api_prefix must start with '/': {prefix:?}"
            )));
        }
        if prefix == "/" || prefix.ends_with('/') {
            return Err(ServerError::Config(format!(
                "api_prefix must name a path segment without a trailing '/': {prefix:?}"
            )));
        }
        if !matches!(self.public_scheme.as_str(), "http" | "https") {
            return Err(ServerError::Config(format!(
                "public_scheme must be http or https: {:?}",
                self.public_scheme
            )));
        }
        if let Some(pattern) = &self.bot_pattern {
            regex_lite::Regex::new(pattern)?;
        }
        Ok(())
    }

    pub fn slow_delay(&self) -> Duration {
        Duration::from_millis(self.slow_delay_ms)
    }

    /// Settings for the API router.
    pub fn api_config(&self) -> ApiConfig {
        ApiConfig {
            slow_delay: self.slow_delay(),
        }
    }
}
