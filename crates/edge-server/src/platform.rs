//! Platform resources backed by server configuration.

use std::sync::Arc;

use edge_core::{BackgroundTasks, Bindings, ExecutionContext, PlatformBindingSource, RequestContext};
use tokio::sync::watch;
use url::Url;

/// Header carrying the scheme the client used in front of a proxy.
pub const FORWARDED_PROTO_HEADER: &str = "x-forwarded-proto";

/// Binds the configured bindings, a shared background task set and the
/// request's own origin.
#[derive(Debug, Clone)]
pub struct ConfigBindingSource {
    bindings: Arc<Bindings>,
    tasks: BackgroundTasks,
    shutdown: watch::Receiver<bool>,
    scheme: String,
    allowed_hosts: Vec<String>,
}

impl ConfigBindingSource {
    pub fn new(
        bindings: Bindings,
        scheme: impl Into<String>,
        tasks: BackgroundTasks,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            bindings: Arc::new(bindings),
            tasks,
            shutdown,
            scheme: scheme.into(),
            allowed_hosts: Vec::new(),
        }
    }

    /// Only derive origins for these hosts. Empty allows any host.
    pub fn with_allowed_hosts(mut self, hosts: impl IntoIterator<Item = String>) -> Self {
        self.allowed_hosts = hosts.into_iter().collect();
        self
    }

    /// Whether `host` (a `Host` header value, port optional) may be used as
    /// a self-call origin.
    pub fn host_allowed(&self, host: &str) -> bool {
        if self.allowed_hosts.is_empty() {
            return true;
        }
        let name = host.rsplit_once(':').map_or(host, |(name, _)| name);
        self.allowed_hosts.iter().any(|allowed| {
            allowed.eq_ignore_ascii_case(host) || allowed.eq_ignore_ascii_case(name)
        })
    }

    pub fn tasks(&self) -> &BackgroundTasks {
        &self.tasks
    }
}

impl PlatformBindingSource for ConfigBindingSource {
    fn bindings(&self, _request: &RequestContext) -> Arc<Bindings> {
        self.bindings.clone()
    }

    fn execution_context(&self, request: &RequestContext) -> ExecutionContext {
        ExecutionContext::new(
            request.request_id.clone(),
            self.tasks.clone(),
            self.shutdown.clone(),
        )
    }

    /// The origin is built from the client-supplied `Host` header, so without
    /// an allowlist any caller can point self-calls at another host.
    fn origin(&self, request: &RequestContext) -> Option<Url> {
        let scheme = request
            .header(FORWARDED_PROTO_HEADER)
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| matches!(*v, "http" | "https"))
            .unwrap_or(self.scheme.as_str());
        let host = request.host()?;
        if !self.host_allowed(host) {
            tracing::warn!(host, "host not in allowlist, no self-call origin");
            return None;
        }
        Url::parse(&format!("{scheme}://{host}")).ok()
    }
}
