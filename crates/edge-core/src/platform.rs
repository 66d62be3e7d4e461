//! Platform resources bound into each request.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::Instrument;
use url::Url;

use crate::context::{RequestContext, RequestId};

/// Execution bindings: arbitrary key/value configuration exposed to a request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bindings(BTreeMap<String, String>);

impl Bindings {
    /// Create empty bindings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a binding.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert or replace a binding.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Get a binding by key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|v| v.as_str())
    }

    /// Iterate bindings in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, String)> for Bindings {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Background work spawned on behalf of requests, drained at shutdown.
#[derive(Debug, Clone, Default)]
pub struct BackgroundTasks {
    handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    fn spawn<F>(&self, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(work);
        let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }

    /// Number of tasks that have not finished yet.
    pub fn pending(&self) -> usize {
        let handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        handles.iter().filter(|h| !h.is_finished()).count()
    }

    /// Wait for every tracked task, including ones spawned while draining.
    pub async fn drain(&self) {
        loop {
            let batch = std::mem::take(
                &mut *self.handles.lock().unwrap_or_else(PoisonError::into_inner),
            );
            if batch.is_empty() {
                return;
            }
            for handle in batch {
                if let Err(e) = handle.await {
                    tracing::warn!(error = %e, "background task did not complete");
                }
            }
        }
    }
}

/// Request lifetime handle.
///
/// Work handed to [`ExecutionContext::wait_until`] is tied to the platform's
/// lifetime rather than to the response, so it keeps running after the body has
/// been sent and is awaited when the server shuts down.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    request_id: RequestId,
    tasks: BackgroundTasks,
    shutdown: watch::Receiver<bool>,
}

impl ExecutionContext {
    /// Create a lifetime handle for one request.
    pub fn new(request_id: RequestId, tasks: BackgroundTasks, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            request_id,
            tasks,
            shutdown,
        }
    }

    /// A handle with its own task set and no shutdown signal.
    pub fn detached(request_id: RequestId) -> Self {
        let (_tx, rx) = watch::channel(false);
        Self::new(request_id, BackgroundTasks::new(), rx)
    }

    /// Run `work` in the background past the end of the response.
    pub fn wait_until<F>(&self, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.spawn(work.in_current_span());
    }

    /// Whether the platform has started shutting down.
    pub fn is_cancelled(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Resolves once the platform starts shutting down.
    ///
    /// Never resolves for a handle whose shutdown source has gone away.
    pub async fn cancelled(&self) {
        let mut rx = self.shutdown.clone();
        if rx.wait_for(|stop| *stop).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    /// Tracked background work this handle spawns into.
    pub fn tasks(&self) -> &BackgroundTasks {
        &self.tasks
    }
}

/// Supplies the platform resources the dispatcher binds into every request.
pub trait PlatformBindingSource: Send + Sync {
    /// Execution bindings visible to this request.
    fn bindings(&self, request: &RequestContext) -> Arc<Bindings>;

    /// Lifetime handle for this request.
    fn execution_context(&self, request: &RequestContext) -> ExecutionContext;

    /// Origin used for internal self-calls, `None` when it cannot be determined.
    fn origin(&self, request: &RequestContext) -> Option<Url>;
}
