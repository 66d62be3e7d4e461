//! Per-request document pipeline.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use edge_core::{CapabilityRegistry, LifecyclePhase, RequestContext};
use futures::FutureExt;
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use http::{HeaderMap, Response, StatusCode};

use crate::error::{ComponentError, RenderError};
use crate::node::Node;
use crate::policy::{CompletionPolicy, RenderMode};
use crate::render::{render_to_stream, DocumentBody, RenderOptions, RenderReport};
use crate::shell::Shell;

/// The view selected for a request.
pub struct RouterContext {
    pub shell: Shell,
    pub tree: Node,
    pub mode: RenderMode,
}

impl RouterContext {
    pub fn new(shell: Shell, tree: Node) -> Self {
        Self {
            shell,
            tree,
            mode: RenderMode::default(),
        }
    }

    pub fn with_mode(mut self, mode: RenderMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Initial status and headers for a document, plus the view to render.
pub struct Resolution {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub context: RouterContext,
}

impl Resolution {
    pub fn ok(context: RouterContext) -> Self {
        Self::with_status(StatusCode::OK, context)
    }

    pub fn not_found(context: RouterContext) -> Self {
        Self::with_status(StatusCode::NOT_FOUND, context)
    }

    pub fn with_status(status: StatusCode, context: RouterContext) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            context,
        }
    }

    /// Add a response header.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// Matches a request to a view.
///
/// Implemented by the application. Capabilities bound for the request are
/// available here and can be moved into components and deferred values.
#[async_trait]
pub trait RenderTreeResolver: Send + Sync {
    async fn resolve(
        &self,
        request: &RequestContext,
        capabilities: &Arc<CapabilityRegistry>,
    ) -> Result<Resolution, ComponentError>;
}

/// Decides whether a user agent belongs to a crawler.
pub trait BotClassifier: Send + Sync {
    fn is_bot(&self, user_agent: &str) -> bool;
}

impl<F> BotClassifier for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn is_bot(&self, user_agent: &str) -> bool {
        self(user_agent)
    }
}

/// How a document response turned out, attached as a response extension.
///
/// The status carried by the response head is the one known when the head was
/// produced. For a streamed document a later failure is only visible here.
#[derive(Debug, Clone)]
pub struct DocumentOutcome {
    status: Arc<AtomicU16>,
    report: RenderReport,
    policy: CompletionPolicy,
}

impl DocumentOutcome {
    /// Status including any escalation from errors after the shell.
    pub fn final_status(&self) -> StatusCode {
        StatusCode::from_u16(self.status.load(Ordering::SeqCst))
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Number of errors reported after the shell.
    pub fn errors(&self) -> usize {
        self.report.errors()
    }

    /// Current lifecycle phase of the body.
    pub fn phase(&self) -> LifecyclePhase {
        self.report.phase()
    }

    /// Resolves once the body is fully produced or abandoned.
    pub async fn all_ready(&self) -> LifecyclePhase {
        self.report.all_ready().await
    }

    pub fn policy(&self) -> CompletionPolicy {
        self.policy
    }
}

/// Raise `status` to 500 unless it already reports an error.
fn escalate(status: &AtomicU16) {
    let _ = status.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
        (current < 400).then_some(StatusCode::INTERNAL_SERVER_ERROR.as_u16())
    });
}

/// Renders resolved views into streamed HTML responses.
#[derive(Clone)]
pub struct DocumentRenderer {
    classifier: Arc<dyn BotClassifier>,
    force_static: bool,
}

impl DocumentRenderer {
    pub fn new(classifier: Arc<dyn BotClassifier>) -> Self {
        Self {
            classifier,
            force_static: false,
        }
    }

    /// Treat every view as static, whatever mode it asks for.
    pub fn with_forced_static(mut self, force: bool) -> Self {
        self.force_static = force;
        self
    }

    /// Completion policy for `request` rendering a view in `mode`.
    pub fn completion_policy(&self, request: &RequestContext, mode: RenderMode) -> CompletionPolicy {
        let mode = if self.force_static {
            RenderMode::Static
        } else {
            mode
        };
        let is_crawler = request
            .user_agent()
            .is_some_and(|ua| self.classifier.is_bot(ua));
        CompletionPolicy::decide(is_crawler, mode)
    }

    /// Resolve the view for `request` and render it.
    pub async fn handle(
        &self,
        request: &RequestContext,
        resolver: &dyn RenderTreeResolver,
        capabilities: &Arc<CapabilityRegistry>,
    ) -> Result<Response<DocumentBody>, RenderError> {
        // A panicking resolver is a failed resolution, not a dropped connection.
        let resolution = AssertUnwindSafe(resolver.resolve(request, capabilities))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(ComponentError::from_panic(payload)))
            .map_err(RenderError::Resolve)?;
        self.render(request, resolution).await
    }

    /// Render a resolved view.
    ///
    /// Fails only when the shell cannot be produced. Crawlers and static views
    /// get the response once every boundary has settled; everyone else gets it
    /// as soon as the shell is queued.
    pub async fn render(
        &self,
        request: &RequestContext,
        resolution: Resolution,
    ) -> Result<Response<DocumentBody>, RenderError> {
        let Resolution {
            status,
            mut headers,
            context,
        } = resolution;
        let policy = self.completion_policy(request, context.mode);

        let status = Arc::new(AtomicU16::new(status.as_u16()));
        let hook_status = status.clone();
        let request_id = request.request_id.clone();
        let options = RenderOptions::new()
            .with_timing(request.timing.clone())
            .on_error(move |err| {
                if err.is_streaming() {
                    tracing::error!(request_id = %request_id, error = %err, "render error after shell");
                    escalate(&hook_status);
                }
            });

        let stream = render_to_stream(&context.shell, context.tree, options)?;
        if policy.waits_for_all() {
            let phase = stream.report.all_ready().await;
            tracing::debug!(?phase, "document fully rendered before responding");
        }

        let outcome = DocumentOutcome {
            status,
            report: stream.report,
            policy,
        };

        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/html"));
        let mut response = Response::new(stream.body);
        *response.status_mut() = outcome.final_status();
        *response.headers_mut() = headers;
        response.extensions_mut().insert(outcome);
        Ok(response)
    }
}
