//! Shell-first rendering of a node tree into a byte stream.
//!
//! The tree is written synchronously up to its first suspense boundaries. That
//! prefix, wrapped in the document shell, is the shell chunk. Each boundary then
//! settles on its own and is streamed as a `<template>` plus a swap script, in
//! completion order. A boundary whose content fails gets a failure marker and
//! the stream carries on.

use std::convert::Infallible;
use std::fmt::Write as _;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use edge_core::{LifecyclePhase, TimingContext};
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, Stream, StreamExt};
use futures::FutureExt;
use tokio::sync::{mpsc, watch};
use tracing::Instrument;

use crate::error::{ComponentError, RenderError};
use crate::node::{escape_html, Node};
use crate::shell::Shell;
use crate::sink::StreamingSink;

/// Client-side swap functions, emitted once ahead of the first boundary chunk.
pub const BOUNDARY_RUNTIME: &str = concat!(
    "function $RC(b,s){var t=document.getElementById(b),c=document.getElementById(s);",
    "if(!t||!c)return;t.replaceChildren(c.content.cloneNode(true));",
    "t.dataset.boundary=\"ready\";c.remove()}",
    "function $RX(b){var t=document.getElementById(b);if(t)t.dataset.boundary=\"failed\"}"
);

/// Callback invoked for every render error, before and after the shell.
pub type ErrorHook = Arc<dyn Fn(&RenderError) + Send + Sync>;

/// Options for [`render_to_stream`].
#[derive(Clone, Default)]
pub struct RenderOptions {
    on_error: Option<ErrorHook>,
    timing: TimingContext,
}

impl RenderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the error hook.
    pub fn on_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&RenderError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(hook));
        self
    }

    /// Use an existing timing context, usually the request's.
    pub fn with_timing(mut self, timing: TimingContext) -> Self {
        self.timing = timing;
        self
    }

    fn report(&self, err: &RenderError) {
        if let Some(hook) = &self.on_error {
            hook(err);
        }
    }
}

/// A document whose shell has been produced and whose body is streaming.
pub struct RenderStream {
    pub body: DocumentBody,
    pub report: RenderReport,
}

/// Render `tree` inside `shell`.
///
/// Returns once the shell chunk is queued. A failure before that point is
/// reported to the hook and returned. Boundaries are driven by a spawned task
/// that stops early if the body is dropped.
pub fn render_to_stream(
    shell: &Shell,
    tree: Node,
    options: RenderOptions,
) -> Result<RenderStream, RenderError> {
    let mut next_id = 0usize;
    let mut writer = TreeWriter::new(&mut next_id);

    if let Err(cause) = writer.write(tree) {
        let err = RenderError::PreShell(cause);
        options.report(&err);
        return Err(err);
    }
    let TreeWriter { out, pending, .. } = writer;

    let (tx, rx) = mpsc::unbounded_channel();
    let (phase_tx, phase_rx) = watch::channel(LifecyclePhase::Start);
    let mut sink = StreamingSink::new(tx, phase_tx, options.timing.clone());

    let mut shell_html = shell.render_opening();
    shell_html.push_str(&out);
    // The receiver is still in hand, so this cannot fail.
    let _ = sink.send_shell(shell_html);

    let errors = Arc::new(AtomicUsize::new(0));
    let task = StreamTask {
        sink,
        pending: pending.into_iter().map(PendingBoundary::settle).collect(),
        next_id,
        closing: shell.render_closing().to_string(),
        options,
        errors: errors.clone(),
        runtime_sent: false,
    };
    tokio::spawn(task.run().in_current_span());

    Ok(RenderStream {
        body: DocumentBody { rx },
        report: RenderReport {
            phase: phase_rx,
            errors,
        },
    })
}

/// Progress of a streaming document, observable after the response is built.
#[derive(Debug, Clone)]
pub struct RenderReport {
    phase: watch::Receiver<LifecyclePhase>,
    errors: Arc<AtomicUsize>,
}

impl RenderReport {
    /// Resolves once body production has ended, returning the final phase.
    pub async fn all_ready(&self) -> LifecyclePhase {
        let mut rx = self.phase.clone();
        let phase = match rx.wait_for(LifecyclePhase::is_terminal).await {
            Ok(phase) => phase.clone(),
            // Sender dropped without a terminal phase: the task was torn down.
            Err(_) => LifecyclePhase::Error("render task stopped".to_string()),
        };
        phase
    }

    /// Current phase.
    pub fn phase(&self) -> LifecyclePhase {
        self.phase.borrow().clone()
    }

    /// Errors reported after the shell so far.
    pub fn errors(&self) -> usize {
        self.errors.load(Ordering::SeqCst)
    }
}

/// Streaming response body.
#[derive(Debug)]
pub struct DocumentBody {
    rx: mpsc::UnboundedReceiver<Bytes>,
}

impl DocumentBody {
    /// Read the whole body into a string.
    pub async fn collect_string(mut self) -> String {
        let mut buf = Vec::new();
        while let Some(chunk) = self.rx.recv().await {
            buf.extend_from_slice(&chunk);
        }
        String::from_utf8_lossy(&buf).into_owned()
    }
}

impl Stream for DocumentBody {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx).map(|chunk| chunk.map(Ok))
    }
}

fn boundary_id(id: usize) -> String {
    format!("B:{id}")
}

struct PendingBoundary {
    id: usize,
    content: BoxFuture<'static, Result<Node, ComponentError>>,
}

type Settled = BoxFuture<'static, (usize, Result<Node, ComponentError>)>;

impl PendingBoundary {
    /// A panic while polling the content settles the boundary as failed.
    fn settle(self) -> Settled {
        let id = self.id;
        AssertUnwindSafe(self.content)
            .catch_unwind()
            .map(move |caught| {
                let result =
                    caught.unwrap_or_else(|payload| Err(ComponentError::from_panic(payload)));
                (id, result)
            })
            .boxed()
    }
}

/// Writes the synchronous part of a tree, collecting suspense boundaries.
struct TreeWriter<'a> {
    out: String,
    next_id: &'a mut usize,
    pending: Vec<PendingBoundary>,
}

impl<'a> TreeWriter<'a> {
    fn new(next_id: &'a mut usize) -> Self {
        Self {
            out: String::new(),
            next_id,
            pending: Vec::new(),
        }
    }

    fn write(&mut self, node: Node) -> Result<(), ComponentError> {
        match node {
            Node::Text(text) => self.out.push_str(&escape_html(&text)),
            Node::Raw(html) => self.out.push_str(&html),
            Node::Element(el) => {
                let _ = write!(self.out, "<{}", el.tag);
                for (name, value) in &el.attrs {
                    let _ = write!(self.out, " {}=\"{}\"", name, escape_html(value));
                }
                self.out.push('>');
                if el.is_void() {
                    return Ok(());
                }
                for child in el.children {
                    self.write(child)?;
                }
                let _ = write!(self.out, "</{}>", el.tag);
            }
            Node::Fragment(children) => {
                for child in children {
                    self.write(child)?;
                }
            }
            Node::Component(render) => {
                let node = std::panic::catch_unwind(AssertUnwindSafe(render))
                    .unwrap_or_else(|payload| Err(ComponentError::from_panic(payload)))?;
                self.write(node)?;
            }
            Node::Suspense(boundary) => {
                let id = *self.next_id;
                *self.next_id += 1;
                let _ = write!(
                    self.out,
                    "<div id=\"{}\" data-boundary=\"pending\">",
                    boundary_id(id)
                );
                self.write(*boundary.fallback)?;
                self.out.push_str("</div>");
                self.pending.push(PendingBoundary {
                    id,
                    content: boundary.content,
                });
            }
        }
        Ok(())
    }
}

enum Step {
    Settled(usize, Result<Node, ComponentError>),
    Drained,
    Disconnected,
}

struct StreamTask {
    sink: StreamingSink,
    pending: FuturesUnordered<Settled>,
    next_id: usize,
    closing: String,
    options: RenderOptions,
    errors: Arc<AtomicUsize>,
    runtime_sent: bool,
}

impl StreamTask {
    async fn run(mut self) {
        loop {
            let step = tokio::select! {
                biased;
                _ = self.sink.closed() => Step::Disconnected,
                next = self.pending.next() => match next {
                    Some((id, result)) => Step::Settled(id, result),
                    None => Step::Drained,
                },
            };

            match step {
                Step::Settled(id, result) => {
                    let chunk = self.boundary_chunk(id, result);
                    if self.emit(id, chunk).is_err() {
                        return self.abandon();
                    }
                }
                Step::Drained => break,
                Step::Disconnected => return self.abandon(),
            }
        }

        let closing = std::mem::take(&mut self.closing);
        if self.sink.send_raw(closing).is_err() {
            return self.abandon();
        }
        if let Err(e) = self.sink.finish() {
            tracing::debug!(error = %e, "document stream did not finish cleanly");
        }
    }

    fn boundary_chunk(&mut self, id: usize, result: Result<Node, ComponentError>) -> String {
        let name = boundary_id(id);
        let written = result.and_then(|node| {
            let mut writer = TreeWriter::new(&mut self.next_id);
            writer.write(node)?;
            Ok((writer.out, writer.pending))
        });

        match written {
            Ok((html, nested)) => {
                for boundary in nested {
                    self.pending.push(boundary.settle());
                }
                format!(
                    "<template id=\"S:{id}\">{html}</template><script>$RC(\"{name}\",\"S:{id}\")</script>"
                )
            }
            Err(cause) => {
                self.errors.fetch_add(1, Ordering::SeqCst);
                self.options.report(&RenderError::Streaming {
                    boundary: name.clone(),
                    cause,
                });
                format!("<script>$RX(\"{name}\")</script>")
            }
        }
    }

    fn emit(&mut self, id: usize, chunk: String) -> Result<(), crate::sink::StreamError> {
        if !self.runtime_sent {
            self.sink
                .send_raw(format!("<script>{BOUNDARY_RUNTIME}</script>"))?;
            self.runtime_sent = true;
        }
        self.sink.send_section(&boundary_id(id), chunk)
    }

    fn abandon(self) {
        tracing::debug!(
            sections = self.sink.sections_sent().len(),
            "client went away, abandoning document stream"
        );
        self.sink.abandon("client disconnected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deferred::Deferred;
    use crate::shell::HeadContent;
    use std::sync::Mutex;
    use std::time::Duration;

    fn shell() -> Shell {
        Shell::new(HeadContent::new("Test"))
    }

    fn slow(ms: u64, text: &'static str) -> Node {
        Node::suspense(Node::text("loading"), async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok::<Node, ComponentError>(Node::element("p").text(text).into())
        })
    }

    // === Shell Tests ===

    #[tokio::test]
    async fn test_static_tree_renders_in_one_pass() {
        let tree: Node = Node::element("h1").text("Hello <world>").into();
        let stream = render_to_stream(&shell(), tree, RenderOptions::new()).unwrap();

        let html = stream.body.collect_string().await;
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<h1>Hello &lt;world&gt;</h1>"));
        assert!(html.ends_with("</html>"));
        assert!(!html.contains("$RC"));
        assert_eq!(stream.report.all_ready().await, LifecyclePhase::Completion);
    }

    #[tokio::test]
    async fn test_component_failure_before_shell_is_rejected() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let hook_seen = seen.clone();
        let options = RenderOptions::new().on_error(move |e| {
            hook_seen.lock().unwrap().push(e.is_streaming());
        });

        let tree = Node::fragment([
            Node::text("before"),
            Node::component(|| Err(ComponentError::msg("no data"))),
        ]);
        let result = render_to_stream(&shell(), tree, options);

        assert!(matches!(result, Err(RenderError::PreShell(_))));
        assert_eq!(*seen.lock().unwrap(), vec![false]);
    }

    #[tokio::test]
    async fn test_component_panic_before_shell_is_rejected() {
        let tree = Node::fragment([
            Node::text("before"),
            Node::component(|| panic!("template bug")),
        ]);
        let result = render_to_stream(&shell(), tree, RenderOptions::new());

        match result {
            Err(RenderError::PreShell(cause)) => {
                assert_eq!(cause.to_string(), "panicked: template bug");
            }
            _ => panic!("expected a pre-shell error"),
        }
    }

    // === Boundary Tests ===

    #[tokio::test(start_paused = true)]
    async fn test_shell_carries_fallback_and_placeholder() {
        let tree = Node::fragment([Node::text("top"), slow(2000, "late")]);
        let mut stream = render_to_stream(&shell(), tree, RenderOptions::new()).unwrap();

        let first = stream.body.next().await.unwrap().unwrap();
        let first = String::from_utf8_lossy(&first).into_owned();
        assert!(first.contains("top"));
        assert!(first.contains(r#"<div id="B:0" data-boundary="pending">loading</div>"#));
        assert!(!first.contains("late"));
        assert_eq!(stream.report.phase(), LifecyclePhase::ShellSent);

        let rest = stream.body.collect_string().await;
        assert!(rest.contains("function $RC"));
        assert!(rest.contains(r#"<template id="S:0"><p>late</p></template><script>$RC("B:0","S:0")</script>"#));
        assert!(rest.ends_with("</html>"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_boundaries_stream_in_completion_order() {
        let tree = Node::fragment([slow(300, "second"), slow(100, "first")]);
        let stream = render_to_stream(&shell(), tree, RenderOptions::new()).unwrap();

        let html = stream.body.collect_string().await;
        let first = html.find("S:1\"><p>first").unwrap();
        let second = html.find("S:0\"><p>second").unwrap();
        assert!(first < second);
        assert_eq!(html.matches("function $RC").count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_nested_boundaries() {
        let tree = Node::suspense(Node::text("outer loading"), async {
            Ok::<_, ComponentError>(Node::fragment([Node::text("outer"), slow(50, "inner")]))
        });
        let stream = render_to_stream(&shell(), tree, RenderOptions::new()).unwrap();

        let html = stream.body.collect_string().await;
        assert!(html.contains(r#"<template id="S:0">outer<div id="B:1" data-boundary="pending">loading</div></template>"#));
        assert!(html.contains(r#"$RC("B:1","S:1")"#));
        assert!(html.find("S:0").unwrap() < html.find("id=\"S:1\"").unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_boundary_reports_and_continues() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let hook_seen = seen.clone();
        let options = RenderOptions::new().on_error(move |e| {
            hook_seen.lock().unwrap().push(e.to_string());
        });

        let broken = Deferred::<String>::failed(ComponentError::msg("upstream 503"));
        let tree = Node::fragment([
            Node::await_deferred(broken, Node::text("wait"), |s: String| Node::text(s)),
            slow(10, "fine"),
        ]);
        let stream = render_to_stream(&shell(), tree, options).unwrap();

        let html = stream.body.collect_string().await;
        assert!(html.contains(r#"<script>$RX("B:0")</script>"#));
        assert!(html.contains("<p>fine</p>"));
        assert!(html.ends_with("</html>"));
        assert_eq!(stream.report.errors(), 1);
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["boundary B:0 failed while streaming: upstream 503".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_boundary_fails_and_stream_completes() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let hook_seen = seen.clone();
        let options = RenderOptions::new().on_error(move |e| {
            hook_seen.lock().unwrap().push(e.to_string());
        });

        let tree = Node::fragment([
            Node::suspense(Node::text("wait"), async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok::<_, ComponentError>(Node::component(|| panic!("bad row")))
            }),
            Node::suspense(Node::text("wait"), async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                if true {
                    panic!("loader bug");
                }
                Ok::<Node, ComponentError>(Node::empty())
            }),
            slow(20, "fine"),
        ]);
        let stream = render_to_stream(&shell(), tree, options).unwrap();

        let html = stream.body.collect_string().await;
        assert!(html.contains(r#"<script>$RX("B:0")</script>"#));
        assert!(html.contains(r#"<script>$RX("B:1")</script>"#));
        assert!(html.contains("<p>fine</p>"));
        assert!(html.ends_with("</html>"));
        assert_eq!(stream.report.errors(), 2);
        assert_eq!(stream.report.all_ready().await, LifecyclePhase::Completion);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                "boundary B:0 failed while streaming: panicked: bad row".to_string(),
                "boundary B:1 failed while streaming: panicked: loader bug".to_string(),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_body_abandons_stream() {
        let tree = slow(10_000, "never");
        let stream = render_to_stream(&shell(), tree, RenderOptions::new()).unwrap();
        let report = stream.report.clone();

        drop(stream.body);

        let phase = report.all_ready().await;
        assert!(matches!(phase, LifecyclePhase::Error(_)));
    }
}
