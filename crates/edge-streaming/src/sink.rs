//! Shell-first streaming sink.

use bytes::Bytes;
use edge_core::{LifecyclePhase, TimingContext};
use tokio::sync::{mpsc, watch};

/// Errors raised by [`StreamingSink`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    #[error("shell already sent")]
    ShellAlreadySent,

    #[error("shell must be sent before sections")]
    ShellNotSent,

    #[error("stream already completed")]
    Completed,

    #[error("client disconnected")]
    Disconnected,
}

/// State of the streaming sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SinkState {
    Initial,
    ShellSent,
    Completed,
}

/// Body writer that enforces the shell-first pattern.
///
/// Every transition is published on a watch channel so the response side can
/// observe progress without holding the sink.
pub struct StreamingSink {
    tx: mpsc::UnboundedSender<Bytes>,
    phase: watch::Sender<LifecyclePhase>,
    state: SinkState,
    timing: TimingContext,
    sections_sent: Vec<String>,
}

impl StreamingSink {
    /// Create a new streaming sink.
    pub fn new(
        tx: mpsc::UnboundedSender<Bytes>,
        phase: watch::Sender<LifecyclePhase>,
        timing: TimingContext,
    ) -> Self {
        Self {
            tx,
            phase,
            state: SinkState::Initial,
            timing,
            sections_sent: Vec::new(),
        }
    }

    /// Send the shell HTML. Must be called before any sections.
    pub fn send_shell(&mut self, html: String) -> Result<(), StreamError> {
        if self.state != SinkState::Initial {
            return Err(StreamError::ShellAlreadySent);
        }

        self.push(html.into())?;
        self.timing.mark("shell_sent");
        self.state = SinkState::ShellSent;
        self.phase.send_replace(LifecyclePhase::ShellSent);

        Ok(())
    }

    /// Send a named chunk. Shell must be sent first.
    pub fn send_section(&mut self, name: &str, html: String) -> Result<(), StreamError> {
        self.ensure_open()?;

        self.push(html.into())?;
        self.timing.mark_section_sent(name);
        self.sections_sent.push(name.to_string());
        self.phase
            .send_replace(LifecyclePhase::SectionSent(name.to_string()));

        Ok(())
    }

    /// Send unnamed bytes. Shell must be sent first.
    pub fn send_raw(&mut self, bytes: impl Into<Bytes>) -> Result<(), StreamError> {
        self.ensure_open()?;
        self.push(bytes.into())
    }

    /// Close the body and publish completion.
    ///
    /// The channel is closed before completion is published, so an observer
    /// woken by completion finds every chunk already queued.
    pub fn finish(mut self) -> Result<TimingContext, StreamError> {
        self.ensure_open()?;
        self.state = SinkState::Completed;
        self.timing.mark("complete");

        tracing::debug!(
            sections = self.sections_sent.len(),
            time_to_shell_ms = self.timing.time_to_shell().map(|d| d.as_millis() as u64),
            total_ms = self.timing.elapsed().as_millis() as u64,
            "document stream complete"
        );

        let Self { tx, phase, timing, .. } = self;
        drop(tx);
        phase.send_replace(LifecyclePhase::Completion);
        Ok(timing)
    }

    /// Stop producing the body early.
    pub fn abandon(self, reason: &str) {
        let Self { tx, phase, .. } = self;
        drop(tx);
        phase.send_replace(LifecyclePhase::Error(reason.to_string()));
    }

    /// Resolves once the receiving side has gone away.
    pub async fn closed(&self) {
        self.tx.closed().await
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Names of the chunks sent so far, in order.
    pub fn sections_sent(&self) -> &[String] {
        &self.sections_sent
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> LifecyclePhase {
        self.phase.borrow().clone()
    }

    /// Timing context reference.
    pub fn timing(&self) -> &TimingContext {
        &self.timing
    }

    fn ensure_open(&self) -> Result<(), StreamError> {
        match self.state {
            SinkState::Initial => Err(StreamError::ShellNotSent),
            SinkState::Completed => Err(StreamError::Completed),
            SinkState::ShellSent => Ok(()),
        }
    }

    fn push(&self, bytes: Bytes) -> Result<(), StreamError> {
        self.tx.send(bytes).map_err(|_| StreamError::Disconnected)
    }
}
