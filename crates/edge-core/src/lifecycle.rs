//! Request lifecycle tracking.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Lifecycle phases of a streamed document body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecyclePhase {
    /// Shell not yet emitted.
    Start,
    /// Shell has been emitted, deferred content may follow.
    ShellSent,
    /// A named boundary chunk has been emitted.
    SectionSent(String),
    /// Body fully flushed and closed.
    Completion,
    /// Production stopped early (e.g. the client went away).
    Error(String),
}

impl LifecyclePhase {
    /// Whether body production has ended, successfully or not.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completion | Self::Error(_))
    }

    /// Whether at least the shell has reached the transport.
    pub fn shell_emitted(&self) -> bool {
        !matches!(self, Self::Start)
    }
}

/// Timing context for observability.
#[derive(Debug, Clone)]
pub struct TimingContext {
    start: Instant,
    marks: HashMap<String, Instant>,
}

impl TimingContext {
    /// Create a new timing context.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            marks: HashMap::new(),
        }
    }

    /// Record a timing mark.
    pub fn mark(&mut self, name: &str) {
        self.marks.insert(name.to_string(), Instant::now());
    }

    /// Mark section sent.
    pub fn mark_section_sent(&mut self, section: &str) {
        self.mark(&format!("section_{}_sent", section));
    }

    /// Get elapsed time since start.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Get time from start to a named mark.
    pub fn since_start(&self, name: &str) -> Option<Duration> {
        self.marks.get(name).map(|t| t.duration_since(self.start))
    }

    /// Get time to shell flush.
    pub fn time_to_shell(&self) -> Option<Duration> {
        self.since_start("shell_sent")
    }

    /// Get time to first section.
    pub fn time_to_first_section(&self) -> Option<Duration> {
        self.marks
            .iter()
            .filter(|(k, _)| k.ends_with("_sent") && k.starts_with("section_"))
            .map(|(_, t)| t.duration_since(self.start))
            .min()
    }
}

impl Default for TimingContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_terminal() {
        assert!(!LifecyclePhase::Start.is_terminal());
        assert!(!LifecyclePhase::ShellSent.is_terminal());
        assert!(!LifecyclePhase::SectionSent("B:0".into()).is_terminal());
        assert!(LifecyclePhase::Completion.is_terminal());
        assert!(LifecyclePhase::Error("gone".into()).is_terminal());
    }

    #[test]
    fn test_phase_shell_emitted() {
        assert!(!LifecyclePhase::Start.shell_emitted());
        assert!(LifecyclePhase::ShellSent.shell_emitted());
        assert!(LifecyclePhase::Completion.shell_emitted());
    }

    #[test]
    fn test_timing_marks() {
        let mut timing = TimingContext::new();
        assert!(timing.time_to_shell().is_none());
        assert!(timing.time_to_first_section().is_none());

        timing.mark("shell_sent");
        timing.mark_section_sent("B:0");

        assert!(timing.time_to_shell().is_some());
        assert!(timing.time_to_first_section().is_some());
        assert!(timing.since_start("section_B:0_sent").is_some());
    }
}
