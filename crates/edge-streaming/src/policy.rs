//! When the response is handed back to the transport.

use serde::{Deserialize, Serialize};

/// How a view wants to be rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    /// Stream deferred content as it settles.
    #[default]
    Interactive,
    /// Produce the full document before responding.
    Static,
}

/// Point at which the response becomes visible to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionPolicy {
    /// Respond once the shell is emitted; the body keeps streaming.
    StreamAfterShell,
    /// Respond once every boundary has settled.
    WaitForAllReady,
}

impl CompletionPolicy {
    /// Crawlers and static views get the complete document up front.
    pub fn decide(is_crawler: bool, mode: RenderMode) -> Self {
        if is_crawler || mode == RenderMode::Static {
            Self::WaitForAllReady
        } else {
            Self::StreamAfterShell
        }
    }

    pub fn waits_for_all(self) -> bool {
        self == Self::WaitForAllReady
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decide() {
        use CompletionPolicy::*;

        assert_eq!(CompletionPolicy::decide(false, RenderMode::Interactive), StreamAfterShell);
        assert_eq!(CompletionPolicy::decide(true, RenderMode::Interactive), WaitForAllReady);
        assert_eq!(CompletionPolicy::decide(false, RenderMode::Static), WaitForAllReady);
        assert_eq!(CompletionPolicy::decide(true, RenderMode::Static), WaitForAllReady);
    }

    #[test]
    fn test_render_mode_serde() {
        let mode: RenderMode = serde_json::from_str("\"static\"").unwrap();
        assert_eq!(mode, RenderMode::Static);
        assert_eq!(RenderMode::default(), RenderMode::Interactive);
    }
}
