//! Render error types.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Failure raised by a component or a deferred value inside a render tree.
///
/// Cheap to clone so a single deferred result can be observed by every subtree
/// that consumes it.
#[derive(Clone)]
pub struct ComponentError(Arc<anyhow::Error>);

impl ComponentError {
    /// Create an error from a message.
    pub fn msg<M>(message: M) -> Self
    where
        M: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        Self(Arc::new(anyhow::Error::msg(message)))
    }

    /// Wrap an `anyhow::Error`.
    pub fn from_anyhow(err: anyhow::Error) -> Self {
        Self(Arc::new(err))
    }

    /// Turn a caught panic payload into an error.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let detail = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        Self::msg(format!("panicked: {detail}"))
    }

    /// Underlying error.
    pub fn inner(&self) -> &anyhow::Error {
        &self.0
    }
}

impl<E> From<E> for ComponentError
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(err: E) -> Self {
        Self(Arc::new(anyhow::Error::new(err)))
    }
}

impl fmt::Display for ComponentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#}", self.0)
    }
}

impl fmt::Debug for ComponentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

/// Errors produced while turning a request into a document.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// Failed before any byte of the shell was emitted. The caller turns this
    /// into an error response.
    #[error("shell render failed: {0}")]
    PreShell(ComponentError),

    /// Failed after the shell was emitted. Reported to the error hook, never
    /// returned to the caller.
    #[error("boundary {boundary} failed while streaming: {cause}")]
    Streaming {
        boundary: String,
        cause: ComponentError,
    },

    /// The render-tree resolver could not produce a router context.
    #[error("view resolution failed: {0}")]
    Resolve(ComponentError),
}

impl RenderError {
    /// Whether this error happened after the shell reached the transport.
    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edge_core::CapabilityError;

    #[test]
    fn test_component_error_from_std_error() {
        let err: ComponentError = CapabilityError::Unbound("api_client").into();
        assert!(err.to_string().contains("api_client"));
        assert!(err.inner().downcast_ref::<CapabilityError>().is_some());
    }

    #[test]
    fn test_component_error_clone_shares_source() {
        let err = ComponentError::msg("boom");
        let clone = err.clone();
        assert_eq!(err.to_string(), clone.to_string());
    }

    #[test]
    fn test_component_error_from_panic_payload() {
        let err = ComponentError::from_panic(Box::new("bad index"));
        assert_eq!(err.to_string(), "panicked: bad index");

        let err = ComponentError::from_panic(Box::new(String::from("owned")));
        assert_eq!(err.to_string(), "panicked: owned");

        let err = ComponentError::from_panic(Box::new(7u8));
        assert_eq!(err.to_string(), "panicked: unknown panic payload");
    }

    #[test]
    fn test_render_error_phase() {
        let pre = RenderError::PreShell(ComponentError::msg("x"));
        let streaming = RenderError::Streaming {
            boundary: "B:0".into(),
            cause: ComponentError::msg("y"),
        };

        assert!(!pre.is_streaming());
        assert!(streaming.is_streaming());
        assert_eq!(streaming.to_string(), "boundary B:0 failed while streaming: y");
    }
}
