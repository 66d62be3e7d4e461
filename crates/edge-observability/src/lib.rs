//! Observability infrastructure for the edge streaming SSR platform.
//!
//! This crate provides:
//! - `init_tracing` / `LogFormat` - Process-wide subscriber installation
//! - `request_span` - Per-request span carrying the request id

mod logging;
mod span;

pub use logging::*;
pub use span::*;
