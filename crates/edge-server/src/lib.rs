//! Request dispatch and serving for edge workloads.
//!
//! This crate provides:
//! - `Dispatcher` - Per-request capability binding and API/document branching
//! - `API_CLIENT` / `BINDINGS` / `EXECUTION_CONTEXT` - Process-wide context tokens
//! - `UserAgentClassifier` - Crawler detection from the user agent
//! - `ConfigBindingSource` - Platform resources backed by `ServerConfig`
//! - `ServerConfig` - File and CLI configuration
//! - `Server` - HTTP serving loop with graceful shutdown

mod bot;
mod config;
mod dispatch;
mod error;
mod platform;
mod server;
mod tokens;

pub use bot::*;
pub use config::*;
pub use dispatch::*;
pub use error::*;
pub use platform::*;
pub use server::*;
pub use tokens::*;
