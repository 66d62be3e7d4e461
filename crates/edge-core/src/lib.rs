//! Core abstractions for the edge streaming SSR platform.
//!
//! This crate provides the fundamental types shared by every request path:
//! - `ContextToken` / `CapabilityRegistry` - Typed per-request capabilities
//! - `RequestContext` - Request metadata and timing
//! - `LifecyclePhase` - Document body lifecycle tracking
//! - `Bindings` / `ExecutionContext` - Platform resources bound per request

mod capability;
mod context;
mod lifecycle;
mod platform;

pub use capability::*;
pub use context::*;
pub use lifecycle::*;
pub use platform::*;
