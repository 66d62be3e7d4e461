//! Shell-first streaming document renderer.
//!
//! This crate turns a render tree into a streamed HTML body:
//! - `Node` / `Deferred` - Render tree with suspense boundaries over pending values
//! - `Shell` - Document head and body wrapper
//! - `StreamingSink` - Shell-first body producer
//! - `render_to_stream` - Shell render plus out-of-order boundary streaming
//! - `CompletionPolicy` - Stream after shell vs. wait for the whole tree
//! - `DocumentRenderer` - Per-request document pipeline

mod deferred;
mod document;
mod error;
mod node;
mod policy;
mod render;
mod shell;
mod sink;

pub use deferred::*;
pub use document::*;
pub use error::*;
pub use node::*;
pub use policy::*;
pub use render::*;
pub use shell::*;
pub use sink::*;
