//! Public SDK for the edge streaming SSR platform.
//!
//! This crate re-exports all platform functionality:
//!
//! ```ignore
//! use edge_sdk::prelude::*;
//!
//! struct Home;
//!
//! #[async_trait]
//! impl RenderTreeResolver for Home {
//!     async fn resolve(
//!         &self,
//!         _request: &RequestContext,
//!         capabilities: &Arc<CapabilityRegistry>,
//!     ) -> Result<Resolution, ComponentError> {
//!         let client = capabilities.get(&API_CLIENT)?.clone();
//!         let message = Deferred::spawn(async move {
//!             Ok::<_, ComponentError>(client.slow().await?.message)
//!         });
//!
//!         let tree = Node::await_deferred(message, Node::text("Loading..."), |m: String| {
//!             Node::element("p").text(m).into()
//!         });
//!         Ok(Resolution::ok(RouterContext::new(Shell::default(), tree)))
//!     }
//! }
//! ```

pub use edge_api;
pub use edge_core;
pub use edge_data;
pub use edge_observability;
pub use edge_server;
pub use edge_streaming;

/// Prelude for convenient imports.
pub mod prelude {
    pub use std::sync::Arc;

    pub use async_trait::async_trait;
    pub use edge_core::*;
    pub use edge_data::*;
    pub use edge_observability::*;
    pub use edge_server::*;
    pub use edge_streaming::*;
}
