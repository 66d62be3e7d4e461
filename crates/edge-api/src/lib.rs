//! Internal JSON API.
//!
//! This crate provides:
//! - `router` / `mount` - The `/health` and `/slow` endpoints
//! - `EndpointError` - JSON error responses
//! - `with_error_policy` - Panic-to-500 conversion

mod error;
mod routes;

pub use error::*;
pub use routes::*;
