//! Data access for document loaders.
//!
//! This crate provides:
//! - `ApiClient` - Typed client for the internal JSON API
//! - `HealthStatus` / `SlowMessage` / `ErrorBody` - Wire types shared with the API router
//! - `FetchError` - Client failure modes

mod api;
mod client;

pub use api::*;
pub use client::*;
