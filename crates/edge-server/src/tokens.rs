//! Context tokens for the capabilities the dispatcher binds.
//!
//! Tokens are created once per process; values are bound per request.

use std::sync::{Arc, LazyLock};

use edge_core::{Bindings, ContextToken, ExecutionContext};
use edge_data::ApiClient;

/// Execution bindings visible to the request.
pub static BINDINGS: LazyLock<ContextToken<Arc<Bindings>>> =
    LazyLock::new(|| ContextToken::new("bindings"));

/// Lifetime handle for background work.
pub static EXECUTION_CONTEXT: LazyLock<ContextToken<ExecutionContext>> =
    LazyLock::new(|| ContextToken::new("execution_context"));

/// Client for the internal API, scoped to the request's origin.
///
/// Optional: not bound when the internal API is disabled or the origin is
/// unknown. Read it with `try_get` unless absence is a wiring bug.
pub static API_CLIENT: LazyLock<ContextToken<ApiClient>> =
    LazyLock::new(|| ContextToken::new("api_client"));
