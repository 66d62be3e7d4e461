//! Request spans.

use edge_core::RequestContext;
use http::StatusCode;
use tracing::Span;

/// Span wrapping all work done for one request.
///
/// The `status` field starts empty and is filled by [`record_status`].
pub fn request_span(request: &RequestContext) -> Span {
    tracing::info_span!(
        "request",
        request_id = %request.request_id,
        method = %request.method,
        path = %request.path,
        status = tracing::field::Empty,
    )
}

/// Record the response status on a request span.
pub fn record_status(span: &Span, status: StatusCode) {
    span.record("status", status.as_u16());
}
