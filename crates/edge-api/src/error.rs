//! Endpoint error policy.

use std::any::Any;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use edge_data::ErrorBody;

/// Failure of an API endpoint, rendered as a JSON error body.
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    #[error("not found")]
    NotFound,

    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("internal server error: {0}")]
    Internal(String),
}

impl EndpointError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for EndpointError {
    fn into_response(self) -> Response {
        let body = match &self {
            Self::NotFound => ErrorBody::new("not found"),
            Self::MethodNotAllowed => ErrorBody::new("method not allowed"),
            Self::Internal(detail) => {
                tracing::error!(detail = %detail, "api endpoint failed");
                ErrorBody::new("internal server error")
            }
        };
        (self.status(), Json(body)).into_response()
    }
}

/// Panic handler for the API: the detail is logged, the client sees a plain 500.
pub(crate) fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };
    EndpointError::Internal(format!("handler panicked: {detail}")).into_response()
}
