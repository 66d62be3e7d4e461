//! Request context with typed parameters.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use http::header::{HeaderName, HOST, USER_AGENT};
use http::request::Parts;
use http::{HeaderMap, HeaderValue, Method, Uri};

use crate::lifecycle::TimingContext;

/// Header carrying a caller-supplied request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Unique request identifier for tracing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(pub String);

static REQUEST_COUNTER: AtomicU32 = AtomicU32::new(0);

impl RequestId {
    /// Generate a new request ID.
    pub fn generate() -> Self {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let seq = REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("{:x}-{:x}-{:04x}", nanos, std::process::id(), seq))
    }

    /// Create from an existing ID string.
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Query string parameters.
pub type QueryParams = HashMap<String, String>;

/// Request metadata shared by the dispatcher, resolvers and the render pipeline.
///
/// Holds everything a document render needs from the inbound request except the
/// body, which documents never read.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Unique request identifier.
    pub request_id: RequestId,
    /// HTTP method.
    pub method: Method,
    /// Full request URI as received.
    pub uri: Uri,
    /// Request path.
    pub path: String,
    /// Query string parameters.
    pub query: QueryParams,
    /// HTTP headers.
    pub headers: HeaderMap,
    /// Timing context for observability.
    pub timing: TimingContext,
}

impl RequestContext {
    /// Create a new request context.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        let path = path.into();
        let uri = path.parse().unwrap_or_default();
        Self {
            request_id: RequestId::generate(),
            method,
            uri,
            path,
            query: HashMap::new(),
            headers: HeaderMap::new(),
            timing: TimingContext::new(),
        }
    }

    /// Build a context from the head of an inbound request.
    pub fn from_parts(parts: &Parts) -> Self {
        let request_id = parts
            .headers
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(RequestId::from_string)
            .unwrap_or_else(RequestId::generate);

        let query = parts
            .uri
            .query()
            .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
            .unwrap_or_default();

        Self {
            request_id,
            method: parts.method.clone(),
            uri: parts.uri.clone(),
            path: parts.uri.path().to_string(),
            query,
            headers: parts.headers.clone(),
            timing: TimingContext::new(),
        }
    }

    /// Add a header, ignoring values that are not valid header text.
    pub fn with_header(mut self, name: HeaderName, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Get a query parameter by name.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(|s| s.as_str())
    }

    /// Get a header value by name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The caller's user agent, if it sent one.
    pub fn user_agent(&self) -> Option<&str> {
        self.headers.get(USER_AGENT).and_then(|v| v.to_str().ok())
    }

    /// Host the request was addressed to, from the `Host` header or the URI authority.
    pub fn host(&self) -> Option<&str> {
        self.headers
            .get(HOST)
            .and_then(|v| v.to_str().ok())
            .or_else(|| self.uri.authority().map(|a| a.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Request;

    fn parts(builder: http::request::Builder) -> Parts {
        builder.body(()).unwrap().into_parts().0
    }

    // === RequestId Tests ===

    #[test]
    fn test_request_id_generate_unique() {
        let a = RequestId::generate();
        let b = RequestId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_request_id_display() {
        let id = RequestId::from_string("req-1");
        assert_eq!(id.to_string(), "req-1");
        assert_eq!(id.as_str(), "req-1");
    }

    // === RequestContext Tests ===

    #[test]
    fn test_from_parts_reads_path_and_query() {
        let parts = parts(Request::get("/search?q=shoes&page=2"));
        let ctx = RequestContext::from_parts(&parts);

        assert_eq!(ctx.method, Method::GET);
        assert_eq!(ctx.path, "/search");
        assert_eq!(ctx.query_param("q"), Some("shoes"));
        assert_eq!(ctx.query_param("page"), Some("2"));
        assert_eq!(ctx.query_param("missing"), None);
    }

    #[test]
    fn test_from_parts_decodes_query() {
        let parts = parts(Request::get("/?name=a%20b"));
        let ctx = RequestContext::from_parts(&parts);

        assert_eq!(ctx.query_param("name"), Some("a b"));
    }

    #[test]
    fn test_from_parts_keeps_caller_request_id() {
        let parts = parts(Request::get("/").header(REQUEST_ID_HEADER, "abc-123"));
        let ctx = RequestContext::from_parts(&parts);

        assert_eq!(ctx.request_id.as_str(), "abc-123");
    }

    #[test]
    fn test_from_parts_generates_request_id_when_missing() {
        let parts = parts(Request::get("/"));
        let ctx = RequestContext::from_parts(&parts);

        assert!(!ctx.request_id.as_str().is_empty());
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let ctx = RequestContext::new(Method::GET, "/")
            .with_header(USER_AGENT, "Mozilla/5.0");

        assert_eq!(ctx.header("User-Agent"), Some("Mozilla/5.0"));
        assert_eq!(ctx.user_agent(), Some("Mozilla/5.0"));
    }

    #[test]
    fn test_host_prefers_header_then_authority() {
        let with_header = RequestContext::new(Method::GET, "/").with_header(HOST, "example.com");
        assert_eq!(with_header.host(), Some("example.com"));

        let parts = parts(Request::get("http://edge.local:8787/"));
        let from_uri = RequestContext::from_parts(&parts);
        assert_eq!(from_uri.host(), Some("edge.local:8787"));

        let none = RequestContext::new(Method::GET, "/");
        assert_eq!(none.host(), None);
    }
}
