//! Top-level request dispatch.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::Request;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use edge_core::{CapabilityError, CapabilityRegistry, PlatformBindingSource, RequestContext};
use edge_data::ApiClient;
use edge_observability::{record_status, request_span};
use edge_streaming::{BotClassifier, DocumentRenderer, RenderError, RenderMode, RenderTreeResolver};
use tower::ServiceExt;
use tracing::Instrument;

use crate::bot::UserAgentClassifier;
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::tokens::{API_CLIENT, BINDINGS, EXECUTION_CONTEXT};

const ERROR_PAGE: &str = "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<title>Internal Server Error</title>\n</head>\n<body>\n<h1>500 Internal Server Error</h1>\n</body>\n</html>";

/// Single entry point for every inbound request.
///
/// Each request gets a fresh [`CapabilityRegistry`], then goes either to the
/// JSON API (paths under the API prefix) or to the document pipeline.
pub struct Dispatcher {
    api_prefix: String,
    api: Router,
    internal_api: bool,
    http: reqwest::Client,
    platform: Arc<dyn PlatformBindingSource>,
    resolver: Arc<dyn RenderTreeResolver>,
    renderer: DocumentRenderer,
    force_static: bool,
}

impl Dispatcher {
    /// Build a dispatcher from configuration.
    pub fn new(
        config: &ServerConfig,
        platform: Arc<dyn PlatformBindingSource>,
        resolver: Arc<dyn RenderTreeResolver>,
    ) -> Result<Self, ServerError> {
        config.validate()?;

        let classifier = match &config.bot_pattern {
            Some(pattern) => UserAgentClassifier::with_pattern(pattern)?,
            None => UserAgentClassifier::new()?,
        };
        let force_static = config.render_mode == RenderMode::Static;
        let renderer = DocumentRenderer::new(Arc::new(classifier)).with_forced_static(force_static);

        Ok(Self {
            api_prefix: config.api_prefix.clone(),
            api: edge_api::mount(&config.api_prefix, config.api_config()),
            internal_api: config.internal_api,
            http: reqwest::Client::builder().build()?,
            platform,
            resolver,
            renderer,
            force_static,
        })
    }

    /// Replace the crawler classifier.
    pub fn with_classifier(mut self, classifier: Arc<dyn BotClassifier>) -> Self {
        self.renderer = DocumentRenderer::new(classifier).with_forced_static(self.force_static);
        self
    }

    /// Whether `path` belongs to the JSON API.
    pub fn is_api_path(&self, path: &str) -> bool {
        path.strip_prefix(self.api_prefix.as_str())
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    }

    /// Bind the platform resources for one request.
    ///
    /// A missing origin or a disabled internal API leaves the API client
    /// unbound rather than failing the request.
    pub fn bind_capabilities(
        &self,
        request: &RequestContext,
    ) -> Result<CapabilityRegistry, CapabilityError> {
        let mut capabilities = CapabilityRegistry::new();
        capabilities.set(&BINDINGS, self.platform.bindings(request))?;
        capabilities.set(&EXECUTION_CONTEXT, self.platform.execution_context(request))?;

        if self.internal_api {
            match self.platform.origin(request) {
                Some(origin) => {
                    match ApiClient::for_origin(self.http.clone(), &origin, &self.api_prefix) {
                        Ok(client) => capabilities.set(
                            &API_CLIENT,
                            client.with_request_id(request.request_id.clone()),
                        )?,
                        Err(e) => tracing::warn!(error = %e, "api client not bound"),
                    }
                }
                None => tracing::debug!("request origin unknown, api client not bound"),
            }
        }

        Ok(capabilities)
    }

    /// Handle one request.
    pub async fn handle(&self, request: Request) -> Response {
        let (parts, body) = request.into_parts();
        let context = RequestContext::from_parts(&parts);
        let span = request_span(&context);

        async move {
            let started = Instant::now();
            let capabilities = match self.bind_capabilities(&context) {
                Ok(capabilities) => Arc::new(capabilities),
                Err(e) => {
                    tracing::error!(error = %e, "failed to bind request capabilities");
                    return error_page();
                }
            };

            let response = if self.is_api_path(&context.path) {
                let mut request = Request::from_parts(parts, body);
                request.extensions_mut().insert(capabilities);
                self.serve_api(request).await
            } else {
                self.serve_document(&context, &capabilities).await
            };

            record_status(&tracing::Span::current(), response.status());
            tracing::info!(
                status = response.status().as_u16(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "request handled"
            );
            response
        }
        .instrument(span)
        .await
    }

    async fn serve_api(&self, request: Request) -> Response {
        match self.api.clone().oneshot(request).await {
            Ok(response) => response,
            Err(never) => match never {},
        }
    }

    async fn serve_document(
        &self,
        context: &RequestContext,
        capabilities: &Arc<CapabilityRegistry>,
    ) -> Response {
        match self
            .renderer
            .handle(context, self.resolver.as_ref(), capabilities)
            .await
        {
            Ok(response) => response.map(Body::from_stream),
            Err(e) => {
                log_render_failure(&e);
                error_page()
            }
        }
    }
}

fn log_render_failure(err: &RenderError) {
    tracing::error!(error = %err, "document render failed before the shell");
}

fn error_page() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        [(CONTENT_TYPE, HeaderValue::from_static("text/html"))],
        ERROR_PAGE,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::http::header::HOST;
    use edge_core::{BackgroundTasks, Bindings};
    use edge_streaming::{ComponentError, Node, Resolution, RouterContext, Shell};
    use std::sync::Mutex;
    use tokio::sync::watch;
    use tracing_test::traced_test;

    use crate::platform::ConfigBindingSource;

    /// Records which capabilities the resolver saw.
    #[derive(Default)]
    struct ProbeResolver {
        seen: Mutex<Vec<Vec<&'static str>>>,
    }

    #[async_trait]
    impl RenderTreeResolver for ProbeResolver {
        async fn resolve(
            &self,
            request: &RequestContext,
            capabilities: &Arc<CapabilityRegistry>,
        ) -> Result<Resolution, ComponentError> {
            if request.path == "/panic" {
                panic!("resolver exploded");
            }
            self.seen.lock().unwrap().push(capabilities.bound_names());
            let greeting = capabilities.get(&BINDINGS)?.get("GREETING").unwrap_or("none").to_string();

            if request.path == "/broken" {
                let tree = Node::component(|| Err(ComponentError::msg("shell exploded")));
                return Ok(Resolution::ok(RouterContext::new(Shell::default(), tree)));
            }
            let tree = Node::element("p").text(greeting).into();
            Ok(Resolution::ok(RouterContext::new(Shell::default(), tree)))
        }
    }

    fn dispatcher(config: ServerConfig, resolver: Arc<ProbeResolver>) -> Dispatcher {
        let (_tx, rx) = watch::channel(false);
        let platform = Arc::new(ConfigBindingSource::new(
            Bindings::new().with("GREETING", "hi there"),
            "http",
            BackgroundTasks::new(),
            rx,
        ));
        Dispatcher::new(&config, platform, resolver).unwrap()
    }

    fn get(path: &str) -> Request {
        axum::http::Request::get(path)
            .header(HOST, "127.0.0.1:8787")
            .body(Body::empty())
            .unwrap()
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    // === Branching Tests ===

    #[test]
    fn test_is_api_path() {
        let d = dispatcher(ServerConfig::default(), Arc::default());

        assert!(d.is_api_path("/api"));
        assert!(d.is_api_path("/api/health"));
        assert!(d.is_api_path("/api/slow"));
        assert!(!d.is_api_path("/apis"));
        assert!(!d.is_api_path("/"));
        assert!(!d.is_api_path("/about/api"));
    }

    #[tokio::test]
    async fn test_api_requests_never_reach_resolver() {
        let resolver = Arc::new(ProbeResolver::default());
        let d = dispatcher(ServerConfig::default(), resolver.clone());

        let response = d.handle(get("/api/health")).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, r#"{"status":"ok"}"#);
        assert!(resolver.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_document_requests_get_capabilities() {
        let resolver = Arc::new(ProbeResolver::default());
        let d = dispatcher(ServerConfig::default(), resolver.clone());

        let response = d.handle(get("/")).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_string(response).await.contains("<p>hi there</p>"));
        assert_eq!(
            resolver.seen.lock().unwrap()[0],
            vec!["api_client", "bindings", "execution_context"]
        );
    }

    // === Capability Tests ===

    #[test]
    fn test_registries_are_per_request() {
        let d = dispatcher(ServerConfig::default(), Arc::default());
        let ctx = RequestContext::from_parts(&get("/").into_parts().0);

        let first = d.bind_capabilities(&ctx).unwrap();
        let second = d.bind_capabilities(&ctx).unwrap();
        assert_eq!(first.len(), 3);
        assert_eq!(second.len(), 3);
        assert_eq!(
            first.get(&API_CLIENT).unwrap().base_url().as_str(),
            "http://127.0.0.1:8787/api/"
        );
    }

    #[test]
    fn test_api_client_optional() {
        let config = ServerConfig {
            internal_api: false,
            ..Default::default()
        };
        let d = dispatcher(config, Arc::default());
        let ctx = RequestContext::from_parts(&get("/").into_parts().0);

        let capabilities = d.bind_capabilities(&ctx).unwrap();
        assert!(capabilities.try_get(&API_CLIENT).is_none());
        assert_eq!(
            capabilities.get(&API_CLIENT).unwrap_err(),
            CapabilityError::Unbound("api_client")
        );
    }

    #[test]
    fn test_api_client_skipped_without_origin() {
        let d = dispatcher(ServerConfig::default(), Arc::default());
        let ctx = RequestContext::new(axum::http::Method::GET, "/");

        let capabilities = d.bind_capabilities(&ctx).unwrap();
        assert!(!capabilities.contains(&API_CLIENT));
        assert!(capabilities.contains(&BINDINGS));
    }

    // === Error Tests ===

    #[tokio::test]
    #[traced_test]
    async fn test_pre_shell_failure_is_500_page() {
        let d = dispatcher(ServerConfig::default(), Arc::default());

        let response = d.handle(get("/broken")).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[CONTENT_TYPE], "text/html");
        assert!(body_string(response).await.contains("500 Internal Server Error"));
        assert!(logs_contain("document render failed before the shell"));
        assert!(logs_contain("shell exploded"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_resolver_panic_is_500_page() {
        let d = dispatcher(ServerConfig::default(), Arc::default());

        let response = d.handle(get("/panic")).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_string(response).await.contains("500 Internal Server Error"));
        assert!(logs_contain("resolver exploded"));

        let response = d.handle(get("/")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
