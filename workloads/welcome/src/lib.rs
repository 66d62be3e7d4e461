//! Reference workload for the edge streaming SSR platform.
//!
//! This workload shows:
//! - Reading execution bindings from the capability registry
//! - Starting a self-call to `/api/slow` in the loader and streaming its result
//! - A not-found view for every other path

use edge_sdk::prelude::*;

/// Bindings key holding the greeting shown on the home page.
pub const GREETING_KEY: &str = "GREETING";

const DEFAULT_GREETING: &str = "No greeting configured.";
const SLOW_FALLBACK: &str = "Loading slow response...";
const API_UNAVAILABLE: &str = "The internal API is not available for this request.";

const STYLES: &str = "body{font-family:system-ui,sans-serif;margin:0}\
main{display:flex;flex-direction:column;align-items:center;gap:2rem;padding:4rem 1rem}\
.message-card{border:1px solid #e5e7eb;border-radius:1.5rem;padding:1.5rem;max-width:20rem}\
.notice{color:#6b7280}";

/// Loader output for the home page.
pub struct HomeData {
    pub greeting: String,
    /// The `/api/slow` self-call, absent when no API client is bound.
    pub slow: Option<Deferred<String>>,
}

/// Resolves `/` to the home page and anything else to a 404 view.
#[derive(Debug, Default, Clone, Copy)]
pub struct WelcomeResolver;

#[async_trait]
impl RenderTreeResolver for WelcomeResolver {
    async fn resolve(
        &self,
        request: &RequestContext,
        capabilities: &Arc<CapabilityRegistry>,
    ) -> Result<Resolution, ComponentError> {
        match request.path.as_str() {
            "/" => {
                let data = load_home(capabilities)?;
                Ok(Resolution::ok(home_view(data)))
            }
            path => {
                tracing::debug!(path, "no page for path");
                Ok(Resolution::not_found(not_found_view(path)))
            }
        }
    }
}

/// Read the greeting and start the slow self-call.
///
/// The self-call is spawned here so it runs while the shell is written.
pub fn load_home(capabilities: &CapabilityRegistry) -> Result<HomeData, ComponentError> {
    let greeting = capabilities
        .get(&BINDINGS)?
        .get(GREETING_KEY)
        .unwrap_or(DEFAULT_GREETING)
        .to_string();

    let slow = capabilities.try_get(&API_CLIENT).cloned().map(|client| {
        Deferred::spawn(async move { Ok::<_, ComponentError>(client.slow().await?.message) })
    });

    Ok(HomeData { greeting, slow })
}

pub fn home_view(data: HomeData) -> RouterContext {
    let slow = match data.slow {
        Some(deferred) => Node::await_deferred(
            deferred,
            Node::element("div").text(SLOW_FALLBACK).into(),
            message_card,
        ),
        None => Node::element("p").class("notice").text(API_UNAVAILABLE).into(),
    };

    let tree = Node::element("main")
        .child(Node::element("header").child(Node::element("h1").text("Welcome")))
        .child(
            Node::element("div")
                .class("messages")
                .child(message_card(data.greeting))
                .child(slow),
        )
        .into();

    let head = HeadContent::new("Welcome")
        .with_description("A streamed welcome page")
        .with_style(STYLES);
    RouterContext::new(Shell::new(head), tree)
}

pub fn not_found_view(path: &str) -> RouterContext {
    let tree = Node::element("main")
        .child(Node::element("h1").text("404"))
        .child(Node::element("p").text(format!("Nothing lives at {path}.")))
        .child(Node::element("a").attr("href", "/").text("Back home"))
        .into();

    let head = HeadContent::new("Not Found").with_style(STYLES);
    RouterContext::new(Shell::new(head), tree)
}

fn message_card(message: String) -> Node {
    Node::element("div")
        .class("message-card")
        .child(Node::element("p").text(message))
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{Method, StatusCode};

    fn capabilities(greeting: Option<&str>) -> Arc<CapabilityRegistry> {
        let mut bindings = Bindings::new();
        if let Some(greeting) = greeting {
            bindings.insert(GREETING_KEY, greeting);
        }
        let mut registry = CapabilityRegistry::new();
        registry.set(&BINDINGS, Arc::new(bindings)).unwrap();
        Arc::new(registry)
    }

    async fn render(context: RouterContext) -> String {
        let stream = render_to_stream(&context.shell, context.tree, RenderOptions::new()).unwrap();
        stream.body.collect_string().await
    }

    // === Loader Tests ===

    #[test]
    fn test_greeting_from_bindings() {
        let data = load_home(&capabilities(Some("Hello from config"))).unwrap();
        assert_eq!(data.greeting, "Hello from config");
        assert!(data.slow.is_none());
    }

    #[test]
    fn test_greeting_fallback() {
        let data = load_home(&capabilities(None)).unwrap();
        assert_eq!(data.greeting, DEFAULT_GREETING);
    }

    #[test]
    fn test_bindings_required() {
        let err = load_home(&CapabilityRegistry::new()).err().unwrap();
        assert!(err.to_string().contains("bindings"));
    }

    // === View Tests ===

    #[tokio::test]
    async fn test_home_streams_slow_message() {
        let html = render(home_view(HomeData {
            greeting: "hi".to_string(),
            slow: Some(Deferred::ready("ok".to_string())),
        }))
        .await;

        assert!(html.contains("<title>Welcome</title>"));
        assert!(html.contains(r#"<div class="message-card"><p>hi</p></div>"#));
        assert!(html.contains("<div>Loading slow response...</div>"));
        assert!(html.contains(r#"<div class="message-card"><p>ok</p></div>"#));
    }

    #[tokio::test]
    async fn test_home_without_api_client_shows_notice() {
        let html = render(home_view(HomeData {
            greeting: "hi".to_string(),
            slow: None,
        }))
        .await;

        assert!(html.contains(API_UNAVAILABLE));
        assert!(!html.contains(SLOW_FALLBACK));
    }

    // === Resolver Tests ===

    #[tokio::test]
    async fn test_unknown_path_is_404() {
        let request = RequestContext::new(Method::GET, "/missing");
        let resolution = WelcomeResolver
            .resolve(&request, &capabilities(None))
            .await
            .unwrap();

        assert_eq!(resolution.status, StatusCode::NOT_FOUND);
        assert!(render(resolution.context).await.contains("Nothing lives at /missing."));
    }

    #[tokio::test]
    async fn test_home_path_is_200() {
        let request = RequestContext::new(Method::GET, "/");
        let resolution = WelcomeResolver
            .resolve(&request, &capabilities(Some("hey")))
            .await
            .unwrap();

        assert_eq!(resolution.status, StatusCode::OK);
        assert!(render(resolution.context).await.contains("<p>hey</p>"));
    }
}
