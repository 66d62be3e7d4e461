//! HTTP serving loop.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::response::Response;
use axum::Router;
use edge_core::BackgroundTasks;
use edge_streaming::RenderTreeResolver;
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::config::ServerConfig;
use crate::dispatch::Dispatcher;
use crate::error::ServerError;
use crate::platform::ConfigBindingSource;

/// Axum application sending every request through `dispatcher`.
pub fn app(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new().fallback(dispatch).with_state(dispatcher)
}

async fn dispatch(State(dispatcher): State<Arc<Dispatcher>>, request: Request) -> Response {
    dispatcher.handle(request).await
}

/// A bound server with its platform resources.
pub struct Server {
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    tasks: BackgroundTasks,
    shutdown: watch::Sender<bool>,
}

impl Server {
    /// Bind the configured address and wire the dispatcher.
    pub async fn bind(
        config: &ServerConfig,
        resolver: Arc<dyn RenderTreeResolver>,
    ) -> Result<Self, ServerError> {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let tasks = BackgroundTasks::new();
        let platform = Arc::new(
            ConfigBindingSource::new(
                config.bindings.clone(),
                config.public_scheme.clone(),
                tasks.clone(),
                shutdown_rx,
            )
            .with_allowed_hosts(config.allowed_hosts.clone()),
        );
        let dispatcher = Arc::new(Dispatcher::new(config, platform, resolver)?);

        let listener = TcpListener::bind(config.listen)
            .await
            .map_err(|source| ServerError::Bind {
                addr: config.listen,
                source,
            })?;

        Ok(Self {
            listener,
            dispatcher,
            tasks,
            shutdown,
        })
    }

    /// Address actually bound, useful when the configured port is 0.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener.local_addr().map_err(ServerError::Serve)
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Serve until `signal` resolves, then wait for in-flight requests and
    /// background work.
    ///
    /// Execution contexts observe cancellation as soon as `signal` fires.
    pub async fn run_until<F>(self, signal: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Self {
            listener,
            dispatcher,
            tasks,
            shutdown,
        } = self;

        let addr = listener.local_addr().map_err(ServerError::Serve)?;
        tracing::info!(%addr, "listening");

        let graceful = async move {
            signal.await;
            tracing::info!("shutdown requested");
            shutdown.send_replace(true);
        };

        axum::serve(listener, app(dispatcher))
            .with_graceful_shutdown(graceful)
            .await
            .map_err(ServerError::Serve)?;

        tracing::info!(pending = tasks.pending(), "draining background work");
        tasks.drain().await;
        tracing::info!("server stopped");
        Ok(())
    }
}

/// Resolves on Ctrl-C.
pub async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
