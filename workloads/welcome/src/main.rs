//! `edge-welcome` - Serve the welcome workload.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use edge_sdk::edge_observability::{init_tracing, LogFormat};
use edge_sdk::edge_server::{ctrl_c, Server, ServerConfig};
use edge_sdk::edge_streaming::RenderMode;
use welcome::WelcomeResolver;

/// Edge Welcome - Streaming SSR reference server
#[derive(Parser)]
#[command(name = "edge-welcome")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file path (defaults to the nearest edge.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Log as JSON lines
    #[arg(long)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Render every document completely before responding
    #[arg(long = "static")]
    static_mode: bool,
}

impl Cli {
    fn load_config(&self) -> Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load(path)?,
            None => {
                let cwd = std::env::current_dir().context("Failed to read working directory")?;
                ServerConfig::discover(&cwd)?
            }
        };

        if let Some(listen) = self.listen {
            config.listen = listen;
        }
        if self.json {
            config.log_format = LogFormat::Json;
        }
        if self.static_mode {
            config.render_mode = RenderMode::Static;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;

    init_tracing(config.log_format, cli.verbose)?;
    tracing::info!(
        listen = %config.listen,
        render_mode = ?config.render_mode,
        internal_api = config.internal_api,
        "starting edge-welcome"
    );

    let server = Server::bind(&config, Arc::new(WelcomeResolver))
        .await
        .with_context(|| format!("Failed to start server on {}", config.listen))?;
    server.run_until(ctrl_c()).await?;

    Ok(())
}
