//! hskk-scoring - HSKK Spoken Answer Scoring service
//!
//! **Module Identity:**
//! - Name: hskk-scoring
//! - Port: 5780 (default)
//!
//! Loads the bootstrap TOML, wires the collaborator clients into the scoring
//! engine and serves it over HTTP until Ctrl-C or SIGTERM.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hskk_scoring::config::{build_engine, ApiKeys};
use hskk_scoring::AppState;

#[derive(Parser, Debug)]
#[command(name = "hskk-scoring")]
#[command(about = "HSKK spoken answer scoring service")]
#[command(version)]
struct Args {
    /// Config file (overrides HSKK_CONFIG and the platform config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen port (overrides [server] port)
    #[arg(short, long, env = "HSKK_PORT")]
    port: Option<u16>,

    /// Log level filter when RUST_LOG is unset (overrides [logging] level)
    #[arg(long, env = "HSKK_LOG_LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Loaded before logging so [logging] can seed the filter
    let config = hskk_common::config::load_bootstrap_config(args.config.as_deref())
        .context("Failed to load configuration")?;

    let level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("hskk_scoring={level},hskk_common={level},tower_http=info").into());
    let registry = tracing_subscriber::registry().with(filter);
    match &config.logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            registry
                .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(std::sync::Mutex::new(file)))
                .init();
        }
        None => registry.with(tracing_subscriber::fmt::layer()).init(),
    }

    info!("Starting hskk-scoring v{}", env!("CARGO_PKG_VERSION"));

    let engine = build_engine(&config, &ApiKeys::from_env()).context("Failed to build scoring engine")?;
    let state = AppState::new(engine);
    let app = hskk_scoring::build_router(state);

    let port = args.port.unwrap_or(config.server.port);
    let addr: SocketAddr = format!("{}:{}", config.server.host, port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", config.server.host, port))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
