//! vigil-rd - Risk & Dissonance Detection microservice
//!
//! **Module Identity:**
//! - Name: vigil-rd (Risk & Dissonance)
//! - Port: 5810
//!
//! Receives per-utterance speech/emotion features over HTTP, assesses risk,
//! tracks per-user crisis state and dispatches crisis events.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use vigil_common::config::{ConfigPathResolver, LoggingConfig};
use vigil_common::events::EventBus;

use vigil_rd::config::EngineConfig;
use vigil_rd::{AppState, RiskEngine};

/// Command-line arguments for vigil-rd
#[derive(Parser, Debug)]
#[command(name = "vigil-rd")]
#[command(about = "Risk & dissonance detection microservice for Vigil")]
#[command(version)]
struct Args {
    /// Configuration file (overrides VIGIL_RD_CONFIG and default locations)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides server.port)
    #[arg(short, long, env = "VIGIL_RD_PORT")]
    port: Option<u16>,

    /// Address to bind (overrides server.bind_address)
    #[arg(short, long, env = "VIGIL_RD_BIND")]
    bind: Option<String>,

    /// Pattern taxonomy file (overrides patterns.taxonomy_path)
    #[arg(short, long, env = "VIGIL_RD_TAXONOMY")]
    taxonomy: Option<PathBuf>,

    /// Write the default configuration to this path and exit
    #[arg(long)]
    write_default_config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if let Some(path) = &args.write_default_config {
        vigil_common::config::write_toml_config(&EngineConfig::default(), path)
            .with_context(|| format!("Failed to write default config to {}", path.display()))?;
        println!("Default configuration written to {}", path.display());
        return Ok(());
    }

    let resolver = ConfigPathResolver::new("vigil-rd");
    let config_path = resolver.resolve(args.config.as_deref());
    let loaded = EngineConfig::load(config_path.as_deref());

    // Logging settings come from the config file when it loaded
    let logging = loaded
        .as_ref()
        .map(|c| c.logging.clone())
        .unwrap_or_default();
    init_tracing(&logging);

    let mut config = loaded.context("Failed to load configuration")?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(bind) = args.bind {
        config.server.bind_address = bind;
    }
    if let Some(taxonomy) = args.taxonomy {
        config.patterns.taxonomy_path = Some(taxonomy);
    }

    info!("Starting vigil-rd (Risk & Dissonance) microservice");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    match &config_path {
        Some(path) => info!("Config: {}", path.display()),
        None => info!("Config: compiled defaults"),
    }

    let event_bus = EventBus::new(config.server.event_capacity);
    info!("Event bus initialized");

    let cancel = CancellationToken::new();
    let sweep_interval = Duration::from_secs(config.server.sweep_interval_secs.max(1));
    let addr: SocketAddr = format!("{}:{}", config.server.bind_address, config.server.port)
        .parse()
        .context("Invalid bind address")?;

    let (engine, dispatcher_task) = RiskEngine::from_config(config, event_bus, cancel.clone())
        .context("Failed to initialize risk engine")?;
    let sweeper_task = engine.spawn_maintenance(sweep_interval, cancel.clone());
    info!(
        taxonomy_version = %engine.taxonomy().version(),
        "Risk engine initialized"
    );

    let app = vigil_rd::build_router(AppState::new(engine)).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    cancel.cancel();
    for (name, task) in [("alert dispatcher", dispatcher_task), ("timeout sweeper", sweeper_task)] {
        if let Err(e) = task.await {
            error!("{} task ended abnormally: {}", name, e);
        }
    }

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(vigil_rd::config::log_filter(logging)));

    let registry = tracing_subscriber::registry().with(filter);
    if logging.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
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
                error!("Failed to install signal handler: {}", e);
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
