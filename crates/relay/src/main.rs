//! Relay - Caching round-robin HTTP reverse proxy

use anyhow::{Context, Result};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod config;

use config::{Config, LoggingConfig};
use relay_api::{AppState, create_admin_router, create_router};
use relay_core::{BackendPool, CachePolicy, ResponseCache};
use relay_proxy::{BackendClient, BackendClientConfig};

/// Relay - Caching round-robin HTTP reverse proxy
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/relay.toml")]
    config: String,

    /// Bind address
    #[arg(long, env = "RELAY_BIND")]
    bind: Option<String>,

    /// Port
    #[arg(short, long, env = "RELAY_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Load configuration
    let config = load_config(&args.config)?;

    // Initialize logging
    init_logging(&config.logging);

    info!("Starting Relay v{}", env!("CARGO_PKG_VERSION"));

    // Initialize response cache
    let capacity = config.cache_capacity();
    let cache = Arc::new(ResponseCache::new(capacity)?);
    let policy = CachePolicy::new(config.cache.enabled)
        .with_default_horizon(config.cache.default_ttl_secs);
    if policy.is_enabled() {
        info!("LRU cache enabled (capacity: {})", capacity);
    } else {
        info!("Response caching disabled");
    }

    // Initialize backend rotation
    let pool = Arc::new(
        BackendPool::new(config.backends.clone()).context("Invalid backend configuration")?,
    );
    for backend in pool.backends() {
        info!("Backend: {}", backend);
    }

    // Initialize backend client
    let client = BackendClient::new(BackendClientConfig {
        timeout: config.upstream.timeout(),
        connect_timeout: config.upstream.connect_timeout(),
    })?;

    // Create application state
    let state = AppState::new(cache, policy, pool, client);

    // Start admin server
    if config.admin.enabled {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("Failed to install Prometheus recorder")?;

        let admin_app = create_admin_router(state.clone(), Some(Arc::new(handle)));
        let admin_addr: SocketAddr =
            format!("{}:{}", config.admin.bind_address, config.admin.port).parse()?;
        let admin_listener = tokio::net::TcpListener::bind(admin_addr)
            .await
            .with_context(|| format!("Failed to bind admin listener on {}", admin_addr))?;

        info!("Admin API listening on {}", admin_addr);
        tokio::spawn(async move {
            if let Err(e) = axum::serve(admin_listener, admin_app).await {
                error!("Admin server failed: {}", e);
            }
        });
    }

    // Create router
    let app = create_router(state).layer(TraceLayer::new_for_http());

    // Determine bind address
    let bind_addr = args.bind.unwrap_or(config.server.bind_address);
    let port = args.port.unwrap_or(config.server.port);
    let addr: SocketAddr = format!("{}:{}", bind_addr, port).parse()?;

    info!("Listening on {}", addr);

    // Start server
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Load configuration before logging is configured, printing its notices to stderr
fn load_config(path: &str) -> Result<Config> {
    load_config_with(path, std::io::stderr)
}

fn load_config_with<W>(path: &str, make_writer: W) -> Result<Config>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let bootstrap = fmt()
        .with_max_level(tracing::Level::INFO)
        .with_ansi(false)
        .with_writer(make_writer)
        .finish();

    tracing::subscriber::with_default(bootstrap, || Config::load(path))
}

/// Initialize logging
fn init_logging(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let registry = tracing_subscriber::registry().with(filter);
    match logging.format.as_str() {
        "json" => registry.with(fmt::layer().json()).init(),
        _ => registry.with(fmt::layer()).init(),
    }
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for CTRL+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
