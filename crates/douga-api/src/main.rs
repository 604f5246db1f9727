//! Axum API server binary.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use douga_api::{create_router, metrics, ApiConfig, AppState};
use douga_cache::EvictionSweeper;
use douga_media::check_ffmpeg;
use douga_queue::JobReaper;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing()?;

    info!("Starting douga-api");

    // Load configuration
    let config = ApiConfig::from_env();
    info!(
        "API config: host={}, port={}, service_did={}",
        config.host,
        config.port,
        config.service_did()
    );
    if config.cache.origin_url.is_empty() {
        warn!("APPVIEW_URL is not set; artifact derivation will fail");
    }

    match check_ffmpeg() {
        Ok(path) => info!("Using ffmpeg at {}", path.display()),
        Err(e) => warn!("{}; watch requests will fail until it is installed", e),
    }

    let state = AppState::new(config.clone()).context("failed to create application state")?;

    let metrics_handle = if config.metrics_enabled {
        info!("Prometheus metrics enabled at /metrics");
        Some(metrics::init_metrics()?)
    } else {
        None
    };

    // Background loops stop when this flips to true.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let sweeper = EvictionSweeper::new(Arc::clone(state.store()), config.cache.sweep_interval);
    let sweeper_task = tokio::spawn(sweeper.run(shutdown_rx.clone()));

    let reaper = JobReaper::new(
        Arc::clone(state.jobs.registry()),
        config.queue.retention,
        config.queue.reap_interval,
    );
    let reaper_task = tokio::spawn(reaper.run(shutdown_rx));

    let store = Arc::clone(state.store());
    let app = create_router(state, metrics_handle);

    // Bind and serve
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("invalid bind address")?;

    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    let _ = shutdown_tx.send(true);
    let _ = tokio::join!(sweeper_task, reaper_task);

    let purged = store.purge().await;
    info!("Removed {} cached artifacts", purged);

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing() -> anyhow::Result<()> {
    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("douga=info".parse()?);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for CTRL+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}
