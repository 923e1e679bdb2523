//! storefront — checkout inventory service
//!
//! Long-running service that:
//! - Reprices carts and holds stock for checkouts
//! - Creates Stripe payment intents for server-computed totals
//! - Reconciles Stripe webhooks against orders and reservations
//! - Sweeps expired holds in the background

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use storefront::auth::RateLimitBackend;
use storefront::{AppState, Config, build_router, logger};

/// Rate limiter cleanup tick
const RATE_LIMIT_CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    let _ = dotenvy::dotenv();

    let config = Config::from_env()
        .map_err(|e| anyhow::anyhow!(e))
        .context("invalid configuration")?;

    logger::init_logger(config.log_json)?;

    tracing::info!("Starting storefront (env: {})", config.environment);

    let http_port = config.http_port;
    let sweep_interval = config.sweep_interval;

    // Initialize application state
    let state = AppState::new(config)
        .await
        .map_err(|e| anyhow::anyhow!(e))
        .context("failed to initialize application state")?;

    let shutdown = CancellationToken::new();

    // Expiry sweeper
    let sweeper = tokio::spawn(
        state
            .sweeper
            .clone()
            .run(sweep_interval, shutdown.clone()),
    );

    // Periodic rate limiter cleanup
    let rate_limiter = state.rate_limiter.clone();
    let cleanup_shutdown = shutdown.clone();
    let cleanup = tokio::spawn(async move {
        let mut interval = tokio::time::interval(RATE_LIMIT_CLEANUP_INTERVAL);
        loop {
            tokio::select! {
                _ = cleanup_shutdown.cancelled() => break,
                _ = interval.tick() => rate_limiter.cleanup().await,
            }
        }
    });

    let app = build_router(state);

    // Start HTTP server
    let http_addr = format!("0.0.0.0:{http_port}");
    let listener = tokio::net::TcpListener::bind(&http_addr)
        .await
        .with_context(|| format!("failed to bind {http_addr}"))?;
    tracing::info!("storefront HTTP listening on {http_addr}");

    let server_shutdown = shutdown.clone();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {e}");
        }
        tracing::info!("Shutdown signal received");
        server_shutdown.cancel();
    })
    .await
    .context("HTTP server error")?;

    // Server may also stop on its own; make sure background tasks follow
    shutdown.cancel();
    let _ = tokio::join!(sweeper, cleanup);
    tracing::info!("storefront stopped");

    Ok(())
}
