use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use throttle_guard::{
    api::create_router,
    config::Config,
    observability::init_tracing,
    rate_limit::{CleanupTask, RateLimiterRegistry},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::load()?;
    config.validate()?;

    // Initialize tracing/logging
    init_tracing(&config.observability);

    tracing::info!("Starting Throttle Guard service");
    tracing::info!("Configuration loaded: {:?}", config.server);

    let registry = Arc::new(RateLimiterRegistry::new(&config.rate_limit));
    let cleanup = CleanupTask::spawn(
        registry.clone(),
        Duration::from_secs(config.rate_limit.cleanup_interval_seconds),
    );

    // Create router
    let app = create_router(registry)?;

    // Bind server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Throttle Guard service is ready to accept requests");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    cleanup.shutdown().await;
    tracing::info!("Throttle Guard service stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
