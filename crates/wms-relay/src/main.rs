//! WMS outbox relay entry point.

use std::error::Error;
use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use wms_core::clock::SystemClock;
use wms_outbox::OutboxPublisher;
use wms_relay::config::RelayConfig;
use wms_relay::redis_bus::RedisStreamBus;
use wms_relay::routes;
use wms_relay::state::AppState;
use wms_store::PgOutboxStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize tracing subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting WMS outbox relay");

    let config = RelayConfig::from_env()?;

    // Create database connection pool and bring the schema up to date.
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;
    wms_store::MIGRATOR.run(&pool).await?;

    let bus = RedisStreamBus::connect(&config.redis_url).await?;
    let outbox = Arc::new(PgOutboxStore::new(pool));

    let publisher = OutboxPublisher::new(
        outbox.clone(),
        Arc::new(bus),
        Arc::new(SystemClock),
        config.publisher,
    );
    let publisher_stats = publisher.stats();
    let attempt_limit = publisher.config().max_attempts;
    let handle = publisher.start();

    let app = routes::router(AppState::new(outbox, publisher_stats, attempt_limit))
        .layer(TraceLayer::new_for_http());

    let addr = config.bind_addr()?;
    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    handle.stop().await;
    tracing::info!("outbox publisher stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}
