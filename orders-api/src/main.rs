//! Orders Service Entry Point
//!
//! Connects to PostgreSQL and Kafka, warms the cache, then runs ingestion and
//! the HTTP server until SIGINT/SIGTERM.

use std::sync::Arc;

use orders_api::server::{run_until, shutdown_signal};
use orders_api::telemetry::{init_tracing, TelemetryConfig};
use orders_api::{
    create_api_router, ingest_task, ApiConfig, ApiError, ApiResult, AppState, CachedOrderStore,
    DbConfig, IngestConfig, KafkaConfig, KafkaOrderSource, PgOrderStore,
};
use orders_storage::{OrderCache, OrderStore};
use tokio::sync::watch;

#[tokio::main]
async fn main() -> ApiResult<()> {
    init_tracing(&TelemetryConfig::from_env())?;

    let api_config = ApiConfig::from_env();
    let db_config = DbConfig::from_env();
    let kafka_config = KafkaConfig::from_env();
    let ingest_config = IngestConfig::from_env();

    let store = PgOrderStore::from_config(&db_config)?;
    store.verify_connection().await?;
    if db_config.run_migrations {
        store.migrate().await?;
    }
    tracing::info!(pool_size = db_config.max_size, "Connected to order store");

    let store_handle: Arc<dyn OrderStore> = Arc::new(store.clone());
    let cache = Arc::new(OrderCache::new(api_config.cache_limit));
    let orders = CachedOrderStore::new(
        Arc::clone(&store_handle),
        Arc::clone(&cache),
        api_config.lookup_timeout,
    );

    if let Err(e) = orders.warm(api_config.startup_load).await {
        tracing::warn!(error = %e, "Cache warm-up failed, starting cold");
    }

    let source = KafkaOrderSource::connect(&kafka_config)?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let ingest = tokio::spawn(ingest_task(
        source,
        store_handle,
        cache,
        ingest_config,
        shutdown_rx,
    ));

    let app = create_api_router(AppState::new(orders), &api_config);
    let addr = api_config.bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;
    tracing::info!(%addr, "Starting orders service");

    let outcome = run_until(
        listener,
        app,
        ingest,
        shutdown_tx,
        api_config.shutdown_grace,
        shutdown_signal(),
    )
    .await;

    store.close();

    let snapshot = outcome?;
    tracing::info!(
        consumed = snapshot.consumed,
        persisted = snapshot.persisted,
        "Orders service stopped"
    );
    Ok(())
}
