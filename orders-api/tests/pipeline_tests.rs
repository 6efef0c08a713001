//! End-to-end flow without external services: messages go through the
//! ingestion task into the mock store and cache, then out over HTTP.

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use orders_api::broker::memory_source;
use orders_api::{ingest_task, IngestConfig};
use orders_storage::{MockOrderStore, OrderStore};
use orders_test_utils::assertions::{assert_cached, assert_stored};
use orders_test_utils::fixtures::{malformed_payload, payload, payload_without_uid, sample_order};
use tokio::sync::watch;

#[path = "support/app.rs"]
mod app_support;
use app_support::{get_json, test_app};

async fn wait_for(check: impl Fn() -> bool) -> bool {
    for _ in 0..400 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}

#[tokio::test]
async fn ingested_order_is_readable_over_http() -> Result<(), String> {
    let app = test_app(MockOrderStore::new(), 100);
    let (source, handle) = memory_source("orders");
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let task = tokio::spawn(ingest_task(
        source,
        app.store.clone() as Arc<dyn OrderStore>,
        Arc::clone(app.orders.cache()),
        IngestConfig {
            retry_backoff: Duration::from_millis(5),
        },
        shutdown_rx,
    ));

    let order = sample_order("b563feb7b2b84b6test");
    handle.publish(malformed_payload());
    handle.publish(payload_without_uid());
    handle.publish(payload(&order));

    let committed = handle.clone();
    assert!(wait_for(|| committed.committed().len() == 3).await);

    assert_stored(&app.store, &order);
    assert_cached(app.orders.cache(), &order);
    assert_eq!(app.store.order_count(), 1);

    let (status, body) = get_json(&app.router, "/orders/b563feb7b2b84b6test").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["order_uid"], "b563feb7b2b84b6test");
    assert_eq!(app.store.load_calls(), 0);

    let _ = shutdown_tx.send(true);
    let snapshot = task
        .await
        .map_err(|e| e.to_string())?
        .map_err(|e| e.to_string())?;
    assert_eq!(snapshot.consumed, 3);
    assert_eq!(snapshot.skipped, 2);
    assert_eq!(snapshot.persisted, 1);
    Ok(())
}

#[tokio::test]
async fn redelivered_order_replaces_previous_version() -> Result<(), String> {
    let app = test_app(MockOrderStore::new(), 100);
    let (source, handle) = memory_source("orders");
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let task = tokio::spawn(ingest_task(
        source,
        app.store.clone() as Arc<dyn OrderStore>,
        Arc::clone(app.orders.cache()),
        IngestConfig::default(),
        shutdown_rx,
    ));

    let first = sample_order("same-uid");
    let mut second = first.clone();
    second.track_number = "UPDATED".to_string();
    second.items.truncate(0);

    handle.publish(payload(&first));
    handle.publish(payload(&second));

    let committed = handle.clone();
    assert!(wait_for(|| committed.committed().len() == 2).await);

    assert_stored(&app.store, &second);
    assert_cached(app.orders.cache(), &second);

    let (_, body) = get_json(&app.router, "/orders/same-uid").await?;
    assert_eq!(body["track_number"], "UPDATED");
    assert_eq!(body["items"].as_array().map(Vec::len), Some(0));

    let _ = shutdown_tx.send(true);
    task.await
        .map_err(|e| e.to_string())?
        .map_err(|e| e.to_string())?;
    Ok(())
}

#[tokio::test]
async fn warm_start_serves_recent_orders_from_cache() -> Result<(), String> {
    use orders_test_utils::fixtures::order_created_at;

    let store = MockOrderStore::with_orders((0..5).map(|i| order_created_at(&format!("order-{}", i), i)));
    let app = test_app(store, 100);

    let admitted = app.orders.warm(3).await.map_err(|e| e.message)?;
    assert_eq!(admitted, 3);

    for uid in ["order-4", "order-3", "order-2"] {
        assert!(app.orders.cache().contains(uid));
    }
    assert!(!app.orders.cache().contains("order-1"));

    let loads_after_warm = app.store.load_calls();
    let (status, _) = get_json(&app.router, "/orders/order-4").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.store.load_calls(), loads_after_warm);
    Ok(())
}
