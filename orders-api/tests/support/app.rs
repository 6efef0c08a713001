//! Router fixtures shared by the HTTP integration tests.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use orders_api::{create_api_router, ApiConfig, AppState, CachedOrderStore};
use orders_storage::{MockOrderStore, OrderCache, OrderStore};
use tower::ServiceExt;

pub struct TestApp {
    pub router: Router,
    pub orders: CachedOrderStore,
    pub store: Arc<MockOrderStore>,
}

/// Router over a mock store with the given cache capacity.
pub fn test_app(store: MockOrderStore, cache_limit: usize) -> TestApp {
    let store = Arc::new(store);
    let config = ApiConfig {
        lookup_timeout: Duration::from_millis(200),
        cache_limit,
        ..ApiConfig::default()
    };
    let orders = CachedOrderStore::new(
        store.clone() as Arc<dyn OrderStore>,
        Arc::new(OrderCache::new(cache_limit)),
        config.lookup_timeout,
    );
    let router = create_api_router(AppState::new(orders.clone()), &config);

    TestApp {
        router,
        orders,
        store,
    }
}

/// Issue a GET and return the status with the body parsed as JSON, or
/// `Value::Null` for non-JSON bodies.
pub async fn get_json(router: &Router, uri: &str) -> Result<(StatusCode, serde_json::Value), String> {
    let request = Request::builder()
        .uri(uri)
        .body(Body::empty())
        .map_err(|e| e.to_string())?;

    let response = router
        .clone()
        .oneshot(request)
        .await
        .map_err(|e| e.to_string())?;
    let status = response.status();

    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .map_err(|e| e.to_string())?;
    let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);

    Ok((status, body))
}
