//! REST API Routes
//!
//! - `/orders/:order_uid`: order lookup
//! - `/health/*`: probes
//! - `/metrics`: Prometheus scrape endpoint
//! - `/openapi.json`: generated API document
//!
//! Every route shares the same layers: request tracing, the per-request
//! timeout and the metrics middleware.

pub mod health;
pub mod orders;

use axum::{middleware::from_fn, response::IntoResponse, routing::get, Json, Router};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use utoipa::OpenApi;

use crate::config::ApiConfig;
use crate::openapi::ApiDoc;
use crate::state::AppState;
use crate::telemetry::{metrics_handler, observability_middleware};

/// GET /openapi.json
pub async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

/// Assemble the full HTTP router.
pub fn create_api_router(state: AppState, config: &ApiConfig) -> Router {
    Router::new()
        .merge(orders::create_router())
        .nest("/health", health::create_router())
        .route("/metrics", get(metrics_handler))
        .route("/openapi.json", get(openapi_json))
        .layer(from_fn(observability_middleware))
        .layer(TimeoutLayer::new(config.request_timeout))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
