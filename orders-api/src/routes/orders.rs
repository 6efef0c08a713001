//! Order lookup routes.
//!
//! - `GET /orders/:order_uid` returns the full order as JSON
//! - `GET /orders/` (no uid) is a client error

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use orders_core::Order;

use crate::cached_store::CachedOrderStore;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// GET /orders/{order_uid} - Fetch one order
#[utoipa::path(
    get,
    path = "/orders/{order_uid}",
    tag = "Orders",
    params(
        ("order_uid" = String, Path, description = "Order identifier")
    ),
    responses(
        (status = 200, description = "Order found", body = Order),
        (status = 400, description = "Empty order uid", body = ApiError),
        (status = 404, description = "Order not found", body = ApiError),
        (status = 500, description = "Store failure", body = ApiError),
        (status = 503, description = "Store unavailable", body = ApiError),
        (status = 504, description = "Store lookup timed out", body = ApiError),
    ),
)]
pub async fn get_order(
    State(orders): State<CachedOrderStore>,
    Path(order_uid): Path<String>,
) -> ApiResult<Json<Order>> {
    let order = orders.get(&order_uid).await?;
    Ok(Json(order))
}

/// GET /orders/ - Lookup without an order uid
#[utoipa::path(
    get,
    path = "/orders/",
    tag = "Orders",
    responses(
        (status = 400, description = "Order uid is required", body = ApiError),
    ),
)]
pub async fn missing_order_uid() -> ApiError {
    ApiError::missing_field("order_uid")
}

/// Create the order router.
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/orders/", get(missing_order_uid))
        .route("/orders/:order_uid", get(get_order))
}
