//! Shared application state for Axum routers.

use std::time::Instant;

use crate::cached_store::CachedOrderStore;

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    /// Cache-first order reads; also gives access to the store for health checks.
    pub orders: CachedOrderStore,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(orders: CachedOrderStore) -> Self {
        Self {
            orders,
            start_time: Instant::now(),
        }
    }
}

crate::impl_from_ref!(CachedOrderStore, orders);
crate::impl_from_ref!(Instant, start_time);
