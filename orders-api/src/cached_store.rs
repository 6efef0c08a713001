//! Cached Order Store
//!
//! Read path for the HTTP API. Lookups check the in-memory cache first and
//! fall back to the persistence gateway on a miss, bounded by a timeout. A
//! successful fallback fills the cache, subject to its capacity.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use orders_core::{Order, StorageError};
use orders_storage::{CacheStats, OrderCache, OrderStore};

use crate::error::{ApiError, ApiResult};
use crate::telemetry::METRICS;

/// Lookup counters since startup.
#[derive(Debug, Default)]
struct LookupCounters {
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Cache-first view over an [`OrderStore`].
#[derive(Clone)]
pub struct CachedOrderStore {
    store: Arc<dyn OrderStore>,
    cache: Arc<OrderCache>,
    lookup_timeout: Duration,
    counters: Arc<LookupCounters>,
}

impl CachedOrderStore {
    pub fn new(store: Arc<dyn OrderStore>, cache: Arc<OrderCache>, lookup_timeout: Duration) -> Self {
        Self {
            store,
            cache,
            lookup_timeout,
            counters: Arc::new(LookupCounters::default()),
        }
    }

    /// Get a reference to the underlying store.
    pub fn store(&self) -> &Arc<dyn OrderStore> {
        &self.store
    }

    /// Get a reference to the cache.
    pub fn cache(&self) -> &Arc<OrderCache> {
        &self.cache
    }

    /// Fetch one order by uid.
    ///
    /// # Errors
    ///
    /// - blank uid: `MissingField`
    /// - unknown uid: `OrderNotFound`
    /// - store slower than the lookup timeout: `Timeout`
    /// - store failure: mapped from the `StorageError`
    pub async fn get(&self, order_uid: &str) -> ApiResult<Order> {
        if order_uid.trim().is_empty() {
            return Err(ApiError::missing_field("order_uid"));
        }

        if let Some(order) = self.cache.get(order_uid) {
            self.record_lookup(true);
            return Ok(order);
        }
        self.record_lookup(false);

        let loaded = tokio::time::timeout(self.lookup_timeout, self.store.load_by_key(order_uid))
            .await
            .map_err(|_| {
                tracing::warn!(
                    order_uid,
                    timeout_ms = self.lookup_timeout.as_millis() as u64,
                    "Order lookup timed out"
                );
                StorageError::Timeout {
                    operation: "load_by_key".to_string(),
                }
            })
            .and_then(|loaded| loaded)?;

        let order = loaded.ok_or_else(|| ApiError::order_not_found(order_uid))?;

        self.cache.set(order.clone());
        self.publish_cache_stats();
        Ok(order)
    }

    /// Load up to `limit` recent orders into the cache. Returns how many were
    /// admitted.
    pub async fn warm(&self, limit: usize) -> ApiResult<usize> {
        if limit == 0 {
            return Ok(0);
        }

        let orders = self.store.load_recent(limit).await?;
        let loaded = orders.len();
        let admitted = self.cache.warm(orders);
        self.publish_cache_stats();

        tracing::info!(loaded, admitted, "Cache warmed from store");
        Ok(admitted)
    }

    /// Cache occupancy, for health reporting.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// (hits, misses) since startup.
    pub fn lookup_counts(&self) -> (u64, u64) {
        (
            self.counters.hits.load(Ordering::Relaxed),
            self.counters.misses.load(Ordering::Relaxed),
        )
    }

    fn record_lookup(&self, hit: bool) {
        let counter = if hit {
            &self.counters.hits
        } else {
            &self.counters.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);

        if let Ok(metrics) = METRICS.as_ref() {
            metrics.record_cache_lookup(hit);
        }
    }

    fn publish_cache_stats(&self) {
        if let Ok(metrics) = METRICS.as_ref() {
            metrics.set_cache_stats(&self.cache.stats());
        }
    }
}
