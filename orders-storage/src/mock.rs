//! In-memory order store for tests and local runs.

use crate::cache::{read_lock, write_lock};
use crate::store::{OrderStore, StorageResult};
use async_trait::async_trait;
use orders_core::{Order, StorageError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::RwLock;
use std::time::Duration;

/// In-memory mock store with failure injection and call counters.
#[derive(Debug, Default)]
pub struct MockOrderStore {
    orders: RwLock<HashMap<String, Order>>,
    save_calls: AtomicUsize,
    load_calls: AtomicUsize,
    failing_saves: AtomicUsize,
    fail_loads: AtomicBool,
    load_delay_ms: AtomicU64,
}

impl MockOrderStore {
    /// Create a new mock store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `orders`.
    pub fn with_orders<I>(orders: I) -> Self
    where
        I: IntoIterator<Item = Order>,
    {
        let store = Self::new();
        {
            let mut map = write_lock(&store.orders);
            for order in orders {
                map.insert(order.order_uid.clone(), order);
            }
        }
        store
    }

    /// Make the next `count` calls to `save_order` fail.
    pub fn fail_next_saves(&self, count: usize) {
        self.failing_saves.store(count, Ordering::SeqCst);
    }

    /// Make every load call fail until switched off again.
    pub fn set_fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }

    /// Delay every load call by `delay`.
    pub fn set_load_delay(&self, delay: Duration) {
        self.load_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of `save_order` calls, successful or not.
    pub fn save_calls(&self) -> usize {
        self.save_calls.load(Ordering::SeqCst)
    }

    /// Number of `load_by_key` and `load_recent` calls.
    pub fn load_calls(&self) -> usize {
        self.load_calls.load(Ordering::SeqCst)
    }

    pub fn order_count(&self) -> usize {
        read_lock(&self.orders).len()
    }

    /// Stored copy of an order, bypassing counters and injected failures.
    pub fn stored(&self, order_uid: &str) -> Option<Order> {
        read_lock(&self.orders).get(order_uid).cloned()
    }

    pub fn clear(&self) {
        write_lock(&self.orders).clear();
    }

    async fn before_load(&self, operation: &str) -> StorageResult<()> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);

        let delay = self.load_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(StorageError::query_failed(operation, "injected load failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl OrderStore for MockOrderStore {
    async fn save_order(&self, order: &Order) -> StorageResult<()> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);

        let should_fail = self
            .failing_saves
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(StorageError::transaction_failed("injected save failure"));
        }

        write_lock(&self.orders).insert(order.order_uid.clone(), order.clone());
        Ok(())
    }

    async fn load_by_key(&self, order_uid: &str) -> StorageResult<Option<Order>> {
        self.before_load("load_by_key").await?;
        Ok(read_lock(&self.orders).get(order_uid).cloned())
    }

    async fn load_recent(&self, limit: usize) -> StorageResult<Vec<Order>> {
        self.before_load("load_recent").await?;
        let mut orders: Vec<Order> = read_lock(&self.orders).values().cloned().collect();
        orders.sort_by(|a, b| {
            b.date_created
                .cmp(&a.date_created)
                .then_with(|| a.order_uid.cmp(&b.order_uid))
        });
        orders.truncate(limit);
        Ok(orders)
    }

    async fn health_check(&self) -> StorageResult<()> {
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(StorageError::unavailable("injected health failure"));
        }
        Ok(())
    }
}
