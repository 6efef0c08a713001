//! Bounded in-memory order cache.
//!
//! A capacity-limited `order_uid -> Order` map shared between the ingestion
//! job and HTTP handlers. Admission is reject-on-full: once the map holds
//! `limit` entries, new keys are silently dropped and existing entries are
//! never evicted to make room. Updates to keys already present always apply.
//!
//! Readers take a shared lock and receive a clone, so a returned order can
//! never observe a later write. Writers hold the exclusive lock for a single
//! map operation; no I/O happens under either lock.

use orders_core::Order;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Outcome of a [`OrderCache::set`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheAdmission {
    /// A new key was admitted.
    Inserted,
    /// An existing entry was overwritten.
    Replaced,
    /// The key was new and the cache was full; nothing changed.
    Rejected,
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of entries currently in cache.
    pub entry_count: usize,
    /// Capacity ceiling fixed at construction.
    pub limit: usize,
    /// New keys turned away because the cache was full.
    pub rejected: u64,
}

impl CacheStats {
    /// Occupancy between 0.0 and 1.0.
    pub fn fill_ratio(&self) -> f64 {
        if self.limit == 0 {
            1.0
        } else {
            self.entry_count as f64 / self.limit as f64
        }
    }
}

/// Capacity-limited order cache with many-reader / exclusive-writer access.
#[derive(Debug)]
pub struct OrderCache {
    entries: RwLock<HashMap<String, Order>>,
    limit: usize,
    rejected: AtomicU64,
}

impl OrderCache {
    /// Create an empty cache holding at most `limit` orders.
    pub fn new(limit: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::with_capacity(limit.min(4096))),
            limit,
            rejected: AtomicU64::new(0),
        }
    }

    /// Look up an order by uid, returning an owned snapshot.
    pub fn get(&self, order_uid: &str) -> Option<Order> {
        read_lock(&self.entries).get(order_uid).cloned()
    }

    pub fn contains(&self, order_uid: &str) -> bool {
        read_lock(&self.entries).contains_key(order_uid)
    }

    /// Insert or overwrite an order keyed by its `order_uid`.
    ///
    /// Existing keys are replaced regardless of occupancy. A new key is
    /// admitted only while `len() < limit`.
    pub fn set(&self, order: Order) -> CacheAdmission {
        let mut entries = write_lock(&self.entries);

        if let Some(slot) = entries.get_mut(&order.order_uid) {
            *slot = order;
            return CacheAdmission::Replaced;
        }

        if entries.len() >= self.limit {
            drop(entries);
            self.rejected.fetch_add(1, Ordering::Relaxed);
            return CacheAdmission::Rejected;
        }

        entries.insert(order.order_uid.clone(), order);
        CacheAdmission::Inserted
    }

    /// Upsert a batch of orders in iteration order. Returns how many were
    /// admitted or replaced.
    pub fn warm<I>(&self, orders: I) -> usize
    where
        I: IntoIterator<Item = Order>,
    {
        orders
            .into_iter()
            .map(|order| self.set(order))
            .filter(|admission| *admission != CacheAdmission::Rejected)
            .count()
    }

    pub fn len(&self) -> usize {
        read_lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entry_count: self.len(),
            limit: self.limit,
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

// Every critical section is a single map call, so a poisoned map is still consistent.
pub(crate) fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
