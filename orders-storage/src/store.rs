//! Persistence gateway contract.
//!
//! Implemented by the Postgres gateway in the service crate and by
//! [`crate::MockOrderStore`] for tests.

use async_trait::async_trait;
use orders_core::{Order, StorageError};

/// Result type alias for persistence gateway calls.
pub type StorageResult<T> = Result<T, StorageError>;

/// Async persistence gateway for orders.
///
/// Writes are idempotent by `order_uid`: saving the same order twice leaves
/// the store in the same state as saving it once.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Atomically upsert an order together with its delivery, payment and
    /// item rows. Nested rows are replaced wholesale; a failed call leaves no
    /// partial write visible.
    async fn save_order(&self, order: &Order) -> StorageResult<()>;

    /// Load one order. `Ok(None)` means the key is unknown.
    async fn load_by_key(&self, order_uid: &str) -> StorageResult<Option<Order>>;

    /// Load up to `limit` orders, most recently created first.
    async fn load_recent(&self, limit: usize) -> StorageResult<Vec<Order>>;

    /// Cheap connectivity probe for readiness checks.
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}
