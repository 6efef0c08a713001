//! Orders Storage - Cache, Gateway Trait and Mock Implementation
//!
//! Defines the bounded order cache shared by ingestion and reads, and the
//! persistence gateway abstraction. The Postgres gateway lives in orders-api.

pub mod cache;
pub mod mock;
pub mod store;

pub use cache::{CacheAdmission, CacheStats, OrderCache};
pub use mock::MockOrderStore;
pub use store::{OrderStore, StorageResult};
