//! Orders API - Ingestion and Read Service
//!
//! Consumes order messages from Kafka, persists them to PostgreSQL and keeps
//! a bounded in-memory cache in front of the store. Orders are served over
//! HTTP by uid.
//!
//! - `broker`: the message source seam and its Kafka implementation
//! - `db`: the Postgres order store
//! - `jobs`: the ingestion background task
//! - `cached_store`: cache-first reads with store fallback
//! - `routes`: the Axum router
//! - `server`: lifecycle and graceful shutdown

pub mod broker;
pub mod cached_store;
pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod jobs;
pub mod macros;
pub mod openapi;
pub mod routes;
pub mod server;
pub mod state;
pub mod telemetry;

// Re-export commonly used types
pub use broker::{InboundMessage, KafkaConfig, KafkaOrderSource, OffsetToken, OrderSource, SourceError};
pub use cached_store::CachedOrderStore;
pub use config::ApiConfig;
pub use db::{DbConfig, PgOrderStore};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use jobs::{ingest_task, IngestConfig, IngestError, IngestSnapshot};
pub use openapi::ApiDoc;
pub use routes::create_api_router;
pub use state::AppState;
