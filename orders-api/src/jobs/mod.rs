//! Background Jobs for the orders service
//!
//! - `ingest`: consumes order messages, persists them and refreshes the cache
//!
//! The job is spawned at startup and stopped through a watch channel:
//!
//! ```ignore
//! use orders_api::jobs::{ingest_task, IngestConfig};
//! use tokio::sync::watch;
//!
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! let handle = tokio::spawn(ingest_task(source, store, cache, IngestConfig::default(), shutdown_rx));
//!
//! let _ = shutdown_tx.send(true);
//! ```

pub mod ingest;

pub use ingest::{ingest_task, IngestConfig, IngestError, IngestMetrics, IngestSnapshot};
