//! Order Ingestion Background Task
//!
//! Pulls order payloads from an [`OrderSource`], persists them through the
//! [`OrderStore`], refreshes the cache and acknowledges the message. Per
//! message:
//!
//! - undecodable or missing `order_uid`: acknowledged and skipped, nothing is
//!   stored or cached
//! - store failure: not acknowledged; the same message is retried after a
//!   fixed backoff until it succeeds or shutdown arrives
//! - success: cached, then acknowledged. A failed acknowledgement is logged
//!   and the message still counts as processed.
//!
//! Fetch failures back off and fetch again. A store write that has started is
//! always allowed to finish; shutdown is only observed while waiting.
//!
//! ```ignore
//! use orders_api::jobs::{ingest_task, IngestConfig};
//! use tokio::sync::watch;
//!
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! let handle = tokio::spawn(ingest_task(source, store, cache, IngestConfig::from_env(), shutdown_rx));
//!
//! // On shutdown
//! let _ = shutdown_tx.send(true);
//! let summary = handle.await??;
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use orders_core::Order;
use orders_storage::{CacheAdmission, OrderCache, OrderStore};
use tokio::sync::watch;

use crate::broker::{OffsetToken, OrderSource, SourceError};
use crate::config::env_parse;
use crate::constants::DEFAULT_RETRY_BACKOFF_MS;
use crate::telemetry::METRICS;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for the ingestion task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestConfig {
    /// Pause after a fetch or store failure (default: 1 second)
    pub retry_backoff: Duration,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            retry_backoff: Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS),
        }
    }
}

impl IngestConfig {
    /// Create IngestConfig from environment variables.
    ///
    /// - `ORDERS_RETRY_BACKOFF_MS`: backoff after failures (default: 1000)
    pub fn from_env() -> Self {
        Self {
            retry_backoff: Duration::from_millis(env_parse(
                "ORDERS_RETRY_BACKOFF_MS",
                DEFAULT_RETRY_BACKOFF_MS,
            )),
        }
    }
}

// ============================================================================
// METRICS
// ============================================================================

/// Counters for one ingestion run.
#[derive(Debug, Default)]
pub struct IngestMetrics {
    /// Messages fetched from the source
    pub consumed: AtomicU64,

    /// Orders written to the store
    pub persisted: AtomicU64,

    /// Messages acknowledged without being stored
    pub skipped: AtomicU64,

    /// Store attempts that failed and were retried
    pub persist_failures: AtomicU64,

    pub fetch_errors: AtomicU64,

    pub commit_errors: AtomicU64,

    /// Persisted orders the cache had no room for
    pub cache_rejections: AtomicU64,
}

impl IngestMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current snapshot of all counters.
    pub fn snapshot(&self) -> IngestSnapshot {
        IngestSnapshot {
            consumed: self.consumed.load(Ordering::Relaxed),
            persisted: self.persisted.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            persist_failures: self.persist_failures.load(Ordering::Relaxed),
            fetch_errors: self.fetch_errors.load(Ordering::Relaxed),
            commit_errors: self.commit_errors.load(Ordering::Relaxed),
            cache_rejections: self.cache_rejections.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64, outcome: &str) {
        counter.fetch_add(1, Ordering::Relaxed);
        if let Ok(metrics) = METRICS.as_ref() {
            metrics.record_ingest(outcome);
        }
    }
}

/// Snapshot of ingestion counters at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestSnapshot {
    pub consumed: u64,
    pub persisted: u64,
    pub skipped: u64,
    pub persist_failures: u64,
    pub fetch_errors: u64,
    pub commit_errors: u64,
    pub cache_rejections: u64,
}

/// Why ingestion stopped on its own.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("order source closed unexpectedly")]
    SourceClosed,
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

/// Whether the loop keeps going after handling one message.
enum Flow {
    Continue,
    Stop,
}

/// Run ingestion until shutdown is signalled or the source closes.
///
/// Dropping the shutdown sender counts as a shutdown signal. Returns the run's
/// counters on a requested stop and [`IngestError::SourceClosed`] when the
/// source ends by itself.
pub async fn ingest_task<S>(
    mut source: S,
    store: Arc<dyn OrderStore>,
    cache: Arc<OrderCache>,
    config: IngestConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<IngestSnapshot, IngestError>
where
    S: OrderSource,
{
    let metrics = IngestMetrics::new();

    tracing::info!(
        retry_backoff_ms = config.retry_backoff.as_millis() as u64,
        "Order ingestion started"
    );

    let outcome = loop {
        let fetched = tokio::select! {
            biased;
            _ = shutdown_requested(&mut shutdown_rx) => {
                tracing::info!("Order ingestion shutting down");
                break Ok(());
            }
            fetched = source.fetch() => fetched,
        };

        let message = match fetched {
            Ok(message) => message,
            Err(SourceError::Closed) => {
                tracing::error!("Order source closed");
                break Err(IngestError::SourceClosed);
            }
            Err(e) => {
                IngestMetrics::bump(&metrics.fetch_errors, "fetch_error");
                tracing::warn!(error = %e, "Failed to fetch order message");
                if !backoff(config.retry_backoff, &mut shutdown_rx).await {
                    break Ok(());
                }
                continue;
            }
        };

        metrics.consumed.fetch_add(1, Ordering::Relaxed);

        let order = match Order::from_payload(&message.payload) {
            Ok(order) => order,
            Err(e) => {
                IngestMetrics::bump(&metrics.skipped, "skipped");
                tracing::warn!(
                    partition = message.token.partition,
                    offset = message.token.offset,
                    error = %e,
                    "Skipping invalid order message"
                );
                acknowledge(&mut source, message.token, &metrics).await;
                continue;
            }
        };

        match persist(&order, store.as_ref(), &config, &metrics, &mut shutdown_rx).await {
            Flow::Continue => {}
            Flow::Stop => {
                tracing::info!(
                    order_uid = %order.order_uid,
                    offset = message.token.offset,
                    "Shutdown during persist retry, message left unacknowledged"
                );
                break Ok(());
            }
        }

        let order_uid = order.order_uid.clone();
        if cache.set(order) == CacheAdmission::Rejected {
            IngestMetrics::bump(&metrics.cache_rejections, "cache_rejected");
            tracing::debug!(order_uid = %order_uid, "Cache full, order not cached");
        }
        if let Ok(prom) = METRICS.as_ref() {
            prom.set_cache_stats(&cache.stats());
        }

        acknowledge(&mut source, message.token, &metrics).await;
        tracing::debug!(order_uid = %order_uid, "Order ingested");
    };

    source.close();

    let snapshot = metrics.snapshot();
    tracing::info!(
        consumed = snapshot.consumed,
        persisted = snapshot.persisted,
        skipped = snapshot.skipped,
        persist_failures = snapshot.persist_failures,
        fetch_errors = snapshot.fetch_errors,
        commit_errors = snapshot.commit_errors,
        "Order ingestion stopped"
    );

    outcome.map(|()| snapshot)
}

/// Store `order`, retrying until it succeeds. Stops only while backing off.
async fn persist(
    order: &Order,
    store: &dyn OrderStore,
    config: &IngestConfig,
    metrics: &IngestMetrics,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> Flow {
    loop {
        match store.save_order(order).await {
            Ok(()) => {
                IngestMetrics::bump(&metrics.persisted, "persisted");
                return Flow::Continue;
            }
            Err(e) => {
                IngestMetrics::bump(&metrics.persist_failures, "persist_failed");
                tracing::error!(
                    order_uid = %order.order_uid,
                    transient = e.is_transient(),
                    error = %e,
                    "Failed to persist order, retrying"
                );
                if !backoff(config.retry_backoff, shutdown_rx).await {
                    return Flow::Stop;
                }
            }
        }
    }
}

async fn acknowledge<S: OrderSource>(source: &mut S, token: OffsetToken, metrics: &IngestMetrics) {
    let offset = token.offset;
    if let Err(e) = source.commit(token).await {
        IngestMetrics::bump(&metrics.commit_errors, "commit_error");
        tracing::warn!(offset, error = %e, "Failed to commit offset");
    }
}

/// Resolves once shutdown is requested or the sender is gone.
async fn shutdown_requested(shutdown_rx: &mut watch::Receiver<bool>) {
    let _ = shutdown_rx.wait_for(|stop| *stop).await;
}

/// Sleep for `delay` unless shutdown comes first. False means stop.
async fn backoff(delay: Duration, shutdown_rx: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = shutdown_requested(shutdown_rx) => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
