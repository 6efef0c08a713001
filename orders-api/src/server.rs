//! Service lifecycle.
//!
//! Runs the HTTP server next to an already spawned ingestion task and stops
//! both together. Shutdown begins on the external stop signal or when either
//! half exits on its own:
//!
//! 1. the shared watch channel flips to `true`
//! 2. the HTTP server stops accepting and drains
//! 3. ingestion finishes its current message and returns
//!
//! Steps 2 and 3 share one grace period. Whatever is still running when it
//! expires is aborted. An ingestion task that ends without being asked to, or
//! has to be aborted, is an error, so the process exits non-zero.

use std::future::{Future, IntoFuture};
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};

use crate::error::{ApiError, ApiResult};
use crate::jobs::{IngestError, IngestSnapshot};

type IngestHandle = JoinHandle<Result<IngestSnapshot, IngestError>>;

/// What started the shutdown.
enum Trigger {
    Signal,
    IngestExited(Result<Result<IngestSnapshot, IngestError>, JoinError>),
    ServerExited(Result<std::io::Result<()>, JoinError>),
}

/// Serve `router` on `listener` until `stop` resolves or a component exits.
///
/// `shutdown_tx` must be the sender whose receiver was handed to the
/// ingestion task. Returns the ingestion counters on a clean stop.
pub async fn run_until<F>(
    listener: TcpListener,
    router: Router,
    mut ingest: IngestHandle,
    shutdown_tx: watch::Sender<bool>,
    grace: Duration,
    stop: F,
) -> ApiResult<IngestSnapshot>
where
    F: Future<Output = ()> + Send,
{
    let addr = listener.local_addr().ok();
    let mut server_rx = shutdown_tx.subscribe();
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        let _ = server_rx.wait_for(|stop| *stop).await;
    });
    let mut server = tokio::spawn(server.into_future());
    tracing::info!(addr = ?addr, "HTTP server listening");

    let trigger = tokio::select! {
        _ = stop => Trigger::Signal,
        joined = &mut ingest => Trigger::IngestExited(joined),
        served = &mut server => Trigger::ServerExited(served),
    };

    let _ = shutdown_tx.send(true);
    let deadline = tokio::time::Instant::now() + grace;

    let server_failed = match &trigger {
        Trigger::ServerExited(served) => {
            tracing::error!(result = ?served, "HTTP server exited unexpectedly");
            true
        }
        _ => {
            match tokio::time::timeout_at(deadline, &mut server).await {
                Ok(Ok(Ok(()))) => tracing::info!("HTTP server stopped"),
                Ok(Ok(Err(e))) => tracing::error!(error = %e, "HTTP server failed while draining"),
                Ok(Err(e)) => tracing::error!(error = %e, "HTTP server task failed"),
                Err(_) => {
                    tracing::warn!(
                        grace_secs = grace.as_secs(),
                        "Grace period expired, closing remaining connections"
                    );
                    server.abort();
                }
            }
            false
        }
    };

    let ingest_outcome = match trigger {
        Trigger::IngestExited(joined) => joined,
        Trigger::Signal | Trigger::ServerExited(_) => {
            match tokio::time::timeout_at(deadline, &mut ingest).await {
                Ok(joined) => joined,
                Err(_) => {
                    tracing::warn!(
                        grace_secs = grace.as_secs(),
                        "Ingestion still busy after the grace period, aborting it"
                    );
                    ingest.abort();
                    return Err(ApiError::timeout("ingestion shutdown"));
                }
            }
        }
    };

    match ingest_outcome {
        Ok(Ok(_)) if server_failed => Err(ApiError::internal_error("HTTP server stopped unexpectedly")),
        Ok(Ok(snapshot)) => Ok(snapshot),
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Ingestion stopped unexpectedly");
            Err(ApiError::broker_error(e.to_string()))
        }
        Err(e) => {
            tracing::error!(error = %e, "Ingestion task failed");
            Err(ApiError::internal_error(format!("Ingestion task failed: {}", e)))
        }
    }
}

/// Resolves on SIGINT, or SIGTERM on Unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use axum::routing::get;
    use orders_core::{Order, StorageError};
    use orders_storage::{MockOrderStore, OrderCache, OrderStore, StorageResult};
    use orders_test_utils::fixtures::{payload, sample_order};
    use tokio::sync::oneshot;

    use crate::broker::memory_source;
    use crate::error::ErrorCode;
    use crate::jobs::{ingest_task, IngestConfig};

    async fn listener() -> ApiResult<TcpListener> {
        TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| ApiError::internal_error(e.to_string()))
    }

    fn router() -> Router {
        Router::new().route("/ping", get(|| async { "pong" }))
    }

    #[tokio::test]
    async fn test_stop_signal_shuts_down_cleanly() -> ApiResult<()> {
        let (source, handle) = memory_source("orders");
        let store = Arc::new(MockOrderStore::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let ingest = tokio::spawn(ingest_task(
            source,
            store.clone() as Arc<dyn OrderStore>,
            Arc::new(OrderCache::new(10)),
            IngestConfig::default(),
            shutdown_rx,
        ));

        handle.publish(payload(&sample_order("before-stop")));

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let watcher = Arc::clone(&store);
        tokio::spawn(async move {
            for _ in 0..400 {
                if watcher.stored("before-stop").is_some() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            let _ = stop_tx.send(());
        });

        let snapshot = run_until(
            listener().await?,
            router(),
            ingest,
            shutdown_tx,
            Duration::from_secs(1),
            async {
                let _ = stop_rx.await;
            },
        )
        .await?;

        assert_eq!(snapshot.persisted, 1);
        assert_eq!(handle.committed(), vec![0]);
        Ok(())
    }

    #[tokio::test]
    async fn test_ingest_exit_fails_the_service() -> ApiResult<()> {
        let (source, handle) = memory_source("orders");
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let ingest = tokio::spawn(ingest_task(
            source,
            Arc::new(MockOrderStore::new()) as Arc<dyn OrderStore>,
            Arc::new(OrderCache::new(10)),
            IngestConfig::default(),
            shutdown_rx,
        ));
        drop(handle);

        let result = run_until(
            listener().await?,
            router(),
            ingest,
            shutdown_tx,
            Duration::from_secs(1),
            std::future::pending::<()>(),
        )
        .await;

        assert_eq!(result.err().map(|e| e.code), Some(ErrorCode::BrokerError));
        Ok(())
    }

    /// Store whose writes start but never finish.
    #[derive(Default)]
    struct StalledStore {
        save_started: AtomicBool,
    }

    #[async_trait]
    impl OrderStore for StalledStore {
        async fn save_order(&self, _order: &Order) -> StorageResult<()> {
            self.save_started.store(true, Ordering::SeqCst);
            std::future::pending::<()>().await;
            Err(StorageError::unavailable("unreachable"))
        }

        async fn load_by_key(&self, _order_uid: &str) -> StorageResult<Option<Order>> {
            Ok(None)
        }

        async fn load_recent(&self, _limit: usize) -> StorageResult<Vec<Order>> {
            Ok(Vec::new())
        }

        async fn health_check(&self) -> StorageResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_stalled_save_is_aborted_after_grace() -> ApiResult<()> {
        let (source, handle) = memory_source("orders");
        let store = Arc::new(StalledStore::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let ingest = tokio::spawn(ingest_task(
            source,
            store.clone() as Arc<dyn OrderStore>,
            Arc::new(OrderCache::new(10)),
            IngestConfig::default(),
            shutdown_rx,
        ));
        handle.publish(payload(&sample_order("stuck")));

        let watcher = Arc::clone(&store);
        let stop = async move {
            while !watcher.save_started.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };

        let result = tokio::time::timeout(
            Duration::from_secs(3),
            run_until(
                listener().await?,
                router(),
                ingest,
                shutdown_tx,
                Duration::from_millis(200),
                stop,
            ),
        )
        .await
        .map_err(|_| ApiError::internal_error("shutdown exceeded the grace period"))?;

        assert_eq!(result.err().map(|e| e.code), Some(ErrorCode::Timeout));
        assert!(handle.committed().is_empty());
        Ok(())
    }
}
