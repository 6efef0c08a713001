//! Channel-fed order source.
//!
//! [`memory_source`] returns the source plus a handle that publishes payloads,
//! injects fetch failures, and records commits. Dropping every handle closes
//! the source once the queued messages are drained.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{InboundMessage, OffsetToken, OrderSource, SourceError};

type Queued = Result<Vec<u8>, String>;

#[derive(Debug, Default)]
struct Shared {
    committed: Mutex<Vec<i64>>,
    fail_commits: AtomicU64,
}

/// In-process [`OrderSource`] on a single partition.
pub struct MemoryOrderSource {
    topic: String,
    rx: mpsc::UnboundedReceiver<Queued>,
    next_offset: i64,
    shared: Arc<Shared>,
}

/// Producer and inspection side of a [`MemoryOrderSource`].
#[derive(Clone)]
pub struct MemorySourceHandle {
    tx: mpsc::UnboundedSender<Queued>,
    shared: Arc<Shared>,
}

/// Create a connected source and handle.
pub fn memory_source(topic: impl Into<String>) -> (MemoryOrderSource, MemorySourceHandle) {
    let (tx, rx) = mpsc::unbounded_channel();
    let shared = Arc::new(Shared::default());
    (
        MemoryOrderSource {
            topic: topic.into(),
            rx,
            next_offset: 0,
            shared: Arc::clone(&shared),
        },
        MemorySourceHandle { tx, shared },
    )
}

impl MemorySourceHandle {
    /// Queue a raw payload. Returns false once the source is gone.
    pub fn publish(&self, payload: impl Into<Vec<u8>>) -> bool {
        self.tx.send(Ok(payload.into())).is_ok()
    }

    /// Make the next fetch fail with `reason`. Consumes no offset.
    pub fn fail_fetch(&self, reason: impl Into<String>) -> bool {
        self.tx.send(Err(reason.into())).is_ok()
    }

    /// Fail the next `n` commits.
    pub fn fail_next_commits(&self, n: u64) {
        self.shared.fail_commits.store(n, Ordering::SeqCst);
    }

    /// Offsets committed so far, in commit order.
    pub fn committed(&self) -> Vec<i64> {
        self.shared
            .committed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl OrderSource for MemoryOrderSource {
    async fn fetch(&mut self) -> Result<InboundMessage, SourceError> {
        match self.rx.recv().await {
            Some(Ok(payload)) => {
                let offset = self.next_offset;
                self.next_offset += 1;
                Ok(InboundMessage {
                    payload,
                    token: OffsetToken::new(self.topic.clone(), 0, offset),
                })
            }
            Some(Err(reason)) => Err(SourceError::Fetch(reason)),
            None => Err(SourceError::Closed),
        }
    }

    async fn commit(&mut self, token: OffsetToken) -> Result<(), SourceError> {
        let failing = self
            .shared
            .fail_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(SourceError::Commit("injected commit failure".into()));
        }

        self.shared
            .committed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(token.offset);
        Ok(())
    }

    fn close(&mut self) {
        self.rx.close();
    }
}
