//! Broker Boundary
//!
//! The ingestion job consumes orders through [`OrderSource`], which hides the
//! concrete broker. A source hands out one message at a time together with an
//! [`OffsetToken`]; committing the token acknowledges that message and every
//! earlier one on the same partition.
//!
//! - `kafka`: consumer-group source backed by rdkafka
//! - `memory`: channel-fed source used by tests and local tooling

pub mod kafka;
pub mod memory;

use async_trait::async_trait;

pub use kafka::{KafkaConfig, KafkaOrderSource};
pub use memory::{memory_source, MemoryOrderSource, MemorySourceHandle};

/// Position of a fetched message.
///
/// Deliberately not `Clone`: [`OrderSource::commit`] takes it by value, so a
/// message can be acknowledged at most once.
#[derive(Debug, PartialEq, Eq)]
pub struct OffsetToken {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

impl OffsetToken {
    pub fn new(topic: impl Into<String>, partition: i32, offset: i64) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
        }
    }

    /// Offset to store in the consumer group: the next one to read.
    pub fn next_offset(&self) -> i64 {
        self.offset + 1
    }
}

/// A fetched, not yet acknowledged message.
#[derive(Debug)]
pub struct InboundMessage {
    pub payload: Vec<u8>,
    pub token: OffsetToken,
}

/// Broker-side failures.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("commit failed: {0}")]
    Commit(String),

    /// The source will never yield another message.
    #[error("source closed")]
    Closed,
}

/// A stream of order payloads with explicit acknowledgement.
#[async_trait]
pub trait OrderSource: Send {
    /// Wait for the next message. Cancel-safe: dropping the future loses nothing.
    async fn fetch(&mut self) -> Result<InboundMessage, SourceError>;

    /// Acknowledge `token` and everything before it on its partition.
    async fn commit(&mut self, token: OffsetToken) -> Result<(), SourceError>;

    /// Leave the consumer group. Called once when ingestion stops.
    fn close(&mut self) {}
}
