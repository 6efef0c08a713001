//! Kafka consumer-group source.
//!
//! Auto-commit is disabled; offsets move only through [`OrderSource::commit`].
//! A group with no stored offset starts from the earliest message.

use async_trait::async_trait;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::{ClientConfig, Message, Offset, TopicPartitionList};

use super::{InboundMessage, OffsetToken, OrderSource, SourceError};
use crate::config::env_parse;
use crate::constants::{
    DEFAULT_KAFKA_BROKER, DEFAULT_KAFKA_GROUP_ID, DEFAULT_KAFKA_SESSION_TIMEOUT_MS,
    DEFAULT_KAFKA_TOPIC,
};
use crate::error::ApiResult;

/// Kafka consumer configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KafkaConfig {
    /// Comma-separated bootstrap servers
    pub brokers: String,
    pub topic: String,
    pub group_id: String,
    pub session_timeout_ms: u64,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: DEFAULT_KAFKA_BROKER.to_string(),
            topic: DEFAULT_KAFKA_TOPIC.to_string(),
            group_id: DEFAULT_KAFKA_GROUP_ID.to_string(),
            session_timeout_ms: DEFAULT_KAFKA_SESSION_TIMEOUT_MS,
        }
    }
}

impl KafkaConfig {
    /// Create KafkaConfig from environment variables.
    ///
    /// - `KAFKA_BROKER`: bootstrap servers (default: `localhost:9092`)
    /// - `KAFKA_TOPIC`: topic (default: `orders`)
    /// - `KAFKA_GROUP_ID`: consumer group (default: `orders-service-group`)
    /// - `KAFKA_SESSION_TIMEOUT_MS`: session timeout (default: 6000)
    pub fn from_env() -> Self {
        let text = |key: &str, default: &str| {
            std::env::var(key)
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Self {
            brokers: text("KAFKA_BROKER", DEFAULT_KAFKA_BROKER),
            topic: text("KAFKA_TOPIC", DEFAULT_KAFKA_TOPIC),
            group_id: text("KAFKA_GROUP_ID", DEFAULT_KAFKA_GROUP_ID),
            session_timeout_ms: env_parse(
                "KAFKA_SESSION_TIMEOUT_MS",
                DEFAULT_KAFKA_SESSION_TIMEOUT_MS,
            ),
        }
    }

    /// librdkafka properties for the order consumer.
    pub fn client_config(&self) -> ClientConfig {
        let mut cfg = ClientConfig::new();
        cfg.set("bootstrap.servers", &self.brokers)
            .set("group.id", &self.group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", self.session_timeout_ms.to_string());
        cfg
    }
}

/// Order source reading one topic through a consumer group.
pub struct KafkaOrderSource {
    consumer: StreamConsumer,
    topic: String,
}

impl KafkaOrderSource {
    /// Create the consumer and subscribe to the configured topic.
    ///
    /// Broker connectivity is established lazily; an unreachable broker shows
    /// up later as fetch errors.
    pub fn connect(config: &KafkaConfig) -> ApiResult<Self> {
        let consumer: StreamConsumer = config.client_config().create()?;
        consumer.subscribe(&[config.topic.as_str()])?;

        tracing::info!(
            brokers = %config.brokers,
            topic = %config.topic,
            group_id = %config.group_id,
            "Kafka consumer subscribed"
        );

        Ok(Self {
            consumer,
            topic: config.topic.clone(),
        })
    }
}

#[async_trait]
impl OrderSource for KafkaOrderSource {
    async fn fetch(&mut self) -> Result<InboundMessage, SourceError> {
        let message = self
            .consumer
            .recv()
            .await
            .map_err(|e| SourceError::Fetch(e.to_string()))?;

        Ok(InboundMessage {
            // Tombstones carry no payload and fail decoding downstream.
            payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
            token: OffsetToken::new(message.topic(), message.partition(), message.offset()),
        })
    }

    async fn commit(&mut self, token: OffsetToken) -> Result<(), SourceError> {
        let mut offsets = TopicPartitionList::new();
        offsets
            .add_partition_offset(
                &token.topic,
                token.partition,
                Offset::Offset(token.next_offset()),
            )
            .map_err(|e| SourceError::Commit(e.to_string()))?;

        self.consumer
            .commit(&offsets, CommitMode::Async)
            .map_err(|e| SourceError::Commit(e.to_string()))
    }

    fn close(&mut self) {
        self.consumer.unsubscribe();
        tracing::info!(topic = %self.topic, "Kafka consumer left the group");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = KafkaConfig::default();
        assert_eq!(config.brokers, "localhost:9092");
        assert_eq!(config.topic, "orders");
        assert_eq!(config.group_id, "orders-service-group");
        assert_eq!(config.session_timeout_ms, 6000);
    }

    #[test]
    fn test_client_config_disables_auto_commit() {
        let cfg = KafkaConfig::default().client_config();
        assert_eq!(cfg.get("enable.auto.commit"), Some("false"));
        assert_eq!(cfg.get("auto.offset.reset"), Some("earliest"));
        assert_eq!(cfg.get("group.id"), Some("orders-service-group"));
        assert_eq!(cfg.get("session.timeout.ms"), Some("6000"));
    }
}
