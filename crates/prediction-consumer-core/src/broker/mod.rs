//! Broker consumer
//!
//! A [`RecordSource`] yields raw prediction records one at a time and
//! commits only when told to. [`KafkaRecordSource`] is the production
//! implementation; the testkit provides an in-memory one.

mod kafka;

use async_trait::async_trait;
use rdkafka::error::KafkaError;
use std::time::Duration;
use thiserror::Error;

pub use kafka::KafkaRecordSource;

/// Consumer group shared by every instance of this service.
pub const CONSUMER_GROUP: &str = "prediction-consumer";
pub const DEFAULT_BROKER: &str = "localhost:9092";
pub const DEFAULT_TOPIC: &str = "modelprediction";

/// One record as delivered by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub payload: Option<Vec<u8>>,
}

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Kafka broker {broker} unreachable: {source}")]
    Unreachable {
        broker: String,
        #[source]
        source: KafkaError,
    },

    #[error("Kafka error: {0}")]
    Kafka(#[from] KafkaError),

    #[error("consumer task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Broker connection settings.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub bootstrap_servers: String,
    pub topic: String,
    pub group_id: String,
    /// Fixed wait before the first connection attempt.
    pub warm_up: Duration,
    /// Bound on the metadata probe done at connect time.
    pub connect_timeout: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: DEFAULT_BROKER.to_string(),
            topic: DEFAULT_TOPIC.to_string(),
            group_id: CONSUMER_GROUP.to_string(),
            warm_up: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Ordered, lazily pulled stream of broker records with explicit commits.
#[async_trait]
pub trait RecordSource: Send {
    /// Next record, or `None` at end of stream (never for a live Kafka
    /// subscription).
    async fn next_record(&mut self) -> Result<Option<RawRecord>, BrokerError>;

    /// Acknowledge every record delivered so far.
    async fn commit(&mut self) -> Result<(), BrokerError>;

    /// Leave the consumer group.
    async fn close(&mut self);
}
