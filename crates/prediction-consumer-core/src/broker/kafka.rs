//! Kafka-backed record source.

use async_trait::async_trait;
use rdkafka::ClientConfig;
use rdkafka::Message;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use tracing::{debug, info};

use super::{BrokerConfig, BrokerError, RawRecord, RecordSource};

/// Subscribed Kafka consumer with auto-commit disabled.
///
/// Dropping it closes the underlying consumer, so group membership is
/// released even when [`RecordSource::close`] is never reached.
pub struct KafkaRecordSource {
    consumer: StreamConsumer,
    topic: String,
    closed: bool,
}

impl KafkaRecordSource {
    pub(crate) fn client_config(config: &BrokerConfig) -> ClientConfig {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &config.bootstrap_servers)
            .set("group.id", &config.group_id)
            .set("auto.offset.reset", "earliest")
            .set("enable.auto.commit", "false");
        client_config
    }

    /// Create the consumer, probe the broker, and subscribe.
    ///
    /// An unreachable broker is reported as [`BrokerError::Unreachable`];
    /// there is no retry.
    pub async fn connect(config: &BrokerConfig) -> Result<Self, BrokerError> {
        let consumer: StreamConsumer = Self::client_config(config).create()?;

        let topic = config.topic.clone();
        let timeout = config.connect_timeout;
        let consumer = tokio::task::spawn_blocking(move || {
            consumer
                .fetch_metadata(Some(&topic), timeout)
                .map(|_| consumer)
        })
        .await?
        .map_err(|source| BrokerError::Unreachable {
            broker: config.bootstrap_servers.clone(),
            source,
        })?;
        info!(broker = %config.bootstrap_servers, "Connected to Kafka broker");

        consumer.subscribe(&[config.topic.as_str()])?;
        info!(topic = %config.topic, group = %config.group_id, "Subscribed to Kafka topic");

        Ok(Self {
            consumer,
            topic: config.topic.clone(),
            closed: false,
        })
    }
}

#[async_trait]
impl RecordSource for KafkaRecordSource {
    async fn next_record(&mut self) -> Result<Option<RawRecord>, BrokerError> {
        let message = self.consumer.recv().await?;
        let record = RawRecord {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
            payload: message.payload().map(<[u8]>::to_vec),
        };
        debug!(
            topic = %record.topic,
            partition = record.partition,
            offset = record.offset,
            "Received Kafka record"
        );
        Ok(Some(record))
    }

    async fn commit(&mut self) -> Result<(), BrokerError> {
        self.consumer.commit_consumer_state(CommitMode::Sync)?;
        Ok(())
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.consumer.unsubscribe();
        info!(topic = %self.topic, "Kafka consumer left group");
    }
}

impl Drop for KafkaRecordSource {
    fn drop(&mut self) {
        if !self.closed {
            debug!(topic = %self.topic, "Kafka consumer dropped without close");
        }
    }
}
