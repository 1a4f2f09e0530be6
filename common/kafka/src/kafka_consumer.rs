use std::sync::{Arc, Weak};

use rdkafka::{
    consumer::{Consumer, StreamConsumer},
    error::KafkaError,
    ClientConfig, Message,
};
use serde::de::DeserializeOwned;

use crate::config::{ConsumerConfig, KafkaConfig};

#[derive(Clone)]
pub struct SingleTopicConsumer {
    inner: Arc<Inner>,
}

struct Inner {
    consumer: StreamConsumer,
    topic: String,
}

#[derive(Debug, thiserror::Error)]
pub enum RecvErr {
    #[error("Kafka error: {0}")]
    Kafka(#[from] KafkaError),
    #[error("Serde error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Received empty payload")]
    Empty,
}

#[derive(Debug, thiserror::Error)]
pub enum OffsetErr {
    #[error("Kafka error: {0}")]
    Kafka(#[from] KafkaError),
    #[error("Consumer gone")]
    Gone,
}

/// Builds the `ClientConfig` shared by `SingleTopicConsumer` and any caller that needs
/// direct access to the underlying `StreamConsumer` (e.g. `common_kafka::dispatcher`,
/// which tracks offsets itself and so can't go through `SingleTopicConsumer`'s opaque
/// `Offset` handle).
pub fn build_consumer_client_config(
    common_config: &KafkaConfig,
    consumer_config: &ConsumerConfig,
) -> ClientConfig {
    let mut client_config = ClientConfig::new();
    client_config
        .set("bootstrap.servers", &common_config.kafka_hosts)
        .set("statistics.interval.ms", "10000")
        .set("group.id", &consumer_config.kafka_consumer_group);

    client_config.set("enable.auto.offset.store", "false");

    if common_config.kafka_tls {
        client_config
            .set("security.protocol", "ssl")
            .set("enable.ssl.certificate.verification", "false");
    };

    client_config
}

/// Creates and subscribes a raw `StreamConsumer`, for callers that need to drive their
/// own offset tracking (`common_kafka::dispatcher::Dispatcher`) rather than use
/// `SingleTopicConsumer::json_recv`'s per-message auto-store.
pub fn create_raw_consumer(
    common_config: &KafkaConfig,
    consumer_config: &ConsumerConfig,
) -> Result<StreamConsumer, KafkaError> {
    let client_config = build_consumer_client_config(common_config, consumer_config);
    let consumer: StreamConsumer = client_config.create()?;
    consumer.subscribe(&[consumer_config.kafka_consumer_topic.as_str()])?;
    Ok(consumer)
}

impl SingleTopicConsumer {
    pub fn new(
        common_config: KafkaConfig,
        consumer_config: ConsumerConfig,
    ) -> Result<Self, KafkaError> {
        let client_config = build_consumer_client_config(&common_config, &consumer_config);
        let consumer: StreamConsumer = client_config.create()?;
        consumer.subscribe(&[consumer_config.kafka_consumer_topic.as_str()])?;

        let inner = Inner {
            consumer,
            topic: consumer_config.kafka_consumer_topic,
        };
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    pub async fn json_recv<T>(&self) -> Result<(T, Offset), RecvErr>
    where
        T: DeserializeOwned,
    {
        let message = self.inner.consumer.recv().await?;

        let offset = Offset {
            handle: Arc::downgrade(&self.inner),
            partition: message.partition(),
            offset: message.offset(),
        };

        let Some(payload) = message.payload() else {
            // We auto-store poison pills, panicking on failure
            offset.store().unwrap();
            return Err(RecvErr::Empty);
        };

        let payload = match serde_json::from_slice(payload) {
            Ok(p) => p,
            Err(e) => {
                // We auto-store poison pills, panicking on failure
                offset.store().unwrap();
                return Err(RecvErr::Serde(e));
            }
        };

        Ok((payload, offset))
    }
}

pub struct Offset {
    handle: Weak<Inner>,
    partition: i32,
    offset: i64,
}

impl Offset {
    pub fn store(self) -> Result<(), OffsetErr> {
        let inner = self.handle.upgrade().ok_or(OffsetErr::Gone)?;
        inner
            .consumer
            .store_offset(&inner.topic, self.partition, self.offset)?;
        Ok(())
    }
}
