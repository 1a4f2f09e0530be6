use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("config error: {0}")]
    Config(#[from] envconfig::Error),

    #[error("kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    #[error("publish error: {0}")]
    Publish(#[from] common_kafka::kafka_producer::KafkaProduceError),

    #[error("relational store error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("data store error: {0}")]
    Olap(#[from] common_database::clickhouse::OlapError),

    #[error("redis error: {0}")]
    Redis(#[from] common_redis::CustomRedisError),

    #[error("unsupported collection type: {0}")]
    UnsupportedCollectionType(String),

    #[error("timeframes are required for candles collection")]
    MissingTimeframes,
}
