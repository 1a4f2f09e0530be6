use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    #[error("config error: {0}")]
    Config(#[from] envconfig::Error),

    #[error("clickhouse error: {0}")]
    ClickHouse(#[from] common_database::clickhouse::OlapError),

    #[error("redis error: {0}")]
    Redis(#[from] common_redis::CustomRedisError),
}
