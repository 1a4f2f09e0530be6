use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    #[error("config error: {0}")]
    Config(#[from] envconfig::Error),

    #[error("clickhouse error: {0}")]
    ClickHouse(#[from] common_database::clickhouse::OlapError),

    #[error("postgres error: {0}")]
    Postgres(#[from] sqlx::Error),
}
