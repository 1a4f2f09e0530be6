use std::sync::Arc;
use std::time::Duration;

use common_database::clickhouse::ClickHouseStore;
use common_kafka::kafka_producer::{create_kafka_producer, KafkaContext};
use common_redis::RedisClient;
use health::HealthRegistry;
use rdkafka::producer::FutureProducer;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::config::Config;
use crate::error::SchedulerError;
use crate::ticker_source::{NoopTickerSource, TickerSource};

pub struct AppContext {
    pub producer: FutureProducer<KafkaContext>,
    pub pg_pool: PgPool,
    pub olap: ClickHouseStore,
    pub redis: RedisClient,
    pub ticker_source: Arc<dyn TickerSource>,
}

impl AppContext {
    pub async fn new(config: &Config) -> Result<Self, SchedulerError> {
        // The scheduler exits immediately after one publish batch, so its producer
        // liveness handle never needs to be polled by anything.
        let health_registry = HealthRegistry::new("scheduler");
        let kafka_liveness = health_registry
            .register("kafka-producer".to_string(), Duration::from_secs(30))
            .await;

        let producer = create_kafka_producer(&config.kafka, kafka_liveness).await?;

        let pg_pool = PgPoolOptions::new()
            .max_connections(config.max_pg_connections)
            .connect(&config.database_url)
            .await?;

        let olap = ClickHouseStore::new(
            &config.clickhouse_host,
            config.clickhouse_port,
            &config.clickhouse_database,
            &config.clickhouse_user,
            &config.clickhouse_password,
        );

        let redis = RedisClient::new(config.redis_url.clone()).await?;

        Ok(Self {
            producer,
            pg_pool,
            olap,
            redis,
            ticker_source: Arc::new(NoopTickerSource),
        })
    }
}
