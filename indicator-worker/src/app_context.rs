use std::sync::Arc;
use std::time::Duration;

use common_database::clickhouse::ClickHouseStore;
use common_kafka::kafka_producer::{create_kafka_producer, KafkaContext};
use common_redis::{DistributedLock, RedisClient};
use health::{HealthHandle, HealthRegistry};
use rdkafka::producer::FutureProducer;
use tracing::info;

use crate::config::Config;
use crate::error::WorkerError;

/// Holds everything the worker needs except the Kafka consumer itself: the dispatch loop
/// in `main` owns a raw `StreamConsumer` directly (via `create_raw_consumer`) since it
/// drives its own offset tracking, which `SingleTopicConsumer`'s opaque `Offset` handle
/// doesn't support.
pub struct AppContext {
    pub health_registry: HealthRegistry,
    pub worker_liveness: HealthHandle,
    pub producer: FutureProducer<KafkaContext>,
    pub olap: Arc<ClickHouseStore>,
    pub lock: DistributedLock<RedisClient>,
}

impl AppContext {
    pub async fn new(config: &Config) -> Result<Self, WorkerError> {
        let health_registry = HealthRegistry::new("liveness");
        let worker_liveness = health_registry
            .register("indicator-worker".to_string(), Duration::from_secs(60))
            .await;
        let kafka_liveness = health_registry
            .register("kafka-producer".to_string(), Duration::from_secs(30))
            .await;

        let producer = create_kafka_producer(&config.kafka, kafka_liveness).await?;

        let olap = Arc::new(ClickHouseStore::new(
            &config.clickhouse_host,
            config.clickhouse_port,
            &config.clickhouse_database,
            &config.clickhouse_user,
            &config.clickhouse_password,
        ));
        olap.health_check().await?;

        let redis_client = RedisClient::new(config.redis_url.clone()).await?;
        let lock = DistributedLock::for_process(Arc::new(redis_client));

        info!(
            "indicator-worker initialized, will subscribe to topic {}",
            config.consumer.kafka_consumer_topic
        );

        Ok(Self {
            health_registry,
            worker_liveness,
            producer,
            olap,
            lock,
        })
    }
}
