use std::sync::Arc;
use std::time::Duration;

use backtest_core::registry::IndicatorRegistry;
use common_database::clickhouse::ClickHouseStore;
use common_kafka::kafka_producer::{create_kafka_producer, KafkaContext};
use health::{HealthHandle, HealthRegistry};
use rdkafka::producer::FutureProducer;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use crate::config::Config;
use crate::error::OrchestratorError;
use crate::evaluator::RuleBasedEvaluator;
use crate::registry_seed;

pub struct AppContext {
    pub health_registry: HealthRegistry,
    pub worker_liveness: HealthHandle,
    pub producer: FutureProducer<KafkaContext>,
    pub pg_pool: PgPool,
    pub olap: Arc<ClickHouseStore>,
    pub registry: Arc<IndicatorRegistry>,
    pub evaluator: Arc<RuleBasedEvaluator>,
}

impl AppContext {
    pub async fn new(config: &Config) -> Result<Self, OrchestratorError> {
        let health_registry = HealthRegistry::new("liveness");
        let worker_liveness = health_registry
            .register("backtest-orchestrator".to_string(), Duration::from_secs(60))
            .await;
        let kafka_liveness = health_registry
            .register("kafka-producer".to_string(), Duration::from_secs(30))
            .await;

        let producer = create_kafka_producer(&config.kafka, kafka_liveness).await?;

        let pg_pool = PgPoolOptions::new()
            .max_connections(config.max_pg_connections)
            .connect(&config.database_url)
            .await?;

        let olap = Arc::new(ClickHouseStore::new(
            &config.clickhouse_host,
            config.clickhouse_port,
            &config.clickhouse_database,
            &config.clickhouse_user,
            &config.clickhouse_password,
        ));
        olap.health_check().await?;

        let registry = Arc::new(registry_seed::seed());
        let evaluator = Arc::new(RuleBasedEvaluator);

        info!(
            "backtest-orchestrator initialized, job-trigger topic {}, success topic {}",
            config.consumer.kafka_consumer_topic, config.success_consumer_topic
        );

        Ok(Self {
            health_registry,
            worker_liveness,
            producer,
            pg_pool,
            olap,
            registry,
            evaluator,
        })
    }
}
