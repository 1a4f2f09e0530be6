use common_kafka::config::{ConsumerConfig, KafkaConfig};
use envconfig::Envconfig;

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "BIND_HOST", default = "::")]
    pub host: String,

    #[envconfig(from = "HEALTH_PORT", default = "3302")]
    pub port: u16,

    #[envconfig(nested = true)]
    pub kafka: KafkaConfig,

    #[envconfig(nested = true)]
    pub consumer: ConsumerConfig,

    #[envconfig(from = "CLICKHOUSE_HOST", default = "localhost")]
    pub clickhouse_host: String,

    #[envconfig(from = "CLICKHOUSE_HTTP_PORT", default = "8123")]
    pub clickhouse_port: u16,

    #[envconfig(from = "CLICKHOUSE_DATABASE", default = "backtest")]
    pub clickhouse_database: String,

    #[envconfig(from = "CLICKHOUSE_USER", default = "default")]
    pub clickhouse_user: String,

    #[envconfig(from = "CLICKHOUSE_PASSWORD", default = "")]
    pub clickhouse_password: String,

    #[envconfig(from = "REDIS_URL", default = "redis://localhost:6379")]
    pub redis_url: String,

    /// Calculation-success notifications are published here for the orchestrator's
    /// round-trip consumer (§4.5 stage 3).
    #[envconfig(from = "INDICATOR_SUCCESS_TOPIC", default = "indicator-calc-success")]
    pub success_topic: String,

    #[envconfig(from = "MAX_CONCURRENT_MESSAGES", default = "8")]
    pub max_concurrent_messages: usize,

    #[envconfig(from = "HANDLER_TIMEOUT_SECS", default = "120")]
    pub handler_timeout_secs: u64,

    #[envconfig(from = "LOCK_WAIT_SECS", default = "30")]
    pub lock_wait_secs: u64,

    #[envconfig(from = "LOCK_LEASE_SECS", default = "300")]
    pub lock_lease_secs: u64,
}

impl Config {
    pub fn init_with_defaults() -> Result<Self, envconfig::Error> {
        ConsumerConfig::set_defaults("indicator-worker", "indicator-calc-request", false);
        Self::init_from_env()
    }
}
