mod app_context;
mod config;
mod error;
mod processor;

use std::future::ready;
use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use backtest_core::kernel::PlaceholderKernel;
use backtest_core::resolver::{IndicatorCalculationRequest, IndicatorCalculationSuccess};
use common_kafka::decorators::{CircuitBreaker, RetrySchedule};
use common_kafka::dispatcher::{Dispatcher, DispatcherConfig};
use common_kafka::error::ProcessingError;
use common_kafka::kafka_consumer::create_raw_consumer;
use common_kafka::kafka_producer::send_iter_to_kafka;
use common_kafka::offset_tracker::PartitionTracker;
use common_kafka::dlq_topic_for;
use common_metrics::{serve, setup_metrics_routes};
use envconfig::Envconfig;
use lifecycle::Manager;
use rdkafka::Message;
use tokio::task::JoinHandle;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use app_context::AppContext;
use config::Config;

fn setup_tracing() {
    let log_layer = tracing_subscriber::fmt::layer().with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(log_layer).init();
}

async fn index() -> &'static str {
    "indicator worker"
}

fn start_health_server(config: &Config, context: Arc<AppContext>) -> JoinHandle<()> {
    let config = config.clone();
    let router = Router::new()
        .route("/", get(index))
        .route("/_readiness", get(index))
        .route(
            "/_liveness",
            get(move || ready(context.health_registry.get_status())),
        );
    let router = setup_metrics_routes(router);
    let bind = format!("{}:{}", config.host, config.port);
    tokio::spawn(async move {
        serve(router, &bind)
            .await
            .expect("failed to start serving health/metrics");
    })
}

#[tokio::main]
async fn main() -> Result<(), error::WorkerError> {
    setup_tracing();
    info!("starting indicator-worker");

    let config = Config::init_with_defaults()?;
    let context = Arc::new(AppContext::new(&config).await?);

    start_health_server(&config, context.clone());

    let mut manager = Manager::builder("indicator-worker").build();
    let handle = manager.register(
        "dispatcher",
        lifecycle::ComponentOptions::new().with_graceful_shutdown(Duration::from_secs(30)),
    );
    let monitor = manager.monitor_background();

    let raw_consumer = create_raw_consumer(&config.kafka, &config.consumer)?;
    let tracker = Arc::new(PartitionTracker::new(
        raw_consumer.clone(),
        config.consumer.kafka_consumer_topic.clone(),
        0,
    ));
    let breaker = Arc::new(CircuitBreaker::new(5, Duration::from_secs(30)));

    let dispatcher = Dispatcher::new(
        tracker,
        breaker,
        DispatcherConfig {
            max_concurrent_messages: config.max_concurrent_messages,
            retry: RetrySchedule::new(
                5,
                vec![
                    Duration::from_secs(1),
                    Duration::from_secs(5),
                    Duration::from_secs(30),
                ],
            ),
            handler_timeout: Duration::from_secs(config.handler_timeout_secs),
            soft_shutdown: Duration::from_secs(20),
            hard_shutdown: Duration::from_secs(5),
        },
        handle,
    );

    let poll_consumer = raw_consumer.clone();
    let poll = move || {
        let consumer = poll_consumer.clone();
        async move {
            match consumer.recv().await {
                Ok(message) => {
                    let offset = message.offset();
                    let decoded = message
                        .payload()
                        .map(|p| p.to_vec())
                        .ok_or_else(|| "empty payload".to_string());
                    Some((offset, decoded))
                }
                Err(error) => {
                    error!(%error, "kafka recv error, stopping dispatch loop");
                    None
                }
            }
        }
    };

    let lock = context.lock.clone();
    let olap = context.olap.clone();
    let lock_wait = Duration::from_secs(config.lock_wait_secs);
    let lock_lease = Duration::from_secs(config.lock_lease_secs);
    let producer = context.producer.clone();
    let success_topic = config.success_topic.clone();

    let on_message = move |payload: Vec<u8>| {
        let olap = olap.clone();
        let lock = lock.clone();
        let producer = producer.clone();
        let success_topic = success_topic.clone();
        async move {
            let request: IndicatorCalculationRequest = serde_json::from_slice(&payload)
                .map_err(|e| ProcessingError::Validation(e.to_string()))?;

            let kernel = PlaceholderKernel;
            processor::process_request(&olap, &lock, &kernel, lock_wait, lock_lease, &request).await?;

            let success = IndicatorCalculationSuccess {
                job_id: request.job_id,
                ticker: request.ticker.clone(),
                timeframe: request.timeframe.clone(),
            };
            send_iter_to_kafka(&producer, &success_topic, [success])
                .await
                .map_err(|e| ProcessingError::Retryable(format!("success publish failed: {e}")))?;

            Ok(())
        }
    };

    let dlq_producer = context.producer.clone();
    let dlq_topic = dlq_topic_for(&config.consumer.kafka_consumer_topic);
    let publish_dlq = move |offset: i64, reason: String, attempts: u32| {
        let producer = dlq_producer.clone();
        let dlq_topic = dlq_topic.clone();
        async move {
            #[derive(serde::Serialize)]
            struct DlqRecord {
                offset: i64,
                reason: String,
                attempts: u32,
            }
            send_iter_to_kafka(
                &producer,
                &dlq_topic,
                [DlqRecord {
                    offset,
                    reason,
                    attempts,
                }],
            )
            .await
            .map_err(|e| ProcessingError::Fatal(format!("dlq publish failed: {e}")))
        }
    };

    let outcome = dispatcher.run(poll, on_message, publish_dlq).await;
    info!(?outcome, "indicator-worker dispatch loop exited");

    if let Err(error) = monitor.wait().await {
        error!(%error, "lifecycle manager reported a non-clean shutdown");
    }

    Ok(())
}
