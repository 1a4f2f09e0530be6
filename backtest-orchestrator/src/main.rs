mod app_context;
mod config;
mod error;
mod evaluator;
mod kafka_publisher;
mod registry_seed;

use std::future::ready;
use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use backtest_core::job::{self, BatchDelta, JobStatus};
use backtest_core::pipeline::{run_pipeline, PipelineDeps};
use backtest_core::resolver::IndicatorCalculationSuccess;
use backtest_core::StageError;
use common_kafka::decorators::{CircuitBreaker, RetrySchedule};
use common_kafka::dispatcher::{Dispatcher, DispatcherConfig};
use common_kafka::error::ProcessingError;
use common_kafka::kafka_consumer::create_raw_consumer;
use common_kafka::offset_tracker::PartitionTracker;
use common_metrics::{serve, setup_metrics_routes};
use envconfig::Envconfig;
use lifecycle::{ComponentOptions, Handle, Manager};
use rdkafka::consumer::StreamConsumer;
use rdkafka::Message;
use serde::Deserialize;
use sqlx::PgPool;
use tokio::task::JoinHandle;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};
use uuid::Uuid;

use app_context::AppContext;
use config::Config;
use evaluator::RuleBasedEvaluator;
use kafka_publisher::CalcRequestProducer;

/// Payload carried by the job-trigger topic. The job row itself is already present in
/// Postgres (written PENDING by the API layer, out of scope here); this message is just
/// the pointer that makes it eligible to run.
#[derive(Debug, Deserialize)]
struct JobTrigger {
    job_id: Uuid,
}

fn setup_tracing() {
    let log_layer = tracing_subscriber::fmt::layer().with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(log_layer).init();
}

async fn index() -> &'static str {
    "backtest orchestrator"
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

/// Runs `run_pipeline` for `job_id` and reconciles its outcome with job/batch state:
/// `Ok(None)` (awaiting a round trip) and the expected `AwaitingIndicators` stage error
/// both leave the job as `ensure_data` already set it. Any other stage failure marks the
/// job (and its batch, if any) FAILED in one transaction.
async fn drive_pipeline<E: backtest_core::trade::StrategyEvaluator>(
    deps: &PipelineDeps<E>,
    pg_pool: &PgPool,
    job_id: Uuid,
    skip_indicator_check: bool,
    simulation_params: backtest_core::trade::SimulationParams,
) -> Result<(), ProcessingError> {
    match run_pipeline(deps, job_id, simulation_params, skip_indicator_check).await {
        Ok(_) => Ok(()),
        Err(StageError::AwaitingIndicators { .. }) => Ok(()),
        Err(e) if !e.is_terminal_failure() => Ok(()),
        Err(e) => {
            let message = e.to_string();
            if let Ok(failed_job) = job::load_job(pg_pool, job_id).await {
                let _ = job::transition_job_terminal(
                    pg_pool,
                    job_id,
                    failed_job.batch_id,
                    JobStatus::Failed,
                    Some(&message),
                    BatchDelta {
                        completed: false,
                        failed: true,
                    },
                )
                .await;
            }
            Err(ProcessingError::Retryable(message))
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_dispatch_loop<E: backtest_core::trade::StrategyEvaluator + 'static>(
    raw_consumer: StreamConsumer,
    topic: String,
    handle: Handle,
    max_concurrent: usize,
    handler_timeout_secs: u64,
    deps: Arc<PipelineDeps<E>>,
    pg_pool: PgPool,
    skip_indicator_check: bool,
    dlq_producer: rdkafka::producer::FutureProducer<common_kafka::kafka_producer::KafkaContext>,
    simulation_params: backtest_core::trade::SimulationParams,
) {
    let tracker = Arc::new(PartitionTracker::new(raw_consumer.clone(), topic.clone(), 0));
    let breaker = Arc::new(CircuitBreaker::new(5, Duration::from_secs(30)));

    let dispatcher = Dispatcher::new(
        tracker,
        breaker,
        DispatcherConfig {
            max_concurrent_messages: max_concurrent,
            retry: RetrySchedule::new(
                5,
                vec![
                    Duration::from_secs(1),
                    Duration::from_secs(5),
                    Duration::from_secs(30),
                ],
            ),
            handler_timeout: Duration::from_secs(handler_timeout_secs),
            soft_shutdown: Duration::from_secs(30),
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
                    error!(%error, topic, "kafka recv error, stopping dispatch loop");
                    None
                }
            }
        }
    };

    let on_message = move |payload: Vec<u8>| {
        let deps = deps.clone();
        let pg_pool = pg_pool.clone();
        let simulation_params = simulation_params.clone();
        async move {
            let job_id = extract_job_id(&payload)?;
            drive_pipeline(&deps, &pg_pool, job_id, skip_indicator_check, simulation_params).await
        }
    };

    let dlq_topic = common_kafka::dlq_topic_for(&topic);
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
            common_kafka::kafka_producer::send_iter_to_kafka(
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
    info!(?outcome, topic, "orchestrator dispatch loop exited");
}

fn extract_job_id(payload: &[u8]) -> Result<Uuid, ProcessingError> {
    if let Ok(trigger) = serde_json::from_slice::<JobTrigger>(payload) {
        return Ok(trigger.job_id);
    }
    serde_json::from_slice::<IndicatorCalculationSuccess>(payload)
        .map(|success| success.job_id)
        .map_err(|e| ProcessingError::Validation(e.to_string()))
}

#[tokio::main]
async fn main() -> Result<(), error::OrchestratorError> {
    setup_tracing();
    info!("starting backtest-orchestrator");

    let config = Config::init_with_defaults()?;
    let context = Arc::new(AppContext::new(&config).await?);

    start_health_server(&config, context.clone());

    let mut manager = Manager::builder("backtest-orchestrator").build();
    let trigger_handle = manager.register(
        "job-trigger-dispatcher",
        ComponentOptions::new().with_graceful_shutdown(Duration::from_secs(30)),
    );
    let success_handle = manager.register(
        "indicator-success-dispatcher",
        ComponentOptions::new().with_graceful_shutdown(Duration::from_secs(30)),
    );
    let monitor = manager.monitor_background();

    let trigger_consumer = create_raw_consumer(&config.kafka, &config.consumer)?;
    let success_consumer = create_raw_consumer(&config.kafka, &config.success_consumer_config())?;

    let calc_request_producer = Arc::new(CalcRequestProducer::new(
        context.producer.clone(),
        config.indicator_calc_request_topic.clone(),
    ));

    let trigger_deps = Arc::new(PipelineDeps {
        pg_pool: context.pg_pool.clone(),
        olap: context.olap.clone(),
        registry: context.registry.clone(),
        evaluator: context.evaluator.clone(),
        calc_request_producer: calc_request_producer.clone(),
    });
    let success_deps = Arc::new(PipelineDeps {
        pg_pool: context.pg_pool.clone(),
        olap: context.olap.clone(),
        registry: context.registry.clone(),
        evaluator: context.evaluator.clone(),
        calc_request_producer,
    });

    let trigger_topic = config.consumer.kafka_consumer_topic.clone();
    let success_topic = config.success_consumer_topic.clone();
    let simulation_params = backtest_core::trade::SimulationParams {
        initial_capital: config.initial_capital,
        position_size_pct: config.position_size_pct,
        lot_size: config.lot_size,
    };

    let trigger_task = run_dispatch_loop::<RuleBasedEvaluator>(
        trigger_consumer,
        trigger_topic,
        trigger_handle,
        config.max_concurrent_jobs,
        config.handler_timeout_secs,
        trigger_deps,
        context.pg_pool.clone(),
        false,
        context.producer.clone(),
        simulation_params.clone(),
    );
    let success_task = run_dispatch_loop::<RuleBasedEvaluator>(
        success_consumer,
        success_topic,
        success_handle,
        config.max_concurrent_jobs,
        config.handler_timeout_secs,
        success_deps,
        context.pg_pool.clone(),
        true,
        context.producer.clone(),
        simulation_params,
    );

    tokio::join!(trigger_task, success_task);

    if let Err(error) = monitor.wait().await {
        error!(%error, "lifecycle manager reported a non-clean shutdown");
    }

    Ok(())
}
