mod app_context;
mod config;
mod error;
mod ticker_source;

use chrono::Utc;
use clap::{Parser, Subcommand};
use common_kafka::kafka_producer::send_iter_to_kafka;
use envconfig::Envconfig;
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use app_context::AppContext;
use config::Config;
use error::SchedulerError;

#[derive(Parser)]
#[command(name = "scheduler")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Synchronise ticker metadata, generate one task message per (ticker, timeframe),
    /// batch-publish them, and exit (§6's scheduler CLI surface).
    ScheduleCollection {
        #[arg(long = "type")]
        collection_type: String,

        #[arg(long, value_delimiter = ',')]
        timeframes: Vec<String>,

        #[arg(long)]
        sync_tickers: bool,

        #[arg(long)]
        sync_redis: bool,
    },
}

/// Task message shape (example: collect_candles), wire-identical to the reference's
/// `CollectionTaskMessage`.
#[derive(Debug, Serialize)]
struct CollectionTaskMessage {
    task_type: String,
    ticker: String,
    params: serde_json::Map<String, serde_json::Value>,
}

fn setup_tracing() {
    let log_layer = tracing_subscriber::fmt::layer().with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(log_layer).init();
}

async fn sync_tickers(context: &AppContext, board: &str) -> Result<usize, SchedulerError> {
    tracing::info!(board, "syncing tickers");
    let tickers = context.ticker_source.fetch_active_tickers(board).await?;
    let count = tickers.len();
    backtest_core::ticker::upsert_tickers(&context.pg_pool, &tickers).await?;
    tracing::info!(count, "tickers synced");
    Ok(count)
}

/// Mirrors ClickHouse's covered `(ticker, timeframe)` pairs into Redis as presence
/// markers, so readers that only have Redis available can answer "is this pair
/// collected at all" without round-tripping to the OLAP store.
async fn sync_redis(context: &AppContext) -> Result<usize, SchedulerError> {
    tracing::info!("syncing redis state with clickhouse coverage");
    let pairs = context.olap.distinct_ticker_timeframes().await?;
    for (ticker, timeframe) in &pairs {
        let key = format!("coverage:{ticker}:{timeframe}");
        context.redis.set(key, Utc::now().to_rfc3339()).await?;
    }
    tracing::info!(count = pairs.len(), "redis synced");
    Ok(pairs.len())
}

async fn schedule_collection(
    context: &AppContext,
    task_topic: &str,
    board: &str,
    collection_type: &str,
    timeframes: &[String],
    do_sync_tickers: bool,
    do_sync_redis: bool,
) -> Result<usize, SchedulerError> {
    tracing::info!(collection_type, ?timeframes, "scheduling collection");

    if collection_type == "candles" && timeframes.is_empty() {
        return Err(SchedulerError::MissingTimeframes);
    }
    if collection_type != "candles" {
        return Err(SchedulerError::UnsupportedCollectionType(
            collection_type.to_string(),
        ));
    }

    if do_sync_redis {
        sync_redis(context).await?;
    }

    if do_sync_tickers {
        sync_tickers(context, board).await?;
    }

    let tickers = backtest_core::ticker::active_tickers(&context.pg_pool, board).await?;
    if tickers.is_empty() {
        tracing::warn!(board, "no active tickers, nothing to schedule");
        return Ok(0);
    }
    tracing::info!(board, count = tickers.len(), "tickers loaded");

    let mut tasks = Vec::new();
    for ticker in &tickers {
        for timeframe in timeframes {
            let mut params = serde_json::Map::new();
            params.insert("timeframe".to_string(), serde_json::json!(timeframe));
            tasks.push(CollectionTaskMessage {
                task_type: "collect_candles".to_string(),
                ticker: ticker.ticker.clone(),
                params,
            });
        }
    }

    if tasks.is_empty() {
        tracing::warn!("no tasks generated");
        return Ok(0);
    }

    let count = tasks.len();
    send_iter_to_kafka(&context.producer, task_topic, tasks).await?;
    tracing::info!(collection_type, count, "tasks published");
    Ok(count)
}

#[tokio::main]
async fn main() {
    setup_tracing();

    let cli = Cli::parse();
    let exit_code = match run(cli).await {
        Ok(count) => {
            tracing::info!(count, "schedule-collection completed");
            0
        }
        Err(error) => {
            tracing::error!(%error, "schedule-collection failed");
            1
        }
    };
    std::process::exit(exit_code);
}

async fn run(cli: Cli) -> Result<usize, SchedulerError> {
    let config = Config::init_from_env()?;
    let context = AppContext::new(&config).await?;

    let Command::ScheduleCollection {
        collection_type,
        timeframes,
        sync_tickers,
        sync_redis,
    } = cli.command;

    schedule_collection(
        &context,
        &config.task_topic,
        &config.market_board,
        &collection_type,
        &timeframes,
        sync_tickers,
        sync_redis,
    )
    .await
}
