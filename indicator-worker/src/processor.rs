//! Per-message processing algorithm for the Indicator Batch Processor (§4.4).

use std::time::Duration;

use backtest_core::kernel::{pivot_to_long_format, BaseCandle, IndicatorKernel};
use backtest_core::registry::IndicatorDescriptor;
use backtest_core::resolver::IndicatorCalculationRequest;
use chrono::Utc;
use common_database::clickhouse::ClickHouseStore;
use common_kafka::error::ProcessingError;
use common_redis::{CustomRedisError, DistributedLock, RedisClient};
use tracing::{info, warn};

/// Runs the full pipeline for one calculation request: builds the indicator list,
/// resolves the effective start, loads base candles once, then loops per indicator
/// acquiring its lock, computing, pivoting, and bulk-inserting (§4.4 steps 1-4).
pub async fn process_request(
    olap: &ClickHouseStore,
    lock: &DistributedLock<RedisClient>,
    kernel: &dyn IndicatorKernel,
    lock_wait: Duration,
    lock_lease: Duration,
    request: &IndicatorCalculationRequest,
) -> Result<(), ProcessingError> {
    if request.indicators.is_empty() {
        return Ok(());
    }

    let max_lookback = request
        .indicators
        .iter()
        .map(|d| kernel.lookback(d))
        .collect::<Result<Vec<u32>, _>>()
        .map_err(|e| ProcessingError::Fatal(format!("bad indicator params: {e}")))?
        .into_iter()
        .max()
        .unwrap_or(0);

    let effective_start = olap
        .effective_start(&request.ticker, &request.timeframe, request.start_date, max_lookback)
        .await
        .map_err(|e| ProcessingError::Retryable(format!("effective_start: {e}")))?;

    let candle_rows = olap
        .load_base_candles(&request.ticker, &request.timeframe, effective_start, request.end_date)
        .await
        .map_err(classify_load_error)?;

    let candles: Vec<BaseCandle> = candle_rows
        .into_iter()
        .map(|c| BaseCandle {
            timestamp: c.begin,
            open: c.open,
            high: c.high,
            low: c.low,
            close: c.close,
            volume: c.volume,
        })
        .collect();

    for descriptor in &request.indicators {
        process_one_indicator(
            olap,
            lock,
            kernel,
            lock_wait,
            lock_lease,
            &request.ticker,
            &request.timeframe,
            request.start_date,
            descriptor,
            &candles,
        )
        .await?;
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn process_one_indicator(
    olap: &ClickHouseStore,
    lock: &DistributedLock<RedisClient>,
    kernel: &dyn IndicatorKernel,
    lock_wait: Duration,
    lock_lease: Duration,
    ticker: &str,
    timeframe: &str,
    start_date: chrono::DateTime<Utc>,
    descriptor: &IndicatorDescriptor,
    candles: &[BaseCandle],
) -> Result<(), ProcessingError> {
    let base_key = descriptor.indicator_key();

    let guard = lock
        .acquire(
            ticker,
            timeframe,
            &base_key,
            lock_wait,
            Duration::from_millis(200),
            lock_lease,
        )
        .await
        .map_err(redis_error_to_processing)?;

    let Some(guard) = guard else {
        return Err(ProcessingError::Retryable(format!(
            "lock acquisition timed out for {base_key}"
        )));
    };

    let version = Utc::now().timestamp_micros().max(0) as u64;
    let rows = pivot_to_long_format(kernel, descriptor, ticker, timeframe, candles, start_date, version)
        .map_err(|e| ProcessingError::Fatal(format!("indicator compute failed for {base_key}: {e}")))?;

    let insert_result = olap.insert_indicator_values(rows).await;
    guard.release().await;

    insert_result.map_err(|e| ProcessingError::Retryable(format!("insert failed for {base_key}: {e}")))?;

    info!(ticker, timeframe, base_key = %base_key, "indicator computed and persisted");
    Ok(())
}

fn classify_load_error(error: common_database::clickhouse::OlapError) -> ProcessingError {
    use common_database::clickhouse::OlapError;
    match error {
        OlapError::NoBaseCandles { .. } | OlapError::MissingOhlcvColumns => {
            ProcessingError::Fatal(error.to_string())
        }
        OlapError::ClickHouse(_) => ProcessingError::Retryable(error.to_string()),
    }
}

fn redis_error_to_processing(error: CustomRedisError) -> ProcessingError {
    match error {
        CustomRedisError::Timeout => {
            warn!("redis timeout during lock acquisition, treating as retryable");
            ProcessingError::Retryable(error.to_string())
        }
        other => ProcessingError::Retryable(other.to_string()),
    }
}
