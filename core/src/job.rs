//! Backtest Job and Batch entities (§3), and the atomic batch-counter update (§4.5).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
pub enum JobStatus {
    Pending,
    Calculating,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
pub enum BatchStatus {
    Pending,
    Running,
    Completed,
    Failed,
    PartiallyFailed,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BacktestJob {
    pub job_id: Uuid,
    pub user_id: Uuid,
    pub ticker: String,
    pub timeframe: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: JobStatus,
    pub strategy_snapshot: serde_json::Value,
    pub simulation_params: serde_json::Value,
    pub batch_id: Option<Uuid>,
    pub error_message: Option<String>,
    pub counts_towards_limit: bool,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BacktestBatch {
    pub batch_id: Uuid,
    pub user_id: Uuid,
    pub total_count: i32,
    pub completed_count: i32,
    pub failed_count: i32,
    pub status: BatchStatus,
}

/// Delta applied to a job's terminal transition. `completed`/`failed` are mutually
/// exclusive outer flags, not independent counters -- a single job contributes at most
/// one of each to its batch.
pub struct BatchDelta {
    pub completed: bool,
    pub failed: bool,
}

/// Applies the job status update and, if the job carries a `batch_id`, the batch
/// counter update in the same transaction -- mandatory per §4.5 to prevent lost counter
/// updates under concurrent child completions.
pub async fn transition_job_terminal(
    pool: &PgPool,
    job_id: Uuid,
    batch_id: Option<Uuid>,
    new_status: JobStatus,
    error_message: Option<&str>,
    delta: BatchDelta,
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query("UPDATE backtest_jobs SET status = $1, error_message = $2 WHERE job_id = $3")
        .bind(new_status)
        .bind(error_message)
        .bind(job_id)
        .execute(&mut *tx)
        .await?;

    if let Some(batch_id) = batch_id {
        let delta_completed = i32::from(delta.completed);
        let delta_failed = i32::from(delta.failed);

        sqlx::query(
            "UPDATE backtest_batches SET \
                completed_count = completed_count + $1, \
                failed_count = failed_count + $2, \
                status = CASE \
                    WHEN completed_count + $1 + failed_count + $2 = total_count THEN \
                        CASE WHEN failed_count + $2 = 0 THEN 'COMPLETED' \
                             WHEN completed_count + $1 = 0 THEN 'FAILED' \
                             ELSE 'PARTIALLY_FAILED' END \
                    WHEN completed_count + $1 + failed_count + $2 > 0 AND status = 'PENDING' THEN 'RUNNING' \
                    ELSE status END \
             WHERE batch_id = $3",
        )
        .bind(delta_completed)
        .bind(delta_failed)
        .bind(batch_id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChildJobSpec {
    pub ticker: String,
    pub timeframe: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub strategy_id: Uuid,
    pub simulation_params: serde_json::Value,
}

#[derive(Debug, Clone)]
pub enum ChildValidationError {
    UnknownTicker,
    TimeframeNotAllowed,
    EmptyOrFutureRange,
    SimulationParamsOutOfBounds(String),
    StrategyNotOwnedByUser,
    InsufficientDataForLookback,
}

impl std::fmt::Display for ChildValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownTicker => write!(f, "ticker does not exist"),
            Self::TimeframeNotAllowed => write!(f, "timeframe not allowed"),
            Self::EmptyOrFutureRange => write!(f, "date range is empty or in the future"),
            Self::SimulationParamsOutOfBounds(msg) => write!(f, "simulation params out of bounds: {msg}"),
            Self::StrategyNotOwnedByUser => write!(f, "strategy not owned by user"),
            Self::InsufficientDataForLookback => write!(f, "insufficient data for required lookback"),
        }
    }
}
