//! Pipeline-level error taxonomy (§7). `StageError::AwaitingIndicators` is special: it
//! is the expected outcome of the Ensure Data stage when a calculation request was just
//! published, and must never mark the job FAILED.

use thiserror::Error;
use uuid::Uuid;

use crate::ast::AstParseError;
use crate::job::ChildValidationError;
use common_database::clickhouse::OlapError;
use common_kafka::kafka_producer::KafkaProduceError;

#[derive(Debug, Error)]
pub enum StageError {
    #[error("job {0} not found")]
    JobNotFound(Uuid),

    #[error("invalid strategy snapshot: {0}")]
    InvalidStrategy(#[from] AstParseError),

    #[error("child job validation failed: {0}")]
    InvalidChildJob(ChildValidationError),

    /// Not a failure: the Ensure Data stage published a calculation request and the
    /// pipeline is now waiting for the indicator-worker round trip (§4.5).
    #[error("awaiting indicator calculation for job {job_id}")]
    AwaitingIndicators { job_id: Uuid },

    #[error("data store error: {0}")]
    Store(#[from] OlapError),

    #[error("relational store error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("evaluator error: {0}")]
    Evaluator(#[from] crate::trade::EvaluatorError),

    #[error("publish error: {0}")]
    Publish(#[from] KafkaProduceError),
}

impl StageError {
    /// Whether this error should transition the job to FAILED. `AwaitingIndicators`
    /// leaves the job in CALCULATING and is handled entirely by the caller's early
    /// return, never reaching a terminal transition.
    pub fn is_terminal_failure(&self) -> bool {
        !matches!(self, StageError::AwaitingIndicators { .. })
    }
}
