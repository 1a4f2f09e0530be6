//! Error taxonomy shared by the consumer dispatch loop, decorators, and the backtest core.
//!
//! Mirrors hook-common's layered error types: each kind carries its own retry/DLQ policy
//! rather than leaving the dispatcher to infer one from a generic error.

use std::time::Duration;

use rdkafka::error::KafkaError;
use thiserror::Error;

/// Error raised by a message handler, deciding how the dispatcher treats the offset.
#[derive(Debug, Error)]
pub enum ProcessingError {
    /// Payload failed to decode or violated its declared schema. Never retried, never
    /// sent to the DLQ -- the offset is marked success so the partition isn't poisoned.
    #[error("validation error: {0}")]
    Validation(String),

    /// Transient failure (OLAP/network/lock timeout). Retried with backoff up to
    /// `max_retries`, then DLQ'd.
    #[error("retryable error: {0}")]
    Retryable(String),

    /// Bad config, unknown indicator family, inconsistent state. DLQ'd immediately, no
    /// retry.
    #[error("fatal error: {0}")]
    Fatal(String),

    /// The handler exhausted its retry budget; carries the last retryable reason.
    #[error("max retries ({attempts}) exceeded: {source}")]
    MaxRetriesExceeded { attempts: u32, source: String },

    /// A `circuit_breaker` decorator's breaker is OPEN. Surfaced to the caller as
    /// retryable rather than fatal.
    #[error("circuit breaker open, retry after {retry_after:?}")]
    CircuitBreakerOpen { retry_after: Duration },
}

impl ProcessingError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, ProcessingError::Fatal(_))
    }

    /// True for error kinds the dispatcher treats like a fresh `RetryableError`.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProcessingError::Retryable(_) | ProcessingError::CircuitBreakerOpen { .. }
        )
    }
}

/// Producer-side failures, surfaced directly to the caller. The transport never retries
/// these on its own.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("message exceeds broker size limit: {0}")]
    MessageSize(String),

    #[error("broker did not acknowledge within the configured timeout")]
    Timeout,

    #[error("publisher error: {0}")]
    Publisher(#[from] KafkaError),
}
