//! Data plane adapters: a typed Postgres pool for relational job/batch/strategy/user/
//! ticker metadata, and (see [`clickhouse`]) a ClickHouse-backed wide-column store for
//! base candles and indicator values.

pub mod clickhouse;

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{
    pool::PoolConnection,
    postgres::{PgPool, PgPoolOptions, PgRow},
    Error as SqlxError, Postgres,
};
use thiserror::Error;
use tokio::time::timeout;

const DATABASE_TIMEOUT_MILLISECS: u64 = 1000;

#[derive(Error, Debug)]
pub enum CustomDatabaseError {
    #[error("Pg error: {0}")]
    Other(#[from] sqlx::Error),

    #[error("Timeout error")]
    Timeout(#[from] tokio::time::error::Elapsed),
}

pub type PostgresReader = Arc<dyn Client + Send + Sync>;
pub type PostgresWriter = Arc<dyn Client + Send + Sync>;

/// A simple db wrapper
/// Supports running any arbitrary query with a timeout.
/// TODO: Make sqlx prepared statements work with pgbouncer, potentially by setting pooling mode to session.
#[async_trait]
pub trait Client {
    async fn get_connection(&self) -> Result<PoolConnection<Postgres>, CustomDatabaseError>;
    async fn run_query(
        &self,
        query: String,
        parameters: Vec<String>,
        timeout_ms: Option<u64>,
    ) -> Result<Vec<PgRow>, CustomDatabaseError>;

    fn get_pool_stats(&self) -> Option<PoolStats>;
}

#[derive(Debug, Clone)]
pub struct PoolStats {
    pub size: u32,
    pub num_idle: usize,
}

/// Configuration for database connection pool
/// Each service should provide its own configuration based on its needs
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Option<Duration>,
    pub max_lifetime: Option<Duration>,
    pub test_before_acquire: bool,
}

impl Default for PoolConfig {
    /// Provides sensible production defaults
    /// Services can override these with their own environment-based configs
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout: Duration::from_secs(10),
            idle_timeout: Some(Duration::from_secs(300)), // Close idle connections after 5 minutes
            max_lifetime: Some(Duration::from_secs(1800)), // Force refresh connections after 30 minutes
            test_before_acquire: true,                     // Test connection health before use
        }
    }
}

/// Legacy function for backward compatibility - uses default production settings
/// New services should use get_pool_with_config() with their own PoolConfig
pub async fn get_pool(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    let config = PoolConfig {
        max_connections,
        ..Default::default()
    };
    get_pool_with_config(url, config).await
}

/// Legacy function for backward compatibility - uses default production settings except for timeout
/// New services should use get_pool_with_config() with their own PoolConfig
pub async fn get_pool_with_timeout(
    url: &str,
    max_connections: u32,
    acquire_timeout: Duration,
) -> Result<PgPool, sqlx::Error> {
    let config = PoolConfig {
        max_connections,
        acquire_timeout,
        ..Default::default()
    };
    get_pool_with_config(url, config).await
}

/// Creates a database pool with the provided configuration
/// This is the recommended function for services to use
pub async fn get_pool_with_config(url: &str, config: PoolConfig) -> Result<PgPool, sqlx::Error> {
    let mut options = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .test_before_acquire(config.test_before_acquire);

    if let Some(idle_timeout) = config.idle_timeout {
        options = options.idle_timeout(idle_timeout);
    }

    if let Some(max_lifetime) = config.max_lifetime {
        options = options.max_lifetime(max_lifetime);
    }

    options.connect(url).await
}

#[async_trait]
impl Client for PgPool {
    fn get_pool_stats(&self) -> Option<PoolStats> {
        Some(PoolStats {
            size: self.size(),
            num_idle: self.num_idle(),
        })
    }

    async fn run_query(
        &self,
        query: String,
        parameters: Vec<String>,
        timeout_ms: Option<u64>,
    ) -> Result<Vec<PgRow>, CustomDatabaseError> {
        let built_query = sqlx::query(&query);
        let built_query = parameters
            .iter()
            .fold(built_query, |acc, param| acc.bind(param));
        let query_results = built_query.fetch_all(self);

        let timeout_ms = match timeout_ms {
            Some(ms) => ms,
            None => DATABASE_TIMEOUT_MILLISECS,
        };

        let fut = timeout(Duration::from_millis(timeout_ms), query_results).await?;

        Ok(fut?)
    }

    async fn get_connection(&self) -> Result<PoolConnection<Postgres>, CustomDatabaseError> {
        Ok(self.acquire().await?)
    }
}

/// Determines if a sqlx::Error represents a foreign key constraint violation
pub fn is_foreign_key_constraint_error(error: &SqlxError) -> bool {
    match error {
        SqlxError::Database(db_error) => {
            // Class 23 — Integrity Constraint Violation; 23503 = foreign_key_violation
            // See: https://www.postgresql.org/docs/current/errcodes-appendix.html
            if let Some(code) = db_error.code() {
                code.as_ref() == "23503"
            } else {
                let msg = db_error.message().to_lowercase();
                msg.contains("violates foreign key constraint")
                    || msg.contains("foreign key constraint")
            }
        }
        _ => false,
    }
}

/// Determines if a sqlx::Error represents a transient failure that should be retried
pub fn is_transient_error(error: &SqlxError) -> bool {
    match error {
        // Connection/pool issues: usually transient.
        SqlxError::Io(_)
        | SqlxError::PoolTimedOut
        | SqlxError::PoolClosed
        // TLS/handshake can be transient (network/cert rollover).
        | SqlxError::Tls(_) => true,

        // Database-specific errors: prefer SQLSTATE when available.
        SqlxError::Database(db_error) => {
            if let Some(code) = db_error.code() {
                let code = code.as_ref();

                // See: PostgreSQL SQLSTATE appendix
                // 08***  Connection Exception
                // 53***  Insufficient Resources
                // 57***  Operator Intervention
                // 58***  System Error (often transient)
                // 40001  Serialization Failure
                // 40003  Statement Completion Unknown (retry if idempotent)
                // 40P01  Deadlock Detected
                code.starts_with("08")
                    || code.starts_with("53")
                    || code.starts_with("57")
                    || code.starts_with("58")
                    || code == "40001"
                    || code == "40003"
                    || code == "40P01"
            } else {
                // Last resort: message heuristics (less reliable than SQLSTATE).
                let msg = db_error.message().to_lowercase();
                msg.contains("connection")
                    || msg.contains("timeout")
                    || msg.contains("timed out")
                    || msg.contains("temporary")
                    || msg.contains("deadlock")
                    || msg.contains("serialization")
                    || msg.contains("disk full")
                    || msg.contains("canceling statement due to")
                    || msg.contains("terminating connection due to")
                    || msg.contains("ssl")
                    || msg.contains("tls")
            }
        }

        // Protocol glitches may be transient.
        SqlxError::Protocol(msg) => {
            let m = msg.to_lowercase();
            m.contains("connection") || m.contains("timeout") || m.contains("ssl") || m.contains("tls")
        }

        // Default: assume non-transient since we're not sure about the error type.
        _ => false,
    }
}
