//! Wide-column time-series store: base OHLCV candles and indicator values in long
//! format, both served by the same ClickHouse cluster.
//!
//! Grounded on `agent-sync`'s `ClickHouseLogStore` for the client construction and query
//! style (`clickhouse::Client::default().with_url()...`, `Row`-derived structs bound
//! into parameterised `query()` calls). The indicator coverage table is a
//! `ReplacingMergeTree`-equivalent: readers collapse duplicates with `SELECT ... FINAL`
//! (or an equivalent `argMax` aggregation) ordered by `version`, giving last-writer-wins
//! semantics across retried writes.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use clickhouse::{Client, Row};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OlapError {
    #[error("clickhouse error: {0}")]
    ClickHouse(#[from] clickhouse::error::Error),

    #[error("no base candles found for {ticker} {timeframe} in range")]
    NoBaseCandles { ticker: String, timeframe: String },

    #[error("base candle rows are missing required OHLCV columns")]
    MissingOhlcvColumns,
}

/// Fixed zone every `begin` timestamp is normalised to before persistence and after
/// retrieval, per the system's timezone policy. Centralised here rather than left to
/// call sites, per the design notes' "never rely on the platform default" rule.
pub const STORAGE_TZ: Tz = chrono_tz::Europe::Moscow;

pub fn to_storage_tz(ts: DateTime<Utc>) -> DateTime<Tz> {
    ts.with_timezone(&STORAGE_TZ)
}

#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct BaseCandleRow {
    pub ticker: String,
    pub timeframe: String,
    #[serde(with = "clickhouse::serde::time::datetime64::millis")]
    pub begin: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// One row of the indicator coverage table, in long format: one `(begin, value_key)`
/// pair per row rather than one wide column per indicator output.
#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct IndicatorValueRow {
    pub ticker: String,
    pub timeframe: String,
    #[serde(with = "clickhouse::serde::time::datetime64::millis")]
    pub begin: DateTime<Utc>,
    pub indicator_key: String,
    pub value_key: String,
    pub value: f64,
    pub version: u64,
}

/// Per-`base_key` gap-check result: how many base candles exist in range vs. how many
/// distinct, non-duplicated indicator values were found for that base_key.
#[derive(Debug, Clone, Row, Deserialize)]
struct CoverageCountRow {
    base_key: String,
    covered_candles: u64,
    distinct_timestamps: u64,
}

pub struct ClickHouseStore {
    client: Client,
}

impl ClickHouseStore {
    pub fn new(host: &str, port: u16, database: &str, user: &str, password: &str) -> Self {
        let url = format!("http://{host}:{port}");
        let client = Client::default()
            .with_url(url)
            .with_database(database)
            .with_user(user)
            .with_password(password);
        Self { client }
    }

    pub async fn health_check(&self) -> Result<(), OlapError> {
        self.client.query("SELECT 1").execute().await?;
        Ok(())
    }

    /// Resolves `effective_start = start_date - (max lookback) candles` by counting
    /// back from `start_date`, falling back to the earliest available candle if the
    /// series is shorter than the requested lookback.
    pub async fn effective_start(
        &self,
        ticker: &str,
        timeframe: &str,
        start_date: DateTime<Utc>,
        lookback_candles: u32,
    ) -> Result<DateTime<Utc>, OlapError> {
        let rows: Vec<DateTime<Utc>> = self
            .client
            .query(
                "SELECT begin FROM base_candles \
                 WHERE ticker = ? AND timeframe = ? AND begin < ? \
                 ORDER BY begin DESC LIMIT ?",
            )
            .bind(ticker)
            .bind(timeframe)
            .bind(start_date.timestamp_millis())
            .bind(lookback_candles)
            .fetch_all()
            .await?;

        Ok(rows.into_iter().last().unwrap_or(start_date))
    }

    /// Single query for OHLCV rows in `[effective_start, end_date]`, ordered by time.
    pub async fn load_base_candles(
        &self,
        ticker: &str,
        timeframe: &str,
        effective_start: DateTime<Utc>,
        end_date: DateTime<Utc>,
    ) -> Result<Vec<BaseCandleRow>, OlapError> {
        let rows = self
            .client
            .query(
                "SELECT ticker, timeframe, begin, open, high, low, close, volume \
                 FROM base_candles \
                 WHERE ticker = ? AND timeframe = ? AND begin >= ? AND begin <= ? \
                 ORDER BY begin ASC",
            )
            .bind(ticker)
            .bind(timeframe)
            .bind(effective_start.timestamp_millis())
            .bind(end_date.timestamp_millis())
            .fetch_all()
            .await?;

        if rows.is_empty() {
            return Err(OlapError::NoBaseCandles {
                ticker: ticker.to_string(),
                timeframe: timeframe.to_string(),
            });
        }
        Ok(rows)
    }

    /// Gap check used by both the Indicator Resolver (§4.6) and the Ensure Data stage
    /// (§4.5): a `base_key` is incomplete iff its covered candle count is short of the
    /// base candle count in range, duplicates exist, or the base_key is absent entirely.
    pub async fn missing_base_keys(
        &self,
        ticker: &str,
        timeframe: &str,
        base_keys: &[String],
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
    ) -> Result<Vec<String>, OlapError> {
        if base_keys.is_empty() {
            return Ok(Vec::new());
        }

        let required_candles: u64 = self
            .client
            .query(
                "SELECT count() FROM base_candles \
                 WHERE ticker = ? AND timeframe = ? AND begin >= ? AND begin <= ?",
            )
            .bind(ticker)
            .bind(timeframe)
            .bind(start_date.timestamp_millis())
            .bind(end_date.timestamp_millis())
            .fetch_one()
            .await?;

        let placeholders = base_keys.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
        let query = format!(
            "SELECT indicator_key AS base_key, \
                    countDistinct(begin) AS distinct_timestamps, \
                    count() AS covered_candles \
             FROM indicator_values FINAL \
             WHERE ticker = ? AND timeframe = ? AND begin >= ? AND begin <= ? \
               AND indicator_key IN ({placeholders}) \
             GROUP BY indicator_key"
        );

        let mut bound = self
            .client
            .query(&query)
            .bind(ticker)
            .bind(timeframe)
            .bind(start_date.timestamp_millis())
            .bind(end_date.timestamp_millis());
        for key in base_keys {
            bound = bound.bind(key);
        }
        let coverage: Vec<CoverageCountRow> = bound.fetch_all().await?;

        let mut missing = Vec::new();
        for base_key in base_keys {
            let found = coverage.iter().find(|row| &row.base_key == base_key);
            let is_complete = found
                .map(|row| {
                    row.distinct_timestamps == required_candles
                        && row.covered_candles == row.distinct_timestamps
                })
                .unwrap_or(false);
            if !is_complete {
                missing.push(base_key.clone());
            }
        }
        Ok(missing)
    }

    /// Bulk insert of long-format indicator rows produced by one indicator's pivot
    /// step (§4.4). Idempotent: retried writes carry a fresh `version` but the same
    /// primary key, and the `FINAL`/`argMax` read policy always surfaces the newest one.
    pub async fn insert_indicator_values(&self, rows: Vec<IndicatorValueRow>) -> Result<(), OlapError> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut insert = self.client.insert("indicator_values")?;
        for row in rows {
            insert.write(&row).await?;
        }
        insert.end().await?;
        Ok(())
    }

    pub async fn insert_base_candles(&self, rows: Vec<BaseCandleRow>) -> Result<(), OlapError> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut insert = self.client.insert("base_candles")?;
        for row in rows {
            insert.write(&row).await?;
        }
        insert.end().await?;
        Ok(())
    }

    /// Loads the wide tabular structure the simulation stage consumes: one row per
    /// timestamp, OHLCV columns plus one `<base_key>_<value_key>` column per requested
    /// indicator pair, via `UNION ALL` over candles and the (deduplicated) value rows.
    pub async fn load_wide_table(
        &self,
        ticker: &str,
        timeframe: &str,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
    ) -> Result<(Vec<BaseCandleRow>, Vec<IndicatorValueRow>), OlapError> {
        let candles = self
            .load_base_candles(ticker, timeframe, start_date, end_date)
            .await?;

        let values: Vec<IndicatorValueRow> = self
            .client
            .query(
                "SELECT ticker, timeframe, begin, indicator_key, value_key, \
                        argMax(value, version) AS value, max(version) AS version \
                 FROM indicator_values \
                 WHERE ticker = ? AND timeframe = ? AND begin >= ? AND begin <= ? \
                 GROUP BY ticker, timeframe, begin, indicator_key, value_key",
            )
            .bind(ticker)
            .bind(timeframe)
            .bind(start_date.timestamp_millis())
            .bind(end_date.timestamp_millis())
            .fetch_all()
            .await?;

        Ok((candles, values))
    }

    /// Distinct `(ticker, timeframe)` pairs with at least one stored candle, the
    /// population the scheduler's `--sync-redis` step mirrors into Redis.
    pub async fn distinct_ticker_timeframes(&self) -> Result<Vec<(String, String)>, OlapError> {
        let rows: Vec<TickerTimeframeRow> = self
            .client
            .query("SELECT DISTINCT ticker, timeframe FROM base_candles")
            .fetch_all()
            .await?;
        Ok(rows.into_iter().map(|r| (r.ticker, r.timeframe)).collect())
    }
}

#[derive(Debug, Clone, Row, Serialize, Deserialize)]
struct TickerTimeframeRow {
    ticker: String,
    timeframe: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_tz_is_moscow() {
        assert_eq!(STORAGE_TZ.to_string(), "Europe/Moscow");
    }
}
