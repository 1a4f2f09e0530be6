//! Indicator Resolver (§4.6): given a set of required `(base_key, value_key)` pairs,
//! answers which pairs have gaps over a date range and builds the Kafka calculation
//! request for the missing ones.
//!
//! Grounded on `original_source/services/trading_core/trading_engine/core/data/indicator_resolver.py`'s
//! `ensure_indicators_available`/`_request_calculation` pair.

use chrono::{DateTime, Utc};
use common_database::clickhouse::ClickHouseStore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analyser::IndicatorPair;
use crate::registry::{IndicatorDescriptor, IndicatorRegistry};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorCalculationRequest {
    pub job_id: Uuid,
    pub ticker: String,
    pub timeframe: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub indicators: Vec<IndicatorDescriptor>,
}

/// Published by the Indicator Batch Processor (§4.4) once every indicator in a request
/// has been computed and persisted. A separate orchestrator consumer replays the
/// backtest pipeline for `job_id` with `skip_indicator_check=true` on receipt (§4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorCalculationSuccess {
    pub job_id: Uuid,
    pub ticker: String,
    pub timeframe: String,
}

pub struct IndicatorResolver<'a> {
    store: &'a ClickHouseStore,
    registry: &'a IndicatorRegistry,
}

impl<'a> IndicatorResolver<'a> {
    pub fn new(store: &'a ClickHouseStore, registry: &'a IndicatorRegistry) -> Self {
        Self { store, registry }
    }

    /// Returns the subset of `required` whose `base_key` is incomplete over the range --
    /// covered candles short of the base candle count, duplicates, or entirely absent.
    pub async fn find_gaps(
        &self,
        ticker: &str,
        timeframe: &str,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
        required: &[IndicatorPair],
    ) -> Result<Vec<IndicatorPair>, common_database::clickhouse::OlapError> {
        let base_keys: Vec<String> = {
            let mut keys: Vec<String> = required.iter().map(|p| p.base_key.clone()).collect();
            keys.sort();
            keys.dedup();
            keys
        };

        let missing_base_keys = self
            .store
            .missing_base_keys(ticker, timeframe, &base_keys, start_date, end_date)
            .await?;

        Ok(required
            .iter()
            .filter(|pair| missing_base_keys.contains(&pair.base_key))
            .cloned()
            .collect())
    }

    /// Ensures data availability for `required`, returning `true` if everything is
    /// already present. If gaps exist, returns `false` and the caller is expected to
    /// publish the accompanying `IndicatorCalculationRequest` to the
    /// indicator-calc-request topic and stop the pipeline for a round trip (§4.5).
    pub async fn ensure_available(
        &self,
        job_id: Uuid,
        ticker: &str,
        timeframe: &str,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
        required: &[IndicatorPair],
    ) -> Result<Option<IndicatorCalculationRequest>, common_database::clickhouse::OlapError> {
        let gaps = self
            .find_gaps(ticker, timeframe, start_date, end_date, required)
            .await?;

        if gaps.is_empty() {
            return Ok(None);
        }

        let missing_base_keys: Vec<String> = {
            let mut keys: Vec<String> = gaps.iter().map(|p| p.base_key.clone()).collect();
            keys.sort();
            keys.dedup();
            keys
        };
        let indicators = self.registry.descriptors_for(&missing_base_keys);

        Ok(Some(IndicatorCalculationRequest {
            job_id,
            ticker: ticker.to_string(),
            timeframe: timeframe.to_string(),
            start_date,
            end_date,
            indicators,
        }))
    }
}
