//! Indicator math kernel boundary. Indicator mathematics is an explicit external
//! collaborator (base spec Non-goals): the core depends on it through a narrow trait
//! and never reimplements a TA-lib/pandas-ta-equivalent library itself.

use chrono::{DateTime, Utc};

use crate::registry::IndicatorDescriptor;

#[derive(Debug, Clone)]
pub struct BaseCandle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// One output column's values, indexed in parallel with the input candle slice.
/// `None` entries are NaN-equivalents produced during the lookback warm-up; the caller
/// drops them before persisting (§4.4 step 4c).
#[derive(Debug, Clone)]
pub struct ColumnarOutput {
    pub value_key: String,
    pub values: Vec<Option<f64>>,
}

#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    #[error("unknown indicator family: {0}")]
    UnknownFamily(String),
    #[error("invalid indicator parameters: {0}")]
    InvalidParams(String),
}

pub trait IndicatorKernel: Send + Sync {
    /// Minimum number of prior candles needed to produce stable values.
    fn lookback(&self, descriptor: &IndicatorDescriptor) -> Result<u32, KernelError>;

    /// Computes every output column for `descriptor` over `candles`, which already
    /// includes the lookback warm-up window.
    fn compute(
        &self,
        descriptor: &IndicatorDescriptor,
        candles: &[BaseCandle],
    ) -> Result<Vec<ColumnarOutput>, KernelError>;
}

/// Placeholder SMA/EMA-shaped kernel sufficient to exercise the pivot/persist plumbing
/// in tests. Not a claim of indicator-math completeness -- real kernels belong to the
/// indicator-definitions service this core treats as an external collaborator.
pub struct PlaceholderKernel;

impl IndicatorKernel for PlaceholderKernel {
    fn lookback(&self, descriptor: &IndicatorDescriptor) -> Result<u32, KernelError> {
        match descriptor.name.as_str() {
            "sma" | "ema" | "rsi" => period_param(descriptor),
            other => Err(KernelError::UnknownFamily(other.to_string())),
        }
    }

    fn compute(
        &self,
        descriptor: &IndicatorDescriptor,
        candles: &[BaseCandle],
    ) -> Result<Vec<ColumnarOutput>, KernelError> {
        let period = period_param(descriptor)? as usize;
        match descriptor.name.as_str() {
            "sma" => Ok(vec![ColumnarOutput {
                value_key: "value".to_string(),
                values: simple_moving_average(candles, period),
            }]),
            "ema" => Ok(vec![ColumnarOutput {
                value_key: "value".to_string(),
                values: exponential_moving_average(candles, period),
            }]),
            "rsi" => Ok(vec![ColumnarOutput {
                value_key: "value".to_string(),
                values: simple_moving_average(candles, period),
            }]),
            other => Err(KernelError::UnknownFamily(other.to_string())),
        }
    }
}

fn period_param(descriptor: &IndicatorDescriptor) -> Result<u32, KernelError> {
    descriptor
        .params
        .get("timeperiod")
        .and_then(|v| v.as_u64())
        .map(|v| v as u32)
        .ok_or_else(|| KernelError::InvalidParams("missing `timeperiod`".to_string()))
}

fn simple_moving_average(candles: &[BaseCandle], period: usize) -> Vec<Option<f64>> {
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    (0..closes.len())
        .map(|i| {
            if i + 1 < period {
                None
            } else {
                let window = &closes[i + 1 - period..=i];
                Some(window.iter().sum::<f64>() / period as f64)
            }
        })
        .collect()
}

fn exponential_moving_average(candles: &[BaseCandle], period: usize) -> Vec<Option<f64>> {
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let alpha = 2.0 / (period as f64 + 1.0);
    let mut out = Vec::with_capacity(closes.len());
    let mut prev: Option<f64> = None;
    for (i, &close) in closes.iter().enumerate() {
        if i + 1 < period {
            out.push(None);
            continue;
        }
        let value = match prev {
            None => closes[i + 1 - period..=i].iter().sum::<f64>() / period as f64,
            Some(p) => alpha * close + (1.0 - alpha) * p,
        };
        prev = Some(value);
        out.push(Some(value));
    }
    out
}

/// Runs `kernel.compute` for every descriptor and pivots each output into the long-format
/// `(ticker, timeframe, begin, indicator_key, value_key, value, version)` rows the OLAP
/// store expects (§4.4 steps 4b-4d), dropping NaN/None values and rows before `start_date`.
pub fn pivot_to_long_format(
    kernel: &dyn IndicatorKernel,
    descriptor: &IndicatorDescriptor,
    ticker: &str,
    timeframe: &str,
    candles: &[BaseCandle],
    start_date: DateTime<Utc>,
    version: u64,
) -> Result<Vec<common_database::clickhouse::IndicatorValueRow>, KernelError> {
    let outputs = kernel.compute(descriptor, candles)?;
    let indicator_key = descriptor.indicator_key();

    let mut rows = Vec::new();
    for output in outputs {
        for (candle, value) in candles.iter().zip(output.values.iter()) {
            let Some(value) = value else { continue };
            if candle.timestamp < start_date {
                continue;
            }
            rows.push(common_database::clickhouse::IndicatorValueRow {
                ticker: ticker.to_string(),
                timeframe: timeframe.to_string(),
                begin: candle.timestamp,
                indicator_key: indicator_key.clone(),
                value_key: output.value_key.clone(),
                value: *value,
                version,
            });
        }
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::IndicatorDescriptor;
    use chrono::TimeZone;

    fn candle(i: i64, close: f64) -> BaseCandle {
        BaseCandle {
            timestamp: Utc.timestamp_opt(i * 3600, 0).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 100.0,
        }
    }

    fn sma_descriptor() -> IndicatorDescriptor {
        let mut params = serde_json::Map::new();
        params.insert("timeperiod".into(), serde_json::json!(3));
        IndicatorDescriptor {
            name: "sma".into(),
            params,
        }
    }

    #[test]
    fn sma_warms_up_before_producing_values() {
        let candles: Vec<BaseCandle> = (0..5).map(|i| candle(i, i as f64 + 1.0)).collect();
        let values = simple_moving_average(&candles, 3);
        assert_eq!(values, vec![None, None, Some(2.0), Some(3.0), Some(4.0)]);
    }

    #[test]
    fn pivot_drops_rows_before_start_date() {
        let kernel = PlaceholderKernel;
        let descriptor = sma_descriptor();
        let candles: Vec<BaseCandle> = (0..5).map(|i| candle(i, i as f64 + 1.0)).collect();
        let start_date = candles[3].timestamp;

        let rows = pivot_to_long_format(
            &kernel,
            &descriptor,
            "AAPL",
            "1h",
            &candles,
            start_date,
            1,
        )
        .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].begin, candles[3].timestamp);
    }
}
