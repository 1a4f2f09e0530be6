//! Trade records and the `StrategyEvaluator` boundary (§4.5 stage 5).
//!
//! The evaluator itself -- the strategy DSL's simulation semantics -- is explicitly out
//! of scope (base spec §1 Non-goals); this module only defines the narrow
//! `StrategyEvaluator` contract the pipeline depends on, plus `compute_metrics`, the
//! Save Results stage's trade-list aggregation. A concrete evaluator lives with its
//! binary (`backtest-orchestrator::evaluator::RuleBasedEvaluator`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ast::StrategyAst;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeDirection {
    Long,
    Short,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    SignalExit,
    StopLoss,
    TakeProfit,
    EndOfRange,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub entry_time: DateTime<Utc>,
    pub entry_price: f64,
    pub exit_time: DateTime<Utc>,
    pub exit_price: f64,
    pub direction: TradeDirection,
    pub pnl: f64,
    pub exit_reason: ExitReason,
}

/// One row of the wide tabular structure the Load Data stage produces: OHLCV plus one
/// `<base_key>_<value_key>` entry per resolved indicator pair.
#[derive(Debug, Clone)]
pub struct WideRow {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub indicators: std::collections::HashMap<String, f64>,
}

#[derive(Debug, Clone)]
pub struct SimulationParams {
    pub initial_capital: f64,
    pub position_size_pct: f64,
    pub lot_size: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum EvaluatorError {
    #[error("evaluator error: {0}")]
    Other(String),
}

#[async_trait]
pub trait StrategyEvaluator: Send + Sync {
    async fn evaluate(
        &self,
        rows: &[WideRow],
        ast: &StrategyAst,
        params: &SimulationParams,
    ) -> Result<Vec<Trade>, EvaluatorError>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BacktestMetrics {
    pub total_trades: u32,
    pub win_rate: f64,
    pub profit_factor: Option<f64>,
    pub max_drawdown_pct: f64,
    pub net_pnl: f64,
}

/// Aggregates a trade list into the Save Results stage's metrics row (§4.5 stage 6),
/// sanitising NaN/Infinity to a representable default (`None`/`0.0`) since the
/// persisted row has no null-safe float column for those.
pub fn compute_metrics(trades: &[Trade]) -> BacktestMetrics {
    if trades.is_empty() {
        return BacktestMetrics::default();
    }

    let total_trades = trades.len() as u32;
    let wins = trades.iter().filter(|t| t.pnl > 0.0).count();
    let win_rate = wins as f64 / total_trades as f64;
    let net_pnl: f64 = trades.iter().map(|t| t.pnl).sum();

    let gross_profit: f64 = trades.iter().filter(|t| t.pnl > 0.0).map(|t| t.pnl).sum();
    let gross_loss: f64 = trades.iter().filter(|t| t.pnl < 0.0).map(|t| -t.pnl).sum();
    let profit_factor = if gross_loss > 0.0 {
        let pf = gross_profit / gross_loss;
        if pf.is_finite() { Some(pf) } else { None }
    } else {
        None
    };

    let mut equity = 0.0;
    let mut peak = 0.0;
    let mut max_drawdown_pct = 0.0;
    for trade in trades {
        equity += trade.pnl;
        peak = peak.max(equity);
        if peak > 0.0 {
            let drawdown = (peak - equity) / peak * 100.0;
            if drawdown > max_drawdown_pct {
                max_drawdown_pct = drawdown;
            }
        }
    }

    BacktestMetrics {
        total_trades,
        win_rate,
        profit_factor,
        max_drawdown_pct,
        net_pnl,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn trade(pnl: f64) -> Trade {
        Trade {
            entry_time: Utc.timestamp_opt(0, 0).unwrap(),
            entry_price: 100.0,
            exit_time: Utc.timestamp_opt(3600, 0).unwrap(),
            exit_price: 100.0 + pnl,
            direction: TradeDirection::Long,
            pnl,
            exit_reason: ExitReason::SignalExit,
        }
    }

    #[test]
    fn empty_trade_list_yields_zeroed_metrics() {
        let metrics = compute_metrics(&[]);
        assert_eq!(metrics.total_trades, 0);
        assert_eq!(metrics.win_rate, 0.0);
    }

    #[test]
    fn win_rate_and_drawdown_reflect_trade_sequence() {
        let trades = vec![trade(10.0), trade(-5.0), trade(20.0)];
        let metrics = compute_metrics(&trades);
        assert_eq!(metrics.total_trades, 3);
        assert!((metrics.win_rate - (2.0 / 3.0)).abs() < 1e-9);
        assert!(metrics.max_drawdown_pct > 0.0);
        assert_eq!(metrics.net_pnl, 25.0);
    }
}
