//! Minimal rule-based `StrategyEvaluator` (§4.5 stage 5). Sufficient to exercise the
//! pipeline end-to-end -- long-only, one position at a time, entered when the AST's
//! root condition turns true and exited on a fixed-pct stop-loss, signal reversal, or
//! end of range. Not a claim of strategy DSL completeness: crossover nodes only look
//! one bar back, and an indicator-based stop-loss is resolved by the analyser (so its
//! referenced values load) but not evaluated as a live exit trigger here.

use async_trait::async_trait;
use backtest_core::ast::{AstNode, OhlcvField, StopLossKind, StrategyAst};
use backtest_core::trade::{
    EvaluatorError, ExitReason, SimulationParams, StrategyEvaluator, Trade, TradeDirection, WideRow,
};

pub struct RuleBasedEvaluator;

#[async_trait]
impl StrategyEvaluator for RuleBasedEvaluator {
    async fn evaluate(
        &self,
        rows: &[WideRow],
        ast: &StrategyAst,
        params: &SimulationParams,
    ) -> Result<Vec<Trade>, EvaluatorError> {
        Ok(run(rows, ast, params))
    }
}

fn run(rows: &[WideRow], ast: &StrategyAst, params: &SimulationParams) -> Vec<Trade> {
    let stop_loss_pct = find_fixed_stop_loss_pct(&ast.root);
    let mut trades = Vec::new();
    let mut open: Option<(usize, f64)> = None;

    for i in 0..rows.len() {
        let prev = i.checked_sub(1).map(|j| &rows[j]);
        let signal = eval_bool(&ast.root, &rows[i], prev);

        match open {
            None if signal => {
                open = Some((i, rows[i].close));
            }
            Some((entry_idx, entry_price)) => {
                let stop_hit = stop_loss_pct
                    .map(|pct| (entry_price - rows[i].low) / entry_price * 100.0 >= pct)
                    .unwrap_or(false);
                let is_last = i == rows.len() - 1;

                if stop_hit || !signal || is_last {
                    let exit_reason = if stop_hit {
                        ExitReason::StopLoss
                    } else if is_last {
                        ExitReason::EndOfRange
                    } else {
                        ExitReason::SignalExit
                    };
                    trades.push(close_trade(
                        rows,
                        entry_idx,
                        entry_price,
                        i,
                        exit_reason,
                        params,
                    ));
                    open = None;
                }
            }
            None => {}
        }
    }

    trades
}

fn close_trade(
    rows: &[WideRow],
    entry_idx: usize,
    entry_price: f64,
    exit_idx: usize,
    exit_reason: ExitReason,
    params: &SimulationParams,
) -> Trade {
    let exit_price = rows[exit_idx].close;
    let position_value = params.initial_capital * params.position_size_pct / 100.0;
    let shares = (position_value / entry_price).max(0.0);
    let pnl = (exit_price - entry_price) * shares;

    Trade {
        entry_time: rows[entry_idx].timestamp,
        entry_price,
        exit_time: rows[exit_idx].timestamp,
        exit_price,
        direction: TradeDirection::Long,
        pnl,
        exit_reason,
    }
}

/// The only stop-loss flavour this reference evaluator treats as a live exit trigger.
/// An indicator-based stop loss is structurally supported by the AST and analyser
/// (its referenced key is still resolved and loaded) but has no effect here.
fn find_fixed_stop_loss_pct(node: &AstNode) -> Option<f64> {
    match node {
        AstNode::StopLoss { config } if config.kind == StopLossKind::Fixed => config.fixed_pct,
        AstNode::And { children } | AstNode::Or { children } => {
            children.iter().find_map(find_fixed_stop_loss_pct)
        }
        _ => None,
    }
}

fn eval_bool(node: &AstNode, row: &WideRow, prev: Option<&WideRow>) -> bool {
    match node {
        AstNode::And { children } => children.iter().all(|c| eval_bool(c, row, prev)),
        AstNode::Or { children } => children.iter().any(|c| eval_bool(c, row, prev)),
        AstNode::GreaterThan { left, right } => eval_num(left, row) > eval_num(right, row),
        AstNode::LessThan { left, right } => eval_num(left, row) < eval_num(right, row),
        AstNode::Equals { left, right } => (eval_num(left, row) - eval_num(right, row)).abs() < f64::EPSILON,
        AstNode::CrossoverUp { left, right } => match prev {
            Some(prev) => eval_num(left, prev) <= eval_num(right, prev) && eval_num(left, row) > eval_num(right, row),
            None => false,
        },
        AstNode::CrossoverDown { left, right } => match prev {
            Some(prev) => eval_num(left, prev) >= eval_num(right, prev) && eval_num(left, row) < eval_num(right, row),
            None => false,
        },
        AstNode::SuperTrendFlip { indicator_key } => match prev {
            Some(prev) => {
                let key = format!("{indicator_key}_value");
                let a = prev.indicators.get(&key).copied().unwrap_or(0.0);
                let b = row.indicators.get(&key).copied().unwrap_or(0.0);
                a.signum() != b.signum()
            }
            None => false,
        },
        AstNode::MacdCrossoverFlip {
            indicator_key,
            signal_key,
        } => match prev {
            Some(prev) => {
                let macd_key = format!("{indicator_key}_value");
                let signal_full_key = format!("{signal_key}_value");
                let prev_diff = prev.indicators.get(&macd_key).copied().unwrap_or(0.0)
                    - prev.indicators.get(&signal_full_key).copied().unwrap_or(0.0);
                let cur_diff = row.indicators.get(&macd_key).copied().unwrap_or(0.0)
                    - row.indicators.get(&signal_full_key).copied().unwrap_or(0.0);
                prev_diff.signum() != cur_diff.signum()
            }
            None => false,
        },
        AstNode::StopLoss { .. } | AstNode::IndicatorValue { .. } | AstNode::PrevIndicatorValue { .. } | AstNode::Value { .. } => {
            false
        }
    }
}

fn eval_num(node: &AstNode, row: &WideRow) -> f64 {
    match node {
        AstNode::Value { literal } => *literal,
        AstNode::IndicatorValue { full_key } => lookup(full_key, row),
        AstNode::PrevIndicatorValue { full_key, .. } => lookup(full_key, row),
        _ => 0.0,
    }
}

fn lookup(full_key: &str, row: &WideRow) -> f64 {
    if let Some(field) = OhlcvField::parse(full_key) {
        return match field {
            OhlcvField::Open => row.open,
            OhlcvField::High => row.high,
            OhlcvField::Low => row.low,
            OhlcvField::Close => row.close,
            OhlcvField::Volume => row.volume,
        };
    }
    row.indicators.get(full_key).copied().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn row(i: i64, close: f64) -> WideRow {
        WideRow {
            timestamp: Utc.timestamp_opt(i * 3600, 0).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 100.0,
            indicators: std::collections::HashMap::new(),
        }
    }

    fn params() -> SimulationParams {
        SimulationParams {
            initial_capital: 10_000.0,
            position_size_pct: 100.0,
            lot_size: 1,
        }
    }

    #[test]
    fn enters_long_when_close_crosses_above_literal_and_exits_at_end_of_range() {
        let rows = vec![row(0, 5.0), row(1, 15.0), row(2, 20.0)];
        let ast = StrategyAst {
            root: AstNode::GreaterThan {
                left: Box::new(AstNode::IndicatorValue {
                    full_key: "close".into(),
                }),
                right: Box::new(AstNode::Value { literal: 10.0 }),
            },
        };

        let trades = run(&rows, &ast, &params());
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].direction, TradeDirection::Long);
        assert_eq!(trades[0].exit_reason, ExitReason::EndOfRange);
        assert!(trades[0].pnl > 0.0);
    }

    #[test]
    fn never_enters_when_condition_never_holds() {
        let rows = vec![row(0, 1.0), row(1, 2.0)];
        let ast = StrategyAst {
            root: AstNode::GreaterThan {
                left: Box::new(AstNode::IndicatorValue {
                    full_key: "close".into(),
                }),
                right: Box::new(AstNode::Value { literal: 1000.0 }),
            },
        };

        assert!(run(&rows, &ast, &params()).is_empty());
    }
}
