//! Strategy AST: the tagged union a backtest job's `strategy_snapshot` is parsed into.
//!
//! Kept as a plain serde-tagged enum rather than a trait-object tree — the analyser and
//! (eventually) the evaluator only need to pattern-match it, and `serde(tag = "type")`
//! mirrors the wire shape the original strategy editor already emits.

use serde::{Deserialize, Serialize};

/// A field reference that resolves directly against loaded OHLCV columns, never against
/// the indicator coverage table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OhlcvField {
    Open,
    High,
    Low,
    Close,
    Volume,
}

impl OhlcvField {
    pub fn parse(ident: &str) -> Option<Self> {
        match ident {
            "open" => Some(Self::Open),
            "high" => Some(Self::High),
            "low" => Some(Self::Low),
            "close" => Some(Self::Close),
            "volume" => Some(Self::Volume),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopLossKind {
    Fixed,
    IndicatorBased,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopLossConfig {
    pub kind: StopLossKind,
    /// Present (and meaningful) only when `kind == IndicatorBased`.
    pub indicator_full_key: Option<String>,
    pub fixed_pct: Option<f64>,
}

/// A value-producing or boolean-producing node in a strategy's condition tree. Node
/// identifiers are the same ones the strategy editor's wire format uses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AstNode {
    And { children: Vec<AstNode> },
    Or { children: Vec<AstNode> },
    GreaterThan { left: Box<AstNode>, right: Box<AstNode> },
    LessThan { left: Box<AstNode>, right: Box<AstNode> },
    Equals { left: Box<AstNode>, right: Box<AstNode> },
    CrossoverUp { left: Box<AstNode>, right: Box<AstNode> },
    CrossoverDown { left: Box<AstNode>, right: Box<AstNode> },
    /// References the current-bar value of `full_key`, e.g. `rsi_timeperiod_14_value` or
    /// an `OhlcvField` identifier.
    IndicatorValue { full_key: String },
    /// References `full_key`'s value `offset` bars back (offset >= 1).
    PrevIndicatorValue { full_key: String, offset: u32 },
    Value { literal: f64 },
    SuperTrendFlip { indicator_key: String },
    MacdCrossoverFlip {
        indicator_key: String,
        signal_key: String,
    },
    StopLoss { config: StopLossConfig },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyAst {
    pub root: AstNode,
}

#[derive(Debug, thiserror::Error)]
pub enum AstParseError {
    #[error("invalid strategy AST json: {0}")]
    Json(#[from] serde_json::Error),
}

impl StrategyAst {
    pub fn parse(raw: &serde_json::Value) -> Result<Self, AstParseError> {
        Ok(serde_json::from_value(raw.clone())?)
    }
}
