//! Strategy Analyser (§4.7): walks a strategy AST and collects the `(base_key,
//! value_key)` pairs that must be present in the coverage table for the strategy to be
//! evaluable.

use crate::ast::{AstNode, OhlcvField, StopLossKind, StrategyAst};
use crate::registry::IndicatorRegistry;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndicatorPair {
    pub base_key: String,
    pub value_key: String,
}

#[derive(Debug, Default)]
pub struct AnalysisResult {
    pub pairs: Vec<IndicatorPair>,
    /// Full keys that didn't suffix-match any known base_key. Per the spec, these
    /// produce a diagnostic but do not fail analysis.
    pub unmatched_full_keys: Vec<String>,
}

pub fn analyse(ast: &StrategyAst, registry: &IndicatorRegistry) -> AnalysisResult {
    let mut result = AnalysisResult::default();
    walk(&ast.root, registry, &mut result);
    result
}

fn collect_full_key(full_key: &str, registry: &IndicatorRegistry, result: &mut AnalysisResult) {
    if OhlcvField::parse(full_key).is_some() {
        return;
    }
    match registry.split_full_key(full_key) {
        Some((base_key, value_key)) => {
            let pair = IndicatorPair {
                base_key: base_key.to_string(),
                value_key: value_key.to_string(),
            };
            if !result.pairs.contains(&pair) {
                result.pairs.push(pair);
            }
        }
        None => result.unmatched_full_keys.push(full_key.to_string()),
    }
}

fn walk(node: &AstNode, registry: &IndicatorRegistry, result: &mut AnalysisResult) {
    match node {
        AstNode::And { children } | AstNode::Or { children } => {
            for child in children {
                walk(child, registry, result);
            }
        }
        AstNode::GreaterThan { left, right }
        | AstNode::LessThan { left, right }
        | AstNode::Equals { left, right }
        | AstNode::CrossoverUp { left, right }
        | AstNode::CrossoverDown { left, right } => {
            walk(left, registry, result);
            walk(right, registry, result);
        }
        AstNode::IndicatorValue { full_key } => collect_full_key(full_key, registry, result),
        AstNode::PrevIndicatorValue { full_key, .. } => {
            collect_full_key(full_key, registry, result)
        }
        AstNode::Value { .. } => {}
        AstNode::SuperTrendFlip { indicator_key } => {
            collect_full_key(indicator_key, registry, result)
        }
        AstNode::MacdCrossoverFlip {
            indicator_key,
            signal_key,
        } => {
            collect_full_key(indicator_key, registry, result);
            collect_full_key(signal_key, registry, result);
        }
        AstNode::StopLoss { config } => {
            if config.kind == StopLossKind::IndicatorBased {
                if let Some(full_key) = &config.indicator_full_key {
                    collect_full_key(full_key, registry, result);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::AstNode;
    use crate::registry::{IndicatorDescriptor, RegistryEntry};
    use std::collections::HashMap;

    fn registry_with_rsi() -> IndicatorRegistry {
        let mut params = serde_json::Map::new();
        params.insert("timeperiod".into(), serde_json::json!(14));
        let mut registry = IndicatorRegistry::new();
        registry.insert(RegistryEntry {
            descriptor: IndicatorDescriptor {
                name: "rsi".into(),
                params,
            },
            lookback: 14,
            outputs: HashMap::from([("value".to_string(), "rsi".to_string())]),
            is_hot: true,
        });
        registry
    }

    #[test]
    fn collects_indicator_value_and_excludes_ohlcv() {
        let registry = registry_with_rsi();
        let ast = StrategyAst {
            root: AstNode::And {
                children: vec![
                    AstNode::GreaterThan {
                        left: Box::new(AstNode::IndicatorValue {
                            full_key: "rsi_timeperiod_14_value".into(),
                        }),
                        right: Box::new(AstNode::Value { literal: 70.0 }),
                    },
                    AstNode::GreaterThan {
                        left: Box::new(AstNode::IndicatorValue {
                            full_key: "close".into(),
                        }),
                        right: Box::new(AstNode::Value { literal: 0.0 }),
                    },
                ],
            },
        };

        let result = analyse(&ast, &registry);
        assert_eq!(
            result.pairs,
            vec![IndicatorPair {
                base_key: "rsi_timeperiod_14".into(),
                value_key: "value".into(),
            }]
        );
        assert!(result.unmatched_full_keys.is_empty());
    }

    #[test]
    fn unmatched_full_key_is_a_diagnostic_not_a_failure() {
        let registry = IndicatorRegistry::new();
        let ast = StrategyAst {
            root: AstNode::IndicatorValue {
                full_key: "totally_unknown_value".into(),
            },
        };

        let result = analyse(&ast, &registry);
        assert!(result.pairs.is_empty());
        assert_eq!(result.unmatched_full_keys, vec!["totally_unknown_value"]);
    }
}
