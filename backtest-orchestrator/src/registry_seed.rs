//! Builds the in-memory `IndicatorRegistry` the pipeline consults to resolve AST
//! indicator references into lookback/output metadata.
//!
//! Real deployments populate this from the indicator-definitions service (out of
//! scope per the core's Non-goals on indicator mathematics). This seeds the same
//! families `PlaceholderKernel` knows how to compute, so the pipeline is exercisable
//! end-to-end without that external service.

use std::collections::HashMap;

use backtest_core::registry::{IndicatorDescriptor, IndicatorRegistry, RegistryEntry};

pub fn seed() -> IndicatorRegistry {
    let mut registry = IndicatorRegistry::new();
    for period in [9, 14, 20, 50, 200] {
        registry.insert(sma_entry(period));
        registry.insert(ema_entry(period));
    }
    registry.insert(rsi_entry(14));
    registry
}

fn period_descriptor(name: &str, period: u32) -> IndicatorDescriptor {
    let mut params = serde_json::Map::new();
    params.insert("timeperiod".into(), serde_json::json!(period));
    IndicatorDescriptor {
        name: name.to_string(),
        params,
    }
}

fn sma_entry(period: u32) -> RegistryEntry {
    RegistryEntry {
        descriptor: period_descriptor("sma", period),
        lookback: period,
        outputs: HashMap::from([("value".to_string(), "sma".to_string())]),
        is_hot: period <= 20,
    }
}

fn ema_entry(period: u32) -> RegistryEntry {
    RegistryEntry {
        descriptor: period_descriptor("ema", period),
        lookback: period,
        outputs: HashMap::from([("value".to_string(), "ema".to_string())]),
        is_hot: period <= 20,
    }
}

fn rsi_entry(period: u32) -> RegistryEntry {
    RegistryEntry {
        descriptor: period_descriptor("rsi", period),
        lookback: period,
        outputs: HashMap::from([("value".to_string(), "rsi".to_string())]),
        is_hot: true,
    }
}
