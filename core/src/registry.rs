//! Indicator registry: the join point between strategy AST references, the Kafka
//! calculation-request payload, and the coverage table's `indicator_key` column.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Canonical descriptor for one indicator instance: a family name plus its parameters.
/// `indicator_key()` is the canonical string form (family + sorted params) used as the
/// join key between the AST and stored values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorDescriptor {
    pub name: String,
    pub params: serde_json::Map<String, serde_json::Value>,
}

impl IndicatorDescriptor {
    pub fn indicator_key(&self) -> String {
        let mut params: Vec<_> = self.params.iter().collect();
        params.sort_by(|a, b| a.0.cmp(b.0));
        let param_part = params
            .iter()
            .map(|(k, v)| format!("{k}_{v}"))
            .collect::<Vec<_>>()
            .join("_");
        if param_part.is_empty() {
            self.name.clone()
        } else {
            format!("{}_{}", self.name, param_part)
        }
    }
}

#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub descriptor: IndicatorDescriptor,
    /// Minimum prior candles needed for stable values.
    pub lookback: u32,
    /// value_key -> output column name, e.g. `{"value": "rsi"}` or
    /// `{"macd": "macd_line", "signal": "macd_signal"}`.
    pub outputs: HashMap<String, String>,
    pub is_hot: bool,
}

impl RegistryEntry {
    pub fn base_key(&self) -> String {
        self.descriptor.indicator_key()
    }
}

/// In-memory registry of known indicator families, keyed by `base_key`. Populated at
/// startup from the indicator definitions service (out of scope for this core per the
/// base spec's Non-goals on indicator mathematics).
#[derive(Debug, Clone, Default)]
pub struct IndicatorRegistry {
    entries: HashMap<String, RegistryEntry>,
}

impl IndicatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entry: RegistryEntry) {
        self.entries.insert(entry.base_key(), entry);
    }

    pub fn get(&self, base_key: &str) -> Option<&RegistryEntry> {
        self.entries.get(base_key)
    }

    /// Splits a full indicator key (`<base_key>_<value_key>`) by suffix-matching
    /// against known base_keys, since base_keys themselves may contain underscores.
    /// Unmatched full-keys return `None` rather than erroring -- the caller (the
    /// Strategy Analyser) turns that into a diagnostic, not a failure.
    pub fn split_full_key<'a>(&self, full_key: &'a str) -> Option<(&'a str, &'a str)> {
        self.entries.keys().find_map(|base_key| {
            full_key
                .strip_prefix(base_key.as_str())
                .and_then(|rest| rest.strip_prefix('_'))
                .map(|value_key| (&full_key[..base_key.len()], value_key))
        })
    }

    pub fn descriptors_for(&self, base_keys: &[String]) -> Vec<IndicatorDescriptor> {
        base_keys
            .iter()
            .filter_map(|key| self.entries.get(key))
            .map(|entry| entry.descriptor.clone())
            .collect()
    }

    pub fn max_lookback<'a>(&self, base_keys: impl Iterator<Item = &'a str>) -> u32 {
        base_keys
            .filter_map(|key| self.entries.get(key))
            .map(|entry| entry.lookback)
            .max()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rsi_entry() -> RegistryEntry {
        let mut params = serde_json::Map::new();
        params.insert("timeperiod".into(), serde_json::json!(14));
        RegistryEntry {
            descriptor: IndicatorDescriptor {
                name: "rsi".into(),
                params,
            },
            lookback: 14,
            outputs: HashMap::from([("value".to_string(), "rsi".to_string())]),
            is_hot: true,
        }
    }

    #[test]
    fn indicator_key_is_stable_under_param_ordering() {
        assert_eq!(rsi_entry().base_key(), "rsi_timeperiod_14");
    }

    #[test]
    fn split_full_key_suffix_matches_against_known_base_keys() {
        let mut registry = IndicatorRegistry::new();
        registry.insert(rsi_entry());

        assert_eq!(
            registry.split_full_key("rsi_timeperiod_14_value"),
            Some(("rsi_timeperiod_14", "value"))
        );
        assert_eq!(registry.split_full_key("unknown_thing_value"), None);
    }
}
