//! Value merging

use crate::value::Value;

/// Merge `incoming` over `existing`
///
/// Two mappings merge key by key, recursing into nested mappings; keys
/// present on one side only pass through. A mapping merged into a
/// sub-chart merges into that chart's values. In every other case the
/// incoming value replaces the existing one.
pub fn merge(existing: Option<Value>, incoming: Value) -> Value {
    match (existing.map(Value::into_host), incoming.into_host()) {
        (Some(Value::Chart(chart)), Value::Map(entries)) => {
            chart.merge_entries(entries);
            Value::Chart(chart)
        }
        (Some(Value::Map(mut base)), Value::Map(overlay)) => {
            for (key, value) in overlay {
                let merged = merge(base.get(&key).cloned(), value);
                base.insert(key, merged);
            }
            Value::Map(base)
        }
        (_, incoming) => incoming,
    }
}
