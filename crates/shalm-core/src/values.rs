//! Chart values as loaded from `values.yaml`
//!
//! Values are plain JSON trees here. The runtime converts them into the
//! chart's live value mapping and merges caller overrides there.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::path::Path;

use crate::error::{CoreError, Result};

/// A values document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Values(pub JsonValue);

impl Values {
    /// Create empty values
    pub fn new() -> Self {
        Self(JsonValue::Object(serde_json::Map::new()))
    }

    /// Load values from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse values from YAML string
    ///
    /// An empty document yields empty values rather than `null`.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let value: JsonValue = serde_yaml::from_str(yaml)?;
        match value {
            JsonValue::Null => Ok(Self::new()),
            JsonValue::Object(_) => Ok(Self(value)),
            other => Err(CoreError::ValuesMerge {
                message: format!("values must be a mapping, got {}", kind_name(&other)),
            }),
        }
    }

    /// Top-level entries, if the values form a mapping
    pub fn as_object(&self) -> Option<&serde_json::Map<String, JsonValue>> {
        self.0.as_object()
    }

    /// Check if values are empty
    pub fn is_empty(&self) -> bool {
        match &self.0 {
            JsonValue::Object(map) => map.is_empty(),
            JsonValue::Null => true,
            _ => false,
        }
    }
}

fn kind_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "sequence",
        JsonValue::Object(_) => "mapping",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_yaml() {
        let values = Values::from_yaml("image:\n  tag: \"1.0\"\nreplicas: 1\n").unwrap();
        assert_eq!(values.0, json!({"image": {"tag": "1.0"}, "replicas": 1}));
        assert_eq!(values.as_object().map(|m| m.len()), Some(2));
        assert!(!values.is_empty());
    }

    #[test]
    fn test_empty_yaml_is_empty_values() {
        let values = Values::from_yaml("").unwrap();
        assert!(values.is_empty());
        assert!(Values::new().is_empty());
    }

    #[test]
    fn test_non_mapping_yaml_rejected() {
        let err = Values::from_yaml("- a\n- b\n").unwrap_err();
        assert!(matches!(err, CoreError::ValuesMerge { ref message } if message.ends_with("got sequence")));
    }

    #[test]
    fn test_from_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("values.yaml");
        std::fs::write(&path, "replicas: 3\n").unwrap();

        let values = Values::from_file(&path).unwrap();
        assert_eq!(values.0, json!({"replicas": 3}));
        assert!(Values::from_file(tmp.path().join("missing.yaml")).is_err());
    }
}
