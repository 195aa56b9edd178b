//! Decoding rendered manifest streams into cluster objects

use kube::api::DynamicObject;
use serde::Deserialize;

use crate::error::{KubeError, Result};

/// Decode a multi-document YAML stream
///
/// Empty and comment-only documents are skipped. Every remaining document
/// must carry `apiVersion` and `kind`.
pub fn parse_manifests(stream: &str) -> Result<Vec<DynamicObject>> {
    let mut objects = Vec::new();
    if stream.trim().is_empty() {
        return Ok(objects);
    }

    for (index, document) in serde_yaml::Deserializer::from_str(stream).enumerate() {
        let value = serde_json::Value::deserialize(document).map_err(|e| {
            KubeError::InvalidManifest(format!("document {}: {}", index, e))
        })?;
        if value.is_null() {
            continue;
        }

        let obj: DynamicObject = serde_json::from_value(value).map_err(|e| {
            KubeError::InvalidManifest(format!("document {}: {}", index, e))
        })?;
        if obj.types.is_none() {
            return Err(KubeError::InvalidManifest(format!(
                "document {}: missing apiVersion or kind",
                index
            )));
        }
        objects.push(obj);
    }

    Ok(objects)
}

/// Short `Kind/name` reference for logs and operation records
pub fn object_ref(obj: &DynamicObject) -> String {
    let kind = obj.types.as_ref().map(|t| t.kind.as_str()).unwrap_or("Unknown");
    let name = obj.metadata.name.as_deref().unwrap_or("unnamed");
    format!("{}/{}", kind, name)
}
