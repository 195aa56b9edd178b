//! Secret vault
//!
//! A vault maps a named byte-map onto exactly one `Opaque` secret in a
//! fixed namespace. It holds no state of its own; every call is a single
//! cluster get, apply or delete.

use async_trait::async_trait;
use k8s_openapi::ByteString;
use kube::api::DynamicObject;
use kube::core::{ObjectMeta, TypeMeta};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{KubeError, Result};
use crate::k8s::{K8s, K8sOptions};

/// Secret payload: field key to raw bytes
pub type SecretData = BTreeMap<String, Vec<u8>>;

/// Storage for managed secret payloads
#[async_trait]
pub trait Vault: Send + Sync {
    /// Create or replace the secret `name`
    async fn write(&self, name: &str, data: &SecretData) -> Result<()>;

    /// Read the secret `name`
    async fn read(&self, name: &str) -> Result<SecretData>;

    /// Remove the secret `name`; an absent secret is not an error
    async fn delete(&self, name: &str) -> Result<()>;

    /// Check whether an error means the secret does not exist
    fn is_not_exist(&self, err: &KubeError) -> bool;
}

/// Vault backed by cluster secrets
#[derive(Clone)]
pub struct K8sVault {
    k8s: Arc<dyn K8s>,
    namespace: String,
}

impl K8sVault {
    pub fn new(k8s: Arc<dyn K8s>, namespace: impl Into<String>) -> Self {
        Self {
            k8s,
            namespace: namespace.into(),
        }
    }

    /// Namespace holding the secrets
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn options(&self) -> K8sOptions {
        K8sOptions::in_namespace(&self.namespace)
    }

    fn secret(&self, name: &str, data: &SecretData) -> Result<DynamicObject> {
        let encoded: BTreeMap<&str, ByteString> = data
            .iter()
            .map(|(k, v)| (k.as_str(), ByteString(v.clone())))
            .collect();

        Ok(DynamicObject {
            types: Some(TypeMeta {
                api_version: "v1".to_string(),
                kind: "Secret".to_string(),
            }),
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(self.namespace.clone()),
                ..Default::default()
            },
            data: serde_json::json!({
                "type": "Opaque",
                "data": serde_json::to_value(encoded)?,
            }),
        })
    }
}

#[async_trait]
impl Vault for K8sVault {
    async fn write(&self, name: &str, data: &SecretData) -> Result<()> {
        tracing::debug!(secret = %name, namespace = %self.namespace, keys = data.len(), "writing secret");
        let secret = self.secret(name, data)?;
        self.k8s.apply(vec![secret], &self.options()).await
    }

    async fn read(&self, name: &str) -> Result<SecretData> {
        let obj = self.k8s.get("secret", name, &self.options()).await?;
        let encoded: BTreeMap<String, ByteString> = match obj.data.get("data") {
            Some(value) if !value.is_null() => serde_json::from_value(value.clone())?,
            _ => BTreeMap::new(),
        };
        tracing::debug!(secret = %name, namespace = %self.namespace, keys = encoded.len(), "read secret");
        Ok(encoded.into_iter().map(|(k, v)| (k, v.0)).collect())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        tracing::debug!(secret = %name, namespace = %self.namespace, "deleting secret");
        let secret = self.secret(name, &SecretData::new())?;
        let options = K8sOptions {
            ignore_not_found: true,
            ..self.options()
        };
        match self.k8s.delete(vec![secret], &options).await {
            Err(e) if self.k8s.is_not_exist(&e) => Ok(()),
            other => other,
        }
    }

    fn is_not_exist(&self, err: &KubeError) -> bool {
        self.k8s.is_not_exist(err)
    }
}
