//! Cluster client contract
//!
//! Charts never talk to the API server directly. Every read, apply and
//! delete goes through a [`K8s`] implementation so that the same apply and
//! delete cascades run against a live cluster ([`crate::KubeClient`]) or an
//! in-memory recorder ([`crate::MockK8s`]).

use async_trait::async_trait;
use kube::api::DynamicObject;
use serde::Deserialize;
use std::time::Duration;

use crate::error::{KubeError, Result};

/// Per-call options for cluster operations
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct K8sOptions {
    /// Force every object into `namespace`, overriding its own namespace
    pub namespaced: bool,

    /// Target namespace; falls back to the client's default when unset
    pub namespace: Option<String>,

    /// Treat absent objects as already deleted
    pub ignore_not_found: bool,

    /// Upper bound for the whole call, in seconds
    pub timeout: Option<u64>,

    /// Suppress progress output
    pub quiet: bool,
}

impl K8sOptions {
    /// Options targeting a single namespace
    pub fn in_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespaced: true,
            namespace: Some(namespace.into()),
            ..Default::default()
        }
    }

    /// Timeout as a duration
    pub fn timeout_duration(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs)
    }

    /// Namespace an object ends up in
    ///
    /// With `namespaced` set, the options' namespace wins over the object's
    /// own. Otherwise the object's namespace is kept and `default` only fills
    /// in when it has none.
    pub fn effective_namespace(&self, object: &DynamicObject, default: &str) -> String {
        if self.namespaced
            && let Some(ns) = &self.namespace
        {
            return ns.clone();
        }
        object
            .metadata
            .namespace
            .clone()
            .or_else(|| self.namespace.clone())
            .unwrap_or_else(|| default.to_string())
    }
}

/// Cluster client used by chart apply/delete and the vault
#[async_trait]
pub trait K8s: Send + Sync {
    /// Fetch a single object by kind and name
    async fn get(&self, kind: &str, name: &str, options: &K8sOptions) -> Result<DynamicObject>;

    /// Create or update objects
    async fn apply(&self, objects: Vec<DynamicObject>, options: &K8sOptions) -> Result<()>;

    /// Remove objects
    async fn delete(&self, objects: Vec<DynamicObject>, options: &K8sOptions) -> Result<()>;

    /// Report overall progress in percent
    fn progress(&self, percent: u8);

    /// Check whether an error means the object is absent
    fn is_not_exist(&self, err: &KubeError) -> bool {
        err.is_not_found()
    }
}
