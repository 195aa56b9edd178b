//! Error types for shalm-kube

use thiserror::Error;

/// Result type for shalm-kube operations
pub type Result<T> = std::result::Result<T, KubeError>;

/// Errors that can occur during cluster operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    /// Object does not exist in the cluster
    #[error("{kind} '{name}' not found")]
    NotFound { kind: String, name: String },

    /// Kind unknown to API discovery
    #[error("unknown resource type: {0}")]
    UnknownKind(String),

    /// A cluster operation was rejected
    #[error("{operation} failed: {message}")]
    OperationFailed { operation: String, message: String },

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid manifest
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Timeout
    #[error("operation timed out after {0}")]
    Timeout(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for KubeError {
    fn from(e: serde_json::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for KubeError {
    fn from(e: serde_yaml::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl KubeError {
    /// Check if the object targeted by the failed call is absent
    pub fn is_not_found(&self) -> bool {
        match self {
            KubeError::NotFound { .. } => true,
            KubeError::Api(kube::Error::Api(resp)) => resp.code == 404,
            _ => false,
        }
    }

    /// Check if this is a conflict error (409)
    pub fn is_conflict(&self) -> bool {
        matches!(self, KubeError::Api(kube::Error::Api(resp)) if resp.code == 409)
    }
}
