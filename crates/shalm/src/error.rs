//! Error types for the chart runtime

use thiserror::Error;

/// Result type for chart runtime operations
pub type Result<T> = std::result::Result<T, ShalmError>;

/// Errors raised while evaluating, applying or deleting charts
#[derive(Debug, Error)]
pub enum ShalmError {
    /// Unknown attribute on a chart or jewel
    #[error("{owner} has no .{attr} attribute")]
    NoSuchAttr { owner: String, attr: String },

    /// Hashing a value that has no hash
    #[error("unhashable type: {0}")]
    Unhashable(String),

    /// Hook missing from a chart's method table
    #[error("chart '{chart}' has no method '{method}'")]
    MissingMethod { chart: String, method: String },

    /// Bad arguments passed to a callable
    #[error("{function}: {message}")]
    InvalidArgument { function: String, message: String },

    /// Secret backend failure
    #[error("{backend}: {message}")]
    Backend { backend: String, message: String },

    /// A built-in hook outlived the chart it belongs to
    #[error("hook '{0}' called after its chart was dropped")]
    ChartDropped(String),

    /// Chart package error
    #[error(transparent)]
    Core(#[from] shalm_core::CoreError),

    /// Template rendering error
    #[error(transparent)]
    Engine(#[from] shalm_engine::EngineError),

    /// Cluster error
    #[error(transparent)]
    Kube(#[from] shalm_kube::KubeError),
}

impl ShalmError {
    /// Check if this wraps a cluster not-found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, ShalmError::Kube(e) if e.is_not_found())
    }

    pub(crate) fn invalid_argument(function: &str, message: impl Into<String>) -> Self {
        ShalmError::InvalidArgument {
            function: function.to_string(),
            message: message.into(),
        }
    }
}
