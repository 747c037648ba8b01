//! Error types for the workload driver.

use crate::measurement::OperationKind;
use thiserror::Error;

/// Errors that can occur while configuring or running a workload.
#[derive(Error, Debug)]
pub enum WorkloadError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The backend failed to bring the store to its initial state.
    #[error("Prepare failed: {0}")]
    Prepare(#[source] BackendError),

    /// A backend operation failed inside a workload loop.
    #[error("{kind} operation failed: {source}")]
    Backend {
        /// Loop the failure happened in.
        kind: OperationKind,
        /// Underlying backend error.
        #[source]
        source: BackendError,
    },

    /// `start` was called on a driver that already ran.
    #[error("Workload driver already started")]
    AlreadyStarted,

    /// `start` was called after the run was stopped or its parent token
    /// was cancelled.
    #[error("Workload driver cancelled before start")]
    Cancelled,

    /// A workload loop panicked.
    #[error("{kind} loop panicked: {message}")]
    LoopPanicked {
        /// Loop that panicked.
        kind: OperationKind,
        /// Panic payload, when it was a string.
        message: String,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML configuration error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// TOML configuration error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl WorkloadError {
    pub(crate) fn backend(kind: OperationKind, source: BackendError) -> Self {
        WorkloadError::Backend { kind, source }
    }
}

/// Error reported by a storage backend.
///
/// Backends convert their own error types into this one so the engine never
/// depends on backend specifics.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct BackendError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl BackendError {
    /// Create an error from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Create an error wrapping an underlying cause.
    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// The error message without its cause chain.
    pub fn message(&self) -> &str {
        &self.message
    }
}
