//! Error types for the PostgreSQL backend.

use thiserror::Error;
use workload_core::BackendError;

/// Errors that can occur while talking to PostgreSQL.
#[derive(Error, Debug)]
pub enum PostgreSQLWorkloadError {
    /// PostgreSQL connection or query error.
    #[error("PostgreSQL error: {0}")]
    PostgreSQL(#[from] tokio_postgres::Error),

    /// A database or table name that cannot be used as an identifier.
    #[error("Invalid identifier '{0}': {1}")]
    InvalidIdentifier(String, &'static str),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<PostgreSQLWorkloadError> for BackendError {
    fn from(e: PostgreSQLWorkloadError) -> Self {
        BackendError::with_source(e.to_string(), e)
    }
}
