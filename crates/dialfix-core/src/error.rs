//! Error types for dialfix-core

use thiserror::Error;

use crate::gateway::GatewayError;

/// Result type alias using dialfix-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in dialfix-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Remote directory error
    #[error("Remote contact error: {0}")]
    Gateway(#[from] GatewayError),
}
