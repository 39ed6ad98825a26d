//! Error types for tabula

use thiserror::Error;

/// Core error type for tabula operations
#[derive(Error, Debug)]
pub enum TabulaError {
    /// Invalid filter, invalid input value, malformed request
    #[error("Validation error: {0}")]
    Validation(String),

    /// A grant check failed before any write was attempted
    #[error("Permission denied: {0}")]
    Permission(String),

    /// DDL rejected by the engine, or metadata could not be read
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Duplicate primary key, unresolvable foreign key value
    #[error("Data integrity error: {0}")]
    DataIntegrity(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Connection error: {0}")]
    Connection(String),

    /// Export output did not materialize. Callers must stop instead of
    /// handing out a partial file.
    #[error("Export failed: {0}")]
    Export(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl TabulaError {
    pub fn is_validation(&self) -> bool {
        matches!(self, TabulaError::Validation(_))
    }

    pub fn is_permission(&self) -> bool {
        matches!(self, TabulaError::Permission(_))
    }

    /// Schema errors include lookups of tables that do not exist
    pub fn is_schema(&self) -> bool {
        matches!(self, TabulaError::Schema(_) | TabulaError::NotFound(_))
    }

    pub fn is_data_integrity(&self) -> bool {
        matches!(self, TabulaError::DataIntegrity(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, TabulaError::NotFound(_))
    }
}

/// Result type alias for tabula operations
pub type Result<T> = std::result::Result<T, TabulaError>;
