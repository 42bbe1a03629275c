use rusqlite;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WardenError {
    #[error("SQLite error: {0}")]
    RusqliteError(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("Failed to parse {source_name}: {reason}")]
    ParseError { source_name: String, reason: String },
    #[error("Schema migration failed: {0}")]
    SchemaMigrationError(String),
    #[error("Storage lock timeout during {op} after {attempts} attempt(s)")]
    StorageLockTimeout { op: String, attempts: u32 },
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Not found: {0}")]
    NotFound(String),
}

impl WardenError {
    pub fn parse(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        WardenError::ParseError {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }

    /// Only lock contention is worth retrying from the caller's side.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WardenError::StorageLockTimeout { .. })
    }
}
