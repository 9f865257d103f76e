//! Error types for the store crate

use thiserror::Error;

/// Errors that can occur during store operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record does not exist
    #[error("{0}")]
    NotFound(String),
}

/// Result type for store operations
pub type Result<T> = std::result::Result<T, Error>;
