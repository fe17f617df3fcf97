//! Error types for docpulse-core

use thiserror::Error;

/// Main error type for the docpulse-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error for event-log files
    #[error("parse error in {source_file}: {message}")]
    Parse {
        source_file: String,
        message: String,
    },

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Link not found
    #[error("link not found: {0}")]
    LinkNotFound(String),

    /// Session not found
    #[error("session not found: {0}")]
    SessionNotFound(String),
}

/// Result type alias for docpulse-core
pub type Result<T> = std::result::Result<T, Error>;
