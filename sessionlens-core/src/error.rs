//! Error types for sessionlens-core

use thiserror::Error;

/// Main error type for the sessionlens-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Session not found
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// A pipeline run is already active for this session
    #[error("analysis already in progress for session {0}")]
    AnalysisInProgress(String),

    /// Session is not in a state that permits this operation
    #[error("session {session} is {status}; {operation} is not allowed")]
    InvalidStatus {
        session: String,
        status: String,
        operation: &'static str,
    },

    /// An extraction pass failed (captured per-pass, never fatal on its own)
    #[error("extraction pass {pass} failed: {message}")]
    Pass { pass: String, message: String },
}

/// Result type alias for sessionlens-core
pub type Result<T> = std::result::Result<T, Error>;
