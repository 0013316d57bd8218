//! Error types for `Conductor` core library.

use thiserror::Error;

/// Result type alias using `Conductor` Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for `Conductor` operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Delta line could not be interpreted
    #[error("Failed to parse delta: {0}")]
    DeltaParse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
