//! Error types for the Grafana client

use thiserror::Error;

/// Result type alias using the client Error
pub type Result<T> = std::result::Result<T, Error>;

/// Grafana client error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("{kind} {id} not found")]
    NotFound { kind: String, id: String },

    #[error("status: {status}, message: {message}")]
    Api { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Error::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// True when the remote object does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}
