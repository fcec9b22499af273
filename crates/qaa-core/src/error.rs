//! Error types for qaa licensing.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // License errors
    #[error("Invalid format: {0}")]
    Format(String),

    #[error("Signature verification failed")]
    Signature,

    #[error("License expired")]
    Expired,

    #[error("License not entitled")]
    NotEntitled,

    // Registry errors
    #[error("Registry integrity check failed: {0}")]
    RegistryIntegrity(String),

    #[error("Network error: {0}")]
    Network(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Infrastructure errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
