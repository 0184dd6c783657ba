//! Error types for the price reporter

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReporterError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Quote error: {0}")]
    Quote(String),

    #[error("Invalid price: {0:?}")]
    InvalidPrice(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Signing error: {0}")]
    Signing(String),

    #[error("Keystore error: {path}: {reason}")]
    Keystore { path: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<config::ConfigError> for ReporterError {
    fn from(err: config::ConfigError) -> Self {
        ReporterError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ReporterError>;
