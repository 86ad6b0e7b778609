//! Shared error types.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CommonError>;

#[derive(Debug, Error)]
pub enum CommonError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}
