//! Store error types.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Store transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("CSV parse error: {0}")]
    Csv(#[from] csv::Error),
}

impl StoreError {
    /// Transient failures are worth retrying; everything else is not.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transport(_))
    }
}
