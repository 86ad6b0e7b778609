//! Engine error types.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Trial failed structural validation; the trial is skipped, the run
    /// proceeds.
    #[error("Invalid trial: {0}")]
    InvalidTrial(String),

    /// Malformed leaf criterion. Non-fatal: the leaf evaluates to the
    /// empty set and a warning is logged.
    #[error("Invalid criterion: {0}")]
    InvalidCriterion(String),

    /// Store failure surviving the retry policy; aborts the run.
    #[error("Store error: {0}")]
    Store(#[from] oncomatch_store::StoreError),

    /// Annotation service failure; the run degrades to general matching.
    #[error("Annotation service error: {0}")]
    Annotation(String),

    #[error("Tumor tree error: {0}")]
    TumorTree(String),

    #[error("Run cancelled")]
    Cancelled,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
