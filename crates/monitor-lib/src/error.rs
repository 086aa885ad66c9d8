//! Error types for the detection core

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    /// Malformed observation, rejected at ingestion
    #[error("validation error: {0}")]
    Validation(String),

    /// Not enough history to assess; callers degrade to a zero score
    #[error("insufficient data for {what}: have {have} samples")]
    InsufficientData { what: &'static str, have: usize },

    /// Durable store could not be reached
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MonitorError {
    pub fn is_validation(&self) -> bool {
        matches!(self, MonitorError::Validation(_))
    }
}
