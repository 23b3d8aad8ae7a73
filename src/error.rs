//! Error types for the ocuguard engine

use thiserror::Error;

/// Errors that can occur in the decision pipeline
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Invalid model definition: {0}")]
    InvalidModel(String),

    #[error("Scaler unavailable: {0}")]
    ScalerUnavailable(String),

    #[error("Feature dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Session store error: {0}")]
    StoreError(String),
}
