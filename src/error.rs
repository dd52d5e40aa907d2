//! Error types for controller construction, training and persistence.
//!
//! The numerical passes themselves never fail: shape violations there panic
//! and NaN/Inf values propagate untouched.

use thiserror::Error;

/// Errors surfaced by the fallible controller APIs
#[derive(Debug, Error)]
pub enum ControllerError {
    /// A configuration field is out of range.
    #[error("Invalid config field `{field}`: {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    /// A stored tensor does not match the shape implied by the shape parameters.
    #[error("Shape mismatch for {tensor}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        tensor: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// Input and target sequences passed to the trainer differ in length.
    #[error("Sequence length mismatch: {inputs} inputs but {targets} targets")]
    SequenceLength { inputs: usize, targets: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ControllerError>;

impl ControllerError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }
}
