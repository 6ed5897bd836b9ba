//! Error types for the core crate.

use thiserror::Error;

/// Core error type.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CoreError {
    /// Unknown vault classification string.
    #[error("Unknown vault classification: {0}")]
    UnknownClassification(String),

    /// Unknown transaction purpose label.
    #[error("Unknown transaction purpose label: {0}")]
    UnknownPurpose(String),

    /// Invalid numeric value (decimal or 0x-hex U256).
    #[error("Invalid numeric value: {0}")]
    InvalidNumber(String),

    /// Byte slice of the wrong length for a fixed-size type.
    #[error("Invalid byte length for {kind}: expected {expected}, got {actual}")]
    InvalidLength {
        /// Name of the target type.
        kind: &'static str,
        /// Expected length in bytes.
        expected: usize,
        /// Actual length in bytes.
        actual: usize,
    },
}

/// Result type alias for CoreError.
pub type Result<T> = std::result::Result<T, CoreError>;
