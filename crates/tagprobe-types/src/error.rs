//! Error types for data parsing in tagprobe-types.

use thiserror::Error;

/// Errors that can occur when parsing peripheral data or state names.
///
/// This error type is platform-agnostic and does not include
/// BLE-specific errors (those belong in tagprobe-core).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// Not enough bytes to decode a value.
    #[error("Insufficient bytes: expected {expected}, got {actual}")]
    InsufficientBytes {
        /// Minimum number of bytes required.
        expected: usize,
        /// Number of bytes received.
        actual: usize,
    },

    /// A state name did not match any known variant.
    #[error("Unknown state: {0}")]
    UnknownState(String),
}

/// Result type alias using tagprobe-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
