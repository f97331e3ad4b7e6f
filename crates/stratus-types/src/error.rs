//! Error types for data parsing in stratus-types.

use thiserror::Error;

/// Errors that can occur when parsing or validating domain values.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// Unknown forecast granularity label.
    #[error("Unknown granularity: {0}")]
    UnknownGranularity(String),

    /// Unknown location sort key.
    #[error(
        "Invalid sort_by parameter '{0}', only allow created_at_ascend, created_at_descend, name_ascend, name_descend"
    )]
    UnknownSort(String),

    /// A required field was empty or malformed.
    #[error("Invalid {field} parameter: {message}")]
    InvalidField {
        field: &'static str,
        message: String,
    },
}

/// Result type alias using stratus-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
