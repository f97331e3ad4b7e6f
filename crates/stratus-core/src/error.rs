//! Error types for stratus-core.
//!
//! # Retry classification
//!
//! | Error Type | Retried | Rationale |
//! |------------|---------|-----------|
//! | [`Error::Status`] | yes | Provider hiccup, rate limit or gateway error |
//! | [`Error::Request`] | yes | Connection reset, DNS, timeout |
//! | [`Error::Decode`] | yes | Truncated or garbled body |
//! | [`Error::Cancelled`] | no | Caller asked to stop |
//! | [`Error::InvalidConfig`] | no | Fix configuration and restart |
//! | [`Error::Fetch`] | no | Already the final, wrapped outcome of a retried fetch |
//! | [`Error::BackoffExhausted`] | no | Retry loop finished without recording an error |

use thiserror::Error;

/// Result type alias for stratus-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to the forecast provider.
#[derive(Debug, Error)]
pub enum Error {
    /// The provider answered with a non-2xx status.
    #[error("weather api returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// The HTTP request itself failed.
    #[error("failed to request weather api: {0}")]
    Request(#[from] reqwest::Error),

    /// The response body was not a valid forecast payload.
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The operation was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// The retry loop ended without recording an error.
    #[error("unknown backoff failure")]
    BackoffExhausted,

    /// Fetching the forecast for a location failed after all retries.
    #[error("failed to fetch forecast for {location}: {source}")]
    Fetch {
        location: String,
        #[source]
        source: Box<Error>,
    },

    /// Invalid client configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Whether a retry loop should try the operation again after this error.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Status { .. } | Error::Request(_) | Error::Decode(_)
        )
    }

    /// Whether this error (or the error it wraps) is a cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        match self {
            Error::Cancelled => true,
            Error::Fetch { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }
}
