//! SDK error type.

use thiserror::Error;

/// Errors returned by the SDK.
#[derive(Debug, Error)]
pub enum SdkError {
    /// Transport failure or undecodable body.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with an error envelope.
    #[error("API error {status} ({code}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Machine-readable error code.
        code: String,
        /// Human-readable message.
        message: String,
    },

    /// Base URL could not be used.
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),
}

/// Result alias for SDK operations.
pub type Result<T> = std::result::Result<T, SdkError>;
