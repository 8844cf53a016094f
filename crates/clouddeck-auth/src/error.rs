//! Authentication setup error types.
//!
//! Failures of a login itself are reported as [`clouddeck_core::Failure`]
//! values. `AuthError` only covers building the client.

use thiserror::Error;

/// A result type using `AuthError`.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Errors that can occur while setting up authentication.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The configuration is unusable.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    HttpClient(String),
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        Self::HttpClient(err.to_string())
    }
}
