//! Error types for setting up the controller.
//!
//! Operation failures are delivered as [`clouddeck_core::Failure`] values in
//! controller events. `ControlError` covers what can go wrong before any
//! operation runs.

use thiserror::Error;

/// A result type using `ControlError`.
pub type Result<T> = std::result::Result<T, ControlError>;

/// Errors that can occur while building the controller.
#[derive(Debug, Error)]
pub enum ControlError {
    /// The configuration is unusable.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    /// Storage layer error.
    #[error("storage error: {0}")]
    Store(#[from] clouddeck_store::StoreError),

    /// Authentication setup error.
    #[error("authentication error: {0}")]
    Auth(#[from] clouddeck_auth::AuthError),
}

impl From<reqwest::Error> for ControlError {
    fn from(err: reqwest::Error) -> Self {
        Self::HttpClient(err.to_string())
    }
}
