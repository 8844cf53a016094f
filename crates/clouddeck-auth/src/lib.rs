//! Identity-provider authentication for clouddeck.
//!
//! This crate turns an email and password into an access token:
//!
//! - [`IdentityProvider`]: the two provider calls used (password
//!   authentication and describe-current-user), implemented over HTTP by
//!   [`CognitoClient`]
//! - [`AuthSession`]: credential validation, single-flight login, and the
//!   resulting [`TokenSet`] with its expiry bookkeeping
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌──────────────────┐
//! │   Controller     │────▶│   AuthSession    │──────▶ CredentialStore
//! └──────────────────┘     └────────┬─────────┘        (on success)
//!                                   │
//!                          ┌────────▼─────────┐
//!                          │ IdentityProvider │
//!                          │ (trait)          │
//!                          └────────┬─────────┘
//!                                   │ HTTPS
//!                          ┌────────▼─────────┐
//!                          │  CognitoClient   │
//!                          └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use clouddeck_auth::{AuthConfig, AuthSession, CognitoClient, LoginOutcome};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let provider = Arc::new(CognitoClient::new(AuthConfig::from_env())?);
//! let session = AuthSession::new(provider);
//!
//! match session.login("user@example.com", "secret").await? {
//!     LoginOutcome::Authenticated(tokens) => {
//!         println!("token valid for {}s", tokens.seconds_remaining());
//!     }
//!     LoginOutcome::Challenge(challenge) => {
//!         println!("provider wants {}", challenge.name);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

use std::time::Duration;

use serde::Deserialize;

pub mod client;
pub mod error;
pub mod session;
pub mod token;

pub use client::{
    AuthChallenge, AuthResponse, AuthenticationResult, CognitoClient, IdentityProvider,
    UserAttribute,
};
pub use error::{AuthError, Result};
pub use session::{AuthSession, LoginOutcome};
pub use token::TokenSet;

#[cfg(any(test, feature = "test-utils"))]
pub use client::MockIdentityProvider;

/// Configuration for the identity provider.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Identity provider endpoint that receives every call.
    #[serde(default = "AuthConfig::default_identity_endpoint")]
    pub identity_endpoint: String,

    /// Application client id registered with the provider.
    #[serde(default = "AuthConfig::default_client_id")]
    pub client_id: String,

    /// Value of the `X-Amz-User-Agent` header sent when describing the user.
    #[serde(default = "AuthConfig::default_user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds.
    #[serde(default = "AuthConfig::default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl AuthConfig {
    fn default_identity_endpoint() -> String {
        "https://cognito-idp.eu-central-1.amazonaws.com/".to_string()
    }

    fn default_client_id() -> String {
        "2e7an7pt3vqdae0abgskfs38k8".to_string()
    }

    fn default_user_agent() -> String {
        "aws-amplify/5.0.4 auth framework/3".to_string()
    }

    const fn default_request_timeout() -> u64 {
        30
    }

    /// Load configuration from environment variables.
    ///
    /// Supported environment variables:
    /// - `CLOUDDECK_IDENTITY_ENDPOINT`: identity provider endpoint
    /// - `CLOUDDECK_CLIENT_ID`: application client id
    /// - `CLOUDDECK_REQUEST_TIMEOUT_SECONDS`: request timeout
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("CLOUDDECK_IDENTITY_ENDPOINT") {
            config.identity_endpoint = val;
        }
        if let Ok(val) = std::env::var("CLOUDDECK_CLIENT_ID") {
            config.client_id = val;
        }
        if let Ok(val) = std::env::var("CLOUDDECK_REQUEST_TIMEOUT_SECONDS") {
            if let Ok(n) = val.parse() {
                config.request_timeout_seconds = n;
            }
        }

        config
    }

    /// Create a configuration pointing at a different endpoint.
    #[must_use]
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            identity_endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    /// Get the request timeout as a `Duration`.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Check that the configuration can be used.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Config` if the endpoint or client id is blank.
    pub fn validate(&self) -> Result<()> {
        if self.identity_endpoint.trim().is_empty() {
            return Err(AuthError::Config("identity endpoint is empty".to_string()));
        }
        if self.client_id.trim().is_empty() {
            return Err(AuthError::Config("client id is empty".to_string()));
        }
        Ok(())
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            identity_endpoint: Self::default_identity_endpoint(),
            client_id: Self::default_client_id(),
            user_agent: Self::default_user_agent(),
            request_timeout_seconds: Self::default_request_timeout(),
        }
    }
}
