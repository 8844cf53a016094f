//! Canonical operation outcomes.
//!
//! Every completed operation is tagged with exactly one [`Outcome`]. Provider
//! error codes are mapped onto this closed set by [`crate::normalize::classify`].

use std::fmt;

/// Application-level result of a completed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// The operation completed successfully.
    Success,
    /// Local validation rejected the input before any network call.
    InvalidInput,
    /// Another call of the same category is already outstanding.
    InProgress,
    /// The identity provider demands an interactive challenge.
    ChallengeRequired,
    /// Credentials were rejected.
    NotAuthorized,
    /// The user does not exist.
    UserNotFound,
    /// The user has not confirmed their account.
    UserNotConfirmed,
    /// The user must reset their password before logging in.
    PasswordResetRequired,
    /// A request parameter was rejected by the provider.
    InvalidParameter,
    /// The password does not satisfy the provider's policy.
    InvalidPassword,
    /// The provider is throttling requests.
    TooManyRequests,
    /// A provider quota was exceeded.
    LimitExceeded,
    /// The addressed resource does not exist.
    ResourceNotFound,
    /// The provider reported an internal failure.
    InternalError,
    /// The request never produced a response.
    NetworkError,
    /// The server answered with an HTTP error status and no usable error body.
    HttpError(u16),
    /// The response body could not be interpreted.
    ParseError,
    /// Anything not covered above.
    UnknownError,
}

impl Outcome {
    /// Returns the kebab-case name of this outcome.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::InvalidInput => "invalid-input",
            Self::InProgress => "in-progress",
            Self::ChallengeRequired => "challenge-required",
            Self::NotAuthorized => "not-authorized",
            Self::UserNotFound => "user-not-found",
            Self::UserNotConfirmed => "user-not-confirmed",
            Self::PasswordResetRequired => "password-reset-required",
            Self::InvalidParameter => "invalid-parameter",
            Self::InvalidPassword => "invalid-password",
            Self::TooManyRequests => "too-many-requests",
            Self::LimitExceeded => "limit-exceeded",
            Self::ResourceNotFound => "resource-not-found",
            Self::InternalError => "internal-error",
            Self::NetworkError => "network-error",
            Self::HttpError(_) => "http-error",
            Self::ParseError => "parse-error",
            Self::UnknownError => "unknown-error",
        }
    }

    /// Human-readable message used when the provider supplies none.
    #[must_use]
    pub const fn default_message(&self) -> &'static str {
        match self {
            Self::Success => "",
            Self::InvalidInput => "Invalid input",
            Self::InProgress => "Operation already in progress",
            Self::ChallengeRequired => "Additional authentication required",
            Self::NotAuthorized => "Incorrect username or password",
            Self::UserNotFound => "User not found",
            Self::UserNotConfirmed => "User not confirmed",
            Self::PasswordResetRequired => "Password reset required",
            Self::InvalidParameter => "Invalid parameters",
            Self::InvalidPassword => "Invalid password",
            Self::TooManyRequests => "Too many requests",
            Self::LimitExceeded => "Request limit exceeded",
            Self::ResourceNotFound => "Resource not found",
            Self::InternalError => "Internal server error",
            Self::NetworkError => "Network error",
            Self::HttpError(_) => "HTTP error",
            Self::ParseError => "Invalid response from server",
            Self::UnknownError => "Unknown error",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HttpError(status) => write!(f, "http-error({status})"),
            other => f.write_str(other.as_str()),
        }
    }
}
