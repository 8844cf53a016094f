//! The failure reported by every clouddeck operation.
//!
//! Failures are data: they are returned and delivered in completion events,
//! never raised. Each carries the classified [`Outcome`], the machine-readable
//! code and a human-readable message.

use thiserror::Error;

use crate::normalize;
use crate::outcome::Outcome;

/// A result type using `Failure`.
pub type Result<T> = std::result::Result<T, Failure>;

/// Machine-readable codes produced locally (not by a provider).
pub mod codes {
    /// Both email and password are blank.
    pub const EMPTY_CREDENTIALS: &str = "EmptyCredentials";
    /// Email is blank.
    pub const EMPTY_EMAIL: &str = "EmptyEmail";
    /// Password is blank.
    pub const EMPTY_PASSWORD: &str = "EmptyPassword";
    /// Email lacks an `@` or a `.` after it.
    pub const INVALID_EMAIL: &str = "InvalidEmail";
    /// Access token is blank.
    pub const EMPTY_ACCESS_TOKEN: &str = "EmptyAccessToken";
    /// Machine id is blank.
    pub const EMPTY_MACHINE_ID: &str = "EmptyMachineId";
    /// Account id is blank.
    pub const EMPTY_ACCOUNT_ID: &str = "EmptyAccountId";
    /// Pairing PIN is blank.
    pub const EMPTY_PIN: &str = "EmptyPin";
    /// A call of the same category is already outstanding.
    pub const IN_PROGRESS: &str = "InProgress";
    /// The identity provider returned a challenge.
    pub const CHALLENGE_REQUIRED: &str = "ChallengeRequired";
    /// No response was received.
    pub const NETWORK_ERROR: &str = "NetworkError";
    /// The body was not a JSON object.
    pub const PARSE_ERROR: &str = "ParseError";
    /// The body was empty.
    pub const EMPTY_RESPONSE: &str = "EmptyResponse";
    /// Authentication result lacked an access token.
    pub const MISSING_ACCESS_TOKEN: &str = "MissingAccessToken";
    /// Machine record lacked a status.
    pub const MISSING_STATUS: &str = "MissingStatus";
    /// User attributes lacked the account attribute.
    pub const MISSING_ACCOUNT_ID: &str = "MissingAccountId";
    /// Account record lacked a machine id.
    pub const MISSING_MACHINE_ID: &str = "MissingMachineId";
    /// Nothing more specific is known.
    pub const UNKNOWN_ERROR: &str = "UnknownError";
}

/// A classified operation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct Failure {
    /// The canonical outcome for `code`.
    pub outcome: Outcome,
    /// Normalized machine-readable code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

impl Failure {
    /// Create a failure from a code and message.
    ///
    /// The code is normalized and classified. An empty message is replaced by
    /// the outcome's default message.
    #[must_use]
    pub fn new(code: impl AsRef<str>, message: impl Into<String>) -> Self {
        let code = normalize::normalize_code(code.as_ref());
        let outcome = normalize::classify(&code);
        let mut message = message.into();
        if message.is_empty() {
            message = outcome.default_message().to_string();
        }
        Self {
            outcome,
            code,
            message,
        }
    }

    /// A transport-level failure with no response body.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(codes::NETWORK_ERROR, message)
    }

    /// An HTTP error status with no usable error body.
    #[must_use]
    pub fn http(status: u16) -> Self {
        Self::new(normalize::http_code(status), format!("HTTP error {status}"))
    }

    /// A response body that could not be interpreted.
    #[must_use]
    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(codes::PARSE_ERROR, message)
    }

    /// A rejected call because another of the same kind is outstanding.
    #[must_use]
    pub fn in_progress(message: impl Into<String>) -> Self {
        Self::new(codes::IN_PROGRESS, message)
    }

    /// Fails with `code` when `value` is blank, otherwise returns it trimmed.
    ///
    /// # Errors
    ///
    /// Returns an `invalid-input` failure carrying `code` and `message`.
    pub fn require<'a>(value: &'a str, code: &str, message: &str) -> Result<&'a str> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            Err(Self::new(code, message))
        } else {
            Ok(trimmed)
        }
    }
}
