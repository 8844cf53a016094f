//! Provider error-body normalization.
//!
//! Providers report errors in several JSON shapes. Rather than deserializing
//! into a fixed type, the code and message are found by probing an ordered
//! list of field names on the parsed object. All functions here are pure and
//! total over their input.

use serde_json::{Map, Value};

use crate::failure::codes;
use crate::outcome::Outcome;

/// Field names that may carry an error code, in lookup order.
pub const CODE_FIELDS: [&str; 5] = ["__type", "code", "error", "Error", "errorCode"];

/// Field names that may carry an error message, in lookup order.
pub const MESSAGE_FIELDS: [&str; 3] = ["message", "Message", "error_description"];

fn first_string(body: &Map<String, Value>, fields: &[&str]) -> String {
    fields
        .iter()
        .find_map(|field| body.get(*field).and_then(Value::as_str))
        .unwrap_or_default()
        .to_string()
}

/// Returns the first string-valued error code found in `body`, or an empty string.
#[must_use]
pub fn extract_code(body: &Map<String, Value>) -> String {
    first_string(body, &CODE_FIELDS)
}

/// Returns the first string-valued error message found in `body`, or an empty string.
#[must_use]
pub fn extract_message(body: &Map<String, Value>) -> String {
    first_string(body, &MESSAGE_FIELDS)
}

/// Strips namespace prefixes from a raw provider code.
///
/// Everything up to and including the last `#` is removed, then everything up
/// to and including the last `/`, then surrounding whitespace. A separator in
/// the final position is left alone so a code is never reduced to nothing.
#[must_use]
pub fn normalize_code(raw: &str) -> String {
    let mut code = raw;
    for separator in ['#', '/'] {
        if let Some(index) = code.rfind(separator) {
            if index + 1 < code.len() {
                code = &code[index + 1..];
            }
        }
    }
    code.trim().to_string()
}

/// Maps a normalized code onto an [`Outcome`].
///
/// `Http<status>` maps to [`Outcome::HttpError`] carrying the status. Codes
/// not in the table map to [`Outcome::UnknownError`].
#[must_use]
pub fn classify(code: &str) -> Outcome {
    match code {
        codes::EMPTY_CREDENTIALS
        | codes::EMPTY_EMAIL
        | codes::EMPTY_PASSWORD
        | codes::INVALID_EMAIL
        | codes::EMPTY_ACCESS_TOKEN
        | codes::EMPTY_MACHINE_ID
        | codes::EMPTY_ACCOUNT_ID
        | codes::EMPTY_PIN => Outcome::InvalidInput,
        "NotAuthorizedException" => Outcome::NotAuthorized,
        "UserNotFoundException" => Outcome::UserNotFound,
        "UserNotConfirmedException" => Outcome::UserNotConfirmed,
        "PasswordResetRequiredException" => Outcome::PasswordResetRequired,
        "InvalidParameterException" => Outcome::InvalidParameter,
        "InvalidPasswordException" => Outcome::InvalidPassword,
        "TooManyRequestsException" => Outcome::TooManyRequests,
        "LimitExceededException" | "RequestLimitExceeded" => Outcome::LimitExceeded,
        "ResourceNotFoundException" => Outcome::ResourceNotFound,
        "InternalErrorException" | "InternalError" => Outcome::InternalError,
        codes::NETWORK_ERROR => Outcome::NetworkError,
        codes::PARSE_ERROR
        | codes::EMPTY_RESPONSE
        | codes::MISSING_ACCESS_TOKEN
        | codes::MISSING_STATUS
        | codes::MISSING_ACCOUNT_ID
        | codes::MISSING_MACHINE_ID => Outcome::ParseError,
        codes::IN_PROGRESS => Outcome::InProgress,
        codes::CHALLENGE_REQUIRED => Outcome::ChallengeRequired,
        other => other
            .strip_prefix("Http")
            .and_then(|status| status.parse::<u16>().ok())
            .map_or(Outcome::UnknownError, Outcome::HttpError),
    }
}

/// Returns the `Http<status>` code for an HTTP status.
#[must_use]
pub fn http_code(status: u16) -> String {
    format!("Http{status}")
}
