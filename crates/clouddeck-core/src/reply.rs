//! Buffered HTTP replies and their interpretation.
//!
//! Every provider call goes through the same steps: send, buffer the body,
//! then decide between "no response", "empty body", "not JSON" and a JSON
//! object that is either the expected shape or an error body. The first three
//! are handled here; shape checks belong to the caller.

use serde_json::{Map, Value};

use crate::failure::{codes, Failure, Result};
use crate::normalize;

/// A parsed JSON object body.
pub type JsonObject = Map<String, Value>;

/// A fully buffered HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    /// HTTP status code.
    pub status: u16,
    /// Raw response body.
    pub body: Vec<u8>,
}

impl HttpReply {
    /// Create a reply from a status and body.
    #[must_use]
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Send `request` and buffer the whole response.
    ///
    /// # Errors
    ///
    /// Returns a `network-error` failure if no response arrives or the body
    /// cannot be read.
    pub async fn send(request: reqwest::RequestBuilder) -> Result<Self> {
        let response = request
            .send()
            .await
            .map_err(|e| Failure::network(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| Failure::network(e.to_string()))?;
        tracing::debug!(status, bytes = body.len(), "Received reply");
        Ok(Self::new(status, body.to_vec()))
    }

    /// Returns `true` if the status is 400 or above.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.status >= 400
    }

    /// Returns `true` if the body is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Parse the body as a JSON object.
    ///
    /// # Errors
    ///
    /// - empty body with an error status: `Http<status>`
    /// - empty body otherwise: `EmptyResponse`
    /// - invalid JSON or a non-object: `ParseError` with the parser's message
    pub fn json_object(&self) -> Result<JsonObject> {
        if self.is_empty() {
            return Err(if self.is_error() {
                Failure::http(self.status)
            } else {
                Failure::new(codes::EMPTY_RESPONSE, "Empty response from server")
            });
        }
        match serde_json::from_slice::<Value>(&self.body) {
            Ok(Value::Object(object)) => Ok(object),
            Ok(_) => Err(Failure::parse("Invalid JSON response")),
            Err(e) => Err(Failure::parse(e.to_string())),
        }
    }

    /// Build a failure from an error body, falling back to the HTTP status.
    ///
    /// Returns `None` when the body carries no code and the status is not an
    /// error, leaving the fallback to the caller.
    #[must_use]
    pub fn body_failure(&self, body: &JsonObject) -> Option<Failure> {
        let mut code = normalize::normalize_code(&normalize::extract_code(body));
        let mut message = normalize::extract_message(body);
        if self.is_error() {
            if code.is_empty() {
                code = normalize::http_code(self.status);
            }
            if message.is_empty() {
                message = format!("HTTP error {}", self.status);
            }
        }
        if code.is_empty() {
            None
        } else {
            Some(Failure::new(code, message))
        }
    }

    /// Build a failure for an error reply whose body may or may not be usable.
    #[must_use]
    pub fn error_failure(&self) -> Failure {
        self.json_object()
            .ok()
            .and_then(|body| self.body_failure(&body))
            .unwrap_or_else(|| {
                if self.is_error() {
                    Failure::http(self.status)
                } else {
                    Failure::new(codes::UNKNOWN_ERROR, "")
                }
            })
    }
}
