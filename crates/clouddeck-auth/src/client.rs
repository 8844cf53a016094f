//! Identity provider client for password login and user lookup.
//!
//! Both calls go to the same endpoint and are distinguished by the
//! `X-Amz-Target` header. Replies are buffered into an [`HttpReply`] and then
//! interpreted by pure functions, so the decoding rules can be tested against
//! literal bodies.

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use serde_json::Value;

use clouddeck_core::{codes, Failure, HttpReply, JsonObject, Result};

use crate::error::AuthError;
use crate::AuthConfig;

const AMZ_JSON: &str = "application/x-amz-json-1.1";
const TARGET_INITIATE_AUTH: &str = "AWSCognitoIdentityProviderService.InitiateAuth";
const TARGET_GET_USER: &str = "AWSCognitoIdentityProviderService.GetUser";
const USER_AGENT_HEADER: &str = "X-Amz-User-Agent";

/// Tokens returned by a completed password authentication.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthenticationResult {
    /// Bearer token for API calls. Never empty.
    pub access_token: String,
    /// OpenID identity token.
    pub id_token: String,
    /// Token for obtaining new access tokens.
    pub refresh_token: String,
    /// Token type, normally `Bearer`.
    pub token_type: String,
    /// Lifetime of the access token in seconds. Zero when absent.
    pub expires_in: i64,
}

impl std::fmt::Debug for AuthenticationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticationResult")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .finish_non_exhaustive()
    }
}

/// An interactive step the provider demands before issuing tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChallenge {
    /// Opaque challenge name (e.g. `SOFTWARE_TOKEN_MFA`).
    pub name: String,
    /// Challenge parameters as strings.
    pub parameters: BTreeMap<String, String>,
}

/// A successful reply to a password authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthResponse {
    /// The user is fully authenticated.
    Authenticated(AuthenticationResult),
    /// The provider wants a challenge answered first.
    Challenge(AuthChallenge),
}

/// One entry of the describe-current-user attribute list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAttribute {
    /// Attribute name, e.g. `custom:account`.
    pub name: String,
    /// Attribute value. Empty when the provider sent none.
    pub value: String,
}

/// Trait for the identity provider calls used by clouddeck.
///
/// This trait abstracts the provider interface, allowing for mock
/// implementations in tests.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Authenticate with an email and password.
    ///
    /// # Errors
    ///
    /// Returns a classified [`Failure`] for transport errors, unreadable
    /// bodies and provider error bodies.
    async fn initiate_auth(&self, email: &str, password: &str) -> Result<AuthResponse>;

    /// Describe the user owning `access_token`.
    ///
    /// # Errors
    ///
    /// Returns a classified [`Failure`] for transport errors, unreadable
    /// bodies and provider error bodies.
    async fn get_user(&self, access_token: &str) -> Result<Vec<UserAttribute>>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct InitiateAuthRequest<'a> {
    auth_flow: &'a str,
    client_id: &'a str,
    auth_parameters: AuthParameters<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "UPPERCASE")]
struct AuthParameters<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct GetUserRequest<'a> {
    access_token: &'a str,
}

/// HTTP client for the Cognito identity provider.
#[derive(Debug, Clone)]
pub struct CognitoClient {
    config: AuthConfig,
    client: reqwest::Client,
}

impl CognitoClient {
    /// Create a new client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be built.
    pub fn new(config: AuthConfig) -> std::result::Result<Self, AuthError> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self { config, client })
    }

    fn request(&self, target: &str) -> reqwest::RequestBuilder {
        self.client
            .post(&self.config.identity_endpoint)
            .header(CONTENT_TYPE, AMZ_JSON)
            .header("X-Amz-Target", target)
    }
}

#[async_trait]
impl IdentityProvider for CognitoClient {
    async fn initiate_auth(&self, email: &str, password: &str) -> Result<AuthResponse> {
        let body = InitiateAuthRequest {
            auth_flow: "USER_PASSWORD_AUTH",
            client_id: &self.config.client_id,
            auth_parameters: AuthParameters {
                username: email,
                password,
            },
        };

        tracing::debug!("Sending password authentication");
        let reply = HttpReply::send(self.request(TARGET_INITIATE_AUTH).json(&body)).await?;
        interpret_login_reply(&reply)
    }

    async fn get_user(&self, access_token: &str) -> Result<Vec<UserAttribute>> {
        let body = GetUserRequest { access_token };

        tracing::debug!("Describing current user");
        let request = self
            .request(TARGET_GET_USER)
            .header(USER_AGENT_HEADER, &self.config.user_agent)
            .json(&body);
        let reply = HttpReply::send(request).await?;
        interpret_user_reply(&reply)
    }
}

fn string_field(object: &JsonObject, field: &str) -> String {
    object
        .get(field)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Interpret a password authentication reply.
///
/// An `AuthenticationResult` object wins, then a non-empty `ChallengeName`.
/// Any other body is treated as an error body.
///
/// # Errors
///
/// Returns the classified failure described by the reply.
pub fn interpret_login_reply(reply: &HttpReply) -> Result<AuthResponse> {
    let body = reply.json_object()?;

    if let Some(result) = body.get("AuthenticationResult").and_then(Value::as_object) {
        let access_token = string_field(result, "AccessToken");
        if access_token.is_empty() {
            return Err(Failure::new(
                codes::MISSING_ACCESS_TOKEN,
                "Access token missing from response",
            ));
        }
        return Ok(AuthResponse::Authenticated(AuthenticationResult {
            access_token,
            id_token: string_field(result, "IdToken"),
            refresh_token: string_field(result, "RefreshToken"),
            token_type: string_field(result, "TokenType"),
            expires_in: lifetime_field(result, "ExpiresIn"),
        }));
    }

    let challenge = string_field(&body, "ChallengeName");
    if !challenge.is_empty() {
        let parameters = body
            .get("ChallengeParameters")
            .and_then(Value::as_object)
            .map(|params| {
                params
                    .iter()
                    .map(|(key, value)| {
                        let value = value
                            .as_str()
                            .map_or_else(|| value.to_string(), str::to_string);
                        (key.clone(), value)
                    })
                    .collect()
            })
            .unwrap_or_default();
        return Ok(AuthResponse::Challenge(AuthChallenge {
            name: challenge,
            parameters,
        }));
    }

    Err(reply
        .body_failure(&body)
        .unwrap_or_else(|| Failure::new(codes::UNKNOWN_ERROR, "Unknown login error")))
}

/// Interpret a describe-current-user reply.
///
/// Attribute entries without a string `Name` are skipped.
///
/// # Errors
///
/// Returns the classified failure described by the reply.
pub fn interpret_user_reply(reply: &HttpReply) -> Result<Vec<UserAttribute>> {
    let body = reply.json_object()?;

    if let Some(attributes) = body.get("UserAttributes").and_then(Value::as_array) {
        return Ok(attributes
            .iter()
            .filter_map(Value::as_object)
            .filter_map(|attr| {
                let name = attr.get("Name").and_then(Value::as_str)?;
                Some(UserAttribute {
                    name: name.to_string(),
                    value: string_field(attr, "Value"),
                })
            })
            .collect());
    }

    Err(reply
        .body_failure(&body)
        .unwrap_or_else(|| Failure::new(codes::UNKNOWN_ERROR, "Unknown GetUser error")))
}

#[allow(clippy::cast_possible_truncation)]
fn lifetime_field(object: &JsonObject, field: &str) -> i64 {
    object.get(field).map_or(0, |value| {
        value
            .as_i64()
            .or_else(|| value.as_f64().map(|f| f as i64))
            .unwrap_or(0)
    })
}

/// A scripted identity provider for testing.
///
/// Replies are returned in the order they were pushed. When a queue runs dry
/// the call fails with a `network-error`.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Default)]
pub struct MockIdentityProvider {
    login_replies: parking_lot::Mutex<std::collections::VecDeque<Result<AuthResponse>>>,
    user_replies: parking_lot::Mutex<std::collections::VecDeque<Result<Vec<UserAttribute>>>>,
    login_delay: parking_lot::Mutex<std::time::Duration>,
    user_delay: parking_lot::Mutex<std::time::Duration>,
    login_calls: std::sync::atomic::AtomicUsize,
    user_calls: std::sync::atomic::AtomicUsize,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockIdentityProvider {
    /// Create a provider with no scripted replies.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for the next login.
    pub fn push_login(&self, reply: Result<AuthResponse>) {
        self.login_replies.lock().push_back(reply);
    }

    /// Queue a successful login with the given token lifetime.
    pub fn push_tokens(&self, access_token: &str, expires_in: i64) {
        self.push_login(Ok(AuthResponse::Authenticated(AuthenticationResult {
            access_token: access_token.to_string(),
            id_token: "id".to_string(),
            refresh_token: "refresh".to_string(),
            token_type: "Bearer".to_string(),
            expires_in,
        })));
    }

    /// Queue a reply for the next user lookup.
    pub fn push_user(&self, reply: Result<Vec<UserAttribute>>) {
        self.user_replies.lock().push_back(reply);
    }

    /// Delay every login reply by `delay`.
    pub fn set_login_delay(&self, delay: std::time::Duration) {
        *self.login_delay.lock() = delay;
    }

    /// Delay every user lookup reply by `delay`.
    pub fn set_user_delay(&self, delay: std::time::Duration) {
        *self.user_delay.lock() = delay;
    }

    /// Number of logins attempted.
    #[must_use]
    pub fn login_calls(&self) -> usize {
        self.login_calls.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Number of user lookups attempted.
    #[must_use]
    pub fn user_calls(&self) -> usize {
        self.user_calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn initiate_auth(&self, _email: &str, _password: &str) -> Result<AuthResponse> {
        self.login_calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let delay = *self.login_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.login_replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(Failure::network("no scripted login reply")))
    }

    async fn get_user(&self, _access_token: &str) -> Result<Vec<UserAttribute>> {
        self.user_calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let delay = *self.user_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.user_replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(Failure::network("no scripted user reply")))
    }
}
