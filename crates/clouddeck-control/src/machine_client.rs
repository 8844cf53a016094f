//! HTTP client for the machine-management API.
//!
//! This module provides the `MachineApi` trait and its HTTP implementation.
//! Every request carries the caller's access token as a bearer header.
//! Ids are percent-encoded as single path segments. Replies are buffered
//! and interpreted by pure functions.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use clouddeck_core::{codes, Failure, HttpReply, JsonObject, Result};

use crate::config::ControlConfig;
use crate::error::ControlError;
use crate::lifecycle::MachineCommand;
use crate::types::{AccountRecord, MachineRecord};

/// Trait for machine-management API communication.
///
/// This trait abstracts the API client interface, allowing for mock
/// implementations in tests.
#[async_trait]
pub trait MachineApi: Send + Sync {
    /// Look up an account and the machine it owns.
    ///
    /// # Errors
    ///
    /// Returns a classified failure, `MissingMachineId` if the account names
    /// no machine.
    async fn get_account(&self, account_id: &str, access_token: &str) -> Result<AccountRecord>;

    /// Fetch the current machine record.
    ///
    /// A record without a status is still returned; deciding what an empty
    /// status means is left to the caller.
    ///
    /// # Errors
    ///
    /// Returns a classified failure.
    async fn get_machine(&self, machine_id: &str, access_token: &str) -> Result<MachineRecord>;

    /// Send a lifecycle command. Any status below 400 is accepted.
    ///
    /// # Errors
    ///
    /// Returns a classified failure for transport errors and error statuses.
    async fn send_command(
        &self,
        machine_id: &str,
        command: MachineCommand,
        access_token: &str,
    ) -> Result<()>;

    /// Register a pairing client by PIN and return the response body.
    ///
    /// # Errors
    ///
    /// Returns a classified failure for transport errors and error statuses.
    async fn add_client(&self, machine_id: &str, pin: &str, access_token: &str)
        -> Result<JsonObject>;
}

/// HTTP client for the machine-management API.
#[derive(Debug, Clone)]
pub struct HttpMachineApi {
    client: reqwest::Client,
    base_url: reqwest::Url,
}

impl HttpMachineApi {
    /// Create a new API client from the controller configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is not an absolute http(s) URL or
    /// the HTTP client cannot be built.
    pub fn new(config: &ControlConfig) -> std::result::Result<Self, ControlError> {
        let base_url = reqwest::Url::parse(config.api_base_url.trim()).map_err(|e| {
            ControlError::Config(format!("api base url {:?}: {e}", config.api_base_url))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ControlError::Config(format!(
                "api base url {:?} cannot carry a path",
                config.api_base_url
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .build()?;

        Ok(Self::with_client(client, base_url))
    }

    /// Create a new API client with a custom reqwest client.
    #[must_use]
    pub fn with_client(client: reqwest::Client, base_url: reqwest::Url) -> Self {
        Self { client, base_url }
    }

    /// Get the base URL of the API.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Append `segments` to the base path, encoding each one.
    fn url(&self, segments: &[&str]) -> reqwest::Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

#[derive(Debug, Serialize)]
struct AddClientRequest<'a> {
    pin: &'a str,
}

#[async_trait]
impl MachineApi for HttpMachineApi {
    async fn get_account(&self, account_id: &str, access_token: &str) -> Result<AccountRecord> {
        let url = self.url(&["accounts", account_id]);
        tracing::debug!(account_id = %account_id, "Fetching account");

        let reply = HttpReply::send(self.client.get(url).bearer_auth(access_token)).await?;
        interpret_account_reply(account_id, &reply)
    }

    async fn get_machine(&self, machine_id: &str, access_token: &str) -> Result<MachineRecord> {
        let url = self.url(&["machines", machine_id]);
        tracing::debug!(machine_id = %machine_id, "Fetching machine status");

        let reply = HttpReply::send(self.client.get(url).bearer_auth(access_token)).await?;
        interpret_machine_reply(machine_id, &reply)
    }

    async fn send_command(
        &self,
        machine_id: &str,
        command: MachineCommand,
        access_token: &str,
    ) -> Result<()> {
        let url = self.url(&["machines", machine_id, command.as_str()]);
        tracing::debug!(machine_id = %machine_id, command = %command, "Sending machine command");

        let request = self.client.post(url).bearer_auth(access_token);
        let reply = HttpReply::send(request).await?;
        interpret_command_reply(&reply)
    }

    async fn add_client(
        &self,
        machine_id: &str,
        pin: &str,
        access_token: &str,
    ) -> Result<JsonObject> {
        let url = self.url(&["machines", machine_id, "clients"]);
        tracing::debug!(machine_id = %machine_id, "Adding pairing client");

        let request = self
            .client
            .post(url)
            .bearer_auth(access_token)
            .json(&AddClientRequest { pin });
        let reply = HttpReply::send(request).await?;
        interpret_client_reply(&reply)
    }
}

/// Parse the body as an object and fail on error statuses.
fn success_object(reply: &HttpReply) -> Result<JsonObject> {
    let body = reply.json_object()?;
    if reply.is_error() {
        return Err(reply
            .body_failure(&body)
            .unwrap_or_else(|| Failure::http(reply.status)));
    }
    Ok(body)
}

fn string_field(object: &JsonObject, field: &str) -> String {
    object
        .get(field)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

#[allow(clippy::cast_possible_truncation)]
fn epoch_field(object: &JsonObject, field: &str) -> i64 {
    match object.get(field) {
        Some(value) => value
            .as_i64()
            .or_else(|| value.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        None => 0,
    }
}

/// Interpret an account lookup reply.
///
/// # Errors
///
/// Returns the classified failure described by the reply.
pub fn interpret_account_reply(account_id: &str, reply: &HttpReply) -> Result<AccountRecord> {
    let body = success_object(reply)?;
    let machine_id = string_field(&body, "machine_id");
    if machine_id.is_empty() {
        return Err(Failure::new(
            codes::MISSING_MACHINE_ID,
            "machine_id missing from account response",
        ));
    }
    Ok(AccountRecord {
        account_id: account_id.to_string(),
        machine_id,
    })
}

/// Interpret a machine status reply.
///
/// A record without a string `id` keeps the requested id. A missing
/// status decodes as an empty string.
///
/// # Errors
///
/// Returns the classified failure described by the reply.
pub fn interpret_machine_reply(machine_id: &str, reply: &HttpReply) -> Result<MachineRecord> {
    let body = success_object(reply)?;

    let id = match string_field(&body, "id") {
        id if id.is_empty() => machine_id.to_string(),
        id => id,
    };

    Ok(MachineRecord {
        id,
        status: string_field(&body, "status"),
        password: string_field(&body, "password"),
        public_address: string_field(&body, "public_ip"),
        last_started_at: epoch_field(&body, "last_started"),
        created_at: epoch_field(&body, "created_at"),
    })
}

/// Interpret a start or stop command reply. The body of a success is ignored.
///
/// # Errors
///
/// Returns the classified failure for an error status.
pub fn interpret_command_reply(reply: &HttpReply) -> Result<()> {
    if reply.is_error() {
        Err(reply.error_failure())
    } else {
        Ok(())
    }
}

/// Interpret a pairing client reply.
///
/// A success with an empty or non-object body yields an empty object. An
/// error status with an unreadable body is a `parse-error`.
///
/// # Errors
///
/// Returns the classified failure described by the reply.
pub fn interpret_client_reply(reply: &HttpReply) -> Result<JsonObject> {
    let body = if reply.is_empty() {
        JsonObject::new()
    } else {
        match reply.json_object() {
            Ok(body) => body,
            Err(failure) if reply.is_error() => return Err(failure),
            Err(_) => JsonObject::new(),
        }
    };

    if reply.is_error() {
        return Err(reply
            .body_failure(&body)
            .unwrap_or_else(|| Failure::http(reply.status)));
    }
    Ok(body)
}

/// A scripted machine API for testing.
///
/// Status replies are returned in order; the last one keeps being returned.
/// Command replies default to success once the queue is empty.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Default)]
pub struct MockMachineApi {
    account: parking_lot::Mutex<Option<Result<AccountRecord>>>,
    statuses: parking_lot::Mutex<std::collections::VecDeque<Result<MachineRecord>>>,
    command_replies: parking_lot::Mutex<std::collections::VecDeque<Result<()>>>,
    commands: parking_lot::Mutex<Vec<MachineCommand>>,
    client_reply: parking_lot::Mutex<Option<Result<JsonObject>>>,
    status_delay: parking_lot::Mutex<std::time::Duration>,
    account_calls: std::sync::atomic::AtomicUsize,
    status_calls: std::sync::atomic::AtomicUsize,
    client_calls: std::sync::atomic::AtomicUsize,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockMachineApi {
    /// Create an API with no scripted replies.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every account lookup with `reply`.
    pub fn set_account(&self, reply: Result<AccountRecord>) {
        *self.account.lock() = Some(reply);
    }

    /// Queue a status reply.
    pub fn push_status(&self, reply: Result<MachineRecord>) {
        self.statuses.lock().push_back(reply);
    }

    /// Queue a successful status reply with the given status string.
    pub fn push_status_str(&self, status: &str) {
        self.push_status(Ok(MachineRecord {
            id: "m-1".to_string(),
            status: status.to_string(),
            password: "host-pw".to_string(),
            public_address: "203.0.113.7".to_string(),
            last_started_at: 0,
            created_at: 0,
        }));
    }

    /// Queue a command reply.
    pub fn push_command_reply(&self, reply: Result<()>) {
        self.command_replies.lock().push_back(reply);
    }

    /// Answer every client add with `reply`.
    pub fn set_client_reply(&self, reply: Result<JsonObject>) {
        *self.client_reply.lock() = Some(reply);
    }

    /// Delay every status reply by `delay`.
    pub fn set_status_delay(&self, delay: std::time::Duration) {
        *self.status_delay.lock() = delay;
    }

    /// Commands sent so far.
    #[must_use]
    pub fn commands(&self) -> Vec<MachineCommand> {
        self.commands.lock().clone()
    }

    /// Number of account lookups.
    #[must_use]
    pub fn account_calls(&self) -> usize {
        self.account_calls.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Number of status fetches.
    #[must_use]
    pub fn status_calls(&self) -> usize {
        self.status_calls.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Number of client adds.
    #[must_use]
    pub fn client_calls(&self) -> usize {
        self.client_calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl MachineApi for MockMachineApi {
    async fn get_account(&self, _account_id: &str, _access_token: &str) -> Result<AccountRecord> {
        self.account_calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.account
            .lock()
            .clone()
            .unwrap_or_else(|| Err(Failure::network("no scripted account reply")))
    }

    async fn get_machine(&self, _machine_id: &str, _access_token: &str) -> Result<MachineRecord> {
        self.status_calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let delay = *self.status_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let mut statuses = self.statuses.lock();
        let reply = if statuses.len() > 1 {
            statuses.pop_front()
        } else {
            statuses.front().cloned()
        };
        reply.unwrap_or_else(|| Err(Failure::network("no scripted status reply")))
    }

    async fn send_command(
        &self,
        _machine_id: &str,
        command: MachineCommand,
        _access_token: &str,
    ) -> Result<()> {
        self.commands.lock().push(command);
        self.command_replies.lock().pop_front().unwrap_or(Ok(()))
    }

    async fn add_client(
        &self,
        _machine_id: &str,
        _pin: &str,
        _access_token: &str,
    ) -> Result<JsonObject> {
        self.client_calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.client_reply
            .lock()
            .clone()
            .unwrap_or_else(|| Err(Failure::network("no scripted client reply")))
    }
}
