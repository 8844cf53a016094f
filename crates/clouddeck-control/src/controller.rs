//! The controller facade.
//!
//! [`CloudDeckController`] owns one user's session against one machine. Every
//! operation returns immediately and completes through exactly one terminal
//! [`ControllerEvent`] on the paired [`ControllerEvents`] receiver.

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use clouddeck_auth::{AuthConfig, AuthSession, CognitoClient, IdentityProvider, LoginOutcome, TokenSet};
use clouddeck_core::{codes, Failure, Flight, JsonObject, Result as OpResult};
use clouddeck_store::{CredentialStore, SessionTimerSettings};

use crate::config::ControlConfig;
use crate::error::Result;
use crate::events::{ControllerEvent, ControllerEvents, EventSink};
use crate::host;
use crate::identity::IdentityResolver;
use crate::lifecycle::{LifecycleAction, MachineCommand};
use crate::machine::{require_target, MachineLifecycleController};
use crate::machine_client::{HttpMachineApi, MachineApi};
use crate::types::MachineRecord;

struct Inner {
    session: AuthSession,
    identity: IdentityResolver,
    machine: MachineLifecycleController,
    api: Arc<dyn MachineApi>,
    store: Arc<dyn CredentialStore>,
    client_flight: Flight,
    events: EventSink,
}

impl Inner {
    async fn login(&self, email: &str, password: &str) -> OpResult<LoginOutcome> {
        let outcome = self.session.login(email, password).await?;
        if matches!(outcome, LoginOutcome::Authenticated(_)) {
            self.machine.set_host_user(&self.session.last_email());
        }
        Ok(outcome)
    }

    async fn add_client(&self, access_token: &str, machine_id: &str, pin: &str) -> OpResult<JsonObject> {
        let access_token = Failure::require(
            access_token,
            codes::EMPTY_ACCESS_TOKEN,
            "Access token is required",
        )?;
        let machine_id = Failure::require(machine_id, codes::EMPTY_MACHINE_ID, "Machine ID is required")?;
        let pin = Failure::require(pin, codes::EMPTY_PIN, "PIN is required")?;
        let Some(_guard) = self.client_flight.try_acquire() else {
            return Err(Failure::in_progress("Client add already in progress"));
        };

        self.api.add_client(machine_id, pin, access_token).await
    }
}

/// Session controller for one user and their machine.
///
/// Operations spawn onto the current Tokio runtime and report through
/// [`ControllerEvents`]. Calling them outside a runtime panics.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
///
/// use clouddeck_auth::AuthConfig;
/// use clouddeck_control::{CloudDeckController, ControlConfig, ControllerEvent};
/// use clouddeck_store::RocksCredentialStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = Arc::new(RocksCredentialStore::open("/tmp/clouddeck")?);
/// let (controller, mut events) =
///     CloudDeckController::new(AuthConfig::default(), ControlConfig::default(), store)?;
///
/// controller.login("user@example.com", "password");
/// while let Some(event) = events.recv().await {
///     if let ControllerEvent::LoginFinished(result) = event {
///         println!("login: {:?}", result.map(|outcome| outcome.outcome()));
///         break;
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub struct CloudDeckController {
    inner: Arc<Inner>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl CloudDeckController {
    /// Create a controller talking to the real identity provider and API.
    ///
    /// # Errors
    ///
    /// Returns an error if either configuration is invalid or an HTTP client
    /// cannot be built.
    pub fn new(
        auth: AuthConfig,
        config: ControlConfig,
        store: Arc<dyn CredentialStore>,
    ) -> Result<(Self, ControllerEvents)> {
        auth.validate()?;
        config.validate()?;

        let provider = Arc::new(CognitoClient::new(auth)?);
        let api = Arc::new(HttpMachineApi::new(&config)?);

        tracing::info!(api = %api.base_url(), "Creating controller");
        Ok(Self::with_components(provider, api, store, &config))
    }

    /// Create a controller from explicit components.
    #[must_use]
    pub fn with_components(
        provider: Arc<dyn IdentityProvider>,
        api: Arc<dyn MachineApi>,
        store: Arc<dyn CredentialStore>,
        config: &ControlConfig,
    ) -> (Self, ControllerEvents) {
        let (events, receiver) = EventSink::channel();
        let inner = Inner {
            session: AuthSession::with_store(Arc::clone(&provider), Arc::clone(&store)),
            identity: IdentityResolver::new(provider, Arc::clone(&api), config.account_attribute.clone()),
            machine: MachineLifecycleController::with_store(Arc::clone(&api), Arc::clone(&store), config),
            api,
            store,
            client_flight: Flight::new(),
            events,
        };
        let controller = Self {
            inner: Arc::new(inner),
            tasks: Mutex::new(Vec::new()),
        };
        (controller, receiver)
    }

    fn spawn<F, Fut>(&self, operation: F)
    where
        F: FnOnce(Arc<Inner>, EventSink) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let events = self.inner.events.scoped();
        let handle = tokio::spawn(operation(Arc::clone(&self.inner), events));

        let mut tasks = self.tasks.lock();
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Submit credentials. Completes with [`ControllerEvent::LoginFinished`].
    pub fn login(&self, email: &str, password: &str) {
        let email = email.to_string();
        let password = password.to_string();
        self.spawn(|inner, events| async move {
            let result = inner.login(&email, &password).await;
            events.emit(ControllerEvent::LoginFinished(result));
        });
    }

    /// Log in with the stored credentials, if any.
    ///
    /// Returns `false` without starting anything when no credentials are
    /// stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn login_with_stored_credentials(&self) -> Result<bool> {
        match self.stored_credentials()? {
            Some((email, password)) => {
                self.login(&email, &password);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Resolve the machine id owned by the token's user.
    ///
    /// Emits [`ControllerEvent::AccountIdResolved`] when the first step
    /// succeeds and completes with [`ControllerEvent::MachineIdResolved`].
    pub fn resolve_machine_id(&self, access_token: &str) {
        let access_token = access_token.to_string();
        self.spawn(|inner, events| async move {
            let result = inner
                .identity
                .fetch_machine_id(&access_token, |account_id| {
                    events.emit(ControllerEvent::AccountIdResolved(account_id.to_string()));
                })
                .await;
            events.emit(ControllerEvent::MachineIdResolved(result));
        });
    }

    /// Fetch the machine status once.
    ///
    /// Completes with [`ControllerEvent::StatusUpdated`] or
    /// [`ControllerEvent::StatusFailed`]. A status fetched while a start or
    /// stop is running counts toward it like one of its own polls.
    pub fn fetch_status(&self, machine_id: &str, access_token: &str) {
        let machine_id = machine_id.to_string();
        let access_token = access_token.to_string();
        self.spawn(|inner, events| async move {
            let event = match inner.machine.fetch_status(&machine_id, &access_token).await {
                Ok(record) => ControllerEvent::StatusUpdated(record),
                Err(failure) => ControllerEvent::StatusFailed(failure),
            };
            events.emit(event);
        });
    }

    /// Start the machine. Completes with [`ControllerEvent::StartFinished`].
    pub fn start(&self, machine_id: &str, access_token: &str) {
        self.run_lifecycle(machine_id, access_token, MachineCommand::Start);
    }

    /// Stop the machine. Completes with [`ControllerEvent::StopFinished`].
    pub fn stop(&self, machine_id: &str, access_token: &str) {
        self.run_lifecycle(machine_id, access_token, MachineCommand::Stop);
    }

    fn run_lifecycle(&self, machine_id: &str, access_token: &str, command: MachineCommand) {
        let action = LifecycleAction::for_command(command);
        let claimed = require_target(machine_id, access_token)
            .and_then(|_| self.inner.machine.begin(command));
        if let Err(failure) = claimed {
            tracing::debug!(command = %command, error = %failure, "Lifecycle request rejected");
            let status = self.inner.machine.status();
            self.inner
                .events
                .scoped()
                .emit(ControllerEvent::lifecycle_finished(action, Err(failure), status));
            return;
        }

        tracing::info!(command = %command, machine_id = %machine_id.trim(), "Lifecycle action started");
        let machine_id = machine_id.trim().to_string();
        let access_token = access_token.trim().to_string();
        self.spawn(move |inner, events| async move {
            let result = inner.machine.run(&machine_id, &access_token, command, &events).await;
            let status = inner.machine.status();
            events.emit(ControllerEvent::lifecycle_finished(action, result, status));
        });
    }

    /// Register a pairing client by PIN.
    ///
    /// Completes with [`ControllerEvent::ClientAdded`] carrying the response
    /// body.
    pub fn add_machine_client(&self, access_token: &str, machine_id: &str, pin: &str) {
        let access_token = access_token.to_string();
        let machine_id = machine_id.to_string();
        let pin = pin.to_string();
        self.spawn(|inner, events| async move {
            let result = inner.add_client(&access_token, &machine_id, &pin).await;
            events.emit(ControllerEvent::ClientAdded(result));
        });
    }

    /// Abort every outstanding operation and return to idle.
    ///
    /// No event from an operation issued before this call is delivered
    /// afterwards, including events already queued.
    pub fn cancel(&self) {
        let epoch = self.inner.events.invalidate();
        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in &tasks {
            task.abort();
        }
        self.inner.machine.reset();
        tracing::info!(epoch, aborted = tasks.len(), "Cancelled outstanding operations");
    }

    // =========================================================================
    // State
    // =========================================================================

    /// A copy of the current token set.
    #[must_use]
    pub fn tokens(&self) -> TokenSet {
        self.inner.session.tokens()
    }

    /// The current access token, empty when not logged in.
    #[must_use]
    pub fn access_token(&self) -> String {
        self.inner.session.access_token()
    }

    /// Returns `true` while a login is outstanding.
    #[must_use]
    pub fn is_logging_in(&self) -> bool {
        self.inner.session.is_logging_in()
    }

    /// The last resolved account id.
    #[must_use]
    pub fn account_id(&self) -> String {
        self.inner.identity.account_id()
    }

    /// The last resolved machine id.
    #[must_use]
    pub fn machine_id(&self) -> String {
        self.inner.identity.machine_id()
    }

    /// A copy of the last fetched machine record.
    #[must_use]
    pub fn machine_record(&self) -> MachineRecord {
        self.inner.machine.record()
    }

    /// The lifecycle action in progress.
    #[must_use]
    pub fn action(&self) -> LifecycleAction {
        self.inner.machine.action()
    }

    /// Consecutive stalled polls in the current action.
    #[must_use]
    pub fn stall_count(&self) -> u32 {
        self.inner.machine.stall_count()
    }

    // =========================================================================
    // Stored State
    // =========================================================================

    /// The stored email and password, if both are present.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn stored_credentials(&self) -> Result<Option<(String, String)>> {
        let store = &self.inner.store;
        Ok(store.stored_email()?.zip(store.stored_password()?))
    }

    /// Returns `true` if both an email and a password are stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn has_stored_credentials(&self) -> Result<bool> {
        Ok(self.inner.store.has_stored_credentials()?)
    }

    /// Remove stored credentials and connection details.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub fn clear_stored_credentials(&self) -> Result<()> {
        self.inner.store.clear_stored_credentials()?;
        tracing::info!("Cleared stored credentials");
        Ok(())
    }

    /// The stored session timer preferences.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn session_timer_settings(&self) -> Result<SessionTimerSettings> {
        Ok(self.inner.store.session_timer_settings()?)
    }

    /// Store session timer preferences. Out-of-range values are sanitized.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub fn set_session_timer_settings(&self, settings: SessionTimerSettings) -> Result<()> {
        Ok(self.inner.store.set_session_timer_settings(settings)?)
    }

    /// Returns `true` if `address` is the stored machine address.
    #[must_use]
    pub fn is_clouddeck_host(&self, address: &str) -> bool {
        host::is_clouddeck_host(self.inner.store.as_ref(), address)
    }
}

impl Drop for CloudDeckController {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}
