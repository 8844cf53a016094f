//! Machine status fetching and the start/stop lifecycle.
//!
//! A start or stop sends its command once, then polls the machine status on
//! a fixed interval until the target status is reported. Polls that show
//! neither the target nor the transitional status count as stalls; once the
//! stall threshold is reached the command is sent again. There is no overall
//! time limit on the poll loop.
//!
//! Every successful status fetch feeds the running action, including fetches
//! made by callers outside the poll loop. A fetch that finishes the action
//! or calls for a re-issue wakes the loop, which then acts on the decision.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;

use clouddeck_core::{codes, Failure, Flight, Outcome, Result};
use clouddeck_store::CredentialStore;

use crate::config::ControlConfig;
use crate::events::{ControllerEvent, EventSink};
use crate::lifecycle::{LifecycleAction, MachineCommand, PollDecision, StallTracker};
use crate::machine_client::MachineApi;
use crate::types::MachineRecord;

/// Reject a blank machine id or access token. Returns both trimmed.
///
/// # Errors
///
/// Returns `EmptyMachineId` or `EmptyAccessToken`.
pub fn require_target<'a>(machine_id: &'a str, access_token: &'a str) -> Result<(&'a str, &'a str)> {
    let machine_id = Failure::require(machine_id, codes::EMPTY_MACHINE_ID, "Machine ID is required")?;
    let access_token = Failure::require(
        access_token,
        codes::EMPTY_ACCESS_TOKEN,
        "Access token is required",
    )?;
    Ok((machine_id, access_token))
}

/// Drives one machine through start and stop.
pub struct MachineLifecycleController {
    api: Arc<dyn MachineApi>,
    store: Option<Arc<dyn CredentialStore>>,
    poll_interval: Duration,
    stall_threshold: u32,
    record: RwLock<MachineRecord>,
    action: Mutex<LifecycleAction>,
    stall: Mutex<StallTracker>,
    /// A finishing or re-issue decision not yet acted on by the poll loop.
    pending: Mutex<Option<(PollDecision, MachineRecord)>>,
    decided: Notify,
    host_user: RwLock<String>,
    status_flight: Flight,
    command_flight: Flight,
}

impl MachineLifecycleController {
    /// Create a controller that does not persist connection details.
    #[must_use]
    pub fn new(api: Arc<dyn MachineApi>, config: &ControlConfig) -> Self {
        Self {
            api,
            store: None,
            poll_interval: config.poll_interval(),
            stall_threshold: config.stall_threshold,
            record: RwLock::new(MachineRecord::default()),
            action: Mutex::new(LifecycleAction::None),
            stall: Mutex::new(StallTracker::new(config.stall_threshold)),
            pending: Mutex::new(None),
            decided: Notify::new(),
            host_user: RwLock::new(String::new()),
            status_flight: Flight::new(),
            command_flight: Flight::new(),
        }
    }

    /// Create a controller that records connection details in `store`.
    #[must_use]
    pub fn with_store(
        api: Arc<dyn MachineApi>,
        store: Arc<dyn CredentialStore>,
        config: &ControlConfig,
    ) -> Self {
        Self {
            store: Some(store),
            ..Self::new(api, config)
        }
    }

    /// Set the user name stored alongside the machine address.
    pub fn set_host_user(&self, host_user: &str) {
        *self.host_user.write() = host_user.to_string();
    }

    /// Fetch the machine status and replace the current record.
    ///
    /// Every decoded reply replaces the record, even one without a status.
    /// Replies with a status are recorded in the credential store and fed to
    /// the running start or stop, if any.
    ///
    /// # Errors
    ///
    /// - `EmptyMachineId` or `EmptyAccessToken` before any request
    /// - `in-progress` while another status fetch is outstanding
    /// - `MissingStatus` if the reply has no status
    /// - the classified API failure otherwise
    pub async fn fetch_status(&self, machine_id: &str, access_token: &str) -> Result<MachineRecord> {
        let (machine_id, access_token) = require_target(machine_id, access_token)?;
        let Some(_guard) = self.status_flight.try_acquire() else {
            return Err(Failure::in_progress("Status request already in progress"));
        };

        let record = self.api.get_machine(machine_id, access_token).await?;
        *self.record.write() = record.clone();
        if record.status.trim().is_empty() {
            return Err(Failure::new(
                codes::MISSING_STATUS,
                "Machine status missing from response",
            ));
        }

        tracing::debug!(machine_id = %record.id, status = %record.status, "Machine status");
        self.remember(&record);
        self.apply(&record);
        Ok(record)
    }

    /// Feed `record` to the running action and wake the poll loop on a
    /// finishing or re-issue decision.
    fn apply(&self, record: &MachineRecord) {
        let action = self.action();
        if !action.is_active() {
            return;
        }
        let decision = self.stall.lock().observe(action, &record.status);
        if decision == PollDecision::Continue {
            return;
        }
        *self.pending.lock() = Some((decision, record.clone()));
        self.decided.notify_one();
    }

    fn remember(&self, record: &MachineRecord) {
        let Some(store) = &self.store else {
            return;
        };
        let host_user = self.host_user.read().clone();
        if let Err(e) = store.remember_machine(&record.public_address, &record.password, &host_user)
        {
            tracing::warn!(error = %e, "Failed to store machine details");
        }
    }

    /// Claim the lifecycle for `command`.
    ///
    /// # Errors
    ///
    /// Returns `in-progress` if a start or stop is already running.
    pub fn begin(&self, command: MachineCommand) -> Result<()> {
        let mut action = self.action.lock();
        if action.is_active() {
            return Err(Failure::in_progress("Machine operation already in progress"));
        }
        *action = LifecycleAction::for_command(command);
        *self.stall.lock() = StallTracker::new(self.stall_threshold);
        self.pending.lock().take();
        Ok(())
    }

    /// Send `command` and poll until the machine reaches its target status.
    ///
    /// [`begin`](Self::begin) must have been called. Status updates, poll
    /// failures and re-issued commands are reported through `events`. The
    /// action is cleared before this returns, unless `events` went stale in
    /// the meantime and the action may already belong to a newer caller.
    ///
    /// # Errors
    ///
    /// Returns the classified failure of the first or a re-issued command.
    pub async fn run(
        &self,
        machine_id: &str,
        access_token: &str,
        command: MachineCommand,
        events: &EventSink,
    ) -> Result<MachineRecord> {
        if let Err(failure) = self.send(machine_id, command, access_token).await {
            tracing::warn!(command = %command, error = %failure, "Machine command failed");
            self.finish(events);
            return Err(failure);
        }

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.fetch_status(machine_id, access_token).await {
                        Ok(record) => {
                            events.emit(ControllerEvent::StatusUpdated(record));
                        }
                        Err(failure) if failure.outcome == Outcome::InProgress => {}
                        Err(failure) => {
                            events.emit(ControllerEvent::StatusFailed(failure));
                        }
                    }
                }
                () = self.decided.notified() => {}
            }

            // A cancelled run parks at the next await until its abort lands.
            if events.is_stale() {
                continue;
            }
            let Some((decision, record)) = self.pending.lock().take() else {
                continue;
            };
            match decision {
                PollDecision::Finished => {
                    tracing::info!(command = %command, status = %record.status, "Machine reached target status");
                    self.finish(events);
                    return Ok(record);
                }
                PollDecision::Continue => {}
                PollDecision::Reissue => {
                    tracing::warn!(command = %command, status = %record.status, "Machine stalled, re-sending command");
                    events.emit(ControllerEvent::CommandReissued(command));
                    if let Err(failure) = self.send(machine_id, command, access_token).await {
                        self.finish(events);
                        return Err(failure);
                    }
                }
            }
        }
    }

    /// Clear the action on behalf of a run reporting through `events`.
    fn finish(&self, events: &EventSink) {
        if events.is_stale() {
            tracing::debug!("Leaving the action to the caller that cancelled this run");
            return;
        }
        self.reset();
    }

    async fn send(&self, machine_id: &str, command: MachineCommand, access_token: &str) -> Result<()> {
        let (machine_id, access_token) = require_target(machine_id, access_token)?;
        let Some(_guard) = self.command_flight.try_acquire() else {
            return Err(Failure::in_progress("Machine command already in progress"));
        };
        self.api.send_command(machine_id, command, access_token).await
    }

    /// Clear the action, the stall count and any undelivered poll decision.
    pub fn reset(&self) {
        *self.action.lock() = LifecycleAction::None;
        self.stall.lock().reset();
        self.pending.lock().take();
    }

    /// A copy of the current machine record.
    #[must_use]
    pub fn record(&self) -> MachineRecord {
        self.record.read().clone()
    }

    /// The last fetched status, empty if none.
    #[must_use]
    pub fn status(&self) -> String {
        self.record.read().status.clone()
    }

    /// The action in progress.
    #[must_use]
    pub fn action(&self) -> LifecycleAction {
        *self.action.lock()
    }

    /// Consecutive stalled polls in the current action.
    #[must_use]
    pub fn stall_count(&self) -> u32 {
        self.stall.lock().count()
    }

    /// Returns `true` while a start or stop is polling.
    #[must_use]
    pub fn is_polling(&self) -> bool {
        self.action().is_active()
    }
}

#[cfg(test)]
mod tests {
    use clouddeck_store::MemoryCredentialStore;

    use super::*;
    use crate::events::ControllerEvents;
    use crate::machine_client::MockMachineApi;

    fn controller() -> (MachineLifecycleController, Arc<MockMachineApi>) {
        let api = Arc::new(MockMachineApi::new());
        let controller = MachineLifecycleController::new(api.clone(), &ControlConfig::default());
        (controller, api)
    }

    fn drain(events: &mut ControllerEvents) -> Vec<ControllerEvent> {
        std::iter::from_fn(|| events.try_recv()).collect()
    }

    #[tokio::test]
    async fn blank_target_sends_nothing() {
        let (controller, api) = controller();
        let err = controller.fetch_status("", "tok").await.unwrap_err();
        assert_eq!(err.code, "EmptyMachineId");
        assert_eq!(err.message, "Machine ID is required");

        let err = controller.fetch_status("m-1", "").await.unwrap_err();
        assert_eq!(err.code, "EmptyAccessToken");
        assert_eq!(api.status_calls(), 0);
    }

    #[tokio::test]
    async fn status_success_is_persisted() {
        let api = Arc::new(MockMachineApi::new());
        api.push_status_str("off");
        let store = Arc::new(MemoryCredentialStore::new());
        let controller =
            MachineLifecycleController::with_store(api, store.clone(), &ControlConfig::default());
        controller.set_host_user("a@b.com");

        let record = controller.fetch_status("m-1", "tok").await.unwrap();
        assert_eq!(record.status, "off");
        assert_eq!(controller.status(), "off");
        assert_eq!(store.stored_server_address().unwrap().as_deref(), Some("203.0.113.7"));
        assert_eq!(store.stored_host_password().unwrap().as_deref(), Some("host-pw"));
        assert_eq!(store.stored_host_user().unwrap().as_deref(), Some("a@b.com"));
    }

    #[tokio::test]
    async fn empty_status_replaces_the_record_but_is_not_stored() {
        let api = Arc::new(MockMachineApi::new());
        let store = Arc::new(MemoryCredentialStore::new());
        let controller =
            MachineLifecycleController::with_store(api.clone(), store.clone(), &ControlConfig::default());
        api.push_status_str("off");
        controller.fetch_status("m-1", "tok").await.unwrap();

        api.push_status(Ok(MachineRecord {
            id: "m-1".to_string(),
            public_address: "198.51.100.9".to_string(),
            ..MachineRecord::default()
        }));
        let err = controller.fetch_status("m-1", "tok").await.unwrap_err();
        assert_eq!(err.code, "MissingStatus");
        assert_eq!(err.outcome, Outcome::ParseError);

        let record = controller.record();
        assert_eq!(record.public_address, "198.51.100.9");
        assert!(controller.status().is_empty());
        assert_eq!(store.stored_server_address().unwrap().as_deref(), Some("203.0.113.7"));
    }

    #[tokio::test(start_paused = true)]
    async fn start_finishes_on_running() {
        let (controller, api) = controller();
        api.push_status_str("starting");
        api.push_status_str("Running");
        let (sink, mut events) = EventSink::channel();

        controller.begin(MachineCommand::Start).unwrap();
        assert_eq!(controller.action(), LifecycleAction::Starting);

        let record = controller
            .run("m-1", "tok", MachineCommand::Start, &sink.scoped())
            .await
            .unwrap();

        assert_eq!(record.status, "Running");
        assert_eq!(api.commands(), vec![MachineCommand::Start]);
        assert_eq!(api.status_calls(), 2);
        assert_eq!(controller.action(), LifecycleAction::None);
        assert!(!controller.is_polling());

        let updates = drain(&mut events);
        assert_eq!(updates.len(), 2);
        assert!(matches!(&updates[0], ControllerEvent::StatusUpdated(r) if r.status == "starting"));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_start_is_reissued_once() {
        let (controller, api) = controller();
        for status in ["off", "off", "running"] {
            api.push_status_str(status);
        }
        let (sink, mut events) = EventSink::channel();

        controller.begin(MachineCommand::Start).unwrap();
        controller
            .run("m-1", "tok", MachineCommand::Start, &sink.scoped())
            .await
            .unwrap();

        assert_eq!(api.commands(), vec![MachineCommand::Start, MachineCommand::Start]);
        assert_eq!(controller.stall_count(), 0);
        let reissued = drain(&mut events)
            .into_iter()
            .filter(|e| matches!(e, ControllerEvent::CommandReissued(_)))
            .count();
        assert_eq!(reissued, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_progress_resets_stall_count() {
        let (controller, api) = controller();
        for status in ["running", "stopping", "running", "off"] {
            api.push_status_str(status);
        }
        let (sink, _events) = EventSink::channel();

        controller.begin(MachineCommand::Stop).unwrap();
        let record = controller
            .run("m-1", "tok", MachineCommand::Stop, &sink.scoped())
            .await
            .unwrap();

        assert_eq!(record.status, "off");
        assert_eq!(api.commands(), vec![MachineCommand::Stop]);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_failure_does_not_end_the_action() {
        let (controller, api) = controller();
        api.push_status(Err(Failure::network("connection reset")));
        api.push_status_str("running");
        let (sink, mut events) = EventSink::channel();

        controller.begin(MachineCommand::Start).unwrap();
        controller
            .run("m-1", "tok", MachineCommand::Start, &sink.scoped())
            .await
            .unwrap();

        let events = drain(&mut events);
        assert_eq!(events[0].outcome(), Outcome::NetworkError);
        assert!(matches!(events[1], ControllerEvent::StatusUpdated(_)));
    }

    #[tokio::test]
    async fn command_failure_ends_the_action() {
        let (controller, api) = controller();
        api.push_command_reply(Err(Failure::http(500)));
        let (sink, _events) = EventSink::channel();

        controller.begin(MachineCommand::Stop).unwrap();
        let err = controller
            .run("m-1", "tok", MachineCommand::Stop, &sink.scoped())
            .await
            .unwrap_err();

        assert_eq!(err.outcome, Outcome::HttpError(500));
        assert_eq!(controller.action(), LifecycleAction::None);
        assert_eq!(api.status_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_caller_fetch_drives_the_action() {
        let api = Arc::new(MockMachineApi::new());
        api.push_status_str("running");
        api.set_status_delay(Duration::from_secs(3));
        let controller = Arc::new(MachineLifecycleController::new(
            api.clone(),
            &ControlConfig::default(),
        ));
        let (sink, _events) = EventSink::channel();

        controller.begin(MachineCommand::Start).unwrap();
        let run = tokio::spawn({
            let controller = Arc::clone(&controller);
            let events = sink.scoped();
            async move {
                controller
                    .run("m-1", "tok", MachineCommand::Start, &events)
                    .await
            }
        });
        while api.commands().is_empty() {
            tokio::task::yield_now().await;
        }

        // Holds the status flight across the loop's first tick.
        let record = controller.fetch_status("m-1", "tok").await.unwrap();
        assert_eq!(record.status, "running");

        let finished = run.await.unwrap().unwrap();
        assert_eq!(finished.status, "running");
        assert_eq!(api.status_calls(), 1);
        assert_eq!(api.commands(), vec![MachineCommand::Start]);
        assert_eq!(controller.action(), LifecycleAction::None);
    }

    #[tokio::test(start_paused = true)]
    async fn caller_fetches_count_toward_a_stall() {
        let api = Arc::new(MockMachineApi::new());
        for status in ["off", "off", "running"] {
            api.push_status_str(status);
        }
        let controller = Arc::new(MachineLifecycleController::new(
            api.clone(),
            &ControlConfig::default(),
        ));
        let (sink, mut events) = EventSink::channel();

        controller.begin(MachineCommand::Start).unwrap();
        let run = tokio::spawn({
            let controller = Arc::clone(&controller);
            let events = sink.scoped();
            async move {
                controller
                    .run("m-1", "tok", MachineCommand::Start, &events)
                    .await
            }
        });
        while api.commands().is_empty() {
            tokio::task::yield_now().await;
        }

        controller.fetch_status("m-1", "tok").await.unwrap();
        controller.fetch_status("m-1", "tok").await.unwrap();
        while api.commands().len() < 2 {
            tokio::task::yield_now().await;
        }

        let finished = run.await.unwrap().unwrap();
        assert_eq!(finished.status, "running");
        assert_eq!(api.commands(), vec![MachineCommand::Start, MachineCommand::Start]);
        assert!(drain(&mut events).contains(&ControllerEvent::CommandReissued(MachineCommand::Start)));
    }

    #[tokio::test]
    async fn fetch_without_an_action_decides_nothing() {
        let (controller, api) = controller();
        api.push_status_str("running");
        controller.fetch_status("m-1", "tok").await.unwrap();
        assert_eq!(controller.action(), LifecycleAction::None);
        assert_eq!(controller.stall_count(), 0);
        assert!(controller.pending.lock().is_none());

        controller.begin(MachineCommand::Stop).unwrap();
        assert_eq!(controller.action(), LifecycleAction::Stopping);
    }

    #[tokio::test]
    async fn cancelled_run_leaves_the_newer_action_alone() {
        let (controller, api) = controller();
        let (sink, _events) = EventSink::channel();

        controller.begin(MachineCommand::Start).unwrap();
        let stale = sink.scoped();
        sink.invalidate();
        controller.reset();
        controller.begin(MachineCommand::Stop).unwrap();

        api.push_command_reply(Err(Failure::http(500)));
        let err = controller
            .run("m-1", "tok", MachineCommand::Start, &stale)
            .await
            .unwrap_err();
        assert_eq!(err.outcome, Outcome::HttpError(500));
        assert_eq!(controller.action(), LifecycleAction::Stopping);
    }

    #[test]
    fn second_action_is_rejected() {
        let (controller, api) = controller();
        controller.begin(MachineCommand::Start).unwrap();

        let err = controller.begin(MachineCommand::Stop).unwrap_err();
        assert_eq!(err.outcome, Outcome::InProgress);
        assert_eq!(err.message, "Machine operation already in progress");
        assert_eq!(controller.action(), LifecycleAction::Starting);
        assert!(api.commands().is_empty());

        controller.reset();
        assert!(controller.begin(MachineCommand::Stop).is_ok());
    }
}
