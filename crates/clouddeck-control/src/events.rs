//! Completion events and their delivery channel.
//!
//! Every event is stamped with the cancellation epoch current when its
//! operation was issued. [`ControllerEvents`] drops events stamped with an
//! older epoch, so nothing issued before a cancel is observed after it, even
//! if it was already queued.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use clouddeck_auth::LoginOutcome;
use clouddeck_core::{Failure, JsonObject, Outcome, Result};

use crate::lifecycle::{LifecycleAction, MachineCommand};
use crate::types::MachineRecord;

/// A completion or progress notification from the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerEvent {
    /// A login attempt completed.
    LoginFinished(Result<LoginOutcome>),
    /// The account id was found; the machine id lookup follows.
    AccountIdResolved(String),
    /// The chained machine id lookup completed.
    MachineIdResolved(Result<String>),
    /// A status fetch succeeded.
    StatusUpdated(MachineRecord),
    /// A status fetch failed.
    StatusFailed(Failure),
    /// A stalled lifecycle command was sent again.
    CommandReissued(MachineCommand),
    /// A start completed. `status` is the machine status at that point.
    StartFinished {
        /// Final record on success, the failure otherwise.
        result: Result<MachineRecord>,
        /// Last known machine status.
        status: String,
    },
    /// A stop completed. `status` is the machine status at that point.
    StopFinished {
        /// Final record on success, the failure otherwise.
        result: Result<MachineRecord>,
        /// Last known machine status.
        status: String,
    },
    /// A pairing client add completed with the parsed response body.
    ClientAdded(Result<JsonObject>),
}

impl ControllerEvent {
    /// The completion event for a start or stop.
    #[must_use]
    pub fn lifecycle_finished(
        action: LifecycleAction,
        result: Result<MachineRecord>,
        status: String,
    ) -> Self {
        match action {
            LifecycleAction::Stopping => Self::StopFinished { result, status },
            LifecycleAction::Starting | LifecycleAction::None => {
                Self::StartFinished { result, status }
            }
        }
    }

    /// The canonical outcome carried by this event.
    #[must_use]
    pub fn outcome(&self) -> Outcome {
        match self {
            Self::LoginFinished(Ok(outcome)) => outcome.outcome(),
            Self::LoginFinished(Err(failure))
            | Self::MachineIdResolved(Err(failure))
            | Self::StatusFailed(failure)
            | Self::StartFinished {
                result: Err(failure),
                ..
            }
            | Self::StopFinished {
                result: Err(failure),
                ..
            }
            | Self::ClientAdded(Err(failure)) => failure.outcome,
            _ => Outcome::Success,
        }
    }

    /// The failure carried by this event, if any.
    #[must_use]
    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Self::LoginFinished(Err(failure))
            | Self::MachineIdResolved(Err(failure))
            | Self::StatusFailed(failure)
            | Self::StartFinished {
                result: Err(failure),
                ..
            }
            | Self::StopFinished {
                result: Err(failure),
                ..
            }
            | Self::ClientAdded(Err(failure)) => Some(failure),
            _ => None,
        }
    }
}

/// Sending half of the event channel, bound to one cancellation epoch.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<(u64, ControllerEvent)>,
    epoch: Arc<AtomicU64>,
    issued: u64,
}

impl EventSink {
    /// Create a connected sink and receiver.
    #[must_use]
    pub fn channel() -> (Self, ControllerEvents) {
        let (tx, rx) = mpsc::unbounded_channel();
        let epoch = Arc::new(AtomicU64::new(0));
        let sink = Self {
            tx,
            epoch: Arc::clone(&epoch),
            issued: 0,
        };
        (sink, ControllerEvents { rx, epoch })
    }

    /// A sink stamped with the current epoch.
    #[must_use]
    pub fn scoped(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            epoch: Arc::clone(&self.epoch),
            issued: self.epoch.load(Ordering::Acquire),
        }
    }

    /// Returns `true` if a cancel happened after this sink was scoped.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.epoch.load(Ordering::Acquire) != self.issued
    }

    /// Deliver `event`. Returns `false` if it was dropped.
    pub fn emit(&self, event: ControllerEvent) -> bool {
        if self.is_stale() {
            tracing::trace!("Dropping event from a cancelled operation");
            return false;
        }
        self.tx.send((self.issued, event)).is_ok()
    }

    /// Start a new epoch. Events from earlier epochs are no longer delivered.
    pub fn invalidate(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::AcqRel) + 1
    }
}

/// Receiving half of the event channel.
#[derive(Debug)]
pub struct ControllerEvents {
    rx: mpsc::UnboundedReceiver<(u64, ControllerEvent)>,
    epoch: Arc<AtomicU64>,
}

impl ControllerEvents {
    /// Wait for the next event. Returns `None` once the controller is gone.
    pub async fn recv(&mut self) -> Option<ControllerEvent> {
        loop {
            let (stamp, event) = self.rx.recv().await?;
            if stamp == self.epoch.load(Ordering::Acquire) {
                return Some(event);
            }
        }
    }

    /// Take the next event if one is ready.
    pub fn try_recv(&mut self) -> Option<ControllerEvent> {
        while let Ok((stamp, event)) = self.rx.try_recv() {
            if stamp == self.epoch.load(Ordering::Acquire) {
                return Some(event);
            }
        }
        None
    }
}
