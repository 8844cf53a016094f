//! Machine lifecycle actions and stall detection.
//!
//! This module holds the pure decision logic applied to every successful
//! status poll while a start or stop is in progress.
//!
//! # State Machine
//!
//! ```text
//!                  start()                      stop()
//!     ┌──────┐ ───────────▶ ┌──────────┐   ┌──────────┐ ◀─────────── ┌──────┐
//!     │ None │              │ Starting │   │ Stopping │              │ None │
//!     └──────┘ ◀─────────── └────┬─────┘   └────┬─────┘ ───────────▶ └──────┘
//!        "running" / failure     │              │      "off" / failure
//!                                │ poll         │ poll
//!                                ▼              ▼
//!                  ┌──────────────────────────────────────┐
//!                  │ target       → Finished              │
//!                  │ transitional → stall count = 0       │
//!                  │ other        → stall count + 1       │
//!                  │              → at threshold: Reissue │
//!                  └──────────────────────────────────────┘
//! ```

use std::fmt;

/// A command understood by the machine-management API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MachineCommand {
    /// Power the machine on.
    Start,
    /// Power the machine off.
    Stop,
}

impl MachineCommand {
    /// The path segment for this command.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
        }
    }
}

impl fmt::Display for MachineCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The lifecycle action currently driving the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LifecycleAction {
    /// No start or stop is in progress.
    #[default]
    None,
    /// Waiting for the machine to report `running`.
    Starting,
    /// Waiting for the machine to report `off`.
    Stopping,
}

impl LifecycleAction {
    /// The action driven by `command`.
    #[must_use]
    pub const fn for_command(command: MachineCommand) -> Self {
        match command {
            MachineCommand::Start => Self::Starting,
            MachineCommand::Stop => Self::Stopping,
        }
    }

    /// The command this action sends, if any.
    #[must_use]
    pub const fn command(&self) -> Option<MachineCommand> {
        match self {
            Self::None => None,
            Self::Starting => Some(MachineCommand::Start),
            Self::Stopping => Some(MachineCommand::Stop),
        }
    }

    /// The status that ends this action.
    #[must_use]
    pub const fn target_status(&self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Starting => Some("running"),
            Self::Stopping => Some("off"),
        }
    }

    /// The status reported while the machine makes progress.
    #[must_use]
    pub const fn transitional_status(&self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Starting => Some("starting"),
            Self::Stopping => Some("stopping"),
        }
    }

    /// Returns `true` for `Starting` and `Stopping`.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        !matches!(self, Self::None)
    }

    /// Classify a raw provider status against this action.
    #[must_use]
    pub fn classify(&self, status: &str) -> StatusClass {
        let status = status.trim();
        if self
            .target_status()
            .is_some_and(|target| status.eq_ignore_ascii_case(target))
        {
            StatusClass::Target
        } else if self
            .transitional_status()
            .is_some_and(|transitional| status.eq_ignore_ascii_case(transitional))
        {
            StatusClass::Transitional
        } else {
            StatusClass::Other
        }
    }
}

impl fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::Starting => "starting",
            Self::Stopping => "stopping",
        })
    }
}

/// How a status relates to the action in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// The action is complete.
    Target,
    /// The machine is moving towards the target.
    Transitional,
    /// Anything else, including `unknown` and unrecognized provider strings.
    Other,
}

/// What the poll loop does after a successful status fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollDecision {
    /// Stop polling and report success.
    Finished,
    /// Keep polling.
    Continue,
    /// Send the command again and keep polling.
    Reissue,
}

/// Counts consecutive polls that neither reached the target nor showed progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StallTracker {
    count: u32,
    threshold: u32,
}

impl StallTracker {
    /// Create a tracker that asks for a re-issue after `threshold` stale polls.
    ///
    /// A threshold of zero is treated as one.
    #[must_use]
    pub const fn new(threshold: u32) -> Self {
        Self {
            count: 0,
            threshold: if threshold == 0 { 1 } else { threshold },
        }
    }

    /// Consecutive stale polls seen so far.
    #[must_use]
    pub const fn count(&self) -> u32 {
        self.count
    }

    /// Forget any stale polls.
    pub fn reset(&mut self) {
        self.count = 0;
    }

    /// Record a polled status for `action` and decide what happens next.
    pub fn observe(&mut self, action: LifecycleAction, status: &str) -> PollDecision {
        if !action.is_active() {
            return PollDecision::Continue;
        }
        match action.classify(status) {
            StatusClass::Target => {
                self.count = 0;
                PollDecision::Finished
            }
            StatusClass::Transitional => {
                self.count = 0;
                PollDecision::Continue
            }
            StatusClass::Other => {
                self.count += 1;
                if self.count >= self.threshold {
                    self.count = 0;
                    PollDecision::Reissue
                } else {
                    PollDecision::Continue
                }
            }
        }
    }
}

impl Default for StallTracker {
    fn default() -> Self {
        Self::new(2)
    }
}
