//! Session control for a clouddeck machine.
//!
//! This crate ties authentication, identity resolution and the machine
//! lifecycle together behind one asynchronous facade, [`CloudDeckController`].
//! Each operation returns immediately and completes through a single
//! [`ControllerEvent`]; [`CloudDeckController::cancel`] aborts everything in
//! flight.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    CloudDeckController                      │
//! │  ┌─────────────┐ ┌──────────────────┐ ┌──────────────────┐  │
//! │  │ AuthSession │ │ IdentityResolver │ │ MachineLifecycle │  │
//! │  │  (login)    │ │ token → account  │ │ start/stop/poll  │  │
//! │  │             │ │ → machine id     │ │ stall re-issue   │  │
//! │  └─────────────┘ └──────────────────┘ └──────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!               ┌──────────────┼──────────────┐
//!               ▼              ▼              ▼
//!        ┌──────────┐   ┌──────────┐   ┌──────────────┐
//!        │ Identity │   │ Machine  │   │ Credential   │
//!        │ provider │   │   API    │   │ store        │
//!        └──────────┘   └──────────┘   └──────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use clouddeck_auth::AuthConfig;
//! use clouddeck_control::{CloudDeckController, ControlConfig, ControllerEvent};
//! use clouddeck_store::MemoryCredentialStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(MemoryCredentialStore::new());
//! let (controller, mut events) =
//!     CloudDeckController::new(AuthConfig::from_env(), ControlConfig::from_env(), store)?;
//!
//! let token = controller.access_token();
//! controller.start("m-1", &token);
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         ControllerEvent::StatusUpdated(record) => println!("status: {}", record.status),
//!         ControllerEvent::StartFinished { result, .. } => {
//!             println!("start finished: {:?}", result.map(|record| record.status));
//!             break;
//!         }
//!         _ => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! See the [`lifecycle`] module for the poll decision rules.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod host;
pub mod identity;
pub mod lifecycle;
pub mod machine;
pub mod machine_client;
pub mod types;

pub use config::ControlConfig;
pub use controller::CloudDeckController;
pub use error::{ControlError, Result};
pub use events::{ControllerEvent, ControllerEvents, EventSink};
pub use host::{is_clouddeck_host, normalize_address};
pub use identity::IdentityResolver;
pub use lifecycle::{LifecycleAction, MachineCommand, PollDecision, StallTracker, StatusClass};
pub use machine::MachineLifecycleController;
pub use machine_client::{HttpMachineApi, MachineApi};
pub use types::{AccountRecord, MachineRecord};

#[cfg(any(test, feature = "test-utils"))]
pub use machine_client::MockMachineApi;

// Re-export commonly used types from dependencies for convenience
pub use clouddeck_auth::{LoginOutcome, TokenSet};
pub use clouddeck_core::{Failure, Outcome};
