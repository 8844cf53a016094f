//! Records returned by the machine-management API.

use serde::{Deserialize, Serialize};

/// Snapshot of the managed machine.
///
/// Replaced wholesale on every successful status fetch. The status is kept
/// as the raw provider string; an empty status means it was never fetched.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineRecord {
    /// Machine id.
    pub id: String,
    /// Raw provider status, e.g. `running`, `off`, `starting`, `stopping`.
    pub status: String,
    /// Password for the remote host session.
    pub password: String,
    /// Public address of the machine.
    pub public_address: String,
    /// When the machine was last started, as Unix seconds. Zero if unknown.
    pub last_started_at: i64,
    /// When the machine was created, as Unix seconds. Zero if unknown.
    pub created_at: i64,
}

impl std::fmt::Debug for MachineRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MachineRecord")
            .field("id", &self.id)
            .field("status", &self.status)
            .field("public_address", &self.public_address)
            .field("last_started_at", &self.last_started_at)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// Account resource linking a user to their machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    /// Account id.
    pub account_id: String,
    /// Machine owned by the account.
    pub machine_id: String,
}
