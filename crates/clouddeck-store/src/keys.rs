//! Setting keys.
//!
//! All keys live in the `clouddeck/` namespace so a store can be shared with
//! unrelated settings.

/// Last successfully used login email.
pub const EMAIL: &str = "clouddeck/email";

/// Last successfully used login password.
pub const PASSWORD: &str = "clouddeck/password";

/// User name for connecting to the machine host.
pub const HOST_USER: &str = "clouddeck/hostUser";

/// Password for connecting to the machine host.
pub const HOST_PASSWORD: &str = "clouddeck/hostPassword";

/// Last known public address of the machine.
pub const SERVER_ADDRESS: &str = "clouddeck/serverAddress";

/// Session timer length in hours.
pub const SESSION_TIMER_HOURS: &str = "clouddeck/sessionTimerHours";

/// Session timer display mode.
pub const SESSION_TIMER_DISPLAY_MODE: &str = "clouddeck/sessionTimerDisplayMode";

/// Minutes before the end of a session at which to warn.
pub const SESSION_TIMER_WARN_MINUTES: &str = "clouddeck/sessionTimerWarnMinutes";

/// Whether the hourly reminder is enabled.
pub const SESSION_TIMER_HOURLY_REMINDER_ENABLED: &str =
    "clouddeck/sessionTimerHourlyReminderEnabled";

/// How long the hourly reminder is shown, in seconds.
pub const SESSION_TIMER_HOURLY_REMINDER_SECONDS: &str =
    "clouddeck/sessionTimerHourlyReminderSeconds";

/// Keys removed by `clear_stored_credentials`.
pub const CREDENTIAL_KEYS: [&str; 5] = [EMAIL, PASSWORD, HOST_USER, HOST_PASSWORD, SERVER_ADDRESS];

/// Encode a key for storage.
#[must_use]
pub fn encode(key: &str) -> Vec<u8> {
    key.as_bytes().to_vec()
}
