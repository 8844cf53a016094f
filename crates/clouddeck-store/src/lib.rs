//! Credential and settings storage for clouddeck.
//!
//! This crate persists the last known login credentials, the connection facts
//! discovered for the managed machine, and the session timer preferences. The
//! store is a side-effect sink: the controller writes to it but never reads
//! from it to make decisions.
//!
//! Two backends are provided:
//!
//! - [`RocksCredentialStore`]: `RocksDB` with a single `settings` column family,
//!   values CBOR-encoded as [`StoredValue`]
//! - [`MemoryCredentialStore`]: a process-local map, for tests and ephemeral use
//!
//! # Example
//!
//! ```
//! use clouddeck_store::{CredentialStore, MemoryCredentialStore};
//!
//! let store = MemoryCredentialStore::new();
//! store.remember_login("user@example.com", "secret").unwrap();
//!
//! assert!(store.has_stored_credentials().unwrap());
//! assert_eq!(store.stored_host_user().unwrap().as_deref(), Some("user@example.com"));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod memory;
pub mod rocks;
pub mod schema;
pub mod types;

pub use error::{Result, StoreError};
pub use memory::MemoryCredentialStore;
pub use rocks::RocksCredentialStore;
pub use types::{SessionTimerSettings, StoredValue, TimerDisplayMode};

/// The storage trait for credentials and settings.
///
/// Implementors provide raw key/value access; the typed accessors are
/// provided on top of it.
pub trait CredentialStore: Send + Sync {
    // =========================================================================
    // Raw Access
    // =========================================================================

    /// Get the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read or decoding fails.
    fn get(&self, key: &str) -> Result<Option<StoredValue>>;

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend write or encoding fails.
    fn put(&self, key: &str, value: StoredValue) -> Result<()>;

    /// Remove the value stored under `key`. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend write fails.
    fn remove(&self, key: &str) -> Result<()>;

    /// Returns `true` if a value is stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Get a non-empty text value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    fn get_text(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .get(key)?
            .and_then(|value| value.as_text().map(str::to_string))
            .filter(|text| !text.is_empty()))
    }

    // =========================================================================
    // Credentials
    // =========================================================================

    /// The last successfully used login email.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    fn stored_email(&self) -> Result<Option<String>> {
        self.get_text(keys::EMAIL)
    }

    /// The last successfully used login password.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    fn stored_password(&self) -> Result<Option<String>> {
        self.get_text(keys::PASSWORD)
    }

    /// The host user, falling back to the stored email.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    fn stored_host_user(&self) -> Result<Option<String>> {
        match self.get_text(keys::HOST_USER)? {
            Some(user) => Ok(Some(user)),
            None => self.stored_email(),
        }
    }

    /// The host password discovered from the machine record.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    fn stored_host_password(&self) -> Result<Option<String>> {
        self.get_text(keys::HOST_PASSWORD)
    }

    /// The last known public address of the machine.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    fn stored_server_address(&self) -> Result<Option<String>> {
        self.get_text(keys::SERVER_ADDRESS)
    }

    /// Returns `true` if both an email and a password are stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    fn has_stored_credentials(&self) -> Result<bool> {
        Ok(self.contains(keys::EMAIL)? && self.contains(keys::PASSWORD)?)
    }

    /// Remove stored credentials and connection facts.
    ///
    /// Session timer preferences are kept.
    ///
    /// # Errors
    ///
    /// Returns an error if a backend write fails.
    fn clear_stored_credentials(&self) -> Result<()> {
        for key in keys::CREDENTIAL_KEYS {
            self.remove(key)?;
        }
        Ok(())
    }

    /// Record the credentials of a successful login.
    ///
    /// The email doubles as the host user.
    ///
    /// # Errors
    ///
    /// Returns an error if a backend write fails.
    fn remember_login(&self, email: &str, password: &str) -> Result<()> {
        if email.is_empty() || password.is_empty() {
            return Ok(());
        }
        self.put(keys::EMAIL, email.into())?;
        self.put(keys::PASSWORD, password.into())?;
        self.put(keys::HOST_USER, email.into())
    }

    /// Record connection facts from a machine record. Empty values are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if a backend write fails.
    fn remember_machine(
        &self,
        server_address: &str,
        host_password: &str,
        host_user: &str,
    ) -> Result<()> {
        for (key, value) in [
            (keys::SERVER_ADDRESS, server_address),
            (keys::HOST_PASSWORD, host_password),
            (keys::HOST_USER, host_user),
        ] {
            if !value.is_empty() {
                self.put(key, value.into())?;
            }
        }
        Ok(())
    }

    // =========================================================================
    // Session Timer
    // =========================================================================

    /// Load the session timer preferences, sanitizing stored values.
    ///
    /// # Errors
    ///
    /// Returns an error if a backend read fails.
    fn session_timer_settings(&self) -> Result<SessionTimerSettings> {
        let defaults = SessionTimerSettings::default();
        let integer = |key: &str, default: i64| -> Result<i64> {
            Ok(self
                .get(key)?
                .and_then(|value| value.as_integer())
                .unwrap_or(default))
        };

        let settings = SessionTimerSettings {
            hours: integer(keys::SESSION_TIMER_HOURS, defaults.hours)?,
            display_mode: TimerDisplayMode::from_i64(integer(
                keys::SESSION_TIMER_DISPLAY_MODE,
                defaults.display_mode.as_i64(),
            )?),
            warn_minutes: integer(keys::SESSION_TIMER_WARN_MINUTES, defaults.warn_minutes)?,
            hourly_reminder_enabled: self
                .get(keys::SESSION_TIMER_HOURLY_REMINDER_ENABLED)?
                .and_then(|value| value.as_flag())
                .unwrap_or(defaults.hourly_reminder_enabled),
            hourly_reminder_seconds: integer(
                keys::SESSION_TIMER_HOURLY_REMINDER_SECONDS,
                defaults.hourly_reminder_seconds,
            )?,
        };
        Ok(settings.sanitized())
    }

    /// Store the session timer preferences, sanitizing them first.
    ///
    /// # Errors
    ///
    /// Returns an error if a backend write fails.
    fn set_session_timer_settings(&self, settings: SessionTimerSettings) -> Result<()> {
        let settings = settings.sanitized();
        self.put(keys::SESSION_TIMER_HOURS, settings.hours.into())?;
        self.put(
            keys::SESSION_TIMER_DISPLAY_MODE,
            settings.display_mode.as_i64().into(),
        )?;
        self.put(keys::SESSION_TIMER_WARN_MINUTES, settings.warn_minutes.into())?;
        self.put(
            keys::SESSION_TIMER_HOURLY_REMINDER_ENABLED,
            settings.hourly_reminder_enabled.into(),
        )?;
        self.put(
            keys::SESSION_TIMER_HOURLY_REMINDER_SECONDS,
            settings.hourly_reminder_seconds.into(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_lifecycle() {
        let store = MemoryCredentialStore::new();
        assert!(!store.has_stored_credentials().unwrap());

        store.remember_login("a@b.com", "pw").unwrap();
        assert!(store.has_stored_credentials().unwrap());
        assert_eq!(store.stored_email().unwrap().as_deref(), Some("a@b.com"));
        assert_eq!(store.stored_password().unwrap().as_deref(), Some("pw"));

        store.clear_stored_credentials().unwrap();
        assert!(!store.has_stored_credentials().unwrap());
        assert!(store.stored_host_user().unwrap().is_none());
    }

    #[test]
    fn remember_login_ignores_empty_values() {
        let store = MemoryCredentialStore::new();
        store.remember_login("", "pw").unwrap();
        assert!(!store.has_stored_credentials().unwrap());
    }

    #[test]
    fn host_user_falls_back_to_email() {
        let store = MemoryCredentialStore::new();
        store.put(keys::EMAIL, "a@b.com".into()).unwrap();
        assert_eq!(store.stored_host_user().unwrap().as_deref(), Some("a@b.com"));

        store.put(keys::HOST_USER, "host".into()).unwrap();
        assert_eq!(store.stored_host_user().unwrap().as_deref(), Some("host"));
    }

    #[test]
    fn remember_machine_skips_empty() {
        let store = MemoryCredentialStore::new();
        store.remember_machine("1.2.3.4", "", "user").unwrap();
        assert_eq!(
            store.stored_server_address().unwrap().as_deref(),
            Some("1.2.3.4")
        );
        assert!(store.stored_host_password().unwrap().is_none());

        store.remember_machine("", "hostpw", "").unwrap();
        assert_eq!(
            store.stored_server_address().unwrap().as_deref(),
            Some("1.2.3.4")
        );
        assert_eq!(
            store.stored_host_password().unwrap().as_deref(),
            Some("hostpw")
        );
    }

    #[test]
    fn clear_keeps_timer_settings() {
        let store = MemoryCredentialStore::new();
        let settings = SessionTimerSettings {
            hours: 3,
            ..SessionTimerSettings::default()
        };
        store.set_session_timer_settings(settings).unwrap();
        store.remember_login("a@b.com", "pw").unwrap();
        store.clear_stored_credentials().unwrap();
        assert_eq!(store.session_timer_settings().unwrap().hours, 3);
    }

    #[test]
    fn timer_settings_are_sanitized() {
        let store = MemoryCredentialStore::new();
        assert_eq!(
            store.session_timer_settings().unwrap(),
            SessionTimerSettings::default()
        );

        store.put(keys::SESSION_TIMER_HOURS, 99_i64.into()).unwrap();
        store.put(keys::SESSION_TIMER_DISPLAY_MODE, 7_i64.into()).unwrap();
        store.put(keys::SESSION_TIMER_WARN_MINUTES, 0_i64.into()).unwrap();
        store
            .put(keys::SESSION_TIMER_HOURLY_REMINDER_ENABLED, false.into())
            .unwrap();
        let settings = store.session_timer_settings().unwrap();
        assert_eq!(settings.hours, 24);
        assert_eq!(settings.display_mode, TimerDisplayMode::BeforeEnd);
        assert_eq!(settings.warn_minutes, 5);
        assert!(!settings.hourly_reminder_enabled);

        store
            .set_session_timer_settings(SessionTimerSettings {
                hourly_reminder_seconds: 600,
                display_mode: TimerDisplayMode::Hidden,
                ..SessionTimerSettings::default()
            })
            .unwrap();
        let settings = store.session_timer_settings().unwrap();
        assert_eq!(settings.hourly_reminder_seconds, 60);
        assert_eq!(settings.display_mode, TimerDisplayMode::Hidden);
    }
}
