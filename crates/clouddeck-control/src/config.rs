//! Controller configuration.

use std::time::Duration;

use serde::Deserialize;

use crate::error::{ControlError, Result};

/// Configuration for the machine-management side of the controller.
#[derive(Debug, Clone, Deserialize)]
pub struct ControlConfig {
    /// Base URL of the machine-management API.
    #[serde(default = "ControlConfig::default_api_base_url")]
    pub api_base_url: String,

    /// Interval between status polls while a start or stop is in progress.
    #[serde(default = "ControlConfig::default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Consecutive stale polls before the lifecycle command is sent again.
    #[serde(default = "ControlConfig::default_stall_threshold")]
    pub stall_threshold: u32,

    /// User attribute that holds the account id.
    #[serde(default = "ControlConfig::default_account_attribute")]
    pub account_attribute: String,

    /// Request timeout in seconds.
    #[serde(default = "ControlConfig::default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// Connect timeout in seconds.
    #[serde(default = "ControlConfig::default_connect_timeout")]
    pub connect_timeout_seconds: u64,
}

impl ControlConfig {
    fn default_api_base_url() -> String {
        "https://api.clouddeck.app".to_string()
    }

    const fn default_poll_interval() -> u64 {
        2000
    }

    const fn default_stall_threshold() -> u32 {
        2
    }

    fn default_account_attribute() -> String {
        "custom:account".to_string()
    }

    const fn default_request_timeout() -> u64 {
        30
    }

    const fn default_connect_timeout() -> u64 {
        5
    }

    /// Create a configuration pointing at a different API.
    #[must_use]
    pub fn with_base_url(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            ..Self::default()
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Supported environment variables:
    /// - `CLOUDDECK_API_URL`: machine-management API base URL
    /// - `CLOUDDECK_POLL_INTERVAL_MS`: status poll interval
    /// - `CLOUDDECK_STALL_THRESHOLD`: stale polls before re-sending a command
    /// - `CLOUDDECK_ACCOUNT_ATTRIBUTE`: user attribute holding the account id
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("CLOUDDECK_API_URL") {
            config.api_base_url = val;
        }
        if let Ok(val) = std::env::var("CLOUDDECK_POLL_INTERVAL_MS") {
            if let Ok(n) = val.parse() {
                config.poll_interval_ms = n;
            }
        }
        if let Ok(val) = std::env::var("CLOUDDECK_STALL_THRESHOLD") {
            if let Ok(n) = val.parse() {
                config.stall_threshold = n;
            }
        }
        if let Ok(val) = std::env::var("CLOUDDECK_ACCOUNT_ATTRIBUTE") {
            config.account_attribute = val;
        }

        config
    }

    /// Get the poll interval as a `Duration`.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Get the request timeout as a `Duration`.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Get the connect timeout as a `Duration`.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    /// Check that the configuration can be used.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Config` for a zero poll interval, a zero stall
    /// threshold, or a blank base URL or account attribute.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(ControlError::Config(
                "poll interval must be greater than zero".to_string(),
            ));
        }
        if self.stall_threshold == 0 {
            return Err(ControlError::Config(
                "stall threshold must be greater than zero".to_string(),
            ));
        }
        if self.api_base_url.trim().is_empty() {
            return Err(ControlError::Config("API base URL is empty".to_string()));
        }
        if self.account_attribute.trim().is_empty() {
            return Err(ControlError::Config("account attribute is empty".to_string()));
        }
        Ok(())
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            api_base_url: Self::default_api_base_url(),
            poll_interval_ms: Self::default_poll_interval(),
            stall_threshold: Self::default_stall_threshold(),
            account_attribute: Self::default_account_attribute(),
            request_timeout_seconds: Self::default_request_timeout(),
            connect_timeout_seconds: Self::default_connect_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ControlConfig::default();
        assert_eq!(config.api_base_url, "https://api.clouddeck.app");
        assert_eq!(config.poll_interval(), Duration::from_secs(2));
        assert_eq!(config.stall_threshold, 2);
        assert_eq!(config.account_attribute, "custom:account");
        assert_eq!(config.connect_timeout(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_values_are_rejected() {
        let config = ControlConfig {
            stall_threshold: 0,
            ..ControlConfig::default()
        };
        assert!(matches!(config.validate(), Err(ControlError::Config(_))));

        let config = ControlConfig {
            poll_interval_ms: 0,
            ..ControlConfig::default()
        };
        assert!(matches!(config.validate(), Err(ControlError::Config(_))));
    }

    #[test]
    fn deserialize_with_defaults() {
        let config: ControlConfig = serde_json::from_str(r#"{"stall_threshold": 3}"#).unwrap();
        assert_eq!(config.stall_threshold, 3);
        assert_eq!(config.poll_interval_ms, 2000);
    }
}
