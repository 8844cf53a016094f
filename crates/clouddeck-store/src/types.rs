//! Value types stored in the settings store.
//!
//! These types represent persisted credentials and user preferences.

use serde::{Deserialize, Serialize};

/// A typed setting value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoredValue {
    /// A string value.
    Text(String),
    /// An integer value.
    Integer(i64),
    /// A boolean value.
    Flag(bool),
}

impl StoredValue {
    /// Return the string value, if this is text.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Return the integer value, converting numeric text.
    #[must_use]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
            Self::Flag(_) => None,
        }
    }

    /// Return the boolean value, converting `"true"`/`"false"` text.
    #[must_use]
    pub fn as_flag(&self) -> Option<bool> {
        match self {
            Self::Flag(b) => Some(*b),
            Self::Text(s) => s.trim().parse().ok(),
            Self::Integer(n) => Some(*n != 0),
        }
    }
}

impl From<&str> for StoredValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for StoredValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for StoredValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<bool> for StoredValue {
    fn from(value: bool) -> Self {
        Self::Flag(value)
    }
}

/// When the session timer is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimerDisplayMode {
    /// Always visible.
    Always,
    /// Visible only shortly before the session ends.
    #[default]
    BeforeEnd,
    /// Never visible.
    Hidden,
}

impl TimerDisplayMode {
    /// Convert to the stored integer representation.
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        match self {
            Self::Always => 0,
            Self::BeforeEnd => 1,
            Self::Hidden => 2,
        }
    }

    /// Convert from the stored integer, using the default when out of range.
    #[must_use]
    pub const fn from_i64(value: i64) -> Self {
        match value {
            0 => Self::Always,
            2 => Self::Hidden,
            _ => Self::BeforeEnd,
        }
    }
}

/// Session timer preferences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTimerSettings {
    /// Session length in hours (1–24).
    pub hours: i64,
    /// When to show the timer.
    pub display_mode: TimerDisplayMode,
    /// Warn this many minutes before the end (1–120).
    pub warn_minutes: i64,
    /// Whether to remind the user every hour.
    pub hourly_reminder_enabled: bool,
    /// How long the hourly reminder is shown, in seconds (1–60).
    pub hourly_reminder_seconds: i64,
}

impl SessionTimerSettings {
    /// Default session length in hours.
    pub const DEFAULT_HOURS: i64 = 8;
    /// Default warning lead time in minutes.
    pub const DEFAULT_WARN_MINUTES: i64 = 5;
    /// Default reminder duration in seconds.
    pub const DEFAULT_HOURLY_REMINDER_SECONDS: i64 = 5;

    /// Clamp session hours: below 1 resets to the default, above 24 caps at 24.
    #[must_use]
    pub const fn sanitize_hours(hours: i64) -> i64 {
        sanitize(hours, 1, 24, Self::DEFAULT_HOURS)
    }

    /// Clamp warning minutes: below 1 resets to the default, above 120 caps at 120.
    #[must_use]
    pub const fn sanitize_warn_minutes(minutes: i64) -> i64 {
        sanitize(minutes, 1, 120, Self::DEFAULT_WARN_MINUTES)
    }

    /// Clamp reminder seconds: below 1 resets to the default, above 60 caps at 60.
    #[must_use]
    pub const fn sanitize_hourly_reminder_seconds(seconds: i64) -> i64 {
        sanitize(seconds, 1, 60, Self::DEFAULT_HOURLY_REMINDER_SECONDS)
    }

    /// Return a copy with every field sanitized.
    #[must_use]
    pub const fn sanitized(self) -> Self {
        Self {
            hours: Self::sanitize_hours(self.hours),
            display_mode: self.display_mode,
            warn_minutes: Self::sanitize_warn_minutes(self.warn_minutes),
            hourly_reminder_enabled: self.hourly_reminder_enabled,
            hourly_reminder_seconds: Self::sanitize_hourly_reminder_seconds(
                self.hourly_reminder_seconds,
            ),
        }
    }
}

impl Default for SessionTimerSettings {
    fn default() -> Self {
        Self {
            hours: Self::DEFAULT_HOURS,
            display_mode: TimerDisplayMode::default(),
            warn_minutes: Self::DEFAULT_WARN_MINUTES,
            hourly_reminder_enabled: true,
            hourly_reminder_seconds: Self::DEFAULT_HOURLY_REMINDER_SECONDS,
        }
    }
}

const fn sanitize(value: i64, min: i64, max: i64, default: i64) -> i64 {
    if value < min {
        default
    } else if value > max {
        max
    } else {
        value
    }
}
