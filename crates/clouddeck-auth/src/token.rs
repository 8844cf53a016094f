//! Access token bookkeeping.

use chrono::{DateTime, TimeDelta, Utc};

use crate::client::AuthenticationResult;

/// Tokens from the last successful login.
///
/// A non-empty access token and an expiry instant exist only together. The
/// default value is the empty set held before login and after any failure.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct TokenSet {
    /// Bearer token for API calls.
    pub access_token: String,
    /// OpenID identity token.
    pub id_token: String,
    /// Token for obtaining new access tokens.
    pub refresh_token: String,
    /// Token type, normally `Bearer`.
    pub token_type: String,
    /// Lifetime reported by the provider, in seconds.
    pub expires_in: i64,
    /// Absolute expiry instant.
    pub expires_at: Option<DateTime<Utc>>,
}

impl TokenSet {
    /// Build a token set from an authentication result received at `now`.
    ///
    /// A non-positive lifetime yields a token that is already expired. An
    /// expiry beyond the representable range saturates at the latest instant.
    #[must_use]
    pub fn issued_at(result: AuthenticationResult, now: DateTime<Utc>) -> Self {
        let expires_in = result.expires_in.max(0);
        let expires_at = TimeDelta::try_seconds(expires_in)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        Self {
            access_token: result.access_token,
            id_token: result.id_token,
            refresh_token: result.refresh_token,
            token_type: result.token_type,
            expires_in,
            expires_at: Some(expires_at),
        }
    }

    /// Returns `true` if no access token is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.access_token.is_empty()
    }

    /// Seconds until expiry as seen at `now`, never negative.
    #[must_use]
    pub fn seconds_remaining_at(&self, now: DateTime<Utc>) -> i64 {
        self.expires_at
            .map_or(0, |at| at.signed_duration_since(now).num_seconds().max(0))
    }

    /// Seconds until expiry, never negative.
    #[must_use]
    pub fn seconds_remaining(&self) -> i64 {
        self.seconds_remaining_at(Utc::now())
    }

    /// Returns `true` once no time remains.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.seconds_remaining() == 0
    }
}

impl std::fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSet")
            .field("has_access_token", &!self.access_token.is_empty())
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}
