//! Login state and credential validation.
//!
//! An [`AuthSession`] moves between `idle` and `logging-in`. Only one login
//! may be outstanding; a second one is rejected with `in-progress`. Any
//! outcome other than full authentication leaves the token set empty.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;

use clouddeck_core::{codes, Failure, Flight, Outcome, Result};
use clouddeck_store::CredentialStore;

use crate::client::{AuthChallenge, AuthResponse, IdentityProvider};
use crate::token::TokenSet;

/// The non-failure results of a login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    /// Tokens were issued.
    Authenticated(TokenSet),
    /// The provider demands a challenge. The caller must answer it out of band.
    Challenge(AuthChallenge),
}

impl LoginOutcome {
    /// The canonical outcome for this result.
    #[must_use]
    pub const fn outcome(&self) -> Outcome {
        match self {
            Self::Authenticated(_) => Outcome::Success,
            Self::Challenge(_) => Outcome::ChallengeRequired,
        }
    }
}

/// Check login input before anything is sent.
///
/// Returns the trimmed email. The password is only checked for blankness.
///
/// # Errors
///
/// Returns an `invalid-input` failure naming the first problem found.
pub fn validate_credentials<'a>(email: &'a str, password: &str) -> Result<&'a str> {
    let email = email.trim();
    let password_blank = password.trim().is_empty();

    match (email.is_empty(), password_blank) {
        (true, true) => Err(Failure::new(
            codes::EMPTY_CREDENTIALS,
            "Email and password are required",
        )),
        (true, false) => Err(Failure::new(codes::EMPTY_EMAIL, "Email is required")),
        (false, true) => Err(Failure::new(codes::EMPTY_PASSWORD, "Password is required")),
        (false, false) if !is_plausible_email(email) => Err(Failure::new(
            codes::INVALID_EMAIL,
            "Email address is invalid",
        )),
        (false, false) => Ok(email),
    }
}

fn is_plausible_email(email: &str) -> bool {
    match email.find('@') {
        Some(at) if at > 0 => email[at + 1..].contains('.'),
        _ => false,
    }
}

/// Owns credential submission and the resulting token set.
pub struct AuthSession {
    provider: Arc<dyn IdentityProvider>,
    store: Option<Arc<dyn CredentialStore>>,
    tokens: RwLock<TokenSet>,
    last_email: RwLock<String>,
    flight: Flight,
}

impl AuthSession {
    /// Create a session that does not persist credentials.
    #[must_use]
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self {
            provider,
            store: None,
            tokens: RwLock::new(TokenSet::default()),
            last_email: RwLock::new(String::new()),
            flight: Flight::new(),
        }
    }

    /// Create a session that records successful logins in `store`.
    #[must_use]
    pub fn with_store(
        provider: Arc<dyn IdentityProvider>,
        store: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            store: Some(store),
            ..Self::new(provider)
        }
    }

    /// Submit credentials.
    ///
    /// The token set is cleared when the attempt starts and only refilled on
    /// full authentication.
    ///
    /// # Errors
    ///
    /// - `in-progress` if another login is outstanding (tokens untouched)
    /// - `invalid-input` for blank or malformed input, before any request
    /// - the classified provider or transport failure otherwise
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome> {
        let Some(_guard) = self.flight.try_acquire() else {
            return Err(Failure::in_progress("Login already in progress"));
        };

        self.clear();
        let email = validate_credentials(email, password)?;

        tracing::debug!("Submitting credentials");
        match self.provider.initiate_auth(email, password).await? {
            AuthResponse::Authenticated(result) => {
                let tokens = TokenSet::issued_at(result, Utc::now());
                *self.tokens.write() = tokens.clone();
                *self.last_email.write() = email.to_string();
                self.remember(email, password);

                tracing::info!(expires_in = tokens.expires_in, "Login succeeded");
                Ok(LoginOutcome::Authenticated(tokens))
            }
            AuthResponse::Challenge(challenge) => {
                tracing::info!(challenge = %challenge.name, "Login requires a challenge");
                Ok(LoginOutcome::Challenge(challenge))
            }
        }
    }

    fn remember(&self, email: &str, password: &str) {
        if let Some(store) = &self.store {
            if let Err(e) = store.remember_login(email, password) {
                tracing::warn!(error = %e, "Failed to store credentials");
            }
        }
    }

    /// A copy of the current token set.
    #[must_use]
    pub fn tokens(&self) -> TokenSet {
        self.tokens.read().clone()
    }

    /// The current access token, empty when not logged in.
    #[must_use]
    pub fn access_token(&self) -> String {
        self.tokens.read().access_token.clone()
    }

    /// The email of the last successful login.
    #[must_use]
    pub fn last_email(&self) -> String {
        self.last_email.read().clone()
    }

    /// Returns `true` while a login is outstanding.
    #[must_use]
    pub fn is_logging_in(&self) -> bool {
        self.flight.is_busy()
    }

    /// Forget the current tokens.
    pub fn clear(&self) {
        *self.tokens.write() = TokenSet::default();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use clouddeck_store::MemoryCredentialStore;

    use super::*;
    use crate::client::MockIdentityProvider;

    fn session() -> (AuthSession, Arc<MockIdentityProvider>) {
        let provider = Arc::new(MockIdentityProvider::new());
        (AuthSession::new(provider.clone()), provider)
    }

    #[test]
    fn blank_input_messages_are_distinct() {
        let cases = [
            ("", "", "EmptyCredentials", "Email and password are required"),
            ("  ", "pw", "EmptyEmail", "Email is required"),
            ("a@b.com", " ", "EmptyPassword", "Password is required"),
        ];
        for (email, password, code, message) in cases {
            let err = validate_credentials(email, password).unwrap_err();
            assert_eq!(err.outcome, Outcome::InvalidInput);
            assert_eq!(err.code, code);
            assert_eq!(err.message, message);
        }
    }

    #[test]
    fn malformed_emails_are_rejected() {
        for email in ["plain", "@b.com", "a@bcom", "a.b@com", "a@"] {
            let err = validate_credentials(email, "pw").unwrap_err();
            assert_eq!(err.code, "InvalidEmail", "email {email:?}");
            assert_eq!(err.message, "Email address is invalid");
        }
        assert_eq!(validate_credentials(" a@b.com ", "pw"), Ok("a@b.com"));
    }

    #[tokio::test]
    async fn invalid_input_sends_nothing() {
        let (session, provider) = session();
        let err = session.login("", "pw").await.unwrap_err();
        assert_eq!(err.outcome, Outcome::InvalidInput);
        assert_eq!(provider.login_calls(), 0);
        assert!(!session.is_logging_in());
    }

    #[tokio::test]
    async fn success_fills_tokens_and_store() {
        let provider = Arc::new(MockIdentityProvider::new());
        provider.push_tokens("at", 3600);
        let store = Arc::new(MemoryCredentialStore::new());
        let session = AuthSession::with_store(provider, store.clone());

        let outcome = session.login(" a@b.com ", "pw").await.unwrap();
        assert_eq!(outcome.outcome(), Outcome::Success);

        let tokens = session.tokens();
        assert_eq!(tokens.access_token, "at");
        assert!((3590..=3600).contains(&tokens.seconds_remaining()));
        assert_eq!(session.last_email(), "a@b.com");
        assert_eq!(store.stored_email().unwrap().as_deref(), Some("a@b.com"));
        assert_eq!(store.stored_host_user().unwrap().as_deref(), Some("a@b.com"));
    }

    #[tokio::test]
    async fn failure_clears_previous_tokens() {
        let (session, provider) = session();
        provider.push_tokens("first", 3600);
        provider.push_login(Err(Failure::new("NotAuthorizedException", "")));

        session.login("a@b.com", "pw").await.unwrap();
        assert!(!session.tokens().is_empty());

        let err = session.login("a@b.com", "wrong").await.unwrap_err();
        assert_eq!(err.outcome, Outcome::NotAuthorized);
        assert_eq!(err.message, "Incorrect username or password");
        assert!(session.tokens().is_empty());
        assert!(session.tokens().expires_at.is_none());
    }

    #[tokio::test]
    async fn challenge_leaves_tokens_empty() {
        let (session, provider) = session();
        provider.push_login(Ok(AuthResponse::Challenge(AuthChallenge {
            name: "SMS_MFA".to_string(),
            parameters: std::collections::BTreeMap::new(),
        })));

        let outcome = session.login("a@b.com", "pw").await.unwrap();
        assert_eq!(outcome.outcome(), Outcome::ChallengeRequired);
        assert!(session.tokens().is_empty());
    }

    #[tokio::test]
    async fn concurrent_login_is_rejected() {
        let provider = Arc::new(MockIdentityProvider::new());
        provider.set_login_delay(Duration::from_millis(200));
        provider.push_tokens("at", 60);
        let session = Arc::new(AuthSession::new(provider.clone()));

        let first = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.login("a@b.com", "pw").await }
        });
        while !session.is_logging_in() {
            tokio::task::yield_now().await;
        }

        let err = session.login("a@b.com", "pw").await.unwrap_err();
        assert_eq!(err.outcome, Outcome::InProgress);

        assert!(first.await.unwrap().is_ok());
        assert_eq!(provider.login_calls(), 1);
        assert!(!session.is_logging_in());
    }

    #[tokio::test]
    async fn aborted_login_returns_to_idle() {
        let provider = Arc::new(MockIdentityProvider::new());
        provider.set_login_delay(Duration::from_secs(60));
        let session = Arc::new(AuthSession::new(provider));

        let task = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.login("a@b.com", "pw").await }
        });
        while !session.is_logging_in() {
            tokio::task::yield_now().await;
        }
        task.abort();
        let _ = task.await;

        assert!(!session.is_logging_in());
        assert!(session.tokens().is_empty());
    }
}
