//! Chained identity resolution: access token → account id → machine id.
//!
//! Both steps share one flight, so a resolver never has two lookups
//! outstanding.

use std::sync::Arc;

use parking_lot::RwLock;

use clouddeck_auth::IdentityProvider;
use clouddeck_core::{codes, Failure, Flight, Result};

use crate::machine_client::MachineApi;

/// Resolves the machine owned by the signed-in user.
pub struct IdentityResolver {
    provider: Arc<dyn IdentityProvider>,
    api: Arc<dyn MachineApi>,
    attribute: String,
    lookup_flight: Flight,
    account_id: RwLock<String>,
    machine_id: RwLock<String>,
}

impl IdentityResolver {
    /// Create a resolver reading the account id from `attribute`.
    #[must_use]
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        api: Arc<dyn MachineApi>,
        attribute: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            api,
            attribute: attribute.into(),
            lookup_flight: Flight::new(),
            account_id: RwLock::new(String::new()),
            machine_id: RwLock::new(String::new()),
        }
    }

    /// Find the account id in the current user's attributes.
    ///
    /// The first attribute with the configured name wins.
    ///
    /// # Errors
    ///
    /// - `EmptyAccessToken` for a blank token
    /// - `in-progress` while either lookup is outstanding
    /// - `MissingAccountId` if the attribute is absent or empty
    /// - the classified provider failure otherwise
    pub async fn resolve_account_id(&self, access_token: &str) -> Result<String> {
        let access_token = Failure::require(
            access_token,
            codes::EMPTY_ACCESS_TOKEN,
            "Access token is required",
        )?;
        let Some(_guard) = self.lookup_flight.try_acquire() else {
            return Err(Failure::in_progress("GetUser already in progress"));
        };

        let attributes = self.provider.get_user(access_token).await?;
        let Some(attribute) = attributes.iter().find(|a| a.name == self.attribute) else {
            return Err(Failure::new(
                codes::MISSING_ACCOUNT_ID,
                format!("{} not found", self.attribute),
            ));
        };
        if attribute.value.trim().is_empty() {
            return Err(Failure::new(
                codes::MISSING_ACCOUNT_ID,
                format!("{} value missing", self.attribute),
            ));
        }

        let account_id = attribute.value.clone();
        tracing::debug!(account_id = %account_id, "Resolved account id");
        *self.account_id.write() = account_id.clone();
        Ok(account_id)
    }

    /// Look up the machine owned by `account_id`.
    ///
    /// # Errors
    ///
    /// - `EmptyAccountId` or `EmptyAccessToken` for blank input
    /// - `in-progress` while either lookup is outstanding
    /// - `MissingMachineId` if the account names no machine
    /// - the classified API failure otherwise
    pub async fn resolve_machine_id(&self, account_id: &str, access_token: &str) -> Result<String> {
        let account_id = Failure::require(account_id, codes::EMPTY_ACCOUNT_ID, "Account ID is required")?;
        let access_token = Failure::require(
            access_token,
            codes::EMPTY_ACCESS_TOKEN,
            "Access token is required",
        )?;
        let Some(_guard) = self.lookup_flight.try_acquire() else {
            return Err(Failure::in_progress("Account lookup already in progress"));
        };

        let account = self.api.get_account(account_id, access_token).await?;
        tracing::debug!(machine_id = %account.machine_id, "Resolved machine id");
        *self.machine_id.write() = account.machine_id.clone();
        Ok(account.machine_id)
    }

    /// Run both lookups in sequence.
    ///
    /// Previously resolved ids are forgotten unless a lookup is already
    /// outstanding. `on_account` is called with the account id before the
    /// machine lookup starts.
    ///
    /// # Errors
    ///
    /// Returns the first failing step's failure.
    pub async fn fetch_machine_id<F>(&self, access_token: &str, on_account: F) -> Result<String>
    where
        F: FnOnce(&str) + Send,
    {
        if !self.is_resolving() {
            self.clear();
        }
        let account_id = self.resolve_account_id(access_token).await?;
        on_account(&account_id);
        self.resolve_machine_id(&account_id, access_token).await
    }

    /// The last resolved account id, empty if none.
    #[must_use]
    pub fn account_id(&self) -> String {
        self.account_id.read().clone()
    }

    /// The last resolved machine id, empty if none.
    #[must_use]
    pub fn machine_id(&self) -> String {
        self.machine_id.read().clone()
    }

    /// Returns `true` while either lookup is outstanding.
    #[must_use]
    pub fn is_resolving(&self) -> bool {
        self.lookup_flight.is_busy()
    }

    /// Forget the resolved ids.
    pub fn clear(&self) {
        self.account_id.write().clear();
        self.machine_id.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use clouddeck_auth::{MockIdentityProvider, UserAttribute};
    use clouddeck_core::Outcome;

    use super::*;
    use crate::machine_client::MockMachineApi;
    use crate::types::AccountRecord;

    fn attribute(name: &str, value: &str) -> UserAttribute {
        UserAttribute {
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    fn resolver() -> (IdentityResolver, Arc<MockIdentityProvider>, Arc<MockMachineApi>) {
        let provider = Arc::new(MockIdentityProvider::new());
        let api = Arc::new(MockMachineApi::new());
        let resolver = IdentityResolver::new(provider.clone(), api.clone(), "custom:account");
        (resolver, provider, api)
    }

    #[tokio::test]
    async fn chain_resolves_both_ids() {
        let (resolver, provider, api) = resolver();
        provider.push_user(Ok(vec![
            attribute("email", "a@b.com"),
            attribute("custom:account", "acct-1"),
            attribute("custom:account", "acct-2"),
        ]));
        api.set_account(Ok(AccountRecord {
            account_id: "acct-1".to_string(),
            machine_id: "m-1".to_string(),
        }));

        let mut seen = String::new();
        let machine_id = resolver
            .fetch_machine_id("tok", |account| seen = account.to_string())
            .await
            .unwrap();

        assert_eq!(machine_id, "m-1");
        assert_eq!(seen, "acct-1");
        assert_eq!(resolver.account_id(), "acct-1");
        assert_eq!(resolver.machine_id(), "m-1");
        assert!(!resolver.is_resolving());
    }

    #[tokio::test]
    async fn missing_attribute_stops_the_chain() {
        let (resolver, provider, api) = resolver();
        provider.push_user(Ok(vec![attribute("email", "a@b.com")]));

        let err = resolver.fetch_machine_id("tok", |_| {}).await.unwrap_err();
        assert_eq!(err.code, "MissingAccountId");
        assert_eq!(err.outcome, Outcome::ParseError);
        assert_eq!(err.message, "custom:account not found");
        assert_eq!(api.account_calls(), 0);

        provider.push_user(Ok(vec![attribute("custom:account", "")]));
        let err = resolver.resolve_account_id("tok").await.unwrap_err();
        assert_eq!(err.message, "custom:account value missing");
    }

    #[tokio::test]
    async fn blank_input_is_rejected_locally() {
        let (resolver, provider, api) = resolver();

        let err = resolver.resolve_account_id(" ").await.unwrap_err();
        assert_eq!(err.code, "EmptyAccessToken");
        assert_eq!(provider.user_calls(), 0);

        let err = resolver.resolve_machine_id("", "tok").await.unwrap_err();
        assert_eq!(err.code, "EmptyAccountId");
        assert_eq!(err.message, "Account ID is required");
        assert_eq!(api.account_calls(), 0);
    }

    #[tokio::test]
    async fn provider_failure_is_forwarded() {
        let (resolver, provider, _api) = resolver();
        provider.push_user(Err(Failure::new("NotAuthorizedException", "Access Token has expired")));

        let err = resolver.resolve_account_id("tok").await.unwrap_err();
        assert_eq!(err.outcome, Outcome::NotAuthorized);
        assert_eq!(err.message, "Access Token has expired");
        assert!(resolver.account_id().is_empty());
    }

    #[tokio::test]
    async fn lookups_exclude_each_other() {
        let provider = Arc::new(MockIdentityProvider::new());
        provider.set_user_delay(Duration::from_millis(200));
        provider.push_user(Ok(vec![attribute("custom:account", "acct-1")]));
        let api = Arc::new(MockMachineApi::new());
        let resolver = Arc::new(IdentityResolver::new(
            provider.clone(),
            api.clone(),
            "custom:account",
        ));

        let first = tokio::spawn({
            let resolver = Arc::clone(&resolver);
            async move { resolver.resolve_account_id("tok").await }
        });
        while !resolver.is_resolving() {
            tokio::task::yield_now().await;
        }

        let err = resolver.resolve_account_id("tok").await.unwrap_err();
        assert_eq!(err.outcome, Outcome::InProgress);
        let err = resolver.resolve_machine_id("acct-1", "tok").await.unwrap_err();
        assert_eq!(err.outcome, Outcome::InProgress);
        assert_eq!(api.account_calls(), 0);

        assert_eq!(first.await.unwrap().unwrap(), "acct-1");
        assert_eq!(provider.user_calls(), 1);
    }
}
