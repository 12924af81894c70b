//! In-memory identity provider
//!
//! Keeps accounts in a table and the signed-in identity in memory. Useful for
//! local development and as a controllable provider in tests.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use crate::domain::identity::{
    Identity, IdentityProvider, ProviderError, ProviderEvent, ProviderListener, ProviderListeners,
    ProviderResult, ProviderSubscription,
};

struct Account {
    identity: Identity,
    password: String,
}

struct MemoryState {
    accounts: HashMap<String, Account>,
    current: Option<Identity>,
    federated: Option<Identity>,
    configured: bool,
    fail_subscribe: bool,
    fail_sign_out: bool,
    sign_in_calls: usize,
    sign_out_calls: usize,
}

/// Identity provider backed by an in-memory account table
pub struct InMemoryIdentityProvider {
    state: Mutex<MemoryState>,
    listeners: ProviderListeners,
}

impl Default for InMemoryIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryIdentityProvider {
    /// A configured provider with no accounts
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState {
                accounts: HashMap::new(),
                current: None,
                federated: None,
                configured: true,
                fail_subscribe: false,
                fail_sign_out: false,
                sign_in_calls: 0,
                sign_out_calls: 0,
            }),
            listeners: ProviderListeners::new(),
        }
    }

    /// A provider that reports itself as not configured
    pub fn unconfigured() -> Self {
        let provider = Self::new();
        provider.lock().configured = false;
        provider
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add an account, returning its identity
    pub fn add_account(&self, email: &str, password: &str, display_name: Option<&str>) -> Identity {
        let mut identity = Identity::new(Uuid::new_v4().to_string()).with_email(email);
        if let Some(name) = display_name {
            identity = identity.with_display_name(name);
        }
        self.lock().accounts.insert(
            email.to_lowercase(),
            Account {
                identity: identity.clone(),
                password: password.to_string(),
            },
        );
        identity
    }

    /// Whether an account exists for `email`
    pub fn has_account(&self, email: &str) -> bool {
        self.lock().accounts.contains_key(&email.to_lowercase())
    }

    /// Identity returned by the next federated sign-in
    pub fn set_federated_identity(&self, identity: Option<Identity>) {
        self.lock().federated = identity;
    }

    /// Make `subscribe` fail
    pub fn fail_subscribe(&self, fail: bool) {
        self.lock().fail_subscribe = fail;
    }

    /// Make `sign_out` fail after clearing nothing
    pub fn fail_sign_out(&self, fail: bool) {
        self.lock().fail_sign_out = fail;
    }

    /// Push an asynchronous provider error to every listener
    pub fn report_error(&self, reason: &str) {
        self.listeners.emit(ProviderEvent::Error(reason.to_string()));
    }

    /// Currently signed-in identity
    pub fn current_identity(&self) -> Option<Identity> {
        self.lock().current.clone()
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Number of sign-in and sign-up requests received
    pub fn sign_in_calls(&self) -> usize {
        self.lock().sign_in_calls
    }

    /// Number of sign-out requests received
    pub fn sign_out_calls(&self) -> usize {
        self.lock().sign_out_calls
    }

    fn set_current(&self, identity: Option<Identity>) {
        let changed = {
            let mut state = self.lock();
            let changed = state.current != identity;
            state.current = identity.clone();
            changed
        };
        if changed {
            self.listeners.emit(ProviderEvent::IdentityChanged(identity));
        }
    }
}

#[async_trait]
impl IdentityProvider for InMemoryIdentityProvider {
    fn is_configured(&self) -> bool {
        self.lock().configured
    }

    fn subscribe(&self, listener: ProviderListener) -> ProviderResult<ProviderSubscription> {
        let current = {
            let state = self.lock();
            if state.fail_subscribe {
                return Err(ProviderError::Misconfigured(
                    "listener registration refused".to_string(),
                ));
            }
            state.current.clone()
        };
        Ok(self.listeners.register(listener, current))
    }

    async fn sign_in(&self, email: &str, password: &str) -> ProviderResult<Identity> {
        let identity = {
            let mut state = self.lock();
            state.sign_in_calls += 1;
            match state.accounts.get(&email.to_lowercase()) {
                Some(account) if account.password == password => account.identity.clone(),
                Some(_) => return Err(ProviderError::Rejected("INVALID_PASSWORD".to_string())),
                None => return Err(ProviderError::Rejected("EMAIL_NOT_FOUND".to_string())),
            }
        };
        debug!(user = %identity.id, "In-memory sign in");
        self.set_current(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_up(&self, email: &str, password: &str) -> ProviderResult<Identity> {
        {
            let mut state = self.lock();
            state.sign_in_calls += 1;
            if state.accounts.contains_key(&email.to_lowercase()) {
                return Err(ProviderError::Rejected("EMAIL_EXISTS".to_string()));
            }
        }
        let identity = self.add_account(email, password, None);
        self.set_current(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_in_federated(&self) -> ProviderResult<Identity> {
        let identity = {
            let mut state = self.lock();
            state.sign_in_calls += 1;
            state.federated.clone().ok_or_else(|| {
                ProviderError::Unavailable("no federated identity available".to_string())
            })?
        };
        self.set_current(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_out(&self) -> ProviderResult<()> {
        {
            let mut state = self.lock();
            state.sign_out_calls += 1;
            if state.fail_sign_out {
                return Err(ProviderError::Unavailable("sign out failed".to_string()));
            }
        }
        self.set_current(None);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recording() -> (ProviderListener, Arc<Mutex<Vec<ProviderEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let listener = ProviderListener::new(move |event| sink.lock().unwrap().push(event));
        (listener, events)
    }

    #[tokio::test]
    async fn test_sign_in_notifies_listeners() {
        let provider = InMemoryIdentityProvider::new();
        let identity = provider.add_account("a@b.com", "pw", Some("Ada"));
        let (listener, events) = recording();
        let _sub = provider.subscribe(listener).unwrap();

        provider.sign_in("A@B.com", "pw").await.unwrap();
        provider.sign_out().await.unwrap();

        assert_eq!(
            *events.lock().unwrap(),
            vec![
                ProviderEvent::IdentityChanged(None),
                ProviderEvent::IdentityChanged(Some(identity)),
                ProviderEvent::IdentityChanged(None),
            ]
        );
    }

    #[tokio::test]
    async fn test_rejections() {
        let provider = InMemoryIdentityProvider::new();
        provider.add_account("a@b.com", "pw", None);

        assert_eq!(
            provider.sign_in("a@b.com", "bad").await,
            Err(ProviderError::Rejected("INVALID_PASSWORD".to_string()))
        );
        assert_eq!(
            provider.sign_in("x@b.com", "pw").await,
            Err(ProviderError::Rejected("EMAIL_NOT_FOUND".to_string()))
        );
        assert_eq!(
            provider.sign_up("a@b.com", "pw").await,
            Err(ProviderError::Rejected("EMAIL_EXISTS".to_string()))
        );
        assert_eq!(provider.sign_in_calls(), 3);
    }

    #[tokio::test]
    async fn test_federated_requires_identity() {
        let provider = InMemoryIdentityProvider::new();
        assert!(matches!(
            provider.sign_in_federated().await,
            Err(ProviderError::Unavailable(_))
        ));

        provider.set_federated_identity(Some(Identity::new("g-1").with_email("g@b.com")));
        let identity = provider.sign_in_federated().await.unwrap();
        assert_eq!(identity.id, "g-1");
        assert_eq!(provider.current_identity(), Some(identity));
    }

    #[test]
    fn test_subscribe_failure() {
        let provider = InMemoryIdentityProvider::new();
        provider.fail_subscribe(true);
        let (listener, _) = recording();

        assert!(provider.subscribe(listener).is_err());
        assert_eq!(provider.listener_count(), 0);
    }
}
