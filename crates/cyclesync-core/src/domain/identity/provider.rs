//! Identity provider trait
//!
//! Abstracts over the remote authentication service. Implementations live in
//! `crate::infrastructure::identity`.

use async_trait::async_trait;

use super::listener::{ProviderListener, ProviderSubscription};
use super::types::{FederatedCredential, Identity, ProviderResult};

/// External authentication service
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Whether all configuration the provider needs is present
    fn is_configured(&self) -> bool;

    /// Register a session-change listener
    ///
    /// The listener is invoked immediately with the current provider-side
    /// identity (possibly `None`), then on every change. Fails synchronously
    /// when the provider cannot set up notifications at all.
    fn subscribe(&self, listener: ProviderListener) -> ProviderResult<ProviderSubscription>;

    /// Sign in with email and password
    async fn sign_in(&self, email: &str, password: &str) -> ProviderResult<Identity>;

    /// Create an account with email and password and sign it in
    async fn sign_up(&self, email: &str, password: &str) -> ProviderResult<Identity>;

    /// Sign in through an interactive federated flow
    async fn sign_in_federated(&self) -> ProviderResult<Identity>;

    /// Sign out provider-side (best-effort)
    async fn sign_out(&self) -> ProviderResult<()>;
}

/// Interactive half of a federated sign-in
///
/// Runs whatever user interaction the identity provider requires (a browser
/// popup, a pasted token) and returns the resulting credential.
#[async_trait]
pub trait FederatedAuthorizer: Send + Sync {
    /// Obtain a credential from the federated identity provider
    async fn authorize(&self) -> ProviderResult<FederatedCredential>;
}
