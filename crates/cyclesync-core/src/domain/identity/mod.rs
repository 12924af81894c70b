//! Identity provider boundary
//!
//! # Architecture
//!
//! - **Types**: `Identity`, `ProviderEvent`, `ProviderError`
//! - **Provider**: `IdentityProvider` trait consumed by the session manager
//! - **Listeners**: `ProviderListener`, `ProviderSubscription` and the
//!   `ProviderListeners` registry shared by provider implementations

pub mod listener;
pub mod provider;
pub mod types;

// Re-export main types
pub use listener::{ProviderListener, ProviderListeners, ProviderSubscription};
pub use provider::{FederatedAuthorizer, IdentityProvider};
pub use types::{FederatedCredential, Identity, ProviderError, ProviderEvent, ProviderResult};
