//! Identity provider implementations

pub mod credential_cache;
pub mod memory;
pub mod rest;

pub use credential_cache::{CachedCredentials, CredentialCache};
pub use memory::InMemoryIdentityProvider;
pub use rest::{RestIdentityProvider, RestIdentityProviderBuilder};
