//! Identity types and provider error definitions

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type for identity provider operations
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Errors reported by an identity provider for explicit actions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The provider could not be reached or the operation failed in transit
    #[error("Identity provider unavailable: {0}")]
    Unavailable(String),

    /// The provider is missing configuration or could not be set up
    #[error("Identity provider misconfigured: {0}")]
    Misconfigured(String),

    /// The provider answered and declined the credentials
    #[error("Identity provider rejected the request: {0}")]
    Rejected(String),
}

/// An authenticated (or synthetic demo) user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Provider-assigned user id
    pub id: String,

    /// Email address, if the provider shares one
    pub email: Option<String>,

    /// Human-readable name, if known
    pub display_name: Option<String>,
}

impl Identity {
    /// Create an identity with only an id
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: None,
            display_name: None,
        }
    }

    /// Set the email address
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Set the display name
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// The fixed, well-known identity used in demo mode
    pub fn demo() -> Self {
        Self::new("demo-user")
            .with_email("demo@cyclesync.com")
            .with_display_name("Demo User")
    }

    /// Whether this is the demo identity
    pub fn is_demo(&self) -> bool {
        self.id == "demo-user"
    }

    /// Best label for display: name, then email, then id
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or(&self.id)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.email {
            Some(email) => write!(f, "{} <{}>", self.label(), email),
            None => write!(f, "{}", self.label()),
        }
    }
}

/// Notification pushed by a provider to its session-change listeners
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    /// The provider-side identity changed (`None` means signed out)
    IdentityChanged(Option<Identity>),

    /// The provider hit an asynchronous failure
    Error(String),
}

/// Credential produced by the interactive part of a federated sign-in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FederatedCredential {
    /// Identity provider id, e.g. `google.com`
    pub provider_id: String,

    /// Token issued by that identity provider
    pub id_token: String,
}

impl FederatedCredential {
    /// A Google id token credential
    pub fn google(id_token: impl Into<String>) -> Self {
        Self {
            provider_id: "google.com".to_string(),
            id_token: id_token.into(),
        }
    }
}
