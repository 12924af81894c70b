//! Errors returned by explicit session actions

use thiserror::Error;

use crate::domain::identity::ProviderError;

/// Result type for sign-in and sign-up operations
pub type AuthResult<T> = std::result::Result<T, AuthError>;

/// Auth errors
///
/// Explicit-action errors are returned to the caller and never change the
/// session mode. `ProviderError` is the variant used for failures that only
/// arrive through the live provider subscription.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Local validation failed; the provider was not contacted
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Provider is not configured, unreachable, or the operation failed
    #[error("Sign in unavailable: {0}. Use demo mode to explore the app.")]
    ProviderUnavailable(String),

    /// Asynchronous failure reported by the provider subscription
    #[error("Authentication error occurred: {0}")]
    ProviderError(String),

    /// The provider declined the credentials
    #[error("Sign in rejected: {0}")]
    Rejected(String),

    /// A sign-out happened while the attempt was in flight; its result was discarded
    #[error("Sign in superseded by sign out")]
    Superseded,
}

impl AuthError {
    /// Get error code for this auth error
    pub fn code(&self) -> &'static str {
        match self {
            Self::ProviderUnavailable(_) => "E100",
            Self::ProviderError(_) => "E101",
            Self::Rejected(_) => "E102",
            Self::Superseded => "E103",
            Self::InvalidInput(_) => "E800",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::ProviderUnavailable(_) | Self::ProviderError(_) => {
                Some("cyclesync demo".to_string())
            }
            Self::Rejected(_) => Some("Check your email and password".to_string()),
            _ => None,
        }
    }
}

impl From<ProviderError> for AuthError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Rejected(reason) => Self::Rejected(reason),
            ProviderError::Unavailable(reason) | ProviderError::Misconfigured(reason) => {
                Self::ProviderUnavailable(reason)
            }
        }
    }
}
