//! Error types for CycleSync

use thiserror::Error;

use crate::domain::session::AuthError;

/// Result type alias using CycleSync's Error
pub type Result<T> = std::result::Result<T, Error>;

/// CycleSync error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // Auth errors (E100-E199, E800)
    #[error(transparent)]
    Auth(#[from] AuthError),

    // Network errors (E200-E299)
    #[error("Network error: {0}. Check your internet connection.")]
    NetworkError(#[from] reqwest::Error),

    // Serialization errors (E400-E499)
    #[error("Failed to parse stored data: {0}")]
    Deserialize(#[from] toml::de::Error),

    #[error("Failed to serialize data: {0}")]
    Serialize(#[from] toml::ser::Error),

    // Config errors (E600-E699)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Session errors (E700-E799)
    #[error("Session did not settle within {0} seconds")]
    Timeout(u64),

    #[error("Session manager has been shut down")]
    ShutDown,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::Auth(err) => err.code(),
            Self::NetworkError(_) => "E200",
            Self::Deserialize(_) => "E400",
            Self::Serialize(_) => "E401",
            Self::ConfigError(_) => "E600",
            Self::Timeout(_) => "E700",
            Self::ShutDown => "E701",
            Self::Io(_) => "E9999",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::Auth(err) => err.suggestion(),
            Self::NetworkError(_) => Some("Check internet connection".to_string()),
            Self::ConfigError(_) => Some("cyclesync config list".to_string()),
            Self::Timeout(_) => Some("cyclesync config set session.settle_timeout_secs 30".to_string()),
            _ => None,
        }
    }
}
