//! Durable flag store boundary
//!
//! A small persistent key/value store that survives process restarts. The
//! session manager uses it for exactly one thing: remembering that the user
//! opted into demo mode, so a cold start can enter demo mode before the
//! identity provider is consulted.

use async_trait::async_trait;
use thiserror::Error;

/// Key under which the demo-mode opt-in is stored
pub const DEMO_FLAG_KEY: &str = "demo-user";

/// Value written for the demo-mode opt-in
pub const DEMO_FLAG_VALUE: &str = "true";

/// Result type for flag store operations
pub type FlagResult<T> = std::result::Result<T, FlagStoreError>;

/// Flag store errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlagStoreError {
    /// Reading the backing storage failed
    #[error("Failed to read flag store: {0}")]
    Read(String),

    /// Writing the backing storage failed
    #[error("Failed to write flag store: {0}")]
    Write(String),

    /// Stored data could not be decoded
    #[error("Flag store corrupted: {0}")]
    Corrupted(String),
}

impl FlagStoreError {
    /// Get error code for this flag store error
    pub fn code(&self) -> &'static str {
        match self {
            Self::Read(_) => "E300",
            Self::Write(_) => "E301",
            Self::Corrupted(_) => "E302",
        }
    }
}

/// Persistent key/value storage for small flags
#[async_trait]
pub trait FlagStore: Send + Sync {
    /// Get the value stored under `key`, if any
    async fn get(&self, key: &str) -> FlagResult<Option<String>>;

    /// Store `value` under `key`, replacing any previous value
    async fn set(&self, key: &str, value: &str) -> FlagResult<()>;

    /// Remove `key`; removing an absent key is not an error
    async fn remove(&self, key: &str) -> FlagResult<()>;
}

/// Whether a stored value counts as the demo flag being set
pub fn is_demo_flag_set(value: Option<&str>) -> bool {
    value == Some(DEMO_FLAG_VALUE)
}
