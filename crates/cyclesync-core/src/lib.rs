//! CycleSync Core Library
//!
//! This crate provides the session core for CycleSync, including:
//! - Session state machine (loading, authenticated, demo, signed out, error)
//! - Ordered subscriber notifications and view selection
//! - Identity provider boundary with REST and in-memory implementations
//! - Durable flag store used to remember demo mode across restarts
//! - Configuration with environment overrides

pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;

#[cfg(test)]
mod config_tests;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::domain::identity::{Identity, IdentityProvider};
    pub use crate::domain::session::{AuthError, Session, SessionManager, SessionMode, View};
    pub use crate::error::{Error, Result};
}
