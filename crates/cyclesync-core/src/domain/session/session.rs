//! Session entity and related types
//!
//! Defines the Session snapshot handed to subscribers and the state it is in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::error::AuthError;
use crate::domain::identity::Identity;

/// Reason recorded when the provider subscription cannot be established
pub const MISCONFIGURED_REASON: &str = "misconfigured";

/// Session mode without attached data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// Session state is still being determined
    Loading,
    /// Signed in with the identity provider
    Authenticated,
    /// Using the fixed demo identity, no network
    Demo,
    /// Provider is reachable but nobody is signed in
    Unauthenticated,
    /// Provider is not configured; offer demo mode and skip the network
    ConfiguredAbsent,
    /// Provider reported a failure
    Error,
}

impl SessionMode {
    /// Create from string representation
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "loading" => Some(Self::Loading),
            "authenticated" => Some(Self::Authenticated),
            "demo" => Some(Self::Demo),
            "unauthenticated" => Some(Self::Unauthenticated),
            "configured_absent" => Some(Self::ConfiguredAbsent),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Loading => "loading",
            Self::Authenticated => "authenticated",
            Self::Demo => "demo",
            Self::Unauthenticated => "unauthenticated",
            Self::ConfiguredAbsent => "configured_absent",
            Self::Error => "error",
        }
    }

    /// Whether the mode carries a usable identity
    pub fn has_identity(&self) -> bool {
        matches!(self, Self::Authenticated | Self::Demo)
    }
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Session state with the data each mode carries
///
/// An identity exists only inside `Authenticated` and `Demo`, and an error
/// reason only inside `Error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SessionState {
    Loading,
    Authenticated { identity: Identity },
    Demo { identity: Identity },
    Unauthenticated,
    ConfiguredAbsent,
    Error { reason: String },
}

impl SessionState {
    /// Demo mode with the fixed demo identity
    pub fn demo() -> Self {
        Self::Demo {
            identity: Identity::demo(),
        }
    }

    /// Authenticated as `identity`
    pub fn authenticated(identity: Identity) -> Self {
        Self::Authenticated { identity }
    }

    /// Error with the given reason
    pub fn error(reason: impl Into<String>) -> Self {
        Self::Error {
            reason: reason.into(),
        }
    }

    /// Map a provider-side identity to a state
    pub fn from_provider_identity(identity: Option<Identity>) -> Self {
        match identity {
            Some(identity) => Self::Authenticated { identity },
            None => Self::Unauthenticated,
        }
    }

    /// The mode of this state
    pub fn mode(&self) -> SessionMode {
        match self {
            Self::Loading => SessionMode::Loading,
            Self::Authenticated { .. } => SessionMode::Authenticated,
            Self::Demo { .. } => SessionMode::Demo,
            Self::Unauthenticated => SessionMode::Unauthenticated,
            Self::ConfiguredAbsent => SessionMode::ConfiguredAbsent,
            Self::Error { .. } => SessionMode::Error,
        }
    }

    /// The identity, when authenticated or in demo mode
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Self::Authenticated { identity } | Self::Demo { identity } => Some(identity),
            _ => None,
        }
    }

    /// The error reason, when in error mode
    pub fn error_reason(&self) -> Option<&str> {
        match self {
            Self::Error { reason } => Some(reason),
            _ => None,
        }
    }
}

/// Snapshot of the session at one instant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Identifier of this session lifetime; renewed on every reset
    pub id: Uuid,

    /// Current state
    #[serde(flatten)]
    pub state: SessionState,

    /// Number of transitions committed by the manager so far
    pub generation: u64,

    /// When the current state was entered
    pub changed_at: DateTime<Utc>,
}

impl Session {
    /// Create a fresh session in `Loading`
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4())
    }

    /// Create a fresh session in `Loading` with a specific ID (for testing or recovery)
    pub fn with_id(id: Uuid) -> Self {
        Self {
            id,
            state: SessionState::Loading,
            generation: 0,
            changed_at: Utc::now(),
        }
    }

    /// Move to `state`, returning whether anything changed
    pub(crate) fn transition(&mut self, state: SessionState) -> bool {
        if self.state == state {
            return false;
        }
        self.state = state;
        self.generation += 1;
        self.changed_at = Utc::now();
        true
    }

    /// Start a new session lifetime in `Loading`
    pub(crate) fn reset(&mut self) {
        self.id = Uuid::new_v4();
        self.state = SessionState::Loading;
        self.generation += 1;
        self.changed_at = Utc::now();
    }

    /// Current mode
    pub fn mode(&self) -> SessionMode {
        self.state.mode()
    }

    /// Current identity, if any
    pub fn identity(&self) -> Option<&Identity> {
        self.state.identity()
    }

    /// Error reason, if in error mode
    pub fn error_reason(&self) -> Option<&str> {
        self.state.error_reason()
    }

    /// Failure reported through the provider subscription, if in error mode
    pub fn error(&self) -> Option<AuthError> {
        self.error_reason()
            .map(|reason| AuthError::ProviderError(reason.to_string()))
    }

    /// Whether the session state is still being determined
    pub fn is_loading(&self) -> bool {
        self.mode() == SessionMode::Loading
    }

    /// Whether the user can use the main application
    pub fn is_usable(&self) -> bool {
        self.mode().has_identity()
    }

    /// Whether the sign-in view should offer demo mode prominently
    pub fn offers_demo(&self) -> bool {
        matches!(self.mode(), SessionMode::ConfiguredAbsent | SessionMode::Error)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.state {
            SessionState::Authenticated { identity } | SessionState::Demo { identity } => {
                write!(f, "{} as {}", self.mode(), identity)
            }
            SessionState::Error { reason } => write!(f, "error: {}", reason),
            other => write!(f, "{}", other.mode()),
        }
    }
}
