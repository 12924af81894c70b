//! Presentation view selection
//!
//! The shell renders exactly one of three views, chosen purely from the
//! session mode.

use serde::{Deserialize, Serialize};

use super::session::{Session, SessionMode};

/// View the presentation layer should render
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum View {
    /// Spinner while the session is determined
    Loading,
    /// Sign-in form, optionally with a prominent demo-mode call to action
    SignIn { offer_demo: bool },
    /// The main application
    Main,
}

impl View {
    /// Select the view for `mode`
    pub fn for_mode(mode: SessionMode) -> Self {
        match mode {
            SessionMode::Loading => Self::Loading,
            SessionMode::Authenticated | SessionMode::Demo => Self::Main,
            SessionMode::Unauthenticated => Self::SignIn { offer_demo: false },
            SessionMode::ConfiguredAbsent | SessionMode::Error => Self::SignIn { offer_demo: true },
        }
    }

    /// Select the view for `session`
    pub fn for_session(session: &Session) -> Self {
        Self::for_mode(session.mode())
    }

    /// Short name for display
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Loading => "loading",
            Self::SignIn { .. } => "sign_in",
            Self::Main => "main",
        }
    }
}
