//! Session domain module
//!
//! Owns the application's notion of "who is using the app right now".
//!
//! # Architecture
//!
//! - **Entities**: `Session`, `SessionState`, `SessionMode`
//! - **Manager**: `SessionManager`, the only writer of session state
//! - **Subscriptions**: ordered delivery of every committed transition
//! - **View**: the presentation choice derived from the mode
//!
//! # Example
//!
//! ```ignore
//! use cyclesync_core::domain::session::{SessionManager, View};
//!
//! let manager = SessionManager::new(provider, flags);
//! let _sub = manager.subscribe(|session| println!("{}", session));
//! manager.initialize().await;
//!
//! if manager.view() == (View::SignIn { offer_demo: true }) {
//!     manager.enter_demo_mode().await;
//! }
//! ```

pub mod error;
pub mod manager;
pub mod session;
pub mod subscription;
pub mod validation;
pub mod view;

// Re-export main types
pub use error::{AuthError, AuthResult};
pub use manager::SessionManager;
pub use session::{MISCONFIGURED_REASON, Session, SessionMode, SessionState};
pub use subscription::{SessionHandler, Subscription};
pub use validation::{validate_credentials, validate_email};
pub use view::View;
