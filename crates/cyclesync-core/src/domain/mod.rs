//! Domain layer
//!
//! Contains the session model and the seams to the identity provider and the
//! durable flag store.

pub mod flags;
pub mod identity;
pub mod session;
