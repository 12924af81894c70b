//! Infrastructure layer
//!
//! Implementations of the domain boundaries: identity providers and durable
//! flag stores.

pub mod flags;
pub mod identity;
