// src/services/mod.rs
//
// Identity services: the user store gateway, session tokens and the
// reconciler that ties verified identities to users

pub mod reconciler;
pub mod token;
pub mod user_store;

// Re-export commonly used types for convenience
pub use user_store::{SqliteUserStore, UserStore};
