//! Profile vault
//!
//! The profile collection, the active session and the shared in-memory
//! database they operate on.

pub mod manager;
mod persist;
pub mod session;
pub mod shared;

pub use manager::{ProfileOverview, ProfileVault};
pub use session::ActiveProfileSession;
pub use shared::SharedDatabase;
