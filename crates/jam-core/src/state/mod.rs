//! Command and published-state plumbing between the runtime and its readers.
//!
//! - [`EngineCommand`] - All user-intent mutations
//! - [`StateManager`] - Thread-safe access to the published [`SharedState`]

mod manager;
mod messages;

pub use manager::{SharedState, StateManager};
pub use messages::EngineCommand;
