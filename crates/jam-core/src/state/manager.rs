//! State manager for thread-safe state access.
//!
//! The [`StateManager`] publishes the engine's view of the session to
//! readers on other threads. Only the runtime thread writes to it.

use std::sync::{Arc, PoisonError, RwLock};

use crate::model::ProjectState;

/// Snapshot published after every runtime tick.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SharedState {
    pub project: ProjectState,
    pub master_gain: f32,
    /// Transport position in beats.
    pub position_beats: f64,
    /// Current play session number.
    pub session: u64,
    /// Registered patch ids.
    pub patches: Vec<String>,
    /// Patch requests still being generated.
    pub pending_patches: usize,
    /// Incremented on every publish.
    pub version: u64,
}

/// Thread-safe handle to the published state.
///
/// Clones share the same underlying state.
#[derive(Clone, Default)]
pub struct StateManager {
    state: Arc<RwLock<SharedState>>,
}

impl StateManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a state manager with a specific initial project.
    pub fn with_project(project: ProjectState) -> Self {
        Self {
            state: Arc::new(RwLock::new(SharedState {
                project,
                master_gain: 1.0,
                ..SharedState::default()
            })),
        }
    }

    /// Read the state with a closure.
    ///
    /// A writer that panicked leaves the last published state readable.
    pub fn with_state_read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&SharedState) -> R,
    {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    /// Write to the state with a closure.
    pub fn with_state_write<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut SharedState) -> R,
    {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    /// Replace the state and bump the version.
    pub fn publish(&self, mut next: SharedState) {
        self.with_state_write(|state| {
            next.version = state.version + 1;
            *state = next;
        });
    }

    /// Get a clone of the current state.
    pub fn snapshot(&self) -> SharedState {
        self.with_state_read(|s| s.clone())
    }

    /// Get a clone of the current project.
    pub fn project(&self) -> ProjectState {
        self.with_state_read(|s| s.project.clone())
    }

    pub fn tempo(&self) -> f64 {
        self.with_state_read(|s| s.project.bpm)
    }

    pub fn is_playing(&self) -> bool {
        self.with_state_read(|s| s.project.is_playing)
    }

    pub fn version(&self) -> u64 {
        self.with_state_read(|s| s.version)
    }
}

impl std::fmt::Debug for StateManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateManager")
            .field("version", &self.version())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_manager_creation() {
        let manager = StateManager::with_project(ProjectState::default());
        assert!((manager.tempo() - 120.0).abs() < 0.001);
        assert!(!manager.is_playing());
        assert_eq!(manager.version(), 0);
    }

    #[test]
    fn test_publish_bumps_version() {
        let manager = StateManager::new();
        let mut next = manager.snapshot();
        next.project.bpm = 98.0;
        next.version = 42;
        manager.publish(next.clone());
        manager.publish(next);
        assert_eq!(manager.version(), 2);
        assert!((manager.tempo() - 98.0).abs() < 0.001);
    }

    #[test]
    fn test_state_manager_clone() {
        let manager1 = StateManager::new();
        let manager2 = manager1.clone();
        manager1.with_state_write(|s| s.project.bpm = 150.0);
        assert!((manager2.tempo() - 150.0).abs() < 0.001);
    }
}
