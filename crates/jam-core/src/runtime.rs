//! Runtime thread for the Jam engine.
//!
//! The runtime thread owns the [`Engine`]. It:
//! - Applies [`EngineCommand`]s in arrival order
//! - Ticks the engine at a fixed interval
//! - Publishes a [`SharedState`](crate::state::SharedState) snapshot after
//!   every tick
//!
//! Other threads talk to it through a cloneable [`RuntimeHandle`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::engine::Engine;
use crate::model::ProjectState;
use crate::state::{EngineCommand, StateManager};

/// Handle to the running runtime.
#[derive(Clone)]
pub struct RuntimeHandle {
    command_tx: Sender<EngineCommand>,
    state: StateManager,
    shutdown: Arc<AtomicBool>,
}

impl RuntimeHandle {
    /// Send a command to the runtime thread.
    pub fn send(&self, command: EngineCommand) -> Result<()> {
        self.command_tx
            .send(command)
            .map_err(|e| anyhow::anyhow!("Failed to send command: {}", e))
    }

    /// Published state.
    pub fn state(&self) -> &StateManager {
        &self.state
    }

    /// Latest published project.
    pub fn project(&self) -> ProjectState {
        self.state.project()
    }

    /// Signal the runtime to shut down.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Wait until the published version passes `version`.
    pub fn wait_for_version(&self, version: u64, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.state.version() > version {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        false
    }
}

/// Owner of the runtime thread.
pub struct Runtime {
    handle: RuntimeHandle,
    thread_handle: Option<JoinHandle<()>>,
}

impl Runtime {
    /// Move `engine` onto a new runtime thread ticking every `tick_interval`.
    pub fn start(engine: Engine, tick_interval: Duration) -> Result<Self> {
        let (command_tx, command_rx) = unbounded();
        let state = StateManager::with_project(engine.project());
        let shutdown = Arc::new(AtomicBool::new(false));

        let handle = RuntimeHandle {
            command_tx,
            state: state.clone(),
            shutdown: shutdown.clone(),
        };

        let thread_handle = thread::Builder::new()
            .name("jam-runtime".to_string())
            .spawn(move || {
                let mut rt = RuntimeThread {
                    engine,
                    command_rx,
                    state,
                    interval: tick_interval,
                };
                rt.run(shutdown);
            })
            .context("Failed to spawn runtime thread")?;

        log::info!("[RUNTIME] Started, tick every {:?}", tick_interval);
        Ok(Self {
            handle,
            thread_handle: Some(thread_handle),
        })
    }

    /// Get a handle to interact with the runtime.
    pub fn handle(&self) -> &RuntimeHandle {
        &self.handle
    }

    /// Shut down the runtime gracefully.
    pub fn shutdown(mut self) {
        self.stop_thread();
    }

    fn stop_thread(&mut self) {
        self.handle.shutdown();
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                log::error!("[RUNTIME] Runtime thread panicked");
            }
        }
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.stop_thread();
    }
}

/// The thread that owns the engine.
struct RuntimeThread {
    engine: Engine,
    command_rx: Receiver<EngineCommand>,
    state: StateManager,
    interval: Duration,
}

impl RuntimeThread {
    fn run(&mut self, shutdown: Arc<AtomicBool>) {
        while !shutdown.load(Ordering::Relaxed) {
            let started = Instant::now();
            self.drain_commands();
            self.engine.tick();
            self.state.publish(self.engine.shared_state());
            thread::sleep(self.interval.saturating_sub(started.elapsed()));
        }
        self.engine.stop();
        self.state.publish(self.engine.shared_state());
        log::info!("[RUNTIME] Stopped");
    }

    fn drain_commands(&mut self) {
        while let Ok(command) = self.command_rx.try_recv() {
            let name = command.name();
            if let Err(e) = self.engine.apply(command) {
                log::warn!("[RUNTIME] Command {} failed: {}", name, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::demo::demo_project;
    use crate::model::TrackData;
    use crate::output::{ChannelOutput, MonotonicClock};
    use crate::soundbank::PatchRegistry;

    fn start() -> (Runtime, crate::output::TriggerReceiver) {
        let (output, rx) = ChannelOutput::bounded(4096, Arc::new(MonotonicClock::new()));
        let engine = Engine::new(
            EngineConfig::default(),
            Box::new(output),
            PatchRegistry::in_memory(),
        );
        let runtime = Runtime::start(engine, Duration::from_millis(5)).unwrap();
        (runtime, rx)
    }

    fn settle(handle: &RuntimeHandle) {
        let version = handle.state().version();
        assert!(handle.wait_for_version(version + 1, Duration::from_secs(2)));
    }

    #[test]
    fn test_commands_reach_published_state() {
        let (runtime, _rx) = start();
        let handle = runtime.handle().clone();
        handle
            .send(EngineCommand::LoadProject {
                project: Box::new(demo_project()),
            })
            .unwrap();
        handle.send(EngineCommand::SetTempo { bpm: 96.0 }).unwrap();
        handle
            .send(EngineCommand::AddTrack {
                data: TrackData::default(),
            })
            .unwrap();
        settle(&handle);

        let project = handle.project();
        assert_eq!(project.bpm, 96.0);
        assert_eq!(project.tracks.len(), 4);
        assert_eq!(project.tracks[3].name, "AI Track");
        runtime.shutdown();
    }

    #[test]
    fn test_failed_command_keeps_running() {
        let (runtime, _rx) = start();
        let handle = runtime.handle().clone();
        handle.send(EngineCommand::SetTempo { bpm: -1.0 }).unwrap();
        handle
            .send(EngineCommand::ToggleMute {
                track_id: "missing".to_string(),
            })
            .unwrap();
        handle.send(EngineCommand::SetTempo { bpm: 140.0 }).unwrap();
        settle(&handle);
        assert_eq!(handle.state().tempo(), 140.0);
        runtime.shutdown();
    }

    #[test]
    fn test_play_delivers_triggers() {
        let (runtime, mut rx) = start();
        let handle = runtime.handle().clone();
        handle
            .send(EngineCommand::LoadProject {
                project: Box::new(demo_project()),
            })
            .unwrap();
        handle.send(EngineCommand::Play).unwrap();
        thread::sleep(Duration::from_millis(150));
        assert!(handle.state().is_playing());

        let triggers = rx.take_due(f64::INFINITY);
        assert!(triggers.iter().any(|t| t.track_id == "t1"));
        assert!(triggers.iter().any(|t| t.track_id == "t2"));

        handle.send(EngineCommand::Stop).unwrap();
        settle(&handle);
        assert!(!handle.state().is_playing());
        runtime.shutdown();
    }

    #[test]
    fn test_send_after_shutdown_fails() {
        let (runtime, _rx) = start();
        let handle = runtime.handle().clone();
        runtime.shutdown();
        assert!(handle.is_shutdown_requested());
        assert!(handle.send(EngineCommand::Play).is_err());
    }
}
