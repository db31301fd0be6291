//! The engine: one owned session timeline.
//!
//! [`Engine`] owns the transport, scheduler, mix graph, tracks and patch
//! registry. It is driven by two kinds of calls:
//! - command methods (`play`, `set_volume`, ...) reflecting user intent
//! - [`Engine::tick`], invoked roughly periodically by a host driver such
//!   as [`Runtime`](crate::runtime::Runtime)
//!
//! Nothing here blocks: patch generation runs on the [`PatchRequester`]
//! worker and trigger delivery goes through a non-blocking [`OutputSink`].

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::mixer::MixGraph;
use crate::model::{ProjectState, Track, TrackData, TrackId};
use crate::output::OutputSink;
use crate::patch::InstrumentPatch;
use crate::scheduler::{LookaheadScheduler, ScheduleContext, TickReport};
use crate::soundbank::{
    service_from_config, PatchRegistry, PatchRequester, SoundDescriptorGenerator,
};
use crate::state::{EngineCommand, SharedState};
use crate::timing::TransportClock;

/// A session: transport, tracks, mix and sound bank.
pub struct Engine {
    config: EngineConfig,
    project_id: String,
    project_name: String,
    tracks: Vec<Track>,
    mix: MixGraph,
    clock: TransportClock,
    scheduler: LookaheadScheduler,
    registry: PatchRegistry,
    output: Box<dyn OutputSink>,
    requester: Option<PatchRequester>,
    last_now: Option<f64>,
}

impl Engine {
    /// Create an engine with an empty session.
    pub fn new(config: EngineConfig, output: Box<dyn OutputSink>, registry: PatchRegistry) -> Self {
        let mut clock = TransportClock::with_loop(config.time_signature, config.loop_bars);
        if let Err(e) = clock.set_tempo(config.tempo) {
            log::warn!("[ENGINE] Ignoring configured tempo: {}", e);
        }
        let defaults = ProjectState::default();
        Self {
            scheduler: LookaheadScheduler::new(config.scheduler.clone()),
            config,
            project_id: defaults.id,
            project_name: defaults.name,
            tracks: Vec::new(),
            mix: MixGraph::new(),
            clock,
            registry,
            output,
            requester: None,
            last_now: None,
        }
    }

    /// Build an engine with the sound bank described by `config`: a file or
    /// memory backed registry (loaded from storage) and a patch worker.
    pub fn from_config(config: EngineConfig, output: Box<dyn OutputSink>) -> Result<Self> {
        let registry =
            PatchRegistry::from_config(&config).context("Failed to open patch store")?;

        let generator = SoundDescriptorGenerator::new(service_from_config(&config.remote));
        let requester =
            PatchRequester::spawn(generator).context("Failed to start patch worker")?;

        Ok(Self::new(config, output, registry).with_requester(requester))
    }

    /// Attach a patch worker.
    pub fn with_requester(mut self, requester: PatchRequester) -> Self {
        self.requester = Some(requester);
        self
    }

    // === Accessors ===

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn clock(&self) -> &TransportClock {
        &self.clock
    }

    pub fn scheduler(&self) -> &LookaheadScheduler {
        &self.scheduler
    }

    pub fn mix(&self) -> &MixGraph {
        &self.mix
    }

    pub fn registry(&self) -> &PatchRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut PatchRegistry {
        &mut self.registry
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track(&self, id: &str) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == id)
    }

    pub fn is_playing(&self) -> bool {
        self.clock.is_playing()
    }

    /// Patch requests submitted but not yet applied.
    pub fn pending_patches(&self) -> usize {
        self.requester.as_ref().map_or(0, PatchRequester::in_flight)
    }

    // === Session ===

    /// Replace the session with `project`.
    ///
    /// The transport is stopped first; it resumes if the project says it is
    /// playing.
    pub fn load_project(&mut self, project: ProjectState) -> Result<(), EngineError> {
        let project = project.normalized();
        self.stop();
        self.clock.set_tempo(project.bpm)?;
        self.clock.seek(project.current_time);
        self.mix = MixGraph::from_tracks(&project.tracks);
        self.project_id = project.id;
        self.project_name = project.name;
        self.tracks = project.tracks;
        log::info!(
            "[ENGINE] Loaded project '{}' ({} tracks, {} bpm)",
            self.project_name,
            self.tracks.len(),
            project.bpm
        );
        if project.is_playing {
            self.play();
        }
        Ok(())
    }

    /// Snapshot of the session with current mix and transport values.
    pub fn project(&self) -> ProjectState {
        let tracks = self
            .tracks
            .iter()
            .map(|track| {
                let mut track = track.clone();
                self.mix.write_back(&mut track);
                track
            })
            .collect();
        ProjectState {
            id: self.project_id.clone(),
            name: self.project_name.clone(),
            bpm: self.clock.bpm(),
            is_playing: self.clock.is_playing(),
            current_time: self.clock.position(),
            tracks,
        }
    }

    /// Everything the runtime publishes to readers.
    pub fn shared_state(&self) -> SharedState {
        SharedState {
            project: self.project(),
            master_gain: self.mix.master_gain(),
            position_beats: self.clock.position_beats(),
            session: self.scheduler.session(),
            patches: self.registry.list().iter().map(|p| p.id.clone()).collect(),
            pending_patches: self.pending_patches(),
            version: 0,
        }
    }

    // === Transport ===

    /// Set the tempo. Committed triggers keep their times.
    pub fn set_tempo(&mut self, bpm: f64) -> Result<(), EngineError> {
        let now = self.output.now();
        self.sync_clock(now);
        self.clock.set_tempo(bpm)?;
        log::info!("[ENGINE] Tempo set to {} bpm", bpm);
        Ok(())
    }

    /// Start or resume playback from the current position.
    pub fn play(&mut self) {
        if self.clock.is_playing() {
            return;
        }
        let now = self.output.now();
        self.sync_clock(now);
        self.clock.play();
        self.scheduler.start(
            now,
            self.clock.position_beats(),
            self.clock.time_signature(),
            self.clock.loop_bars(),
        );
        self.output.set_session(self.scheduler.session());
        log::info!("[ENGINE] Play from {:.3}s", self.clock.position());
    }

    /// Freeze the playhead and discard triggers that have not sounded.
    pub fn pause(&mut self) {
        let now = self.output.now();
        self.sync_clock(now);
        self.clock.pause();
        self.halt();
        log::info!("[ENGINE] Paused at {:.3}s", self.clock.position());
    }

    /// Stop, rewind and discard triggers that have not sounded.
    pub fn stop(&mut self) {
        self.clock.stop();
        self.halt();
        log::info!("[ENGINE] Stopped");
    }

    /// Move the playhead. While playing, scheduling restarts from there.
    pub fn seek(&mut self, seconds: f64) {
        let now = self.output.now();
        self.sync_clock(now);
        self.clock.seek(seconds);
        if self.clock.is_playing() {
            self.output.cancel_pending(None);
            self.scheduler.start(
                now,
                self.clock.position_beats(),
                self.clock.time_signature(),
                self.clock.loop_bars(),
            );
            self.output.set_session(self.scheduler.session());
        }
        log::debug!("[ENGINE] Seek to {:.3}s", self.clock.position());
    }

    fn halt(&mut self) {
        if self.scheduler.is_running() {
            self.scheduler.stop();
            self.output.set_session(self.scheduler.session());
            self.output.cancel_pending(None);
        }
    }

    /// Bring the transport up to `now` without scheduling.
    fn sync_clock(&mut self, now: f64) {
        let delta = self.last_now.map_or(0.0, |last| now - last);
        self.last_now = Some(now);
        self.clock.advance(delta);
    }

    // === Mixer ===

    pub fn set_volume(&mut self, track_id: &str, volume: f32) -> Result<f32, EngineError> {
        self.mix.set_volume(track_id, volume)
    }

    pub fn set_pan(&mut self, track_id: &str, pan: f32) -> Result<f32, EngineError> {
        self.mix.set_pan(track_id, pan)
    }

    pub fn toggle_mute(&mut self, track_id: &str) -> Result<bool, EngineError> {
        self.mix.toggle_mute(track_id)
    }

    pub fn toggle_solo(&mut self, track_id: &str) -> Result<bool, EngineError> {
        self.mix.toggle_solo(track_id)
    }

    pub fn set_master_gain(&mut self, gain: f32) -> f32 {
        self.mix.set_master_gain(gain)
    }

    // === Tracks ===

    /// Append a track built from partial data. Returns its generated id.
    pub fn add_track(&mut self, data: TrackData) -> TrackId {
        self.insert_track(data.into_track())
    }

    /// Append a fully specified track.
    pub fn insert_track(&mut self, track: Track) -> TrackId {
        let track = track.normalized();
        let id = track.id.clone();
        self.mix.add_track(&track);
        log::info!("[ENGINE] Added track '{}' ({})", track.name, id);
        self.tracks.push(track);
        id
    }

    /// Remove a track and cancel its pending triggers.
    pub fn remove_track(&mut self, track_id: &str) -> Result<Track, EngineError> {
        let index = self
            .tracks
            .iter()
            .position(|t| t.id == track_id)
            .ok_or_else(|| EngineError::UnknownTrack(track_id.to_string()))?;
        let mut track = self.tracks.remove(index);
        self.mix.write_back(&mut track);
        self.mix.remove_track(track_id);
        self.output.cancel_pending(Some(track_id));
        log::info!("[ENGINE] Removed track {}", track_id);
        Ok(track)
    }

    // === Sound bank ===

    /// Queue a patch generation. The result is registered on a later tick
    /// and bound to `target_track` if given.
    pub fn request_patch(
        &mut self,
        prompt: &str,
        genre: Option<&str>,
        target_track: Option<&str>,
    ) -> Result<u64, EngineError> {
        if let Some(id) = target_track {
            if self.track(id).is_none() {
                return Err(EngineError::UnknownTrack(id.to_string()));
            }
        }
        let requester = self
            .requester
            .as_mut()
            .ok_or(EngineError::ChannelClosed("patch requests"))?;
        let id = requester.request(prompt, genre, target_track.map(str::to_string))?;
        log::info!("[ENGINE] Requested patch #{} for '{}'", id, prompt);
        Ok(id)
    }

    /// Register a patch directly. Returns its id.
    pub fn register_patch(&mut self, patch: InstrumentPatch) -> String {
        self.registry.register(patch)
    }

    /// Bind a registered patch to a track.
    pub fn bind_patch(&mut self, track_id: &str, patch_id: &str) -> Result<(), EngineError> {
        if !self.registry.contains(patch_id) {
            return Err(EngineError::UnknownPatch(patch_id.to_string()));
        }
        let track = self
            .tracks
            .iter_mut()
            .find(|t| t.id == track_id)
            .ok_or_else(|| EngineError::UnknownTrack(track_id.to_string()))?;
        track.patch_id = Some(patch_id.to_string());
        log::info!("[ENGINE] Bound patch {} to track {}", patch_id, track_id);
        Ok(())
    }

    fn apply_patch_results(&mut self) {
        let Some(requester) = self.requester.as_mut() else {
            return;
        };
        for result in requester.try_results() {
            let patch_id = self.registry.register(result.patch);
            if let Some(track_id) = result.request.target_track {
                if let Err(e) = self.bind_patch(&track_id, &patch_id) {
                    log::warn!("[ENGINE] Cannot bind patch {}: {}", patch_id, e);
                }
            }
        }
    }

    // === Commands ===

    /// Apply a command.
    pub fn apply(&mut self, command: EngineCommand) -> Result<(), EngineError> {
        match command {
            EngineCommand::SetTempo { bpm } => self.set_tempo(bpm)?,
            EngineCommand::Play => self.play(),
            EngineCommand::Pause => self.pause(),
            EngineCommand::Stop => self.stop(),
            EngineCommand::Seek { seconds } => self.seek(seconds),
            EngineCommand::SetVolume { track_id, volume } => {
                self.set_volume(&track_id, volume)?;
            }
            EngineCommand::SetPan { track_id, pan } => {
                self.set_pan(&track_id, pan)?;
            }
            EngineCommand::ToggleMute { track_id } => {
                self.toggle_mute(&track_id)?;
            }
            EngineCommand::ToggleSolo { track_id } => {
                self.toggle_solo(&track_id)?;
            }
            EngineCommand::SetMasterGain { gain } => {
                self.set_master_gain(gain);
            }
            EngineCommand::AddTrack { data } => {
                self.add_track(data);
            }
            EngineCommand::RemoveTrack { track_id } => {
                self.remove_track(&track_id)?;
            }
            EngineCommand::LoadProject { project } => self.load_project(*project)?,
            EngineCommand::RequestPatch {
                prompt,
                genre,
                target_track,
            } => {
                self.request_patch(&prompt, genre.as_deref(), target_track.as_deref())?;
            }
            EngineCommand::BindPatch { track_id, patch_id } => {
                self.bind_patch(&track_id, &patch_id)?;
            }
        }
        Ok(())
    }

    // === Tick ===

    /// One scheduling step: apply finished patches, advance the transport
    /// to the output clock and commit triggers inside the lookahead window.
    pub fn tick(&mut self) -> TickReport {
        let now = self.output.now();
        self.apply_patch_results();
        self.sync_clock(now);

        let ctx = ScheduleContext {
            bpm: self.clock.bpm(),
            signature: self.clock.time_signature(),
            loop_bars: self.clock.loop_bars(),
            position_beats: self.clock.position_beats(),
            tracks: &self.tracks,
            mix: &self.mix,
            registry: &self.registry,
        };
        let report = self.scheduler.tick(now, &ctx, self.output.as_mut());
        if report.triggers > 0 {
            log::debug!(
                "[ENGINE] Tick committed {} triggers over {} steps",
                report.triggers,
                report.steps
            );
        }
        report
    }

    /// Default patch shared by unbound tracks.
    pub fn default_patch(&self) -> Arc<InstrumentPatch> {
        self.registry.default_patch().clone()
    }
}
