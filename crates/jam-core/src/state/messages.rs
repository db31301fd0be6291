//! Commands accepted by the engine.
//!
//! Every user intent reaches the engine as an [`EngineCommand`]. The
//! runtime applies them in arrival order between ticks.

use crate::model::{ProjectState, TrackData, TrackId};

/// A state change requested by the UI layer or the CLI.
#[derive(Clone, Debug, PartialEq)]
pub enum EngineCommand {
    // === Transport ===
    /// Set the tempo in BPM.
    SetTempo { bpm: f64 },

    /// Start or resume playback.
    Play,

    /// Freeze the playhead and drop pending triggers.
    Pause,

    /// Stop, rewind to zero and drop pending triggers.
    Stop,

    /// Move the playhead to a position in seconds.
    Seek { seconds: f64 },

    // === Mixer ===
    SetVolume { track_id: TrackId, volume: f32 },

    SetPan { track_id: TrackId, pan: f32 },

    ToggleMute { track_id: TrackId },

    ToggleSolo { track_id: TrackId },

    SetMasterGain { gain: f32 },

    // === Tracks ===
    /// Create a track from partial data.
    AddTrack { data: TrackData },

    RemoveTrack { track_id: TrackId },

    /// Replace the whole session.
    LoadProject { project: Box<ProjectState> },

    // === Sound bank ===
    /// Generate a patch in the background, optionally binding it to a track.
    RequestPatch {
        prompt: String,
        genre: Option<String>,
        target_track: Option<TrackId>,
    },

    /// Bind a registered patch to a track.
    BindPatch { track_id: TrackId, patch_id: String },
}

impl EngineCommand {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            EngineCommand::SetTempo { .. } => "set_tempo",
            EngineCommand::Play => "play",
            EngineCommand::Pause => "pause",
            EngineCommand::Stop => "stop",
            EngineCommand::Seek { .. } => "seek",
            EngineCommand::SetVolume { .. } => "set_volume",
            EngineCommand::SetPan { .. } => "set_pan",
            EngineCommand::ToggleMute { .. } => "toggle_mute",
            EngineCommand::ToggleSolo { .. } => "toggle_solo",
            EngineCommand::SetMasterGain { .. } => "set_master_gain",
            EngineCommand::AddTrack { .. } => "add_track",
            EngineCommand::RemoveTrack { .. } => "remove_track",
            EngineCommand::LoadProject { .. } => "load_project",
            EngineCommand::RequestPatch { .. } => "request_patch",
            EngineCommand::BindPatch { .. } => "bind_patch",
        }
    }
}
