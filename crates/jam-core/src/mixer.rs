//! Per-track gain staging with mute, solo and a master bus.
//!
//! The mix graph holds no audio. It answers one question for the scheduler:
//! how loud should the next trigger on a track be. State changes only
//! affect triggers committed after them.

use std::collections::HashMap;

use crate::error::EngineError;
use crate::model::{clamp_pan, clamp_volume, Track, TrackId};

/// Mix state of a single track.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChannelStrip {
    pub volume: f32,
    pub pan: f32,
    pub muted: bool,
    pub solo: bool,
}

impl ChannelStrip {
    fn from_track(track: &Track) -> Self {
        Self {
            volume: clamp_volume(track.volume),
            pan: clamp_pan(track.pan),
            muted: track.muted,
            solo: track.solo,
        }
    }
}

/// Track strips plus the master bus.
#[derive(Clone, Debug)]
pub struct MixGraph {
    strips: HashMap<TrackId, ChannelStrip>,
    master_gain: f32,
}

impl Default for MixGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl MixGraph {
    pub fn new() -> Self {
        Self {
            strips: HashMap::new(),
            master_gain: 1.0,
        }
    }

    /// Build strips for every track.
    pub fn from_tracks(tracks: &[Track]) -> Self {
        let mut graph = Self::new();
        for track in tracks {
            graph.add_track(track);
        }
        graph
    }

    /// Add (or replace) the strip of a track from its stored mix values.
    pub fn add_track(&mut self, track: &Track) {
        self.strips
            .insert(track.id.clone(), ChannelStrip::from_track(track));
    }

    pub fn remove_track(&mut self, id: &str) -> Option<ChannelStrip> {
        self.strips.remove(id)
    }

    pub fn strip(&self, id: &str) -> Option<&ChannelStrip> {
        self.strips.get(id)
    }

    pub fn track_count(&self) -> usize {
        self.strips.len()
    }

    fn strip_mut(&mut self, id: &str) -> Result<&mut ChannelStrip, EngineError> {
        self.strips
            .get_mut(id)
            .ok_or_else(|| EngineError::UnknownTrack(id.to_string()))
    }

    /// Set the fader level, clamped to `[0, 1]`. Returns the stored value.
    pub fn set_volume(&mut self, id: &str, volume: f32) -> Result<f32, EngineError> {
        let strip = self.strip_mut(id)?;
        strip.volume = clamp_volume(volume);
        Ok(strip.volume)
    }

    /// Set the pan, clamped to `[-1, 1]`. Returns the stored value.
    pub fn set_pan(&mut self, id: &str, pan: f32) -> Result<f32, EngineError> {
        let strip = self.strip_mut(id)?;
        strip.pan = clamp_pan(pan);
        Ok(strip.pan)
    }

    /// Flip the mute flag. Returns the new state.
    pub fn toggle_mute(&mut self, id: &str) -> Result<bool, EngineError> {
        let strip = self.strip_mut(id)?;
        strip.muted = !strip.muted;
        Ok(strip.muted)
    }

    /// Flip the solo flag. Returns the new state.
    pub fn toggle_solo(&mut self, id: &str) -> Result<bool, EngineError> {
        let strip = self.strip_mut(id)?;
        strip.solo = !strip.solo;
        Ok(strip.solo)
    }

    /// Set the master gain, clamped to `[0, 1]`. Returns the stored value.
    pub fn set_master_gain(&mut self, gain: f32) -> f32 {
        self.master_gain = clamp_volume(gain);
        self.master_gain
    }

    pub fn master_gain(&self) -> f32 {
        self.master_gain
    }

    /// Whether any track is soloed.
    pub fn any_solo(&self) -> bool {
        self.strips.values().any(|s| s.solo)
    }

    /// Gain of a track before the master bus.
    ///
    /// Zero for unknown and muted tracks, and for every non-soloed track
    /// while some track is soloed. A soloed track still honors its own mute.
    pub fn effective_gain(&self, id: &str) -> f32 {
        let Some(strip) = self.strips.get(id) else {
            return 0.0;
        };
        if self.any_solo() && !strip.solo {
            return 0.0;
        }
        if strip.muted {
            0.0
        } else {
            strip.volume
        }
    }

    /// Gain of a track after the master bus.
    pub fn output_gain(&self, id: &str) -> f32 {
        self.effective_gain(id) * self.master_gain
    }

    /// Whether a trigger on this track would be heard at all.
    pub fn is_audible(&self, id: &str) -> bool {
        self.effective_gain(id) > 0.0
    }

    /// Copy the strip state back into a track (for snapshots).
    pub fn write_back(&self, track: &mut Track) {
        if let Some(strip) = self.strips.get(&track.id) {
            track.volume = strip.volume;
            track.pan = strip.pan;
            track.muted = strip.muted;
            track.solo = strip.solo;
        }
    }
}
