//! Project model: tracks, regions and notes.
//!
//! Region positions are in bars, note positions in beats relative to the
//! start of their region. Constructors clamp out-of-range values; data
//! that arrives through deserialization is clamped by
//! [`ProjectState::normalized`] and re-checked by the scheduler.

use serde::{Deserialize, Serialize};

/// Identifier of a track.
pub type TrackId = String;

/// Identifier of a region.
pub type RegionId = String;

/// Shortest note the model accepts, in beats.
pub const MIN_NOTE_BEATS: f64 = 1.0 / 64.0;

/// Shortest region the model accepts, in bars.
pub const MIN_REGION_BARS: f64 = 1.0 / 16.0;

/// Color used for tracks created without one.
pub const DEFAULT_TRACK_COLOR: &str = "#a78bfa";

/// Kind of content a track plays.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TrackType {
    /// Regions are triggered once at their start.
    #[default]
    Audio,
    /// Notes inside regions are triggered.
    Midi,
    /// Notes when a region has any, otherwise the region start.
    Hybrid,
}

/// A note inside a MIDI region.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MidiNote {
    /// MIDI pitch, 0-127.
    #[serde(alias = "midi")]
    pub pitch: u8,
    /// Start in beats relative to the region start.
    pub time: f64,
    /// Length in beats.
    pub duration: f64,
    /// Velocity in `[0, 1]`.
    pub velocity: f32,
}

impl MidiNote {
    pub fn new(pitch: u8, time: f64, duration: f64, velocity: f32) -> Self {
        Self {
            pitch,
            time,
            duration,
            velocity,
        }
        .clamped()
    }

    /// Clamp every field into range.
    pub fn clamped(self) -> Self {
        Self {
            pitch: self.pitch.min(127),
            time: if self.time.is_finite() { self.time.max(0.0) } else { 0.0 },
            duration: if self.duration.is_finite() {
                self.duration.max(MIN_NOTE_BEATS)
            } else {
                MIN_NOTE_BEATS
            },
            velocity: if self.velocity.is_finite() {
                self.velocity.clamp(0.0, 1.0)
            } else {
                0.0
            },
        }
    }
}

/// A time-bounded clip placed on a track.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub id: RegionId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub color: String,
    /// Start in bars.
    pub start: f64,
    /// Length in bars.
    pub duration: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<MidiNote>,
}

impl Region {
    pub fn new(id: impl Into<RegionId>, start: f64, duration: f64) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            color: String::new(),
            start,
            duration,
            notes: Vec::new(),
        }
        .clamped()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    pub fn with_note(mut self, note: MidiNote) -> Self {
        self.notes.push(note.clamped());
        self
    }

    pub fn with_notes(mut self, notes: impl IntoIterator<Item = MidiNote>) -> Self {
        self.notes.extend(notes.into_iter().map(MidiNote::clamped));
        self
    }

    /// End of the region in bars (exclusive).
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }

    /// Whether the region has a usable position and length.
    pub fn is_well_formed(&self) -> bool {
        self.start.is_finite() && self.start >= 0.0 && self.duration.is_finite() && self.duration > 0.0
    }

    /// Clamp position, length and notes into range.
    pub fn clamped(self) -> Self {
        Self {
            start: if self.start.is_finite() { self.start.max(0.0) } else { 0.0 },
            duration: if self.duration.is_finite() {
                self.duration.max(MIN_REGION_BARS)
            } else {
                MIN_REGION_BARS
            },
            notes: self.notes.into_iter().map(MidiNote::clamped).collect(),
            ..self
        }
    }
}

/// A track in the project.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub name: String,
    #[serde(rename = "type", default)]
    pub track_type: TrackType,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub muted: bool,
    #[serde(default)]
    pub solo: bool,
    /// Fader level in `[0, 1]`.
    pub volume: f32,
    /// Stereo position in `[-1, 1]`.
    #[serde(default)]
    pub pan: f32,
    #[serde(default)]
    pub regions: Vec<Region>,
    /// Display label of the instrument, e.g. "Kora".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instrument: Option<String>,
    /// Registered patch the track plays through.
    #[serde(default, alias = "patchId", skip_serializing_if = "Option::is_none")]
    pub patch_id: Option<String>,
}

impl Track {
    pub fn new(id: impl Into<TrackId>, name: impl Into<String>, track_type: TrackType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            track_type,
            color: DEFAULT_TRACK_COLOR.to_string(),
            muted: false,
            solo: false,
            volume: TrackData::DEFAULT_VOLUME,
            pan: 0.0,
            regions: Vec::new(),
            instrument: None,
            patch_id: None,
        }
    }

    pub fn with_region(mut self, region: Region) -> Self {
        self.regions.push(region.clamped());
        self
    }

    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = clamp_volume(volume);
        self
    }

    pub fn with_pan(mut self, pan: f32) -> Self {
        self.pan = clamp_pan(pan);
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    pub fn with_instrument(mut self, instrument: impl Into<String>) -> Self {
        self.instrument = Some(instrument.into());
        self
    }

    pub fn with_patch(mut self, patch_id: impl Into<String>) -> Self {
        self.patch_id = Some(patch_id.into());
        self
    }

    /// Clamp mix values and regions into range.
    pub fn normalized(self) -> Self {
        Self {
            volume: clamp_volume(self.volume),
            pan: clamp_pan(self.pan),
            regions: self.regions.into_iter().map(Region::clamped).collect(),
            ..self
        }
    }
}

/// Partial track description used by `add_track`.
///
/// Missing fields take the defaults of a freshly generated track.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackData {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub track_type: Option<TrackType>,
    pub color: Option<String>,
    pub instrument: Option<String>,
    pub regions: Option<Vec<Region>>,
    pub patch_id: Option<String>,
}

impl TrackData {
    pub const DEFAULT_NAME: &'static str = "AI Track";
    pub const DEFAULT_INSTRUMENT: &'static str = "Synth";
    pub const DEFAULT_VOLUME: f32 = 0.8;

    /// Build a track with a freshly generated id.
    pub fn into_track(self) -> Track {
        self.into_track_with_id(format!("t-{}", uuid::Uuid::new_v4().simple()))
    }

    pub fn into_track_with_id(self, id: impl Into<TrackId>) -> Track {
        Track {
            id: id.into(),
            name: self.name.unwrap_or_else(|| Self::DEFAULT_NAME.to_string()),
            track_type: self.track_type.unwrap_or_default(),
            color: self.color.unwrap_or_else(|| DEFAULT_TRACK_COLOR.to_string()),
            muted: false,
            solo: false,
            volume: Self::DEFAULT_VOLUME,
            pan: 0.0,
            regions: self
                .regions
                .unwrap_or_default()
                .into_iter()
                .map(Region::clamped)
                .collect(),
            instrument: Some(
                self.instrument
                    .unwrap_or_else(|| Self::DEFAULT_INSTRUMENT.to_string()),
            ),
            patch_id: self.patch_id,
        }
    }
}

/// Aggregate root of a session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProjectState {
    pub id: String,
    pub name: String,
    pub bpm: f64,
    #[serde(default, alias = "isPlaying")]
    pub is_playing: bool,
    /// Transport position in seconds.
    #[serde(default, alias = "currentTime")]
    pub current_time: f64,
    #[serde(default)]
    pub tracks: Vec<Track>,
}

impl Default for ProjectState {
    fn default() -> Self {
        Self {
            id: "proj_1".to_string(),
            name: "Untitled Jam 1".to_string(),
            bpm: crate::timing::DEFAULT_BPM,
            is_playing: false,
            current_time: 0.0,
            tracks: Vec::new(),
        }
    }
}

impl ProjectState {
    /// Parse a project from JSON and clamp it into range.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        let project: ProjectState = serde_json::from_str(json)?;
        Ok(project.normalized())
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn track(&self, id: &str) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == id)
    }

    /// Clamp tempo, time and every track into range.
    pub fn normalized(self) -> Self {
        Self {
            bpm: crate::timing::validate_bpm(self.bpm).unwrap_or(crate::timing::DEFAULT_BPM),
            current_time: if self.current_time.is_finite() {
                self.current_time.max(0.0)
            } else {
                0.0
            },
            tracks: self.tracks.into_iter().map(Track::normalized).collect(),
            ..self
        }
    }
}

pub fn clamp_volume(volume: f32) -> f32 {
    if volume.is_finite() {
        volume.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

pub fn clamp_pan(pan: f32) -> f32 {
    if pan.is_finite() {
        pan.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}
