//! Instrument patches and their synthesis parameters.
//!
//! A patch is the playable result of the sound bank pipeline. All numeric
//! fields are clamped into their valid ranges when a patch is built or
//! normalized, so a registered patch never carries out-of-bound values.

use serde::{Deserialize, Serialize};

/// Oscillator waveform.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    #[default]
    Sine,
    Square,
    Sawtooth,
    Triangle,
    Noise,
    Custom,
}

impl Waveform {
    /// Parse a waveform name, case-insensitively.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "sine" => Some(Waveform::Sine),
            "square" => Some(Waveform::Square),
            "sawtooth" | "saw" => Some(Waveform::Sawtooth),
            "triangle" => Some(Waveform::Triangle),
            "noise" => Some(Waveform::Noise),
            "custom" => Some(Waveform::Custom),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Waveform::Sine => "sine",
            Waveform::Square => "square",
            Waveform::Sawtooth => "sawtooth",
            Waveform::Triangle => "triangle",
            Waveform::Noise => "noise",
            Waveform::Custom => "custom",
        }
    }
}

/// Filter response type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    #[default]
    Lowpass,
    Highpass,
    Bandpass,
    Lowshelf,
    Highshelf,
    Peaking,
    Notch,
    Allpass,
}

impl FilterKind {
    /// Parse a filter name, case-insensitively.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "lowpass" => Some(FilterKind::Lowpass),
            "highpass" => Some(FilterKind::Highpass),
            "bandpass" => Some(FilterKind::Bandpass),
            "lowshelf" => Some(FilterKind::Lowshelf),
            "highshelf" => Some(FilterKind::Highshelf),
            "peaking" => Some(FilterKind::Peaking),
            "notch" => Some(FilterKind::Notch),
            "allpass" => Some(FilterKind::Allpass),
            _ => None,
        }
    }
}

/// ADSR amplitude envelope. Times are in seconds.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Envelope {
    pub attack: f64,
    pub decay: f64,
    pub sustain: f64,
    pub release: f64,
}

impl Envelope {
    pub const fn new(attack: f64, decay: f64, sustain: f64, release: f64) -> Self {
        Self {
            attack,
            decay,
            sustain,
            release,
        }
    }

    /// Clamp times to `>= 0` and sustain to `[0, 1]`.
    pub fn clamped(self) -> Self {
        Self {
            attack: non_negative(self.attack),
            decay: non_negative(self.decay),
            sustain: unit(self.sustain),
            release: non_negative(self.release),
        }
    }
}

impl Default for Envelope {
    fn default() -> Self {
        Self::new(0.01, 0.2, 0.8, 0.3)
    }
}

/// Filter settings.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub kind: FilterKind,
    /// Cutoff frequency in Hz, always > 0.
    pub frequency: f64,
    /// Resonance, always > 0.
    #[serde(alias = "Q")]
    pub q: f64,
}

impl Filter {
    pub const DEFAULT_FREQUENCY: f64 = 1200.0;
    pub const DEFAULT_Q: f64 = 1.0;

    /// Replace non-positive or non-finite values with the defaults.
    pub fn clamped(self) -> Self {
        Self {
            kind: self.kind,
            frequency: positive_or(self.frequency, Self::DEFAULT_FREQUENCY),
            q: positive_or(self.q, Self::DEFAULT_Q),
        }
    }
}

impl Default for Filter {
    fn default() -> Self {
        Self {
            kind: FilterKind::Lowpass,
            frequency: Self::DEFAULT_FREQUENCY,
            q: Self::DEFAULT_Q,
        }
    }
}

/// Low-frequency oscillator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Lfo {
    /// Rate in Hz, > 0.
    pub rate: f64,
    /// Modulation depth, >= 0.
    pub depth: f64,
}

impl Lfo {
    /// Returns `None` when the rate is unusable.
    pub fn clamped(self) -> Option<Self> {
        if self.rate.is_finite() && self.rate > 0.0 {
            Some(Self {
                rate: self.rate,
                depth: non_negative(self.depth),
            })
        } else {
            None
        }
    }
}

/// Synthesis parameters carried by a patch.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SynthParameters {
    pub oscillator: Waveform,
    pub envelope: Envelope,
    pub filter: Filter,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lfo: Option<Lfo>,
}

impl SynthParameters {
    /// Clamp every field into its valid range.
    pub fn normalized(self) -> Self {
        Self {
            oscillator: self.oscillator,
            envelope: self.envelope.clamped(),
            filter: self.filter.clamped(),
            lfo: self.lfo.and_then(Lfo::clamped),
        }
    }
}

/// How a patch produces sound.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchKind {
    #[default]
    Synth,
    Sampler,
    Procedural,
}

/// A registered, playable instrument configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InstrumentPatch {
    pub id: String,
    pub name: String,
    pub kind: PatchKind,
    pub parameters: SynthParameters,
}

impl InstrumentPatch {
    /// Id of the built-in patch used by tracks without a bound patch.
    pub const DEFAULT_ID: &'static str = "patch_default";

    /// Create a patch, normalizing its parameters.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        kind: PatchKind,
        parameters: SynthParameters,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            parameters: parameters.normalized(),
        }
    }

    /// Generate a fresh patch id.
    pub fn generate_id() -> String {
        format!("patch_{}", uuid::Uuid::new_v4().simple())
    }

    /// The fallback patch: a plain sine voice.
    pub fn default_patch() -> Self {
        Self::new(
            Self::DEFAULT_ID,
            "Default",
            PatchKind::Synth,
            SynthParameters::default(),
        )
    }

    /// Return a copy with every parameter clamped into range.
    pub fn normalized(self) -> Self {
        Self {
            parameters: self.parameters.normalized(),
            ..self
        }
    }
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() {
        value.max(0.0)
    } else {
        0.0
    }
}

fn unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn positive_or(value: f64, default: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        default
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_clamping() {
        let env = Envelope::new(-1.0, f64::NAN, 1.7, 0.4).clamped();
        assert_eq!(env, Envelope::new(0.0, 0.0, 1.0, 0.4));
    }

    #[test]
    fn test_filter_replaces_non_positive_values() {
        let filter = Filter {
            kind: FilterKind::Highpass,
            frequency: 0.0,
            q: -2.0,
        }
        .clamped();
        assert_eq!(filter.kind, FilterKind::Highpass);
        assert_eq!(filter.frequency, 1200.0);
        assert_eq!(filter.q, 1.0);
    }

    #[test]
    fn test_lfo_with_zero_rate_is_dropped() {
        let params = SynthParameters {
            lfo: Some(Lfo {
                rate: 0.0,
                depth: 0.1,
            }),
            ..Default::default()
        }
        .normalized();
        assert_eq!(params.lfo, None);
    }

    #[test]
    fn test_waveform_names() {
        assert_eq!(Waveform::from_name("SawTooth"), Some(Waveform::Sawtooth));
        assert_eq!(Waveform::from_name("wobble"), None);
        assert_eq!(Waveform::Noise.name(), "noise");
    }

    #[test]
    fn test_patch_json_shape() {
        let patch = InstrumentPatch::default_patch();
        let json = serde_json::to_value(&patch).unwrap();
        assert_eq!(json["kind"], "synth");
        assert_eq!(json["parameters"]["oscillator"], "sine");
        assert_eq!(json["parameters"]["filter"]["kind"], "lowpass");
        assert!(json["parameters"].get("lfo").is_none());
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let a = InstrumentPatch::generate_id();
        let b = InstrumentPatch::generate_id();
        assert!(a.starts_with("patch_"));
        assert_ne!(a, b);
    }
}
