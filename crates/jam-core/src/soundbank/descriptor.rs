//! Sound descriptors and the prompt-to-descriptor pipeline.
//!
//! A [`SoundDescriptor`] is the loose, partially filled description a remote
//! service or the keyword heuristic produces. [`SoundDescriptor::to_patch`]
//! turns it into a fully specified [`InstrumentPatch`], filling every
//! missing field with a documented default.

use serde::{Deserialize, Serialize};

use super::remote::{DescriptorRequest, DescriptorService};
use crate::error::RemoteError;
use crate::patch::{
    Envelope, Filter, FilterKind, InstrumentPatch, Lfo, PatchKind, SynthParameters, Waveform,
};

/// Name given to patches whose descriptor carries none.
pub const DEFAULT_PATCH_NAME: &str = "AI Patch";

/// Oscillator part of a descriptor.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OscillatorSpec {
    #[serde(rename = "type", alias = "kind", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detune: Option<f64>,
}

/// Filter part of a descriptor.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSpec {
    #[serde(rename = "type", alias = "kind", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency: Option<f64>,
    #[serde(rename = "Q", alias = "q", skip_serializing_if = "Option::is_none")]
    pub q: Option<f64>,
}

/// Granular settings. Their presence marks a procedural patch.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrainSpec {
    /// Grain length in seconds.
    #[serde(rename = "grainSize", alias = "grain_size")]
    pub grain_size: f64,
    pub density: f64,
    pub texture: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DescriptorMetadata {
    pub tags: Vec<String>,
}

/// A synthesis description with every field optional.
///
/// Unknown JSON fields are ignored and missing ones stay `None`, so any
/// object-shaped response parses.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoundDescriptor {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oscillator: Option<OscillatorSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub envelope: Option<Envelope>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<FilterSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lfo: Option<Lfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grain: Option<GrainSpec>,
    pub metadata: DescriptorMetadata,
}

/// A group of prompt keywords and the overrides it applies.
struct KeywordFamily {
    tag: &'static str,
    keywords: &'static [&'static str],
    apply: fn(&mut SoundDescriptor),
}

impl KeywordFamily {
    fn matches(&self, prompt: &str) -> bool {
        self.keywords.iter().any(|k| prompt.contains(k))
    }
}

/// Families in application order. Later families overwrite what they set.
const KEYWORD_FAMILIES: [KeywordFamily; 3] = [
    KeywordFamily {
        tag: "bass",
        keywords: &["bass", "808"],
        apply: |d| {
            d.set_waveform("sine");
            d.envelope = Some(Envelope::new(0.005, 0.12, 0.9, 0.2));
            d.set_cutoff(900.0);
        },
    },
    KeywordFamily {
        tag: "afro",
        keywords: &["makossa", "bikutsi", "afro"],
        apply: |d| {
            d.set_waveform("square");
            d.envelope = Some(Envelope::new(0.01, 0.25, 0.75, 0.35));
            d.set_cutoff(1800.0);
            d.lfo = Some(Lfo {
                rate: 4.5,
                depth: 0.03,
            });
        },
    },
    KeywordFamily {
        tag: "percussion",
        keywords: &["shaker", "percu", "dry"],
        apply: |d| {
            d.set_waveform("noise");
            d.grain = Some(GrainSpec {
                grain_size: 0.05,
                density: 0.8,
                texture: "white".to_string(),
            });
            d.envelope = Some(Envelope::new(0.001, 0.06, 0.0, 0.05));
        },
    },
];

impl SoundDescriptor {
    /// Starting point of the heuristic: a mellow filtered saw.
    pub fn base(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            genre: None,
            oscillator: Some(OscillatorSpec {
                kind: Some(Waveform::Sawtooth.name().to_string()),
                detune: Some(0.0),
            }),
            envelope: Some(Envelope::default()),
            filter: Some(FilterSpec {
                kind: Some("lowpass".to_string()),
                frequency: Some(Filter::DEFAULT_FREQUENCY),
                q: Some(Filter::DEFAULT_Q),
            }),
            lfo: Some(Lfo {
                rate: 5.0,
                depth: 0.02,
            }),
            grain: None,
            metadata: DescriptorMetadata::default(),
        }
    }

    /// Deterministic keyword heuristic used when no remote descriptor is
    /// available.
    pub fn fallback(prompt: &str) -> Self {
        let lower = prompt.to_lowercase();
        let mut descriptor = Self::base(prompt);
        for family in &KEYWORD_FAMILIES {
            if family.matches(&lower) {
                (family.apply)(&mut descriptor);
                descriptor.metadata.tags.push(family.tag.to_string());
            }
        }
        descriptor
    }

    pub fn tags(&self) -> &[String] {
        &self.metadata.tags
    }

    fn set_waveform(&mut self, name: &str) {
        self.oscillator.get_or_insert_with(Default::default).kind = Some(name.to_string());
    }

    fn set_cutoff(&mut self, frequency: f64) {
        self.filter.get_or_insert_with(Default::default).frequency = Some(frequency);
    }

    /// Synthesis parameters with defaults for everything missing.
    pub fn to_parameters(&self) -> SynthParameters {
        let oscillator = self
            .oscillator
            .as_ref()
            .and_then(|o| o.kind.as_deref())
            .and_then(Waveform::from_name)
            .unwrap_or_default();

        let filter = match &self.filter {
            Some(spec) => Filter {
                kind: spec
                    .kind
                    .as_deref()
                    .and_then(FilterKind::from_name)
                    .unwrap_or_default(),
                frequency: spec.frequency.unwrap_or(Filter::DEFAULT_FREQUENCY),
                q: spec.q.unwrap_or(Filter::DEFAULT_Q),
            },
            None => Filter::default(),
        };

        SynthParameters {
            oscillator,
            envelope: self.envelope.unwrap_or_default(),
            filter,
            lfo: self.lfo,
        }
        .normalized()
    }

    /// Build a playable patch with a fresh id.
    pub fn to_patch(&self) -> InstrumentPatch {
        let name = self
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(DEFAULT_PATCH_NAME);
        let kind = if self.grain.is_some() {
            PatchKind::Procedural
        } else {
            PatchKind::Synth
        };
        InstrumentPatch::new(InstrumentPatch::generate_id(), name, kind, self.to_parameters())
    }
}

/// Turns prompts into descriptors: remote first, heuristic on any failure.
pub struct SoundDescriptorGenerator {
    service: Box<dyn DescriptorService>,
}

impl SoundDescriptorGenerator {
    pub fn new(service: Box<dyn DescriptorService>) -> Self {
        Self { service }
    }

    /// Generator that always uses the heuristic.
    pub fn offline() -> Self {
        Self::new(Box::new(super::remote::OfflineDescriptorService))
    }

    /// Produce a descriptor for `prompt`. Never fails.
    pub fn generate(&self, prompt: &str, genre: Option<&str>) -> SoundDescriptor {
        let request = DescriptorRequest::new(prompt, genre);
        let mut descriptor = match self.service.fetch(&request) {
            Ok(descriptor) => {
                log::debug!("[SOUNDBANK] Remote descriptor for '{}'", prompt);
                descriptor
            }
            Err(RemoteError::Unavailable) => SoundDescriptor::fallback(prompt),
            Err(e) => {
                log::warn!(
                    "[SOUNDBANK] Remote generation failed ({}), using fallback for '{}'",
                    e,
                    prompt
                );
                SoundDescriptor::fallback(prompt)
            }
        };
        if descriptor.genre.is_none() {
            descriptor.genre = genre.map(str::to_string);
        }
        descriptor
    }

    /// Generate and convert in one step.
    pub fn generate_patch(&self, prompt: &str, genre: Option<&str>) -> InstrumentPatch {
        self.generate(prompt, genre).to_patch()
    }
}
