//! Engine configuration.
//!
//! Every field has a default, so a config file only needs the values it
//! changes.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::patch::SynthParameters;
use crate::timing::{TimeSignature, DEFAULT_BPM, DEFAULT_LOOP_BARS};

/// Top-level configuration of an [`Engine`](crate::engine::Engine) and its runtime.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Tempo used until a project or command sets one.
    pub tempo: f64,
    pub time_signature: TimeSignature,
    /// Transport loop length in bars.
    pub loop_bars: u32,
    pub scheduler: SchedulerConfig,
    /// Period of the runtime tick.
    pub tick_interval_ms: u64,
    /// Capacity of the trigger queue to the audio thread.
    pub trigger_queue_capacity: usize,
    /// Sound of tracks without a bound patch.
    pub default_patch: SynthParameters,
    pub remote: RemoteConfig,
    pub storage: StorageConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tempo: DEFAULT_BPM,
            time_signature: TimeSignature::default(),
            loop_bars: DEFAULT_LOOP_BARS,
            scheduler: SchedulerConfig::default(),
            tick_interval_ms: 25,
            trigger_queue_capacity: 1024,
            default_patch: SynthParameters::default(),
            remote: RemoteConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load a JSON config file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

/// Lookahead scheduler settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// How far past the current instant a tick may commit triggers.
    pub lookahead_ms: u64,
    /// Quantum subdivision: 4 steps per beat is a 16th note in 4/4.
    pub steps_per_beat: u32,
    /// Re-sync to the transport instead of catching up when the cursor
    /// falls this far behind.
    pub max_lateness_ms: u64,
    /// Upper bound on quantum steps processed in a single tick.
    pub max_steps_per_tick: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            lookahead_ms: 100,
            steps_per_beat: 4,
            max_lateness_ms: 250,
            max_steps_per_tick: 1024,
        }
    }
}

impl SchedulerConfig {
    pub fn lookahead_seconds(&self) -> f64 {
        self.lookahead_ms as f64 / 1000.0
    }

    pub fn max_lateness_seconds(&self) -> f64 {
        self.max_lateness_ms as f64 / 1000.0
    }
}

/// Remote descriptor service settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// URL that accepts `POST {prompt, genre}`. `None` means offline.
    pub endpoint: Option<String>,
    pub timeout_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_ms: 5000,
        }
    }
}

impl RemoteConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Patch persistence settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory of the file store. `None` keeps patches in memory only.
    pub directory: Option<PathBuf>,
    /// Key the patch registry is stored under.
    pub patch_key: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            directory: None,
            patch_key: "jam_instruments".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"tempo": 98, "scheduler": {"lookahead_ms": 80}}"#).unwrap();
        assert_eq!(config.tempo, 98.0);
        assert_eq!(config.scheduler.lookahead_ms, 80);
        assert_eq!(config.scheduler.steps_per_beat, 4);
        assert_eq!(config.loop_bars, 16);
        assert_eq!(config.storage.patch_key, "jam_instruments");
        assert_eq!(config.remote.endpoint, None);
    }

    #[test]
    fn test_config_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jam.json");
        let mut config = EngineConfig::default();
        config.remote.endpoint = Some("http://localhost:3000/api/generateSoundBank".to_string());
        std::fs::write(&path, serde_json::to_string(&config).unwrap()).unwrap();
        assert_eq!(EngineConfig::from_json_file(&path).unwrap(), config);
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        assert!(EngineConfig::from_json_file(Path::new("/nonexistent/jam.json")).is_err());
    }
}
