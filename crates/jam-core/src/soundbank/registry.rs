//! Registry of playable instrument patches.
//!
//! Patches are shared as `Arc<InstrumentPatch>` so triggers can carry them
//! without copying. The registry is persisted as a JSON array under a
//! single store key.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::store::{BackgroundStore, FileStore, KeyValueStore, MemoryStore};
use crate::config::EngineConfig;
use crate::error::StoreError;
use crate::patch::{InstrumentPatch, PatchKind};

/// Default store key of the registry.
pub const DEFAULT_STORE_KEY: &str = "jam_instruments";

/// Owns registered patches and their persistence.
pub struct PatchRegistry {
    patches: BTreeMap<String, Arc<InstrumentPatch>>,
    default_patch: Arc<InstrumentPatch>,
    store: Box<dyn KeyValueStore>,
    key: String,
}

impl PatchRegistry {
    pub fn new(store: Box<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            patches: BTreeMap::new(),
            default_patch: Arc::new(InstrumentPatch::default_patch()),
            store,
            key: key.into(),
        }
    }

    /// Registry described by `config`, with persisted patches loaded.
    ///
    /// A configured directory gets a [`FileStore`] behind a
    /// [`BackgroundStore`], so registering never waits on the disk.
    /// Without one, patches live in memory.
    pub fn from_config(config: &EngineConfig) -> Result<Self, StoreError> {
        let store: Box<dyn KeyValueStore> = match &config.storage.directory {
            Some(dir) => Box::new(BackgroundStore::spawn(Box::new(FileStore::open(dir)?))?),
            None => Box::new(MemoryStore::new()),
        };
        let default_patch = InstrumentPatch::new(
            InstrumentPatch::DEFAULT_ID,
            "Default",
            PatchKind::Synth,
            config.default_patch.clone(),
        );
        let mut registry =
            Self::new(store, config.storage.patch_key.clone()).with_default_patch(default_patch);
        registry.load_all();
        Ok(registry)
    }

    /// Registry backed by a [`MemoryStore`].
    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryStore::new()), DEFAULT_STORE_KEY)
    }

    /// Replace the patch used for tracks without a registered one.
    pub fn with_default_patch(mut self, patch: InstrumentPatch) -> Self {
        self.default_patch = Arc::new(patch.normalized());
        self
    }

    /// Register (or replace) a patch and persist the registry.
    ///
    /// Storage failures are logged; the patch stays registered in memory.
    pub fn register(&mut self, patch: InstrumentPatch) -> String {
        let patch = patch.normalized();
        let id = patch.id.clone();
        if self.patches.insert(id.clone(), Arc::new(patch)).is_some() {
            log::debug!("[SOUNDBANK] Replaced patch {}", id);
        } else {
            log::info!("[SOUNDBANK] Registered patch {}", id);
        }
        if let Err(e) = self.persist_all() {
            log::warn!("[SOUNDBANK] Failed to persist registry: {}", e);
        }
        id
    }

    pub fn get(&self, id: &str) -> Option<Arc<InstrumentPatch>> {
        self.patches.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.patches.contains_key(id)
    }

    /// Patch for a track binding; the default patch when unbound or unknown.
    pub fn resolve(&self, id: Option<&str>) -> Arc<InstrumentPatch> {
        id.and_then(|id| self.patches.get(id))
            .unwrap_or(&self.default_patch)
            .clone()
    }

    pub fn default_patch(&self) -> &Arc<InstrumentPatch> {
        &self.default_patch
    }

    /// All patches, ordered by id.
    pub fn list(&self) -> Vec<Arc<InstrumentPatch>> {
        self.patches.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    /// Remove a patch and persist. Returns the removed patch.
    pub fn remove(&mut self, id: &str) -> Option<Arc<InstrumentPatch>> {
        let removed = self.patches.remove(id)?;
        if let Err(e) = self.persist_all() {
            log::warn!("[SOUNDBANK] Failed to persist registry: {}", e);
        }
        Some(removed)
    }

    /// Write every patch to the store.
    pub fn persist_all(&mut self) -> Result<(), StoreError> {
        let patches: Vec<&InstrumentPatch> = self.patches.values().map(|p| p.as_ref()).collect();
        let json = serde_json::to_string(&patches)?;
        self.store.set(&self.key, &json)
    }

    /// Merge the persisted patches into the registry. Returns how many were
    /// loaded.
    ///
    /// Missing, unreadable or corrupt data loads nothing and is only logged.
    pub fn load_all(&mut self) -> usize {
        let raw = match self.store.get(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return 0,
            Err(e) => {
                log::warn!("[SOUNDBANK] Failed to read registry: {}", e);
                return 0;
            }
        };
        let patches: Vec<InstrumentPatch> = match serde_json::from_str(&raw) {
            Ok(patches) => patches,
            Err(e) => {
                log::warn!("[SOUNDBANK] Ignoring corrupt registry data: {}", e);
                return 0;
            }
        };
        let count = patches.len();
        for patch in patches {
            let patch = patch.normalized();
            self.patches.insert(patch.id.clone(), Arc::new(patch));
        }
        log::info!("[SOUNDBANK] Loaded {} patches", count);
        count
    }
}
