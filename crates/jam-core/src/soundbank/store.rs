//! Durable key-value stores for the patch registry.
//!
//! [`BackgroundStore`] moves writes of a slow store onto its own thread so
//! callers on the engine tick never wait for the disk.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Sender};

use crate::error::StoreError;

/// String key-value storage.
pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// Volatile store, used when no directory is configured and in tests.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// One `<key>.json` file per key inside a directory.
#[derive(Clone, Debug)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
            && !key.starts_with('.');
        if !valid {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(format!("{key}.json")))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        // Atomic replace.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// Write-behind wrapper: `set` queues the value for a `jam-store` thread
/// and returns at once.
///
/// Reads see queued values immediately. Write failures are logged by the
/// writer thread. Dropping the store flushes every queued write.
pub struct BackgroundStore {
    inner: Arc<Mutex<Box<dyn KeyValueStore>>>,
    latest: HashMap<String, String>,
    write_tx: Option<Sender<(String, String)>>,
    writer: Option<JoinHandle<()>>,
}

impl BackgroundStore {
    /// Start the writer thread in front of `inner`.
    pub fn spawn(inner: Box<dyn KeyValueStore>) -> Result<Self, StoreError> {
        let inner = Arc::new(Mutex::new(inner));
        let (write_tx, write_rx) = unbounded::<(String, String)>();

        let target = inner.clone();
        let writer = thread::Builder::new()
            .name("jam-store".to_string())
            .spawn(move || {
                for (key, value) in write_rx {
                    let mut store = target.lock().unwrap_or_else(PoisonError::into_inner);
                    if let Err(e) = store.set(&key, &value) {
                        log::warn!("[STORE] Failed to write '{}': {}", key, e);
                    }
                }
                log::debug!("[STORE] Writer exiting");
            })?;

        Ok(Self {
            inner,
            latest: HashMap::new(),
            write_tx: Some(write_tx),
            writer: Some(writer),
        })
    }
}

impl KeyValueStore for BackgroundStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        if let Some(value) = self.latest.get(key) {
            return Ok(Some(value.clone()));
        }
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.latest.insert(key.to_string(), value.to_string());
        match &self.write_tx {
            Some(tx) if tx.send((key.to_string(), value.to_string())).is_ok() => Ok(()),
            _ => Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "store writer stopped",
            ))),
        }
    }
}

impl Drop for BackgroundStore {
    fn drop(&mut self) {
        self.write_tx.take();
        if let Some(writer) = self.writer.take() {
            if writer.join().is_err() {
                log::error!("[STORE] Writer thread panicked");
            }
        }
    }
}
