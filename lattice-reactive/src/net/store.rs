//! Persistent key-value storage.
//!
//! The engine only needs string get/set. Every caller inside the crate treats
//! storage as best-effort: failures are logged and otherwise ignored, so a
//! broken store degrades to "nothing cached" rather than an error.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ReactiveError, Result};

/// Narrow storage interface consumed by caching and persistence.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// One file per key under a root directory.
///
/// Keys are hex-encoded into file names, so any key is safe to use.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key.bytes().map(|b| format!("{b:02x}")).collect();
        self.root.join(name)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        std::fs::write(self.path_for(key), value)?;
        Ok(())
    }
}

/// A stored value with the unix-epoch millisecond timestamp of its write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stamped<T> {
    pub data: T,
    pub timestamp: u64,
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(crate::config::millis)
        .unwrap_or_default()
}

/// Read and decode `key`, logging and swallowing any failure.
pub(crate) fn load<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Option<T> {
    let decoded = store.get(key).and_then(|raw| {
        raw.map(|raw| serde_json::from_str(&raw))
            .transpose()
            .map_err(ReactiveError::from)
    });
    match decoded {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(key, error = %err, "storage read failed");
            None
        }
    }
}

/// Encode and write `value` under `key`, logging and swallowing any failure.
pub(crate) fn save<T: Serialize>(store: &dyn KeyValueStore, key: &str, value: &T) {
    let written = serde_json::to_string(value)
        .map_err(ReactiveError::from)
        .and_then(|raw| store.set(key, &raw));
    if let Err(err) = written {
        tracing::warn!(key, error = %err, "storage write failed");
    }
}

/// Read `key` if it was stamped less than `ttl` ago.
pub(crate) fn load_fresh<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
    ttl: Duration,
) -> Option<T> {
    let stamped: Stamped<T> = load(store, key)?;
    let age = now_millis().saturating_sub(stamped.timestamp);
    if u128::from(age) < ttl.as_millis() {
        Some(stamped.data)
    } else {
        tracing::debug!(key, age_ms = age, "cached entry expired");
        None
    }
}

/// Write `value` under `key` stamped with the current time.
pub(crate) fn save_stamped<T: Serialize>(store: &dyn KeyValueStore, key: &str, value: &T) {
    let stamped = Stamped {
        data: value,
        timestamp: now_millis(),
    };
    save(store, key, &stamped);
}
