//! Persisted progress: the key-value contract and the unlock-count codec.
//!
//! The durable side of the archive is one scalar: how many phases are
//! unlocked. It lives in a string-to-string store shared with the rest of the
//! site (the same store holds the content panel's catalog). Reads never fail
//! from the caller's point of view; anything missing or corrupt reads as the
//! initial value of 1.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::StoreError;

/// Store key for the unlocked phase count.
pub const UNLOCK_KEY: &str = "unlocked_phase_count";

/// Unlock count used when nothing valid is stored.
pub const DEFAULT_UNLOCKED: u32 = 1;

// =============================================================================
// Key-value contract
// =============================================================================

/// String key to string value persistence.
///
/// Implementations handle the actual persistence (file, browser storage,
/// in-memory). The trait enables testing with fakes.
pub trait KvStore: Send {
    /// Read a value; `Ok(None)` when the key is absent.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a value, replacing any previous one.
    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError>;
}

impl<T: KvStore + ?Sized> KvStore for Box<T> {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        (**self).set(key, value)
    }
}

/// Ephemeral store for tests and throwaway sessions.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
    writes: u64,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed a key.
    #[must_use]
    pub fn with_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    /// Number of successful `set` calls.
    #[must_use]
    pub fn writes(&self) -> u64 {
        self.writes
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value.to_string());
        self.writes += 1;
        Ok(())
    }
}

/// A flat JSON object on disk.
///
/// The file is read once at open; a missing or malformed file starts empty.
/// Every `set` rewrites the whole file through a temp file and rename so a
/// crash never leaves a half-written object behind.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl JsonFileStore {
    #[must_use]
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<BTreeMap<String, String>>(&raw) {
                Ok(entries) => entries,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "State file malformed, starting empty");
                    BTreeMap::new()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "State file unreadable, starting empty");
                BTreeMap::new()
            }
        };
        debug!(path = %path.display(), keys = entries.len(), "Opened state file");
        Self { path, entries }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(io_err)?;
            }
        }
        let encoded = serde_json::to_string_pretty(&self.entries)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, encoded).map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(io_err)?;
        Ok(())
    }
}

impl KvStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value.to_string());
        self.flush()
    }
}

// =============================================================================
// Unlock count codec
// =============================================================================

/// Parse a stored unlock count. Only plain non-negative decimal integers are
/// accepted.
#[must_use]
pub fn parse_unlock_count(raw: &str) -> Option<u32> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    trimmed.parse::<u32>().ok()
}

/// Typed access to the unlock count on top of a [`KvStore`].
#[derive(Debug)]
pub struct ProgressStore<K> {
    store: K,
}

impl<K: KvStore> ProgressStore<K> {
    #[must_use]
    pub fn new(store: K) -> Self {
        Self { store }
    }

    /// Load the unlock count, clamped into `[1, phase_count]`.
    ///
    /// Absent, unparsable or unreadable values yield [`DEFAULT_UNLOCKED`].
    pub fn load(&self, phase_count: u32) -> u32 {
        let ceiling = phase_count.max(DEFAULT_UNLOCKED);
        let stored = match self.store.get(UNLOCK_KEY) {
            Ok(Some(raw)) => {
                let parsed = parse_unlock_count(&raw);
                if parsed.is_none() {
                    warn!(raw = %raw, "Stored unlock count is not a number, using default");
                }
                parsed
            }
            Ok(None) => None,
            Err(err) => {
                warn!(error = %err, "Unlock count unreadable, using default");
                None
            }
        };
        stored
            .unwrap_or(DEFAULT_UNLOCKED)
            .clamp(DEFAULT_UNLOCKED, ceiling)
    }

    /// Persist the unlock count. Returns `false` when the backend refused the
    /// write; the failure is logged and never propagated.
    pub fn save(&mut self, count: u32) -> bool {
        match self.store.set(UNLOCK_KEY, &count.to_string()) {
            Ok(()) => {
                debug!(unlocked_count = count, "Persisted unlock count");
                true
            }
            Err(err) => {
                warn!(unlocked_count = count, error = %err, "Failed to persist unlock count");
                false
            }
        }
    }

    #[must_use]
    pub fn store(&self) -> &K {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut K {
        &mut self.store
    }

    #[must_use]
    pub fn into_inner(self) -> K {
        self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenStore;

    impl KvStore for BrokenStore {
        fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Backend("offline".to_string()))
        }

        fn set(&mut self, _key: &str, _value: &str) -> Result<(), StoreError> {
            Err(StoreError::Backend("offline".to_string()))
        }
    }

    #[test]
    fn missing_value_defaults_to_one() {
        let store = ProgressStore::new(MemoryStore::new());
        assert_eq!(store.load(3), 1);
    }

    #[test]
    fn garbage_values_default_to_one() {
        for raw in ["", "abc", "-2", "2.5", "3abc", "99999999999999999999"] {
            let store = ProgressStore::new(MemoryStore::new().with_entry(UNLOCK_KEY, raw));
            assert_eq!(store.load(3), 1, "raw value {raw:?}");
        }
    }

    #[test]
    fn stored_value_is_clamped_into_range() {
        let zero = ProgressStore::new(MemoryStore::new().with_entry(UNLOCK_KEY, "0"));
        assert_eq!(zero.load(3), 1);
        let high = ProgressStore::new(MemoryStore::new().with_entry(UNLOCK_KEY, "9"));
        assert_eq!(high.load(3), 3);
        let ok = ProgressStore::new(MemoryStore::new().with_entry(UNLOCK_KEY, " 2\n"));
        assert_eq!(ok.load(3), 2);
    }

    #[test]
    fn save_then_load() {
        let mut store = ProgressStore::new(MemoryStore::new());
        assert!(store.save(2));
        assert!(store.save(2));
        assert_eq!(store.load(3), 2);
        assert_eq!(store.store().writes(), 2);
    }

    #[test]
    fn broken_backend_is_non_fatal() {
        let mut store = ProgressStore::new(BrokenStore);
        assert_eq!(store.load(3), 1);
        assert!(!store.save(2));
    }

    #[test]
    fn json_file_store_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let mut first = ProgressStore::new(JsonFileStore::open(&path));
        assert_eq!(first.load(3), 1);
        assert!(first.save(3));

        let second = ProgressStore::new(JsonFileStore::open(&path));
        assert_eq!(second.load(3), 3);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn json_file_store_tolerates_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "][").unwrap();
        let store = JsonFileStore::open(&path);
        assert_eq!(store.get(UNLOCK_KEY).unwrap(), None);
    }
}
