//! Durable key-value flag storage
//!
//! The core persists exactly one local flag: whether first-run onboarding
//! has been completed. Session persistence itself belongs to the backend.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use crate::error::{Result, ZappiesError};

/// Key under which the first-run flag is stored.
pub const HAS_SEEN_ONBOARDING: &str = "hasSeenOnboarding";

/// Durable string key-value storage for local flags.
pub trait FlagStore: Send + Sync {
    /// Read a flag. Absent keys are `Ok(None)`.
    fn get(&self, key: &str) -> Result<Option<String>>;
    /// Write a flag, overwriting any previous value.
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// Sled-backed flag store used in production builds.
pub struct SledFlagStore {
    db: sled::Db,
}

impl SledFlagStore {
    /// Open (or create) the flag database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = sled::open(path)?;
        Ok(Self { db })
    }
}

impl FlagStore for SledFlagStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match self.db.get(key.as_bytes())? {
            Some(raw) => {
                let value = String::from_utf8(raw.to_vec())
                    .map_err(|e| ZappiesError::Storage(format!("Non-UTF8 flag value: {e}")))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.db.insert(key.as_bytes(), value.as_bytes())?;
        self.db.flush()?;
        Ok(())
    }
}

/// In-memory flag store for tests and fixtures.
#[derive(Default)]
pub struct MemoryFlagStore {
    entries: Mutex<HashMap<String, String>>,
    fail_reads: Mutex<bool>,
}

impl MemoryFlagStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `get` fail, for error-path tests.
    pub fn fail_reads(&self) {
        if let Ok(mut flag) = self.fail_reads.lock() {
            *flag = true;
        }
    }
}

impl FlagStore for MemoryFlagStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let failing = self
            .fail_reads
            .lock()
            .map_err(|_| ZappiesError::Storage("Flag store lock poisoned".to_string()))?;
        if *failing {
            return Err(ZappiesError::Storage("Injected flag read failure".to_string()));
        }
        let entries = self
            .entries
            .lock()
            .map_err(|_| ZappiesError::Storage("Flag store lock poisoned".to_string()))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| ZappiesError::Storage("Flag store lock poisoned".to_string()))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryFlagStore::new();
        assert!(store.get(HAS_SEEN_ONBOARDING).unwrap().is_none());
        store.set(HAS_SEEN_ONBOARDING, "true").unwrap();
        assert_eq!(store.get(HAS_SEEN_ONBOARDING).unwrap().as_deref(), Some("true"));
    }

    #[test]
    fn sled_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledFlagStore::open(&dir.path().join("flags")).unwrap();
        assert!(store.get(HAS_SEEN_ONBOARDING).unwrap().is_none());
        store.set(HAS_SEEN_ONBOARDING, "true").unwrap();
        assert_eq!(store.get(HAS_SEEN_ONBOARDING).unwrap().as_deref(), Some("true"));
    }

    #[test]
    fn injected_read_failure_surfaces() {
        let store = MemoryFlagStore::new();
        store.fail_reads();
        assert!(store.get(HAS_SEEN_ONBOARDING).is_err());
    }
}
