//! In-memory stamp store

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::StampError;
use crate::stamp::Stamp;
use crate::traits::StampStore;

/// Stamp store that keeps stamps in process memory
///
/// Nothing survives the process. Useful for tests and for dry runs against a
/// snapshot of another store.
#[derive(Debug, Default)]
pub struct MemoryStampStore {
    stamps: Mutex<HashMap<PathBuf, BTreeMap<String, Stamp>>>,
}

impl MemoryStampStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding a copy of `owner`'s stamps from another store
    ///
    /// # Errors
    /// Returns error if the source store cannot list the owner's stamps
    pub fn snapshot(source: &dyn StampStore, owner: &Path) -> Result<Self, StampError> {
        let store = Self::new();
        let stamps = source
            .list(owner)?
            .into_iter()
            .map(|s| (s.task.clone(), s))
            .collect();
        store.stamps.lock().insert(owner.to_path_buf(), stamps);
        Ok(store)
    }
}

impl StampStore for MemoryStampStore {
    fn check(&self, owner: &Path, task: &str) -> Result<Option<Stamp>, StampError> {
        Ok(self
            .stamps
            .lock()
            .get(owner)
            .and_then(|stamps| stamps.get(task))
            .cloned())
    }

    fn create(
        &self,
        owner: &Path,
        task: &str,
        hash: Option<&str>,
        metadata: Option<serde_json::Value>,
    ) -> Result<Stamp, StampError> {
        if task.is_empty() {
            return Err(StampError::InvalidName(task.to_string()));
        }

        let stamp = Stamp::record(task, hash, metadata);

        self.stamps
            .lock()
            .entry(owner.to_path_buf())
            .or_default()
            .insert(task.to_string(), stamp.clone());
        Ok(stamp)
    }

    fn delete(&self, owner: &Path, task: &str) -> Result<(), StampError> {
        if let Some(stamps) = self.stamps.lock().get_mut(owner) {
            stamps.remove(task);
        }
        Ok(())
    }

    fn list(&self, owner: &Path) -> Result<Vec<Stamp>, StampError> {
        Ok(self
            .stamps
            .lock()
            .get(owner)
            .map(|stamps| stamps.values().cloned().collect())
            .unwrap_or_default())
    }

    fn store_type(&self) -> &'static str {
        "memory"
    }
}
