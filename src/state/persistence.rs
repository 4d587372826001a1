//! Snapshot storage backends.
//!
//! - **JSON**: one file per snapshot under `snapshots/` plus an `index.json`
//! - **Memory**: in-process storage for tests

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{Snapshot, StateError, StateResult};

/// Storage of recorded snapshots
pub trait StatePersistence: Send + Sync {
    /// Save a snapshot
    fn save_snapshot(&self, snapshot: &Snapshot) -> StateResult<()>;

    /// Load a snapshot by id
    fn load_snapshot(&self, snapshot_id: &str) -> StateResult<Snapshot>;

    /// All snapshots, newest first
    fn list_snapshots(&self) -> StateResult<Vec<Snapshot>>;

    /// Most recent snapshot recorded for `state_key`
    fn latest_snapshot(&self, state_key: &str) -> StateResult<Option<Snapshot>>;

    /// Delete a snapshot
    fn delete_snapshot(&self, snapshot_id: &str) -> StateResult<()>;
}

// ============================================================================
// JSON Persistence Backend
// ============================================================================

/// JSON file-based persistence backend
pub struct JsonPersistence {
    base_dir: PathBuf,
    snapshots_dir: PathBuf,
    index: Arc<RwLock<SnapshotIndex>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SnapshotIndex {
    /// Snapshot id to metadata
    snapshots: HashMap<String, SnapshotMetadata>,
    /// State key to most recent snapshot id
    latest_by_key: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnapshotMetadata {
    id: String,
    state_key: String,
    created_at: DateTime<Utc>,
    fingerprint: String,
    resource_count: usize,
}

impl SnapshotIndex {
    /// Rebuild the index from the snapshot files in `dir`
    fn scan(dir: &Path) -> StateResult<Self> {
        let mut index = SnapshotIndex::default();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let reader = BufReader::new(File::open(&path)?);
            match serde_json::from_reader::<_, Snapshot>(reader) {
                Ok(snapshot) => index.record(&snapshot),
                Err(e) => warn!("Skipping snapshot file {}: {}", path.display(), e),
            }
        }
        Ok(index)
    }

    /// Add `snapshot`, keeping the newest snapshot of each key as latest
    fn record(&mut self, snapshot: &Snapshot) {
        self.snapshots.insert(
            snapshot.id.clone(),
            SnapshotMetadata {
                id: snapshot.id.clone(),
                state_key: snapshot.state_key.clone(),
                created_at: snapshot.created_at,
                fingerprint: snapshot.fingerprint.clone(),
                resource_count: snapshot.resource_count(),
            },
        );

        let is_newest = match self.latest_by_key.get(&snapshot.state_key) {
            Some(current) => self
                .snapshots
                .get(current)
                .map_or(true, |m| snapshot.created_at >= m.created_at),
            None => true,
        };
        if is_newest {
            self.latest_by_key
                .insert(snapshot.state_key.clone(), snapshot.id.clone());
        }
    }
}

impl JsonPersistence {
    /// Open (or create) the store rooted at `base_dir`
    pub fn new(base_dir: impl Into<PathBuf>) -> StateResult<Self> {
        let base_dir = base_dir.into();
        let snapshots_dir = base_dir.join("snapshots");
        fs::create_dir_all(&snapshots_dir)?;

        let index_path = base_dir.join("index.json");
        let mut rebuilt = false;
        let index = if index_path.exists() {
            let reader = BufReader::new(File::open(&index_path)?);
            match serde_json::from_reader(reader) {
                Ok(index) => index,
                Err(e) => {
                    warn!(
                        "Snapshot index {} is unreadable ({}), rebuilding it from {}",
                        index_path.display(),
                        e,
                        snapshots_dir.display()
                    );
                    rebuilt = true;
                    SnapshotIndex::scan(&snapshots_dir)?
                }
            }
        } else {
            SnapshotIndex::default()
        };

        let store = Self {
            base_dir,
            snapshots_dir,
            index: Arc::new(RwLock::new(index)),
        };
        if rebuilt {
            store.save_index()?;
        }
        Ok(store)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn save_index(&self) -> StateResult<()> {
        let index_path = self.base_dir.join("index.json");
        let writer = BufWriter::new(File::create(&index_path)?);
        serde_json::to_writer_pretty(writer, &*self.index.read())?;
        Ok(())
    }

    fn snapshot_path(&self, snapshot_id: &str) -> PathBuf {
        self.snapshots_dir.join(format!("{}.json", snapshot_id))
    }
}

impl StatePersistence for JsonPersistence {
    fn save_snapshot(&self, snapshot: &Snapshot) -> StateResult<()> {
        let file_path = self.snapshot_path(&snapshot.id);
        let writer = BufWriter::new(File::create(&file_path)?);
        serde_json::to_writer_pretty(writer, snapshot)?;

        self.index.write().record(snapshot);

        self.save_index()?;
        debug!("Saved snapshot {} to {}", snapshot.id, file_path.display());
        Ok(())
    }

    fn load_snapshot(&self, snapshot_id: &str) -> StateResult<Snapshot> {
        let file_path = self.snapshot_path(snapshot_id);
        if !file_path.exists() {
            return Err(StateError::SnapshotNotFound(snapshot_id.to_string()));
        }

        let reader = BufReader::new(File::open(&file_path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    fn list_snapshots(&self) -> StateResult<Vec<Snapshot>> {
        let ids: Vec<String> = self.index.read().snapshots.keys().cloned().collect();
        let mut snapshots = Vec::with_capacity(ids.len());

        for id in ids {
            match self.load_snapshot(&id) {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(e) => warn!("Skipping snapshot {}: {}", id, e),
            }
        }

        snapshots.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(snapshots)
    }

    fn latest_snapshot(&self, state_key: &str) -> StateResult<Option<Snapshot>> {
        let latest = self.index.read().latest_by_key.get(state_key).cloned();
        match latest {
            Some(snapshot_id) => Ok(Some(self.load_snapshot(&snapshot_id)?)),
            None => Ok(None),
        }
    }

    fn delete_snapshot(&self, snapshot_id: &str) -> StateResult<()> {
        let file_path = self.snapshot_path(snapshot_id);
        if file_path.exists() {
            fs::remove_file(&file_path)?;
        }

        {
            let mut index = self.index.write();
            if let Some(metadata) = index.snapshots.remove(snapshot_id) {
                if index.latest_by_key.get(&metadata.state_key).map(String::as_str)
                    == Some(snapshot_id)
                {
                    let next_latest = index
                        .snapshots
                        .values()
                        .filter(|m| m.state_key == metadata.state_key)
                        .max_by_key(|m| m.created_at)
                        .map(|m| m.id.clone());

                    match next_latest {
                        Some(next_id) => {
                            index.latest_by_key.insert(metadata.state_key, next_id);
                        }
                        None => {
                            index.latest_by_key.remove(&metadata.state_key);
                        }
                    }
                }
            }
        }

        self.save_index()
    }
}

// ============================================================================
// Memory Persistence Backend
// ============================================================================

/// In-memory persistence backend
#[derive(Default)]
pub struct MemoryPersistence {
    snapshots: RwLock<HashMap<String, Snapshot>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StatePersistence for MemoryPersistence {
    fn save_snapshot(&self, snapshot: &Snapshot) -> StateResult<()> {
        self.snapshots
            .write()
            .insert(snapshot.id.clone(), snapshot.clone());
        Ok(())
    }

    fn load_snapshot(&self, snapshot_id: &str) -> StateResult<Snapshot> {
        self.snapshots
            .read()
            .get(snapshot_id)
            .cloned()
            .ok_or_else(|| StateError::SnapshotNotFound(snapshot_id.to_string()))
    }

    fn list_snapshots(&self) -> StateResult<Vec<Snapshot>> {
        let mut snapshots: Vec<Snapshot> = self.snapshots.read().values().cloned().collect();
        snapshots.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(snapshots)
    }

    fn latest_snapshot(&self, state_key: &str) -> StateResult<Option<Snapshot>> {
        Ok(self
            .snapshots
            .read()
            .values()
            .filter(|s| s.state_key == state_key)
            .max_by_key(|s| s.created_at)
            .cloned())
    }

    fn delete_snapshot(&self, snapshot_id: &str) -> StateResult<()> {
        self.snapshots.write().remove(snapshot_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::manifest;
    use chrono::Duration;
    use tempfile::TempDir;

    fn snapshot(environment: &str, age_minutes: i64) -> Snapshot {
        let mut snapshot = Snapshot::new(manifest(environment, "10.0.0.0/16")).unwrap();
        snapshot.created_at = Utc::now() - Duration::minutes(age_minutes);
        snapshot
    }

    #[test]
    fn test_json_save_and_load() {
        let dir = TempDir::new().unwrap();
        let store = JsonPersistence::new(dir.path()).unwrap();
        let saved = snapshot("dev", 0);
        store.save_snapshot(&saved).unwrap();

        assert!(dir.path().join("index.json").exists());
        assert!(dir
            .path()
            .join("snapshots")
            .join(format!("{}.json", saved.id))
            .exists());
        assert_eq!(store.load_snapshot(&saved.id).unwrap(), saved);
    }

    #[test]
    fn test_json_latest_per_key() {
        let dir = TempDir::new().unwrap();
        let store = JsonPersistence::new(dir.path()).unwrap();
        let older = snapshot("dev", 10);
        let newer = snapshot("dev", 0);
        let prod = snapshot("prod", 0);
        store.save_snapshot(&older).unwrap();
        store.save_snapshot(&newer).unwrap();
        store.save_snapshot(&prod).unwrap();

        assert_eq!(store.latest_snapshot("elk/dev").unwrap().unwrap().id, newer.id);
        assert_eq!(store.latest_snapshot("elk/prod").unwrap().unwrap().id, prod.id);
        assert!(store.latest_snapshot("elk/qa").unwrap().is_none());
    }

    #[test]
    fn test_json_index_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let saved = snapshot("dev", 0);
        {
            let store = JsonPersistence::new(dir.path()).unwrap();
            store.save_snapshot(&saved).unwrap();
        }
        let store = JsonPersistence::new(dir.path()).unwrap();
        assert_eq!(store.latest_snapshot("elk/dev").unwrap().unwrap().id, saved.id);
        assert_eq!(store.list_snapshots().unwrap().len(), 1);
    }

    #[test]
    fn test_json_delete_falls_back_to_previous() {
        let dir = TempDir::new().unwrap();
        let store = JsonPersistence::new(dir.path()).unwrap();
        let older = snapshot("dev", 10);
        let newer = snapshot("dev", 0);
        store.save_snapshot(&older).unwrap();
        store.save_snapshot(&newer).unwrap();

        store.delete_snapshot(&newer.id).unwrap();
        assert_eq!(store.latest_snapshot("elk/dev").unwrap().unwrap().id, older.id);

        store.delete_snapshot(&older.id).unwrap();
        assert!(store.latest_snapshot("elk/dev").unwrap().is_none());
        assert!(matches!(
            store.load_snapshot(&older.id),
            Err(StateError::SnapshotNotFound(_))
        ));
    }

    #[test]
    fn test_json_latest_ignores_save_order() {
        let dir = TempDir::new().unwrap();
        let store = JsonPersistence::new(dir.path()).unwrap();
        let newer = snapshot("dev", 0);
        let older = snapshot("dev", 10);
        store.save_snapshot(&newer).unwrap();
        store.save_snapshot(&older).unwrap();

        assert_eq!(store.latest_snapshot("elk/dev").unwrap().unwrap().id, newer.id);

        let memory = MemoryPersistence::new();
        memory.save_snapshot(&newer).unwrap();
        memory.save_snapshot(&older).unwrap();
        assert_eq!(memory.latest_snapshot("elk/dev").unwrap().unwrap().id, newer.id);
    }

    #[test]
    fn test_json_rebuilds_corrupted_index() {
        let dir = TempDir::new().unwrap();
        let older = snapshot("dev", 10);
        let newer = snapshot("dev", 0);
        {
            let store = JsonPersistence::new(dir.path()).unwrap();
            store.save_snapshot(&older).unwrap();
            store.save_snapshot(&newer).unwrap();
        }
        fs::write(dir.path().join("index.json"), "{ not json").unwrap();

        let store = JsonPersistence::new(dir.path()).unwrap();
        assert_eq!(store.latest_snapshot("elk/dev").unwrap().unwrap().id, newer.id);
        assert_eq!(store.list_snapshots().unwrap().len(), 2);

        let prod = snapshot("prod", 0);
        store.save_snapshot(&prod).unwrap();
        let reopened = JsonPersistence::new(dir.path()).unwrap();
        assert_eq!(reopened.list_snapshots().unwrap().len(), 3);
        assert_eq!(reopened.latest_snapshot("elk/dev").unwrap().unwrap().id, newer.id);
    }

    #[test]
    fn test_list_is_newest_first() {
        let store = MemoryPersistence::new();
        let older = snapshot("dev", 10);
        let newer = snapshot("dev", 0);
        store.save_snapshot(&older).unwrap();
        store.save_snapshot(&newer).unwrap();

        let ids: Vec<String> = store.list_snapshots().unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![newer.id.clone(), older.id.clone()]);
        assert_eq!(store.latest_snapshot("elk/dev").unwrap().unwrap().id, newer.id);
    }

    #[test]
    fn test_memory_delete() {
        let store = MemoryPersistence::new();
        let saved = snapshot("dev", 0);
        store.save_snapshot(&saved).unwrap();
        store.delete_snapshot(&saved.id).unwrap();
        assert!(store.load_snapshot(&saved.id).is_err());
    }
}
