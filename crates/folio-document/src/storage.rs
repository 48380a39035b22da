//! Folio Storage - Persistence Backends
//!
//! Pluggable persistence for collection snapshots and blobs. The memory
//! backend keeps everything in process; the local backend writes one JSON
//! snapshot per collection under a database directory guarded by a lock
//! file.
//!
//! Layout of a local database:
//!
//! ```text
//! <data_dir>/<database>/
//!     LOCK
//!     collections/<name>.json
//!     blobs/<id>.bin
//!     blobs/<id>.json
//! ```
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::blob::{BlobStore, LocalBlobStore, MemoryBlobStore};
use crate::collection::CollectionSnapshot;
use folio_common::{FolioError, Result};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const LOCK_FILE: &str = "LOCK";
const COLLECTIONS_DIR: &str = "collections";
const BLOBS_DIR: &str = "blobs";
const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(25);

// =============================================================================
// Storage Backend Trait
// =============================================================================

/// Pluggable persistence interface.
pub trait StorageBackend: Send + Sync {
    /// Short backend name for reports.
    fn name(&self) -> &'static str;

    /// Check that the backend is usable.
    fn ping(&self) -> Result<()>;

    /// Read every persisted collection.
    fn load(&self) -> Result<Vec<CollectionSnapshot>>;

    /// Persist one collection, replacing its previous snapshot.
    fn save(&self, snapshot: &CollectionSnapshot) -> Result<()>;

    /// The blob store of this database.
    fn blobs(&self) -> Arc<dyn BlobStore>;

    /// Release held resources. Further pings fail.
    fn release(&self) -> Result<()>;

    /// Get storage statistics.
    fn stats(&self) -> StorageStats;
}

// =============================================================================
// Storage Statistics
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageStats {
    pub saves: u64,
    pub bytes_written: u64,
}

#[derive(Default)]
struct StatCounters {
    saves: AtomicU64,
    bytes_written: AtomicU64,
}

impl StatCounters {
    fn record(&self, bytes: usize) {
        self.saves.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    fn snapshot(&self) -> StorageStats {
        StorageStats {
            saves: self.saves.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// Memory Backend
// =============================================================================

/// In-process backend; nothing outlives the process.
pub struct MemoryStorage {
    collections: RwLock<BTreeMap<String, CollectionSnapshot>>,
    blobs: Arc<MemoryBlobStore>,
    released: AtomicBool,
    stats: StatCounters,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(BTreeMap::new()),
            blobs: Arc::new(MemoryBlobStore::new()),
            released: AtomicBool::new(false),
            stats: StatCounters::default(),
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageBackend for MemoryStorage {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn ping(&self) -> Result<()> {
        if self.released.load(Ordering::SeqCst) {
            return Err(FolioError::Connect("storage has been released".to_string()));
        }
        Ok(())
    }

    fn load(&self) -> Result<Vec<CollectionSnapshot>> {
        Ok(self.collections.read().values().cloned().collect())
    }

    fn save(&self, snapshot: &CollectionSnapshot) -> Result<()> {
        let bytes = snapshot
            .documents
            .iter()
            .filter_map(|doc| doc.encoded_size().ok())
            .sum();
        self.stats.record(bytes);
        self.collections
            .write()
            .insert(snapshot.name.clone(), snapshot.clone());
        Ok(())
    }

    fn blobs(&self) -> Arc<dyn BlobStore> {
        self.blobs.clone()
    }

    fn release(&self) -> Result<()> {
        self.released.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stats(&self) -> StorageStats {
        self.stats.snapshot()
    }
}

// =============================================================================
// Local Backend
// =============================================================================

/// Directory-backed backend holding an exclusive lock on its database.
pub struct LocalStorage {
    root: PathBuf,
    sync_writes: bool,
    blobs: Arc<LocalBlobStore>,
    locked: AtomicBool,
    stats: StatCounters,
}

impl LocalStorage {
    /// Open (creating if needed) the database directory and take its lock.
    ///
    /// Waits up to `lock_timeout` for another holder to release the lock.
    pub fn open(root: impl Into<PathBuf>, sync_writes: bool, lock_timeout: Duration) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(root.join(COLLECTIONS_DIR)).map_err(|e| {
            FolioError::Connect(format!("cannot open database at {}: {}", root.display(), e))
        })?;

        acquire_lock(&root, lock_timeout)?;

        let blobs = match LocalBlobStore::new(root.join(BLOBS_DIR), sync_writes) {
            Ok(blobs) => blobs,
            Err(e) => {
                let _ = std::fs::remove_file(root.join(LOCK_FILE));
                return Err(e);
            }
        };

        tracing::debug!("Opened local storage at {}", root.display());

        Ok(Self {
            root,
            sync_writes,
            blobs: Arc::new(blobs),
            locked: AtomicBool::new(true),
            stats: StatCounters::default(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collection_path(&self, name: &str) -> PathBuf {
        self.root.join(COLLECTIONS_DIR).join(format!("{}.json", name))
    }
}

fn acquire_lock(root: &Path, timeout: Duration) -> Result<()> {
    let path = root.join(LOCK_FILE);
    let started = Instant::now();

    loop {
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                writeln!(file, "{}", std::process::id())?;
                return Ok(());
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                if started.elapsed() >= timeout {
                    return Err(FolioError::Connect(format!(
                        "database at {} is locked by another client (remove {} if it is stale)",
                        root.display(),
                        path.display()
                    )));
                }
                std::thread::sleep(LOCK_RETRY_INTERVAL);
            }
            Err(e) => {
                return Err(FolioError::Connect(format!(
                    "cannot lock {}: {}",
                    path.display(),
                    e
                )))
            }
        }
    }
}

impl StorageBackend for LocalStorage {
    fn name(&self) -> &'static str {
        "local"
    }

    fn ping(&self) -> Result<()> {
        if !self.locked.load(Ordering::SeqCst) {
            return Err(FolioError::Connect("storage has been released".to_string()));
        }
        if !self.root.join(LOCK_FILE).exists() {
            return Err(FolioError::Connect(format!(
                "lock file under {} disappeared",
                self.root.display()
            )));
        }
        Ok(())
    }

    fn load(&self) -> Result<Vec<CollectionSnapshot>> {
        let mut snapshots = Vec::new();

        for entry in std::fs::read_dir(self.root.join(COLLECTIONS_DIR))? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let bytes = std::fs::read(&path)?;
            let snapshot: CollectionSnapshot = serde_json::from_slice(&bytes).map_err(|e| {
                FolioError::Serialization(format!("corrupt snapshot {}: {}", path.display(), e))
            })?;
            snapshots.push(snapshot);
        }

        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(snapshots)
    }

    fn save(&self, snapshot: &CollectionSnapshot) -> Result<()> {
        let encoded = serde_json::to_vec_pretty(snapshot)?;
        write_atomic(&self.collection_path(&snapshot.name), &encoded, self.sync_writes)?;
        self.stats.record(encoded.len());
        Ok(())
    }

    fn blobs(&self) -> Arc<dyn BlobStore> {
        self.blobs.clone()
    }

    fn release(&self) -> Result<()> {
        if self.locked.swap(false, Ordering::SeqCst) {
            std::fs::remove_file(self.root.join(LOCK_FILE))?;
            tracing::debug!("Released lock on {}", self.root.display());
        }
        Ok(())
    }

    fn stats(&self) -> StorageStats {
        self.stats.snapshot()
    }
}

impl Drop for LocalStorage {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::warn!("Failed to release lock on {}: {}", self.root.display(), e);
        }
    }
}

// =============================================================================
// File Helpers
// =============================================================================

/// Write through a sibling temporary file and rename it over `path`.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8], sync: bool) -> std::io::Result<()> {
    let mut temp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    let result = (|| {
        std::fs::write(&temp_path, bytes)?;
        if sync {
            std::fs::File::open(&temp_path)?.sync_all()?;
        }
        std::fs::rename(&temp_path, path)
    })();

    if result.is_err() {
        let _ = std::fs::remove_file(&temp_path);
    }
    result
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Document;
    use tempfile::tempdir;

    fn snapshot(name: &str, ids: &[&str]) -> CollectionSnapshot {
        CollectionSnapshot {
            name: name.to_string(),
            documents: ids.iter().map(|id| Document::with_id(*id)).collect(),
            indexes: Vec::new(),
        }
    }

    #[test]
    fn test_memory_storage() {
        let storage = MemoryStorage::new();
        storage.ping().unwrap();
        storage.save(&snapshot("students", &["a", "b"])).unwrap();

        let loaded = storage.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].documents.len(), 2);
        assert_eq!(storage.stats().saves, 1);

        storage.release().unwrap();
        assert!(storage.ping().is_err());
    }

    #[test]
    fn test_local_storage_round_trip() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("db");

        {
            let storage = LocalStorage::open(&root, false, Duration::from_millis(100)).unwrap();
            storage.save(&snapshot("students", &["a"])).unwrap();
            storage.save(&snapshot("students", &["a", "b"])).unwrap();
            storage.save(&snapshot("courses", &["x"])).unwrap();
        }

        let storage = LocalStorage::open(&root, false, Duration::from_millis(100)).unwrap();
        let loaded = storage.load().unwrap();
        let names: Vec<&str> = loaded.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["courses", "students"]);
        assert_eq!(loaded[1].documents.len(), 2);
        assert!(!root.join(COLLECTIONS_DIR).join("students.json.tmp").exists());
    }

    #[test]
    fn test_local_storage_lock() {
        let dir = tempdir().unwrap();
        let first = LocalStorage::open(dir.path(), false, Duration::from_millis(50)).unwrap();

        let err = LocalStorage::open(dir.path(), false, Duration::from_millis(50))
            .err()
            .unwrap();
        assert!(matches!(err, FolioError::Connect(_)));

        first.release().unwrap();
        assert!(first.ping().is_err());
        let second = LocalStorage::open(dir.path(), false, Duration::from_millis(50)).unwrap();
        second.ping().unwrap();
    }

    #[test]
    fn test_corrupt_snapshot() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::open(dir.path(), false, Duration::from_millis(50)).unwrap();
        std::fs::write(dir.path().join(COLLECTIONS_DIR).join("bad.json"), b"{not json").unwrap();

        let err = storage.load().unwrap_err();
        assert!(matches!(err, FolioError::Serialization(_)));
    }

    #[test]
    fn test_write_atomic_replaces() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("file.json");
        write_atomic(&path, b"one", true).unwrap();
        write_atomic(&path, b"two", false).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"two");
    }
}
