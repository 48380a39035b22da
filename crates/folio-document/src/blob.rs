//! Folio Blob Store
//!
//! Companion store for bulk binary payloads, addressed by opaque ids.
//! A write is all-or-nothing from the caller's perspective: the id is only
//! returned, and only becomes visible to readers, once both the payload and
//! its metadata are in place.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::storage::write_atomic;
use chrono::{DateTime, Utc};
use folio_common::utils::{crc32, verify_crc32};
use folio_common::{FolioError, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

// =============================================================================
// Blob ID
// =============================================================================

/// Opaque identifier of a stored blob.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobId(String);

impl BlobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Ids become file names in the local store, so only hex-like ids are accepted there.
    fn is_safe_file_name(&self) -> bool {
        !self.0.is_empty() && self.0.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Blob Metadata
// =============================================================================

/// Metadata recorded alongside every blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlobMeta {
    pub id: BlobId,
    pub filename: String,
    pub content_type: String,
    pub length: u64,
    pub checksum: u32,
    pub uploaded_at: DateTime<Utc>,
}

impl BlobMeta {
    fn describe(bytes: &[u8], filename: &str, content_type: &str) -> Self {
        Self {
            id: BlobId::generate(),
            filename: filename.to_string(),
            content_type: content_type.to_string(),
            length: bytes.len() as u64,
            checksum: crc32(bytes),
            uploaded_at: Utc::now(),
        }
    }
}

// =============================================================================
// Blob Store Trait
// =============================================================================

/// Large-object store interface.
pub trait BlobStore: Send + Sync {
    /// Store bytes under a fresh id.
    fn put(&self, bytes: &[u8], filename: &str, content_type: &str) -> Result<BlobMeta>;

    /// Read the bytes of a blob.
    fn get(&self, id: &BlobId) -> Result<Option<Vec<u8>>>;

    /// Read the metadata of a blob.
    fn meta(&self, id: &BlobId) -> Result<Option<BlobMeta>>;

    /// List every committed blob, oldest first.
    fn list(&self) -> Result<Vec<BlobMeta>>;

    fn exists(&self, id: &BlobId) -> Result<bool> {
        Ok(self.meta(id)?.is_some())
    }

    /// Total payload size in bytes.
    fn total_size(&self) -> Result<u64> {
        Ok(self.list()?.iter().map(|meta| meta.length).sum())
    }
}

fn sort_oldest_first(metas: &mut [BlobMeta]) {
    metas.sort_by(|a, b| {
        a.uploaded_at
            .cmp(&b.uploaded_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}

// =============================================================================
// Memory Blob Store
// =============================================================================

/// In-memory blob store for testing and volatile sessions.
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<BlobId, (BlobMeta, Vec<u8>)>>,
    capacity: Option<u64>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self {
            blobs: RwLock::new(HashMap::new()),
            capacity: None,
        }
    }

    /// Create a store that refuses writes beyond `capacity` total bytes.
    pub fn with_capacity(capacity: u64) -> Self {
        Self {
            blobs: RwLock::new(HashMap::new()),
            capacity: Some(capacity),
        }
    }
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BlobStore for MemoryBlobStore {
    fn put(&self, bytes: &[u8], filename: &str, content_type: &str) -> Result<BlobMeta> {
        let mut blobs = self.blobs.write();

        if let Some(capacity) = self.capacity {
            let used: u64 = blobs.values().map(|(meta, _)| meta.length).sum();
            if used + bytes.len() as u64 > capacity {
                return Err(FolioError::BlobStore(format!(
                    "storing '{}' ({} bytes) would exceed the capacity of {} bytes",
                    filename,
                    bytes.len(),
                    capacity
                )));
            }
        }

        let meta = BlobMeta::describe(bytes, filename, content_type);
        blobs.insert(meta.id.clone(), (meta.clone(), bytes.to_vec()));
        Ok(meta)
    }

    fn get(&self, id: &BlobId) -> Result<Option<Vec<u8>>> {
        Ok(self.blobs.read().get(id).map(|(_, bytes)| bytes.clone()))
    }

    fn meta(&self, id: &BlobId) -> Result<Option<BlobMeta>> {
        Ok(self.blobs.read().get(id).map(|(meta, _)| meta.clone()))
    }

    fn list(&self) -> Result<Vec<BlobMeta>> {
        let mut metas: Vec<BlobMeta> = self
            .blobs
            .read()
            .values()
            .map(|(meta, _)| meta.clone())
            .collect();
        sort_oldest_first(&mut metas);
        Ok(metas)
    }
}

// =============================================================================
// Local Blob Store
// =============================================================================

/// Directory-backed blob store.
///
/// Each blob is a `<id>.bin` payload plus a `<id>.json` metadata file. Both
/// are written to temporary files and renamed into place; the metadata
/// rename is the commit point, so a payload without metadata is invisible.
pub struct LocalBlobStore {
    dir: PathBuf,
    sync_writes: bool,
}

impl LocalBlobStore {
    pub fn new(dir: impl Into<PathBuf>, sync_writes: bool) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| {
            FolioError::BlobStore(format!("cannot create {}: {}", dir.display(), e))
        })?;
        Ok(Self { dir, sync_writes })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn data_path(&self, id: &BlobId) -> PathBuf {
        self.dir.join(format!("{}.bin", id))
    }

    fn meta_path(&self, id: &BlobId) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    fn commit(&self, meta: &BlobMeta, bytes: &[u8]) -> Result<()> {
        let data_path = self.data_path(&meta.id);
        write_atomic(&data_path, bytes, self.sync_writes)?;

        let encoded = serde_json::to_vec_pretty(meta)?;
        if let Err(e) = write_atomic(&self.meta_path(&meta.id), &encoded, self.sync_writes) {
            let _ = std::fs::remove_file(&data_path);
            return Err(e.into());
        }
        Ok(())
    }
}

impl BlobStore for LocalBlobStore {
    fn put(&self, bytes: &[u8], filename: &str, content_type: &str) -> Result<BlobMeta> {
        let meta = BlobMeta::describe(bytes, filename, content_type);

        self.commit(&meta, bytes).map_err(|e| {
            FolioError::BlobStore(format!("failed to store '{}': {}", filename, e))
        })?;

        tracing::debug!("Committed blob {} to {}", meta.id, self.dir.display());
        Ok(meta)
    }

    fn get(&self, id: &BlobId) -> Result<Option<Vec<u8>>> {
        let Some(meta) = self.meta(id)? else {
            return Ok(None);
        };

        let bytes = std::fs::read(self.data_path(id)).map_err(|e| {
            FolioError::BlobStore(format!("blob {} has metadata but no payload: {}", id, e))
        })?;

        if bytes.len() as u64 != meta.length || !verify_crc32(&bytes, meta.checksum) {
            return Err(FolioError::BlobStore(format!(
                "blob {} failed its integrity check",
                id
            )));
        }
        Ok(Some(bytes))
    }

    fn meta(&self, id: &BlobId) -> Result<Option<BlobMeta>> {
        if !id.is_safe_file_name() {
            return Ok(None);
        }

        match std::fs::read(self.meta_path(id)) {
            Ok(content) => Ok(Some(serde_json::from_slice(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self) -> Result<Vec<BlobMeta>> {
        let mut metas = Vec::new();

        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let is_meta = path.extension().and_then(|e| e.to_str()) == Some("json");
            if !is_meta {
                continue;
            }

            let content = std::fs::read(&path)?;
            match serde_json::from_slice::<BlobMeta>(&content) {
                Ok(meta) => metas.push(meta),
                Err(e) => tracing::warn!("Skipping unreadable blob metadata {}: {}", path.display(), e),
            }
        }

        sort_oldest_first(&mut metas);
        Ok(metas)
    }
}

// =============================================================================
// Tests
// =============================================================================
