//! Folio Document Engine
//!
//! Core engine that coordinates the collections of one database and keeps
//! their persisted snapshots in step with every successful write. Each
//! collection commits through the storage backend before a write is kept,
//! so a failed save leaves memory and disk as they were.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::blob::BlobStore;
use crate::collection::{Collection, CollectionSnapshot, DeleteResult, InsertManyResult, UpdateResult};
use crate::index::IndexSpec;
use crate::query::Query;
use crate::storage::{StorageBackend, StorageStats};
use crate::types::{Document, DocumentId};
use crate::update::Update;
use folio_common::{FolioError, Result};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

const MAX_NAME_LEN: usize = 120;

// =============================================================================
// Document Engine Configuration
// =============================================================================

/// Configuration for the document engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub max_document_size: usize,
    pub max_collections: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_document_size: 16 * 1024 * 1024, // 16MB
            max_collections: 1000,
        }
    }
}

// =============================================================================
// Document Engine
// =============================================================================

/// The collections of one database over a storage backend.
pub struct DocumentEngine {
    config: EngineConfig,
    database: String,
    storage: Arc<dyn StorageBackend>,
    collections: RwLock<HashMap<String, Arc<Collection>>>,
    materialized: RwLock<BTreeSet<String>>,
    stats: RwLock<EngineStats>,
}

impl DocumentEngine {
    /// Open a database, loading every persisted collection.
    pub fn open(
        database: impl Into<String>,
        storage: Arc<dyn StorageBackend>,
        config: EngineConfig,
    ) -> Result<Self> {
        let database = database.into();
        let mut collections = HashMap::new();
        let mut materialized = BTreeSet::new();

        for snapshot in storage.load()? {
            let name = snapshot.name.clone();
            let collection = Collection::from_snapshot(snapshot, config.max_document_size)?
                .with_commit_hook(commit_to(storage.clone()));
            tracing::info!(
                "Loaded {} documents into collection '{}'",
                collection.len(),
                name
            );
            materialized.insert(name.clone());
            collections.insert(name, Arc::new(collection));
        }

        Ok(Self {
            config,
            database,
            storage,
            collections: RwLock::new(collections),
            materialized: RwLock::new(materialized),
            stats: RwLock::new(EngineStats::default()),
        })
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn storage(&self) -> &Arc<dyn StorageBackend> {
        &self.storage
    }

    pub fn blobs(&self) -> Arc<dyn BlobStore> {
        self.storage.blobs()
    }

    // -------------------------------------------------------------------------
    // Collection Management
    // -------------------------------------------------------------------------

    /// Get a collection, creating it lazily.
    ///
    /// A new collection is only listed once something has been written to it.
    pub fn collection(&self, name: &str) -> Result<Arc<Collection>> {
        if let Some(collection) = self.collections.read().get(name) {
            return Ok(collection.clone());
        }

        validate_collection_name(name)?;

        let mut collections = self.collections.write();
        if let Some(collection) = collections.get(name) {
            return Ok(collection.clone());
        }
        if collections.len() >= self.config.max_collections {
            return Err(FolioError::Write(format!(
                "database '{}' already holds {} collections",
                self.database, self.config.max_collections
            )));
        }

        let collection = Arc::new(
            Collection::with_max_document_size(name, self.config.max_document_size)
                .with_commit_hook(commit_to(self.storage.clone())),
        );
        collections.insert(name.to_string(), collection.clone());
        Ok(collection)
    }

    /// Names of collections that hold written data, sorted.
    pub fn list_collections(&self) -> Vec<String> {
        self.materialized.read().iter().cloned().collect()
    }

    pub fn collection_exists(&self, name: &str) -> bool {
        self.materialized.read().contains(name)
    }

    /// Get collection statistics.
    pub fn collection_stats(&self, name: &str) -> Option<CollectionStats> {
        if !self.collection_exists(name) {
            return None;
        }
        let collection = self.collections.read().get(name).cloned()?;
        let snapshot = collection.snapshot();

        Some(CollectionStats {
            name: name.to_string(),
            document_count: snapshot.documents.len(),
            index_count: snapshot.indexes.len() + 1,
            data_size: snapshot
                .documents
                .iter()
                .filter_map(|doc| doc.encoded_size().ok())
                .sum::<usize>() as u64,
        })
    }

    /// Write the collection's current state to storage.
    pub fn persist(&self, name: &str) -> Result<()> {
        let Some(collection) = self.collections.read().get(name).cloned() else {
            return Ok(());
        };

        commit_to(self.storage.clone())(&collection.snapshot())?;
        self.mark_written(name);
        Ok(())
    }

    fn mark_written(&self, name: &str) {
        if !self.collection_exists(name) {
            self.materialized.write().insert(name.to_string());
        }
    }

    // -------------------------------------------------------------------------
    // Document Operations
    // -------------------------------------------------------------------------

    /// Insert a document into a collection.
    pub fn insert_one(&self, collection: &str, doc: Document) -> Result<DocumentId> {
        let id = self.collection(collection)?.insert_one(doc)?;
        self.mark_written(collection);
        self.stats.write().documents_inserted += 1;
        Ok(id)
    }

    /// Insert multiple documents, each independently.
    pub fn insert_many(&self, collection: &str, docs: Vec<Document>) -> Result<InsertManyResult> {
        let result = self.collection(collection)?.insert_many(docs)?;
        if !result.inserted.is_empty() {
            self.mark_written(collection);
        }
        self.stats.write().documents_inserted += result.inserted.len() as u64;
        Ok(result)
    }

    pub fn update_one(&self, collection: &str, query: &Query, update: &Update) -> Result<UpdateResult> {
        let result = self.collection(collection)?.update_one(query, update)?;
        Ok(self.after_update(collection, result))
    }

    pub fn update_many(&self, collection: &str, query: &Query, update: &Update) -> Result<UpdateResult> {
        let result = self.collection(collection)?.update_many(query, update)?;
        Ok(self.after_update(collection, result))
    }

    fn after_update(&self, collection: &str, result: UpdateResult) -> UpdateResult {
        if result.modified_count > 0 {
            self.mark_written(collection);
        }
        self.stats.write().documents_updated += result.modified_count;
        result
    }

    pub fn delete_one(&self, collection: &str, query: &Query) -> Result<DeleteResult> {
        let result = self.collection(collection)?.delete_one(query)?;
        Ok(self.after_delete(result))
    }

    pub fn delete_many(&self, collection: &str, query: &Query) -> Result<DeleteResult> {
        let result = self.collection(collection)?.delete_many(query)?;
        Ok(self.after_delete(result))
    }

    fn after_delete(&self, result: DeleteResult) -> DeleteResult {
        self.stats.write().documents_deleted += result.deleted_count;
        result
    }

    /// Record a read for statistics.
    pub fn record_query(&self) {
        self.stats.write().queries_executed += 1;
    }

    // -------------------------------------------------------------------------
    // Index Operations
    // -------------------------------------------------------------------------

    /// Create an index on a collection.
    ///
    /// An index request materializes the collection even when the index
    /// already existed.
    pub fn create_index(&self, collection: &str, spec: IndexSpec) -> Result<String> {
        let name = self.collection(collection)?.create_index(spec)?;
        if !self.collection_exists(collection) {
            self.persist(collection)?;
        }
        Ok(name)
    }

    /// Drop an index.
    pub fn drop_index(&self, collection: &str, name: &str) -> Result<bool> {
        self.collection(collection)?.drop_index(name)
    }

    // -------------------------------------------------------------------------
    // Statistics
    // -------------------------------------------------------------------------

    /// Get engine statistics.
    pub fn stats(&self) -> EngineStats {
        self.stats.read().clone()
    }

    pub fn storage_stats(&self) -> StorageStats {
        self.storage.stats()
    }
}

/// Commit hook saving each new snapshot through `storage`.
fn commit_to(
    storage: Arc<dyn StorageBackend>,
) -> impl Fn(&CollectionSnapshot) -> Result<()> + Send + Sync + 'static {
    move |snapshot| {
        storage.save(snapshot).map_err(|e| {
            tracing::error!("Failed to persist collection '{}': {}", snapshot.name, e);
            e
        })
    }
}

/// Reject collection names that cannot be stored as a snapshot file.
pub fn validate_collection_name(name: &str) -> Result<()> {
    match name_problem(name) {
        Some(problem) => Err(FolioError::Write(format!(
            "collection name '{}' {}",
            name, problem
        ))),
        None => Ok(()),
    }
}

/// Reject database names that cannot be used as a directory under the data dir.
pub fn validate_database_name(name: &str) -> Result<()> {
    match name_problem(name) {
        Some(problem) => Err(FolioError::Config(format!(
            "database name '{}' {}",
            name, problem
        ))),
        None => Ok(()),
    }
}

fn name_problem(name: &str) -> Option<&'static str> {
    if name.is_empty() {
        Some("must not be empty")
    } else if name.len() > MAX_NAME_LEN {
        Some("is too long")
    } else if name.starts_with('.') || name.starts_with("system.") {
        Some("uses a reserved prefix")
    } else if name.contains(['$', '/', '\\', '\0']) {
        Some("must not contain '$', '/', '\\' or NUL")
    } else {
        None
    }
}

// =============================================================================
// Engine Statistics
// =============================================================================

/// Statistics for the document engine.
#[derive(Debug, Clone, Default)]
pub struct EngineStats {
    pub documents_inserted: u64,
    pub documents_updated: u64,
    pub documents_deleted: u64,
    pub queries_executed: u64,
}

/// Statistics for a collection.
#[derive(Debug, Clone)]
pub struct CollectionStats {
    pub name: String,
    pub document_count: usize,
    pub index_count: usize,
    pub data_size: u64,
}

// =============================================================================
// Tests
// =============================================================================
