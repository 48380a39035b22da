//! Folio Client
//!
//! Session over one database. Connecting validates the descriptor, resolves
//! the storage backend from its host, checks reachability within the
//! configured timeout and loads the persisted collections.
//!
//! The session is released by `close` or, on any other exit path, on drop.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::blob::BlobStore;
use crate::collection::{Collection, Cursor, DeleteResult, InsertManyResult, UpdateResult};
use crate::engine::{
    validate_database_name, CollectionStats, DocumentEngine, EngineConfig, EngineStats,
};
use crate::index::{IndexDescriptor, IndexSpec};
use crate::pipeline::Pipeline;
use crate::query::Query;
use crate::storage::{LocalStorage, MemoryStorage, StorageBackend};
use crate::types::{Document, DocumentId};
use crate::update::Update;
use folio_common::{ClientConfig, ConnectionDescriptor, FolioError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const MEMORY_HOST: &str = "memory";
const LOCAL_HOSTS: [&str; 3] = ["local", "localhost", "127.0.0.1"];
const SYNC_WRITES_OPTION: &str = "syncWrites";
const PING_RETRY_INTERVAL: Duration = Duration::from_millis(50);

// =============================================================================
// Client
// =============================================================================

/// A connected session.
pub struct Client {
    config: ClientConfig,
    descriptor: ConnectionDescriptor,
    engine: Arc<DocumentEngine>,
    closed: AtomicBool,
}

impl Client {
    /// Connect using the given configuration.
    pub fn connect(config: &ClientConfig) -> Result<Self> {
        config.validate()?;
        let descriptor = config.descriptor()?;
        let database = config.database_for(&descriptor);
        validate_database_name(&database)?;

        let storage = open_backend(config, &descriptor, &database)?;
        ping_within(storage.as_ref(), config.connect_timeout())?;

        let engine_config = EngineConfig {
            max_document_size: config.max_document_size,
            ..EngineConfig::default()
        };
        let engine = DocumentEngine::open(database, storage, engine_config)?;

        tracing::info!(
            "Connected to {} ({} storage, database '{}')",
            descriptor,
            engine.storage().name(),
            engine.database()
        );

        Ok(Self {
            config: config.clone(),
            descriptor,
            engine: Arc::new(engine),
            closed: AtomicBool::new(false),
        })
    }

    /// Check that the session is still usable.
    pub fn ping(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(FolioError::Connect("client is closed".to_string()));
        }
        self.engine.storage().ping()
    }

    pub fn database(&self) -> &str {
        self.engine.database()
    }

    pub fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn backend_name(&self) -> &'static str {
        self.engine.storage().name()
    }

    /// Handle to a collection; it is created on first write.
    pub fn collection(&self, name: &str) -> Result<CollectionHandle> {
        Ok(CollectionHandle {
            engine: self.engine.clone(),
            collection: self.engine.collection(name)?,
        })
    }

    /// Handle to the configured default collection.
    pub fn default_collection(&self) -> Result<CollectionHandle> {
        self.collection(&self.config.collection)
    }

    pub fn list_collection_names(&self) -> Vec<String> {
        self.engine.list_collections()
    }

    /// The large-object store of this database.
    pub fn blobs(&self) -> Arc<dyn BlobStore> {
        self.engine.blobs()
    }

    pub fn stats(&self) -> EngineStats {
        self.engine.stats()
    }

    /// Release the session. Idempotent.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        tracing::debug!("Closing session on database '{}'", self.database());
        self.engine.storage().release()
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!("Failed to release session: {}", e);
        }
    }
}

fn open_backend(
    config: &ClientConfig,
    descriptor: &ConnectionDescriptor,
    database: &str,
) -> Result<Arc<dyn StorageBackend>> {
    let host = descriptor.host.to_ascii_lowercase();

    if host == MEMORY_HOST {
        return Ok(Arc::new(MemoryStorage::new()));
    }

    if LOCAL_HOSTS.contains(&host.as_str()) {
        let sync_writes = match descriptor.option(SYNC_WRITES_OPTION) {
            Some(value) => value.parse::<bool>().map_err(|_| {
                FolioError::Config(format!(
                    "option {} must be true or false, got '{}'",
                    SYNC_WRITES_OPTION, value
                ))
            })?,
            None => config.sync_writes,
        };
        let root = config.data_dir.join(database);
        let storage = LocalStorage::open(root, sync_writes, config.connect_timeout())?;
        return Ok(Arc::new(storage));
    }

    Err(FolioError::Connect(format!(
        "host '{}' is not reachable; use 'memory' or 'localhost'",
        descriptor.host
    )))
}

/// Ping until success or until `timeout` has elapsed.
fn ping_within(storage: &dyn StorageBackend, timeout: Duration) -> Result<()> {
    let started = Instant::now();
    loop {
        match storage.ping() {
            Ok(()) => return Ok(()),
            Err(e) if started.elapsed() >= timeout => {
                return Err(FolioError::Connect(format!(
                    "store not reachable within {} ms: {}",
                    timeout.as_millis(),
                    e
                )))
            }
            Err(_) => std::thread::sleep(PING_RETRY_INTERVAL),
        }
    }
}

// =============================================================================
// Collection Handle
// =============================================================================

/// Operations on one collection of a connected database.
///
/// Writes are persisted before they return.
#[derive(Clone)]
pub struct CollectionHandle {
    engine: Arc<DocumentEngine>,
    collection: Arc<Collection>,
}

impl CollectionHandle {
    pub fn name(&self) -> &str {
        self.collection.name()
    }

    fn ensure_open(&self) -> Result<()> {
        self.engine.storage().ping()
    }

    pub fn insert_one(&self, doc: Document) -> Result<DocumentId> {
        self.ensure_open()?;
        self.engine.insert_one(self.name(), doc)
    }

    /// Insert each document independently and report per-position outcomes.
    pub fn insert_many(&self, docs: Vec<Document>) -> Result<InsertManyResult> {
        self.ensure_open()?;
        self.engine.insert_many(self.name(), docs)
    }

    pub fn find_one(&self, query: &Query) -> Option<Document> {
        self.engine.record_query();
        self.collection.find_one(query)
    }

    /// Lazy cursor over the matches, in insertion order.
    pub fn find(&self, query: &Query) -> Cursor<'_> {
        self.engine.record_query();
        self.collection.find(query)
    }

    pub fn count(&self, query: &Query) -> usize {
        self.engine.record_query();
        self.collection.count(query)
    }

    pub fn update_one(&self, query: &Query, update: &Update) -> Result<UpdateResult> {
        self.ensure_open()?;
        self.engine.update_one(self.name(), query, update)
    }

    pub fn update_many(&self, query: &Query, update: &Update) -> Result<UpdateResult> {
        self.ensure_open()?;
        self.engine.update_many(self.name(), query, update)
    }

    pub fn delete_one(&self, query: &Query) -> Result<DeleteResult> {
        self.ensure_open()?;
        self.engine.delete_one(self.name(), query)
    }

    pub fn delete_many(&self, query: &Query) -> Result<DeleteResult> {
        self.ensure_open()?;
        self.engine.delete_many(self.name(), query)
    }

    pub fn create_index(&self, spec: IndexSpec) -> Result<String> {
        self.ensure_open()?;
        self.engine.create_index(self.name(), spec)
    }

    pub fn drop_index(&self, name: &str) -> Result<bool> {
        self.ensure_open()?;
        self.engine.drop_index(self.name(), name)
    }

    pub fn list_indexes(&self) -> Vec<IndexDescriptor> {
        self.collection.list_indexes()
    }

    pub fn aggregate(&self, pipeline: &Pipeline) -> Result<Vec<Document>> {
        self.engine.record_query();
        self.collection.aggregate(pipeline)
    }

    /// `None` until the collection has been written.
    pub fn stats(&self) -> Option<CollectionStats> {
        self.engine.collection_stats(self.name())
    }
}

// =============================================================================
// Tests
// =============================================================================
