//! Folio Document - Embedded Document Store
//!
//! Schema-less document collections with filters, partial updates,
//! secondary indexes, an aggregation pipeline and a companion large-object
//! store, persisted through pluggable storage backends.
//!
//! Key Features:
//! - Closed value model with tagged file references
//! - Lazy, insertion-ordered cursors with index-assisted lookups
//! - Atomic single and multi-document updates
//! - Unwind/group/sort aggregation validated before execution
//! - Memory and on-disk backends behind a bounded connectivity check
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

pub mod blob;
pub mod client;
pub mod collection;
pub mod engine;
pub mod file_ref;
pub mod index;
pub mod pipeline;
pub mod query;
pub mod storage;
pub mod types;
pub mod update;

pub use blob::{BlobId, BlobMeta, BlobStore, LocalBlobStore, MemoryBlobStore};
pub use client::{Client, CollectionHandle};
pub use collection::{
    BatchFailure, Collection, CollectionSnapshot, Cursor, DeleteResult, InsertManyResult,
    UpdateResult,
};
pub use engine::{
    validate_collection_name, validate_database_name, CollectionStats, DocumentEngine,
    EngineConfig, EngineStats,
};
pub use file_ref::{as_blob_ref, as_data_uri, as_path, as_url, FileRef};
pub use index::{Direction, IndexDescriptor, IndexSpec};
pub use pipeline::{Accumulator, Expr, Pipeline, Stage};
pub use query::{Filter, Query, QueryBuilder};
pub use storage::{LocalStorage, MemoryStorage, StorageBackend, StorageStats};
pub use types::{Document, DocumentId, Value};
pub use update::{Update, UpdateOp};
