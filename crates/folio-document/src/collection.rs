//! Folio Document Collection
//!
//! A named, insertion-ordered set of documents with secondary indexes.
//! Every document gets a sequence number when inserted; the sequence never
//! changes on update, so iteration order is always insertion order.
//!
//! Writes are atomic per operation: a failing `update_many` leaves every
//! document as it was. With a commit hook installed, a write only becomes
//! visible once the hook has accepted the resulting snapshot; if the hook
//! fails the collection is restored to its state before the write.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::index::{DocumentIndex, IndexDescriptor, IndexSpec, ID_INDEX_NAME};
use crate::pipeline::Pipeline;
use crate::query::Query;
use crate::types::{validate_document, Document, DocumentId, ID_FIELD};
use crate::update::Update;
use folio_common::{FolioError, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::ops::Bound;

const DEFAULT_MAX_DOCUMENT_SIZE: usize = 16 * 1024 * 1024;

// =============================================================================
// Operation Results
// =============================================================================

/// Outcome of a batch insert: which positions succeeded and which failed.
#[derive(Debug, Default)]
pub struct InsertManyResult {
    pub inserted: Vec<(usize, DocumentId)>,
    pub failed: Vec<BatchFailure>,
}

impl InsertManyResult {
    pub fn inserted_ids(&self) -> Vec<DocumentId> {
        self.inserted.iter().map(|(_, id)| id.clone()).collect()
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// A document of a batch that could not be inserted.
#[derive(Debug)]
pub struct BatchFailure {
    pub index: usize,
    pub error: FolioError,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateResult {
    pub matched_count: u64,
    pub modified_count: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteResult {
    pub deleted_count: u64,
}

// =============================================================================
// Snapshot
// =============================================================================

/// Persisted form of a collection: documents in insertion order plus the
/// secondary index definitions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectionSnapshot {
    pub name: String,
    pub documents: Vec<Document>,
    pub indexes: Vec<IndexDescriptor>,
}

// =============================================================================
// Collection State
// =============================================================================

#[derive(Clone)]
struct CollectionState {
    documents: BTreeMap<u64, Document>,
    positions: HashMap<DocumentId, u64>,
    indexes: Vec<DocumentIndex>,
    next_seq: u64,
}

impl CollectionState {
    fn new() -> Self {
        Self {
            documents: BTreeMap::new(),
            positions: HashMap::new(),
            indexes: Vec::new(),
            next_seq: 1,
        }
    }

    /// Candidate sequence numbers from the `_id` map or a covering index.
    fn plan(&self, query: &Query) -> Option<VecDeque<u64>> {
        if let Some((_, value)) = query.equalities().find(|(f, _)| *f == ID_FIELD) {
            if let Some(id) = DocumentId::from_value(value) {
                return Some(self.positions.get(&id).copied().into_iter().collect());
            }
        }

        self.indexes
            .iter()
            .filter_map(|index| index.covering_values(query).map(|values| index.lookup(&values)))
            .min_by_key(|seqs| seqs.len())
            .map(|seqs| seqs.into_iter().collect())
    }

    fn select(&self, query: &Query, limit: Option<usize>) -> Vec<u64> {
        let candidates: Vec<u64> = match self.plan(query) {
            Some(seqs) => seqs.into_iter().collect(),
            None => self.documents.keys().copied().collect(),
        };

        candidates
            .into_iter()
            .filter(|seq| self.documents.get(seq).is_some_and(|doc| query.matches(doc)))
            .take(limit.unwrap_or(usize::MAX))
            .collect()
    }

    fn check_unique(&self, doc: &Document, seq: u64) -> Result<()> {
        self.indexes.iter().try_for_each(|index| index.check_unique(doc, seq))
    }

    fn index(&mut self, doc: &Document, seq: u64) {
        for index in self.indexes.iter_mut() {
            index.insert(doc, seq);
        }
    }

    fn unindex(&mut self, doc: &Document, seq: u64) {
        for index in self.indexes.iter_mut() {
            index.remove(doc, seq);
        }
    }

    /// Swap the stored document at `seq`, keeping indexes in step. Infallible.
    fn replace(&mut self, seq: u64, doc: Document) -> Option<Document> {
        let old = self.documents.remove(&seq)?;
        self.unindex(&old, seq);
        self.index(&doc, seq);
        self.documents.insert(seq, doc);
        Some(old)
    }

    fn remove(&mut self, seq: u64) -> Option<Document> {
        let doc = self.documents.remove(&seq)?;
        self.unindex(&doc, seq);
        if let Some(id) = doc.id() {
            self.positions.remove(&id);
        }
        Some(doc)
    }
}

// =============================================================================
// Collection
// =============================================================================

/// Receives the snapshot produced by a write before the write is kept.
pub type CommitHook = Box<dyn Fn(&CollectionSnapshot) -> Result<()> + Send + Sync>;

/// A collection of documents.
pub struct Collection {
    name: String,
    state: RwLock<CollectionState>,
    max_document_size: usize,
    commit: Option<CommitHook>,
}

impl Collection {
    /// Create a new collection.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_max_document_size(name, DEFAULT_MAX_DOCUMENT_SIZE)
    }

    pub fn with_max_document_size(name: impl Into<String>, max_document_size: usize) -> Self {
        Self {
            name: name.into(),
            state: RwLock::new(CollectionState::new()),
            max_document_size,
            commit: None,
        }
    }

    /// Install the hook every changing write must pass before it is kept.
    pub fn with_commit_hook(
        mut self,
        hook: impl Fn(&CollectionSnapshot) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.commit = Some(Box::new(hook));
        self
    }

    /// Rebuild a collection from its persisted form.
    pub fn from_snapshot(snapshot: CollectionSnapshot, max_document_size: usize) -> Result<Self> {
        let collection = Self::with_max_document_size(snapshot.name, max_document_size);

        for descriptor in snapshot.indexes {
            let spec = IndexSpec {
                keys: descriptor.keys,
                unique: descriptor.unique,
                name: Some(descriptor.name),
            };
            collection.create_index(spec)?;
        }

        for doc in snapshot.documents {
            if doc.id().is_none() {
                return Err(FolioError::Serialization(format!(
                    "stored document in '{}' has no _id",
                    collection.name
                )));
            }
            collection.insert_one(doc)?;
        }

        Ok(collection)
    }

    /// Capture documents and index definitions.
    pub fn snapshot(&self) -> CollectionSnapshot {
        self.snapshot_of(&self.state.read())
    }

    fn snapshot_of(&self, state: &CollectionState) -> CollectionSnapshot {
        CollectionSnapshot {
            name: self.name.clone(),
            documents: state.documents.values().cloned().collect(),
            indexes: state.indexes.iter().map(|i| i.descriptor().clone()).collect(),
        }
    }

    /// Run `op` under the write lock. When `changed` reports a change, the
    /// commit hook must accept the new snapshot before the lock is released,
    /// otherwise the state taken before `op` is put back.
    ///
    /// `op` must leave the state untouched when it fails.
    fn write<T>(
        &self,
        op: impl FnOnce(&mut CollectionState) -> Result<T>,
        changed: impl FnOnce(&T) -> bool,
    ) -> Result<T> {
        let mut state = self.state.write();
        let Some(commit) = self.commit.as_ref() else {
            return op(&mut *state);
        };

        let checkpoint = state.clone();
        let outcome = op(&mut *state)?;
        if changed(&outcome) {
            if let Err(e) = commit(&self.snapshot_of(&*state)) {
                *state = checkpoint;
                tracing::warn!("Rolled back write to '{}': {}", self.name, e);
                return Err(e);
            }
        }
        Ok(outcome)
    }

    /// Get the collection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the number of documents.
    pub fn len(&self) -> usize {
        self.state.read().documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn prepare(&self, doc: &mut Document) -> Result<DocumentId> {
        validate_document(doc)?;

        let id = match doc.id() {
            Some(id) => id,
            None => {
                let id = DocumentId::generate();
                doc.set_id(id.clone());
                id
            }
        };

        self.check_size(doc)?;
        Ok(id)
    }

    fn check_size(&self, doc: &Document) -> Result<()> {
        let size = doc.encoded_size()?;
        if size > self.max_document_size {
            return Err(FolioError::Write(format!(
                "document is {} bytes, above the {} byte limit",
                size, self.max_document_size
            )));
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Insert
    // -------------------------------------------------------------------------

    /// Insert a document, assigning an `_id` if it has none.
    pub fn insert_one(&self, mut doc: Document) -> Result<DocumentId> {
        let id = self.prepare(&mut doc)?;
        self.write(|state| self.insert_prepared(state, id, doc), |_| true)
    }

    /// Insert each document independently; failures do not stop the batch.
    ///
    /// The accepted documents are committed together. Only a failing commit
    /// fails the call, and then none of the batch is kept.
    pub fn insert_many(&self, docs: Vec<Document>) -> Result<InsertManyResult> {
        self.write(
            |state| {
                let mut result = InsertManyResult::default();
                for (index, mut doc) in docs.into_iter().enumerate() {
                    let outcome = self
                        .prepare(&mut doc)
                        .and_then(|id| self.insert_prepared(state, id, doc));
                    match outcome {
                        Ok(id) => result.inserted.push((index, id)),
                        Err(error) => {
                            tracing::warn!(
                                "Document {} of batch into '{}' was rejected: {}",
                                index,
                                self.name,
                                error
                            );
                            result.failed.push(BatchFailure { index, error });
                        }
                    }
                }
                Ok(result)
            },
            |result| !result.inserted.is_empty(),
        )
    }

    fn insert_prepared(
        &self,
        state: &mut CollectionState,
        id: DocumentId,
        doc: Document,
    ) -> Result<DocumentId> {
        if state.positions.contains_key(&id) {
            return Err(FolioError::Write(format!(
                "duplicate _id '{}' in collection '{}'",
                id, self.name
            )));
        }

        let seq = state.next_seq;
        state.check_unique(&doc, seq)?;

        state.next_seq += 1;
        state.index(&doc, seq);
        state.positions.insert(id.clone(), seq);
        state.documents.insert(seq, doc);

        tracing::debug!("Inserted document {} into '{}'", id, self.name);
        Ok(id)
    }

    // -------------------------------------------------------------------------
    // Query
    // -------------------------------------------------------------------------

    /// Lazily iterate the matching documents in insertion order.
    pub fn find(&self, query: &Query) -> Cursor<'_> {
        let plan = self.state.read().plan(query);
        Cursor {
            collection: self,
            query: query.clone(),
            plan,
            last_seq: None,
            returned: 0,
            scanned: 0,
        }
    }

    /// First match in insertion order.
    pub fn find_one(&self, query: &Query) -> Option<Document> {
        self.find(query).next()
    }

    /// Get a document by ID.
    pub fn get(&self, id: &DocumentId) -> Option<Document> {
        let state = self.state.read();
        let seq = state.positions.get(id)?;
        state.documents.get(seq).cloned()
    }

    /// Number of matches; equals the length of `find` with the same query.
    pub fn count(&self, query: &Query) -> usize {
        self.find(query).count()
    }

    // -------------------------------------------------------------------------
    // Update
    // -------------------------------------------------------------------------

    /// Apply the update to the first match.
    ///
    /// `modified_count` is 1 only when the stored value actually changed.
    pub fn update_one(&self, query: &Query, update: &Update) -> Result<UpdateResult> {
        update.validate()?;
        self.write(|state| self.update_first(state, query, update), modified)
    }

    fn update_first(
        &self,
        state: &mut CollectionState,
        query: &Query,
        update: &Update,
    ) -> Result<UpdateResult> {
        let Some(seq) = state.select(query, Some(1)).into_iter().next() else {
            return Ok(UpdateResult::default());
        };

        let Some(new_doc) = self.updated_copy(state, seq, update)? else {
            return Ok(UpdateResult {
                matched_count: 1,
                modified_count: 0,
            });
        };

        state.check_unique(&new_doc, seq)?;
        state.replace(seq, new_doc);

        Ok(UpdateResult {
            matched_count: 1,
            modified_count: 1,
        })
    }

    /// Apply the update to every match, or to none if any would fail.
    pub fn update_many(&self, query: &Query, update: &Update) -> Result<UpdateResult> {
        update.validate()?;
        self.write(|state| self.update_all(state, query, update), modified)
    }

    fn update_all(
        &self,
        state: &mut CollectionState,
        query: &Query,
        update: &Update,
    ) -> Result<UpdateResult> {
        let seqs = state.select(query, None);

        let mut pending = Vec::new();
        for &seq in &seqs {
            if let Some(new_doc) = self.updated_copy(state, seq, update)? {
                pending.push((seq, new_doc));
            }
        }

        let mut applied: Vec<(u64, Document)> = Vec::with_capacity(pending.len());
        for (seq, new_doc) in pending {
            let Some(old) = state.replace(seq, new_doc) else {
                continue;
            };

            let conflict = state
                .documents
                .get(&seq)
                .map(|doc| state.check_unique(doc, seq))
                .unwrap_or(Ok(()));

            if let Err(e) = conflict {
                state.replace(seq, old);
                for (done_seq, previous) in applied.into_iter().rev() {
                    state.replace(done_seq, previous);
                }
                return Err(e);
            }
            applied.push((seq, old));
        }

        Ok(UpdateResult {
            matched_count: seqs.len() as u64,
            modified_count: applied.len() as u64,
        })
    }

    /// The updated document, or `None` if the update leaves it unchanged.
    fn updated_copy(
        &self,
        state: &CollectionState,
        seq: u64,
        update: &Update,
    ) -> Result<Option<Document>> {
        let Some(current) = state.documents.get(&seq) else {
            return Ok(None);
        };

        let mut next = current.clone();
        update.apply(&mut next)?;
        if next == *current {
            return Ok(None);
        }

        validate_document(&next)?;
        self.check_size(&next)?;
        Ok(Some(next))
    }

    // -------------------------------------------------------------------------
    // Delete
    // -------------------------------------------------------------------------

    /// Remove the first match in insertion order.
    pub fn delete_one(&self, query: &Query) -> Result<DeleteResult> {
        self.write(|state| Ok(delete_selected(state, query, Some(1))), deleted)
    }

    /// Remove every match.
    pub fn delete_many(&self, query: &Query) -> Result<DeleteResult> {
        self.write(|state| Ok(delete_selected(state, query, None)), deleted)
    }

    // -------------------------------------------------------------------------
    // Index Operations
    // -------------------------------------------------------------------------

    /// Create an index, or return the name of an equivalent existing one.
    pub fn create_index(&self, spec: IndexSpec) -> Result<String> {
        spec.validate()?;

        let is_id_index = spec.keys.len() == 1 && spec.keys[0].0 == ID_FIELD;
        if is_id_index && spec.name.as_deref().map_or(true, |n| n == ID_INDEX_NAME) {
            return Ok(ID_INDEX_NAME.to_string());
        }

        self.write(|state| self.add_index(state, spec), |(_, created)| *created)
            .map(|(name, _)| name)
    }

    /// The index name and whether it was newly built.
    fn add_index(&self, state: &mut CollectionState, spec: IndexSpec) -> Result<(String, bool)> {
        let name = spec.resolved_name();

        if let Some(existing) = state
            .indexes
            .iter()
            .map(|i| i.descriptor())
            .find(|d| d.keys == spec.keys)
        {
            let same_name = spec.name.as_ref().map_or(true, |n| *n == existing.name);
            if existing.unique == spec.unique && same_name {
                return Ok((existing.name.clone(), false));
            }
            return Err(FolioError::InvalidIndex(format!(
                "index '{}' already covers these keys with different options",
                existing.name
            )));
        }

        if state.indexes.iter().any(|i| i.name() == name) {
            return Err(FolioError::InvalidIndex(format!(
                "an index named '{}' already exists on different keys",
                name
            )));
        }

        let mut index = DocumentIndex::new(IndexDescriptor {
            name: name.clone(),
            keys: spec.keys,
            unique: spec.unique,
        });
        for (&seq, doc) in &state.documents {
            index.check_unique(doc, seq).map_err(|e| {
                FolioError::InvalidIndex(format!("cannot build '{}': {}", name, e))
            })?;
            index.insert(doc, seq);
        }

        state.indexes.push(index);
        tracing::info!("Created index '{}' on collection '{}'", name, self.name);
        Ok((name, true))
    }

    /// The implicit `_id_` index followed by secondary indexes in creation order.
    pub fn list_indexes(&self) -> Vec<IndexDescriptor> {
        let state = self.state.read();
        std::iter::once(IndexDescriptor::id_index())
            .chain(state.indexes.iter().map(|i| i.descriptor().clone()))
            .collect()
    }

    /// Drop a secondary index by name. Returns whether it existed.
    pub fn drop_index(&self, name: &str) -> Result<bool> {
        if name == ID_INDEX_NAME {
            return Err(FolioError::InvalidIndex("the _id_ index cannot be dropped".to_string()));
        }
        self.write(
            |state| {
                let before = state.indexes.len();
                state.indexes.retain(|i| i.name() != name);
                Ok(state.indexes.len() != before)
            },
            |dropped| *dropped,
        )
    }

    // -------------------------------------------------------------------------
    // Aggregation
    // -------------------------------------------------------------------------

    /// Run a pipeline over the whole collection in insertion order.
    pub fn aggregate(&self, pipeline: &Pipeline) -> Result<Vec<Document>> {
        pipeline.validate()?;
        let input: Vec<Document> = self.state.read().documents.values().cloned().collect();
        pipeline.execute(input)
    }
}

fn modified(result: &UpdateResult) -> bool {
    result.modified_count > 0
}

fn deleted(result: &DeleteResult) -> bool {
    result.deleted_count > 0
}

fn delete_selected(state: &mut CollectionState, query: &Query, limit: Option<usize>) -> DeleteResult {
    let seqs = state.select(query, limit);
    let deleted = seqs.into_iter().filter_map(|seq| state.remove(seq)).count();
    DeleteResult {
        deleted_count: deleted as u64,
    }
}

// =============================================================================
// Cursor
// =============================================================================

/// Lazy, finite iteration over the documents matching a query.
///
/// Each step takes the read lock briefly and resumes after the last
/// examined document. Calling `find` again restarts from the beginning.
pub struct Cursor<'a> {
    collection: &'a Collection,
    query: Query,
    plan: Option<VecDeque<u64>>,
    last_seq: Option<u64>,
    returned: usize,
    scanned: usize,
}

impl Cursor<'_> {
    /// Documents examined so far.
    pub fn scanned(&self) -> usize {
        self.scanned
    }

    /// Whether candidates come from an index instead of a full scan.
    pub fn uses_index(&self) -> bool {
        self.plan.is_some()
    }
}

impl Iterator for Cursor<'_> {
    type Item = Document;

    fn next(&mut self) -> Option<Document> {
        if self.query.limit.is_some_and(|limit| self.returned >= limit) {
            return None;
        }

        let collection = self.collection;
        let state = collection.state.read();

        loop {
            let seq = match self.plan.as_mut() {
                Some(plan) => plan.pop_front()?,
                None => {
                    let lower = match self.last_seq {
                        Some(last) => Bound::Excluded(last),
                        None => Bound::Unbounded,
                    };
                    let (&seq, _) = state.documents.range((lower, Bound::Unbounded)).next()?;
                    self.last_seq = Some(seq);
                    seq
                }
            };

            let Some(doc) = state.documents.get(&seq) else {
                continue;
            };
            self.scanned += 1;

            if self.query.matches(doc) {
                self.returned += 1;
                return Some(doc.clone());
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::Direction;
    use crate::query::QueryBuilder;
    use crate::types::Value;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn doc(json: serde_json::Value) -> Document {
        Document::from_json(json).unwrap()
    }

    fn seeded() -> Collection {
        let collection = Collection::new("students");
        collection.insert_one(doc(json!({"name": "Alice", "age": 24}))).unwrap();
        collection.insert_one(doc(json!({"name": "Bob", "age": 29}))).unwrap();
        collection
            .insert_one(doc(json!({"name": "Charlie", "age": 24, "visits": 1})))
            .unwrap();
        collection
    }

    #[test]
    fn test_insert_assigns_id() {
        let collection = Collection::new("test");
        let id = collection.insert_one(doc(json!({"name": "Alice"}))).unwrap();

        let stored = collection.get(&id).unwrap();
        assert_eq!(stored.id(), Some(id.clone()));
        assert_eq!(stored.get("name").and_then(|v| v.as_str()), Some("Alice"));
    }

    #[test]
    fn test_duplicate_id() {
        let collection = Collection::new("test");
        collection.insert_one(Document::with_id("same-id")).unwrap();

        let result = collection.insert_one(Document::with_id("same-id"));
        assert!(matches!(result, Err(FolioError::Write(_))));
        assert_eq!(collection.len(), 1);
    }

    #[test]
    fn test_scalar_ids() {
        let collection = Collection::new("test");
        let seven = collection.insert_one(doc(json!({"_id": 7, "name": "x"}))).unwrap();
        assert_eq!(seven, DocumentId::from(7i64));

        collection.insert_one(doc(json!({"_id": "7", "name": "y"}))).unwrap();
        collection.insert_one(doc(json!({"_id": true}))).unwrap();

        let duplicate = collection.insert_one(doc(json!({"_id": 7.0})));
        assert!(matches!(duplicate, Err(FolioError::Write(_))));

        let mut cursor = collection.find(&Query::from_json(&json!({"_id": 7})).unwrap());
        assert!(cursor.uses_index());
        let found = cursor.next().unwrap();
        assert_eq!(found.get("name"), Some(&Value::from("x")));

        let by_text = collection.find_one(&Query::by_id(&DocumentId::new("7"))).unwrap();
        assert_eq!(by_text.get("name"), Some(&Value::from("y")));

        let rejected = collection.insert_one(doc(json!({"_id": [1, 2]})));
        assert!(matches!(rejected, Err(FolioError::Write(_))));
        assert_eq!(collection.len(), 3);
    }

    #[test]
    fn test_failed_commit_restores_state() {
        let failing = Arc::new(AtomicBool::new(false));
        let switch = failing.clone();
        let collection = Collection::new("test").with_commit_hook(move |_| {
            if switch.load(Ordering::SeqCst) {
                Err(FolioError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "disk full",
                )))
            } else {
                Ok(())
            }
        });
        collection.insert_one(Document::with_id("alice").with("age", 24i64)).unwrap();
        collection.create_index(IndexSpec::new("age", Direction::Ascending)).unwrap();

        failing.store(true, Ordering::SeqCst);
        assert!(collection.insert_one(Document::with_id("bob")).is_err());
        assert!(collection.insert_many(vec![Document::with_id("carol")]).is_err());
        let age = QueryBuilder::new().eq("age", 24i64).build();
        assert!(collection.update_one(&age, &Update::new().set("age", 30i64)).is_err());
        assert!(collection.delete_many(&Query::new()).is_err());
        assert!(collection.drop_index("age_1").is_err());

        assert_eq!(collection.len(), 1);
        assert_eq!(collection.count(&age), 1);
        assert_eq!(collection.list_indexes().len(), 2);

        let noop = collection.update_one(&age, &Update::new().set("age", 24i64)).unwrap();
        assert_eq!(noop.modified_count, 0);

        failing.store(false, Ordering::SeqCst);
        assert_eq!(collection.insert_one(Document::with_id("bob")).unwrap(), DocumentId::new("bob"));
        assert_eq!(collection.len(), 2);
    }

    #[test]
    fn test_insert_rejects_reserved_fields() {
        let collection = Collection::new("test");
        let result = collection.insert_one(doc(json!({"$bad": 1})));
        assert!(matches!(result, Err(FolioError::Write(_))));
    }

    #[test]
    fn test_document_size_limit() {
        let collection = Collection::with_max_document_size("small", 64);
        let result = collection.insert_one(doc(json!({"bio": "x".repeat(100)})));
        assert!(matches!(result, Err(FolioError::Write(_))));
    }

    #[test]
    fn test_insert_many_partial_failure() {
        let collection = Collection::new("test");
        let result = collection.insert_many(vec![
            Document::with_id("a"),
            Document::with_id("a"),
            Document::new().with("name", "no id"),
        ])
        .unwrap();

        assert_eq!(result.inserted.len(), 2);
        assert_eq!(result.inserted[0].0, 0);
        assert_eq!(result.inserted[1].0, 2);
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].index, 1);
        assert!(!result.is_complete());
        assert_eq!(collection.len(), 2);
    }

    #[test]
    fn test_find_insertion_order_and_limit() {
        let collection = seeded();

        let names: Vec<String> = collection
            .find(&Query::new())
            .filter_map(|d| d.get("name").and_then(|v| v.as_str()).map(String::from))
            .collect();
        assert_eq!(names, vec!["Alice", "Bob", "Charlie"]);

        let query = QueryBuilder::new().eq("age", 24i64).limit(1).build();
        assert_eq!(collection.find(&query).count(), 1);
        assert_eq!(collection.count(&query), 1);
        assert_eq!(collection.count(&QueryBuilder::new().eq("age", 24i64).build()), 2);
    }

    #[test]
    fn test_cursor_is_lazy() {
        let collection = seeded();
        let mut cursor = collection.find(&Query::new());
        assert_eq!(cursor.scanned(), 0);

        cursor.next().unwrap();
        collection.insert_one(doc(json!({"name": "Dana"}))).unwrap();
        assert_eq!(cursor.count(), 3);
    }

    #[test]
    fn test_find_by_id_uses_positions() {
        let collection = seeded();
        let id = collection.insert_one(doc(json!({"name": "Eve"}))).unwrap();

        let mut cursor = collection.find(&Query::by_id(&id));
        assert!(cursor.uses_index());
        assert!(cursor.next().is_some());
        assert_eq!(cursor.scanned(), 1);
    }

    #[test]
    fn test_update_one_counts() {
        let collection = seeded();
        let query = QueryBuilder::new().eq("name", "Charlie").build();

        let result = collection
            .update_one(&query, &Update::new().inc("visits", 5i64).set("active", true))
            .unwrap();
        assert_eq!(result, UpdateResult { matched_count: 1, modified_count: 1 });

        let charlie = collection.find_one(&query).unwrap();
        assert_eq!(charlie.get("visits"), Some(&Value::Int(6)));
        assert_eq!(charlie.get("active"), Some(&Value::Bool(true)));

        let noop = collection
            .update_one(&query, &Update::new().set("active", true))
            .unwrap();
        assert_eq!(noop, UpdateResult { matched_count: 1, modified_count: 0 });

        let missing = collection
            .update_one(&QueryBuilder::new().eq("name", "Zed").build(), &Update::new().set("a", 1i64))
            .unwrap();
        assert_eq!(missing, UpdateResult::default());
    }

    #[test]
    fn test_update_preserves_order_and_id() {
        let collection = seeded();
        let alice = collection.find_one(&QueryBuilder::new().eq("name", "Alice").build()).unwrap();

        collection
            .update_one(&Query::by_id(&alice.id().unwrap()), &Update::new().set("age", 25i64))
            .unwrap();

        let first = collection.find(&Query::new()).next().unwrap();
        assert_eq!(first.id(), alice.id());
        assert_eq!(first.get("age"), Some(&Value::Int(25)));
    }

    #[test]
    fn test_update_many_all_or_nothing() {
        let collection = seeded();
        collection
            .create_index(IndexSpec::new("tag", Direction::Ascending).unique())
            .unwrap();

        let query = QueryBuilder::new().eq("age", 24i64).build();
        let err = collection
            .update_many(&query, &Update::new().set("tag", "same"))
            .unwrap_err();
        assert!(matches!(err, FolioError::Write(_)));
        assert_eq!(collection.count(&QueryBuilder::new().exists("tag", true).build()), 0);

        let result = collection
            .update_many(&query, &Update::new().set("cohort", "2025"))
            .unwrap();
        assert_eq!(result.matched_count, 2);
        assert_eq!(result.modified_count, 2);
    }

    #[test]
    fn test_update_many_operator_failure_changes_nothing() {
        let collection = seeded();
        collection.insert_one(doc(json!({"name": "Text", "age": "old"}))).unwrap();

        let err = collection
            .update_many(&Query::new(), &Update::new().inc("age", 1i64))
            .unwrap_err();
        assert!(matches!(err, FolioError::InvalidUpdate(_)));
        assert_eq!(collection.count(&QueryBuilder::new().eq("age", 25i64).build()), 0);
    }

    #[test]
    fn test_delete() {
        let collection = seeded();
        let query = QueryBuilder::new().eq("name", "Bob").build();

        assert_eq!(collection.delete_one(&query).unwrap().deleted_count, 1);
        assert!(collection.find_one(&query).is_none());
        assert_eq!(collection.delete_one(&query).unwrap().deleted_count, 0);

        let result = collection
            .delete_many(&QueryBuilder::new().eq("age", 24i64).build())
            .unwrap();
        assert_eq!(result.deleted_count, 2);
        assert!(collection.is_empty());
    }

    #[test]
    fn test_index_idempotent_and_used() {
        let collection = seeded();
        let spec = IndexSpec::new("name", Direction::Ascending);

        let first = collection.create_index(spec.clone()).unwrap();
        let second = collection.create_index(spec).unwrap();
        assert_eq!(first, "name_1");
        assert_eq!(first, second);

        let names: Vec<String> = collection.list_indexes().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["_id_", "name_1"]);

        let mut cursor = collection.find(&QueryBuilder::new().eq("name", "Bob").build());
        assert!(cursor.uses_index());
        assert!(cursor.next().is_some());
        assert_eq!(cursor.scanned(), 1);

        let conflicting = collection.create_index(IndexSpec::new("name", Direction::Ascending).unique());
        assert!(matches!(conflicting, Err(FolioError::InvalidIndex(_))));
    }

    #[test]
    fn test_unique_index_build_failure() {
        let collection = seeded();
        let err = collection
            .create_index(IndexSpec::new("age", Direction::Ascending).unique())
            .unwrap_err();
        assert!(matches!(err, FolioError::InvalidIndex(_)));
        assert_eq!(collection.list_indexes().len(), 1);
    }

    #[test]
    fn test_index_tracks_updates_and_deletes() {
        let collection = seeded();
        collection.create_index(IndexSpec::new("age", Direction::Ascending)).unwrap();

        collection
            .update_one(&QueryBuilder::new().eq("name", "Bob").build(), &Update::new().set("age", 24i64))
            .unwrap();
        assert_eq!(collection.count(&QueryBuilder::new().eq("age", 24i64).build()), 3);

        collection
            .delete_one(&QueryBuilder::new().eq("name", "Alice").build())
            .unwrap();
        assert_eq!(collection.count(&QueryBuilder::new().eq("age", 24i64).build()), 2);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let collection = seeded();
        collection.create_index(IndexSpec::new("name", Direction::Descending)).unwrap();

        let snapshot = collection.snapshot();
        let restored = Collection::from_snapshot(snapshot, DEFAULT_MAX_DOCUMENT_SIZE).unwrap();

        assert_eq!(restored.len(), 3);
        assert_eq!(restored.list_indexes(), collection.list_indexes());
        let names: Vec<Value> = restored
            .find(&Query::new())
            .filter_map(|d| d.get("name").cloned())
            .collect();
        assert_eq!(names, vec![Value::from("Alice"), Value::from("Bob"), Value::from("Charlie")]);
    }
}
