//! Folio Document Index
//!
//! Named, ordered-field indexes attached to a collection. An index maps the
//! key tuple of each document to the insertion sequence numbers holding it,
//! so equality lookups return candidates already in insertion order.
//!
//! Array fields are multikey: a document is reachable through the whole
//! array and through each of its elements.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::query::Query;
use crate::types::{Document, NumberKey, Value};
use folio_common::{FolioError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Name of the implicit unique index on `_id`.
pub const ID_INDEX_NAME: &str = "_id_";

// =============================================================================
// Direction
// =============================================================================

/// Ordering direction of an index key or sort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Ascending,
    Descending,
}

impl Direction {
    pub fn as_i32(self) -> i32 {
        match self {
            Self::Ascending => 1,
            Self::Descending => -1,
        }
    }

    /// Parse the `1` / `-1` convention.
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            1 => Some(Self::Ascending),
            -1 => Some(Self::Descending),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_i32())
    }
}

// =============================================================================
// Index Specification
// =============================================================================

/// Requested index: ordered key fields plus options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub keys: Vec<(String, Direction)>,
    pub unique: bool,
    pub name: Option<String>,
}

impl IndexSpec {
    /// Single-field index.
    pub fn new(field: impl Into<String>, direction: Direction) -> Self {
        Self {
            keys: vec![(field.into(), direction)],
            unique: false,
            name: None,
        }
    }

    /// Compound index over several fields, in order.
    pub fn compound(keys: Vec<(String, Direction)>) -> Self {
        Self {
            keys,
            unique: false,
            name: None,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// `field_1` / `field_-1` segments joined by `_`.
    pub fn default_name(&self) -> String {
        self.keys
            .iter()
            .map(|(field, direction)| format!("{}_{}", field, direction))
            .collect::<Vec<_>>()
            .join("_")
    }

    pub fn resolved_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.default_name())
    }

    /// Parse a key document such as `{"name": 1, "age": -1}`.
    pub fn from_json(keys: &serde_json::Value) -> Result<Self> {
        let serde_json::Value::Object(obj) = keys else {
            return Err(FolioError::InvalidIndex(format!(
                "index keys must be an object, got {}",
                keys
            )));
        };

        let keys = obj
            .iter()
            .map(|(field, dir)| {
                dir.as_i64()
                    .and_then(Direction::from_i64)
                    .map(|d| (field.clone(), d))
                    .ok_or_else(|| {
                        FolioError::InvalidIndex(format!(
                            "direction of '{}' must be 1 or -1, got {}",
                            field, dir
                        ))
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        let spec = Self::compound(keys);
        spec.validate()?;
        Ok(spec)
    }

    pub fn validate(&self) -> Result<()> {
        if self.keys.is_empty() {
            return Err(FolioError::InvalidIndex("an index needs at least one key".to_string()));
        }

        for (i, (field, _)) in self.keys.iter().enumerate() {
            if field.is_empty() || field.starts_with('$') {
                return Err(FolioError::InvalidIndex(format!(
                    "invalid index field '{}'",
                    field
                )));
            }
            if self.keys[..i].iter().any(|(other, _)| other == field) {
                return Err(FolioError::InvalidIndex(format!(
                    "field '{}' appears twice in the index",
                    field
                )));
            }
        }

        if let Some(ref name) = self.name {
            if name.is_empty() || name == ID_INDEX_NAME {
                return Err(FolioError::InvalidIndex(format!("invalid index name '{}'", name)));
            }
        }
        Ok(())
    }
}

/// An index as listed by a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub name: String,
    pub keys: Vec<(String, Direction)>,
    pub unique: bool,
}

impl IndexDescriptor {
    pub fn id_index() -> Self {
        Self {
            name: ID_INDEX_NAME.to_string(),
            keys: vec![("_id".to_string(), Direction::Ascending)],
            unique: true,
        }
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(|(field, _)| field.as_str())
    }
}

impl fmt::Display for IndexDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<String> = self
            .keys
            .iter()
            .map(|(field, direction)| format!("{}: {}", field, direction))
            .collect();
        write!(f, "{} {{ {} }}", self.name, keys.join(", "))?;
        if self.unique {
            write!(f, " unique")?;
        }
        Ok(())
    }
}

// =============================================================================
// Index Key
// =============================================================================

/// Hashable form of a value. Numbers key by their [`NumberKey`], the rule
/// equality filters use, and file references by their plain form. A missing
/// field keys as `Null`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IndexKey {
    Null,
    Bool(bool),
    Number(NumberKey),
    String(String),
    Composite(String),
}

impl IndexKey {
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Int(n) => Self::Number(NumberKey::Int(*n)),
            Value::Float(f) => Self::Number(NumberKey::from_f64(*f)),
            Value::String(s) => Self::String(s.clone()),
            Value::FileRef(file) => Self::from_value(&file.to_plain()),
            Value::Array(_) | Value::Object(_) => Self::Composite(value.to_json().to_string()),
        }
    }

    pub fn from_field(value: Option<&Value>) -> Self {
        value.map(Self::from_value).unwrap_or(Self::Null)
    }

    /// Keys under which a field value is reachable.
    fn reachable(value: Option<&Value>) -> Vec<Self> {
        let mut keys = vec![Self::from_field(value)];
        if let Some(Value::Array(items)) = value {
            for item in items {
                let key = Self::from_value(item);
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }
        keys
    }
}

// =============================================================================
// Document Index
// =============================================================================

/// A secondary index over a collection.
#[derive(Clone)]
pub struct DocumentIndex {
    descriptor: IndexDescriptor,
    entries: HashMap<Vec<IndexKey>, BTreeSet<u64>>,
}

impl DocumentIndex {
    pub fn new(descriptor: IndexDescriptor) -> Self {
        Self {
            descriptor,
            entries: HashMap::new(),
        }
    }

    pub fn descriptor(&self) -> &IndexDescriptor {
        &self.descriptor
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Every key tuple a document is reachable through.
    fn key_tuples(&self, doc: &Document) -> Vec<Vec<IndexKey>> {
        let mut tuples: Vec<Vec<IndexKey>> = vec![Vec::new()];
        for field in self.descriptor.fields() {
            let options = IndexKey::reachable(doc.lookup(field).as_deref());
            tuples = tuples
                .into_iter()
                .flat_map(|prefix| {
                    options.iter().map(move |key| {
                        let mut tuple = prefix.clone();
                        tuple.push(key.clone());
                        tuple
                    })
                })
                .collect();
        }
        tuples
    }

    /// Fail if another document already holds one of this document's keys.
    pub fn check_unique(&self, doc: &Document, seq: u64) -> Result<()> {
        if !self.descriptor.unique {
            return Ok(());
        }
        if self.descriptor.fields().all(|field| !doc.contains(field)) {
            return Ok(());
        }

        for tuple in self.key_tuples(doc) {
            if let Some(holders) = self.entries.get(&tuple) {
                if holders.iter().any(|holder| *holder != seq) {
                    return Err(FolioError::Write(format!(
                        "duplicate key for unique index '{}': {}",
                        self.descriptor.name,
                        describe_tuple(&self.descriptor, doc)
                    )));
                }
            }
        }
        Ok(())
    }

    /// Index a document.
    pub fn insert(&mut self, doc: &Document, seq: u64) {
        for tuple in self.key_tuples(doc) {
            self.entries.entry(tuple).or_default().insert(seq);
        }
    }

    /// Remove a document from the index.
    pub fn remove(&mut self, doc: &Document, seq: u64) {
        for tuple in self.key_tuples(doc) {
            if let Some(holders) = self.entries.get_mut(&tuple) {
                holders.remove(&seq);
                if holders.is_empty() {
                    self.entries.remove(&tuple);
                }
            }
        }
    }

    /// Sequence numbers of the documents whose key equals `values`.
    pub fn lookup(&self, values: &[&Value]) -> BTreeSet<u64> {
        let tuple: Vec<IndexKey> = values.iter().map(|v| IndexKey::from_value(v)).collect();
        self.entries.get(&tuple).cloned().unwrap_or_default()
    }

    /// The equality values of a query covering every key of this index.
    ///
    /// Only scalar values qualify; composite values compare loosely and are
    /// left to a scan.
    pub fn covering_values<'q>(&self, query: &'q Query) -> Option<Vec<&'q Value>> {
        self.descriptor
            .fields()
            .map(|field| {
                query
                    .equalities()
                    .find(|(f, v)| *f == field && is_scalar(v))
                    .map(|(_, v)| v)
            })
            .collect()
    }

    /// Number of distinct key tuples.
    pub fn key_count(&self) -> usize {
        self.entries.len()
    }
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_) | Value::FileRef(_))
}

fn describe_tuple(descriptor: &IndexDescriptor, doc: &Document) -> String {
    descriptor
        .fields()
        .map(|field| {
            let value = doc.lookup(field).map(|v| v.to_json()).unwrap_or(serde_json::Value::Null);
            format!("{}: {}", field, value)
        })
        .collect::<Vec<_>>()
        .join(", ")
}

// =============================================================================
// Tests
// =============================================================================
