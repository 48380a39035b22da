//! Folio Document Types
//!
//! Core data types for schema-less documents: identifiers, the closed value
//! variant type and the ordered field map that makes up a document.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::file_ref::FileRef;
use folio_common::{FolioError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

/// Name of the identifier field every stored document carries.
pub const ID_FIELD: &str = "_id";

// =============================================================================
// Document ID
// =============================================================================

/// Unique identifier for a document.
///
/// Any scalar may serve as an `_id`. Numbers are held in canonical form, so
/// `7` and `7.0` name the same document while `"7"` names another.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum DocumentId {
    String(String),
    Number(NumberKey),
    Bool(bool),
}

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self::String(id.into())
    }

    pub fn generate() -> Self {
        Self::String(uuid::Uuid::new_v4().simple().to_string())
    }

    /// The identifier held by an `_id` value; `None` for non-scalars.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self::String(s.clone())),
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::Int(_) | Value::Float(_) => NumberKey::of(value).map(Self::Number),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::String(s) => Value::String(s.clone()),
            Self::Number(n) => n.to_value(),
            Self::Bool(b) => Value::Bool(*b),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{}", s),
            Self::Number(n) => write!(f, "{}", n),
            Self::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl From<String> for DocumentId {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&str> for DocumentId {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<i64> for DocumentId {
    fn from(n: i64) -> Self {
        Self::Number(NumberKey::Int(n))
    }
}

impl TryFrom<Value> for DocumentId {
    type Error = FolioError;

    fn try_from(value: Value) -> Result<Self> {
        Self::from_value(&value).ok_or_else(|| {
            FolioError::Serialization(format!(
                "_id must be a string, number or boolean, got {}",
                value.type_name()
            ))
        })
    }
}

// =============================================================================
// Number Key
// =============================================================================

/// Canonical form of a number, shared by equality filters, index keys and
/// identifiers.
///
/// Integral floats inside the `i64` range collapse onto integers, so `24`,
/// `24.0` and `-0.0`/`0` are one key. Other floats key by their bits with a
/// single NaN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NumberKey {
    Int(i64),
    Float(u64),
}

impl NumberKey {
    pub fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Int(n) => Some(Self::Int(*n)),
            Value::Float(f) => Some(Self::from_f64(*f)),
            _ => None,
        }
    }

    pub fn from_f64(f: f64) -> Self {
        if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
            Self::Int(f as i64)
        } else if f.is_nan() {
            Self::Float(f64::NAN.to_bits())
        } else {
            Self::Float(f.to_bits())
        }
    }

    pub fn to_value(self) -> Value {
        match self {
            Self::Int(n) => Value::Int(n),
            Self::Float(bits) => Value::Float(f64::from_bits(bits)),
        }
    }
}

impl fmt::Display for NumberKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{}", n),
            Self::Float(bits) => write!(f, "{}", f64::from_bits(*bits)),
        }
    }
}

// =============================================================================
// Value
// =============================================================================

/// A document field value: JSON-like scalars and containers plus file
/// references, which read as their plain form in filters and output.
///
/// Variant order matters for untagged deserialization: integers are tried
/// before floats and tagged file references before plain objects.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<Value>),
    FileRef(FileRef),
    Object(BTreeMap<String, Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, Self::Bool(_))
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Self::Int(_) | Self::Float(_))
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Self::String(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Self::Array(_))
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Self::Object(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::Float(f) => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Self::Array(arr) => Some(arr),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_file_ref(&self) -> Option<&FileRef> {
        match self {
            Self::FileRef(file) => Some(file),
            _ => None,
        }
    }

    /// Short type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::FileRef(_) => "file reference",
            Self::Object(_) => "object",
        }
    }

    /// Stored value at a dotted path; array elements are addressed by position.
    ///
    /// Does not descend into file references, see [`Value::lookup_path`].
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let parts: Vec<&str> = path.split('.').collect();
        self.get_path_parts(&parts)
    }

    fn get_path_parts(&self, parts: &[&str]) -> Option<&Value> {
        if parts.is_empty() {
            return Some(self);
        }

        let key = parts[0];
        let rest = &parts[1..];

        match self {
            Self::Object(obj) => obj.get(key).and_then(|v| v.get_path_parts(rest)),
            Self::Array(arr) => key
                .parse::<usize>()
                .ok()
                .and_then(|idx| arr.get(idx))
                .and_then(|v| v.get_path_parts(rest)),
            _ => None,
        }
    }

    /// Value at a dotted path as filters see it: a file reference with path
    /// segments left is read through its plain form, so `file.blob_id`
    /// addresses the id of a blob reference.
    pub fn lookup_path(&self, path: &str) -> Option<Cow<'_, Value>> {
        let parts: Vec<&str> = path.split('.').collect();
        self.lookup_parts(&parts)
    }

    fn lookup_parts(&self, parts: &[&str]) -> Option<Cow<'_, Value>> {
        let Some((key, rest)) = parts.split_first() else {
            return Some(Cow::Borrowed(self));
        };

        match self {
            Self::Object(obj) => obj.get(*key).and_then(|v| v.lookup_parts(rest)),
            Self::Array(arr) => key
                .parse::<usize>()
                .ok()
                .and_then(|idx| arr.get(idx))
                .and_then(|v| v.lookup_parts(rest)),
            Self::FileRef(file) => {
                let plain = file.to_plain();
                let found = plain.lookup_parts(parts)?.into_owned();
                Some(Cow::Owned(found))
            }
            _ => None,
        }
    }

    /// Build a value from JSON input.
    ///
    /// Objects carrying a `$file` tag are read back as file references.
    pub fn from_json(json: JsonValue) -> Self {
        match json {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(b) => Self::Bool(b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else {
                    Self::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            JsonValue::String(s) => Self::String(s),
            JsonValue::Array(arr) => Self::Array(arr.into_iter().map(Self::from_json).collect()),
            JsonValue::Object(obj) => {
                if obj.contains_key(crate::file_ref::FILE_TAG) {
                    if let Ok(file) = serde_json::from_value::<FileRef>(JsonValue::Object(obj.clone())) {
                        return Self::FileRef(file);
                    }
                }
                Self::Object(obj.into_iter().map(|(k, v)| (k, Self::from_json(v))).collect())
            }
        }
    }

    /// JSON output form; file references render as their plain field value.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Null => JsonValue::Null,
            Self::Bool(b) => JsonValue::Bool(*b),
            Self::Int(n) => JsonValue::Number((*n).into()),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Self::String(s) => JsonValue::String(s.clone()),
            Self::Array(arr) => JsonValue::Array(arr.iter().map(|v| v.to_json()).collect()),
            Self::FileRef(file) => file.to_plain().to_json(),
            Self::Object(obj) => {
                JsonValue::Object(obj.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Int(n as i64)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Self::Int(n as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<Vec<Value>> for Value {
    fn from(arr: Vec<Value>) -> Self {
        Self::Array(arr)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(obj: BTreeMap<String, Value>) -> Self {
        Self::Object(obj)
    }
}

impl From<FileRef> for Value {
    fn from(file: FileRef) -> Self {
        Self::FileRef(file)
    }
}

impl From<DocumentId> for Value {
    fn from(id: DocumentId) -> Self {
        id.to_value()
    }
}

impl From<Document> for Value {
    fn from(doc: Document) -> Self {
        Self::Object(doc.fields)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

// =============================================================================
// Document
// =============================================================================

/// A schema-less record of named fields.
///
/// The identifier lives in the field map under `_id` once the store has
/// assigned or accepted it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    fields: BTreeMap<String, Value>,
}

impl Document {
    /// Create an empty document without an identifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a document with a specific ID.
    pub fn with_id(id: impl Into<DocumentId>) -> Self {
        let mut doc = Self::new();
        doc.set_id(id.into());
        doc
    }

    /// Create a document from a field map.
    pub fn from_fields(fields: BTreeMap<String, Value>) -> Self {
        Self { fields }
    }

    /// Create a document from a JSON object.
    pub fn from_json(json: JsonValue) -> Result<Self> {
        match Value::from_json(json) {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(FolioError::Write(format!(
                "a document must be an object, got {}",
                other.type_name()
            ))),
        }
    }

    /// Convert to JSON.
    pub fn to_json(&self) -> JsonValue {
        JsonValue::Object(
            self.fields
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }

    /// The document identifier, if it has a scalar `_id`.
    pub fn id(&self) -> Option<DocumentId> {
        self.fields.get(ID_FIELD).and_then(DocumentId::from_value)
    }

    pub fn set_id(&mut self, id: DocumentId) {
        self.fields.insert(ID_FIELD.to_string(), id.to_value());
    }

    /// Get a stored field value, following dotted paths into nested objects.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match key.split_once('.') {
            Some((head, rest)) => self.fields.get(head).and_then(|v| v.get_path(rest)),
            None => self.fields.get(key),
        }
    }

    /// Field value as filters, indexes and stages read it. See [`Value::lookup_path`].
    pub fn lookup(&self, key: &str) -> Option<Cow<'_, Value>> {
        match key.split_once('.') {
            Some((head, rest)) => self.fields.get(head).and_then(|v| v.lookup_path(rest)),
            None => self.fields.get(key).map(Cow::Borrowed),
        }
    }

    /// Set a top-level field value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }

    /// Builder form of [`Document::set`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    /// Set a value at a dotted path, creating intermediate objects.
    ///
    /// Fails if an intermediate segment exists but is not an object.
    pub fn set_path(&mut self, path: &str, value: Value) -> Result<()> {
        let mut parts = path.split('.');
        let Some(first) = parts.next() else {
            return Err(FolioError::InvalidUpdate("empty field path".to_string()));
        };
        let rest: Vec<&str> = parts.collect();

        if rest.is_empty() {
            self.fields.insert(first.to_string(), value);
            return Ok(());
        }

        let mut current = self
            .fields
            .entry(first.to_string())
            .or_insert_with(|| Value::Object(BTreeMap::new()));
        let mut walked = first.to_string();

        for (i, part) in rest.iter().enumerate() {
            let map = match current {
                Value::Object(map) => map,
                other => {
                    return Err(FolioError::InvalidUpdate(format!(
                        "cannot create field '{}' inside '{}' of type {}",
                        path,
                        walked,
                        other.type_name()
                    )))
                }
            };

            if i == rest.len() - 1 {
                map.insert(part.to_string(), value);
                return Ok(());
            }

            current = map
                .entry(part.to_string())
                .or_insert_with(|| Value::Object(BTreeMap::new()));
            walked.push('.');
            walked.push_str(part);
        }

        Ok(())
    }

    /// Remove a field, following dotted paths into nested objects.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        match key.rsplit_once('.') {
            None => self.fields.remove(key),
            Some((parent, leaf)) => {
                let mut current = self.fields.get_mut(parent.split('.').next()?)?;
                for part in parent.split('.').skip(1) {
                    match current {
                        Value::Object(map) => current = map.get_mut(part)?,
                        _ => return None,
                    }
                }
                match current {
                    Value::Object(map) => map.remove(leaf),
                    _ => None,
                }
            }
        }
    }

    /// Check if a field exists.
    pub fn contains(&self, key: &str) -> bool {
        self.lookup(key).is_some()
    }

    /// Get all field names.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    pub fn into_fields(self) -> BTreeMap<String, Value> {
        self.fields
    }

    /// Get the number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if the document is empty.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Serialized size in bytes of the persisted form.
    pub fn encoded_size(&self) -> Result<usize> {
        Ok(serde_json::to_vec(self)?.len())
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

// =============================================================================
// Validation
// =============================================================================

/// Check that a document can be stored: field names must be non-empty,
/// must not start with `$` and must not contain `.` at any depth, and a
/// present `_id` must be a string, number or boolean.
pub fn validate_document(doc: &Document) -> Result<()> {
    if let Some(id) = doc.fields.get(ID_FIELD) {
        if DocumentId::from_value(id).is_none() {
            return Err(FolioError::Write(format!(
                "_id must be a string, number or boolean, got {}",
                id.type_name()
            )));
        }
    }

    for (key, value) in &doc.fields {
        check_field_names(key, value)?;
    }
    Ok(())
}

fn check_field_names(key: &str, value: &Value) -> Result<()> {
    if key.is_empty() {
        return Err(FolioError::Write("field names must not be empty".to_string()));
    }
    if key.starts_with('$') {
        return Err(FolioError::Write(format!(
            "field name '{}' must not start with '$'",
            key
        )));
    }
    if key.contains('.') {
        return Err(FolioError::Write(format!(
            "field name '{}' must not contain '.'",
            key
        )));
    }

    check_nested(value)
}

fn check_nested(value: &Value) -> Result<()> {
    match value {
        Value::Object(map) => map.iter().try_for_each(|(k, v)| check_field_names(k, v)),
        Value::Array(items) => items.iter().try_for_each(check_nested),
        _ => Ok(()),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_ref;
    use serde_json::json;

    #[test]
    fn test_document_id() {
        let id1 = DocumentId::generate();
        let id2 = DocumentId::generate();
        assert_ne!(id1, id2);
        assert_eq!(id1.as_str().map(str::len), Some(32));

        let id3 = DocumentId::new("custom-id");
        assert_eq!(id3.as_str(), Some("custom-id"));
    }

    #[test]
    fn test_scalar_document_ids() {
        assert_eq!(DocumentId::from_value(&Value::Int(7)), Some(DocumentId::from(7i64)));
        assert_eq!(DocumentId::from_value(&Value::Float(7.0)), Some(DocumentId::from(7i64)));
        assert_ne!(DocumentId::from_value(&Value::from("7")), Some(DocumentId::from(7i64)));
        assert_eq!(
            DocumentId::from_value(&Value::Bool(true)).map(|id| id.to_value()),
            Some(Value::Bool(true))
        );
        assert!(DocumentId::from_value(&Value::Null).is_none());
        assert!(DocumentId::from_value(&Value::Array(vec![])).is_none());

        let doc = Document::new().with("_id", 2.5);
        assert_eq!(doc.id().map(|id| id.to_string()), Some("2.5".to_string()));

        let encoded = serde_json::to_string(&DocumentId::from(7i64)).unwrap();
        assert_eq!(encoded, "7");
        let decoded: DocumentId = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(decoded, DocumentId::new("abc"));
        assert!(serde_json::from_str::<DocumentId>("[1]").is_err());
    }

    #[test]
    fn test_number_key_normalization() {
        assert_eq!(NumberKey::from_f64(24.0), NumberKey::Int(24));
        assert_eq!(NumberKey::from_f64(-0.0), NumberKey::Int(0));
        assert_eq!(NumberKey::from_f64(f64::NAN), NumberKey::from_f64(-f64::NAN));
        assert_ne!(NumberKey::from_f64(24.5), NumberKey::Int(24));
        assert_ne!(
            NumberKey::of(&Value::Int(9_007_199_254_740_993)),
            NumberKey::of(&Value::Float(9_007_199_254_740_992.0))
        );
        assert!(matches!(NumberKey::from_f64(1e19), NumberKey::Float(_)));
    }

    #[test]
    fn test_value_types() {
        assert!(Value::Null.is_null());

        let boolean = Value::Bool(true);
        assert!(boolean.is_bool());
        assert_eq!(boolean.as_bool(), Some(true));

        let number = Value::Int(42);
        assert!(number.is_number());
        assert_eq!(number.as_f64(), Some(42.0));

        let string = Value::from("hello");
        assert_eq!(string.as_str(), Some("hello"));
        assert_eq!(string.type_name(), "string");
    }

    #[test]
    fn test_untagged_deserialization_order() {
        let value: Value = serde_json::from_str("24").unwrap();
        assert_eq!(value, Value::Int(24));

        let value: Value = serde_json::from_str("24.5").unwrap();
        assert_eq!(value, Value::Float(24.5));

        let value: Value = serde_json::from_str(r#"{"blob_id": "abc"}"#).unwrap();
        assert!(value.is_object());

        let value: Value =
            serde_json::from_str(r#"{"$file": "url", "href": "https://example.com"}"#).unwrap();
        assert_eq!(value, Value::FileRef(file_ref::as_url("https://example.com")));
    }

    #[test]
    fn test_document_paths() {
        let mut doc = Document::from_json(json!({
            "name": "Alice",
            "address": {"city": "Paris"},
            "courses": ["Math", "Physics"]
        }))
        .unwrap();

        assert_eq!(doc.get("address.city").and_then(|v| v.as_str()), Some("Paris"));
        assert_eq!(doc.get("courses.1").and_then(|v| v.as_str()), Some("Physics"));
        assert!(doc.get("address.zip").is_none());

        doc.set_path("address.zip", Value::from("75001")).unwrap();
        doc.set_path("meta.source.kind", Value::from("seed")).unwrap();
        assert_eq!(doc.get("address.zip").and_then(|v| v.as_str()), Some("75001"));
        assert_eq!(doc.get("meta.source.kind").and_then(|v| v.as_str()), Some("seed"));

        let err = doc.set_path("name.first", Value::from("A")).unwrap_err();
        assert!(matches!(err, FolioError::InvalidUpdate(_)));

        assert_eq!(doc.remove("address.city"), Some(Value::from("Paris")));
        assert!(!doc.contains("address.city"));
        assert!(doc.contains("address"));
    }

    #[test]
    fn test_document_id_field() {
        let doc = Document::with_id("doc123").with("name", "Bob");
        assert_eq!(doc.id(), Some(DocumentId::new("doc123")));
        assert_eq!(doc.to_json()["_id"], "doc123");
        assert_eq!(doc.len(), 2);

        assert!(Document::new().id().is_none());
    }

    #[test]
    fn test_document_from_non_object() {
        let err = Document::from_json(json!([1, 2])).unwrap_err();
        assert!(matches!(err, FolioError::Write(_)));
    }

    #[test]
    fn test_persisted_round_trip() {
        let doc = Document::with_id("d1")
            .with("age", 24i64)
            .with("ratio", 0.5)
            .with("link", file_ref::as_url("https://example.com"))
            .with("file", file_ref::as_path("./images/sample.png"));

        let encoded = serde_json::to_string(&doc).unwrap();
        let decoded: Document = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, doc);
    }

    #[test]
    fn test_validate_document() {
        assert!(validate_document(&Document::with_id("x").with("a", 1i64)).is_ok());

        let bad = Document::from_json(json!({"$where": 1})).unwrap();
        assert!(matches!(validate_document(&bad), Err(FolioError::Write(_))));

        let nested = Document::from_json(json!({"a": {"$b": 1}})).unwrap();
        assert!(validate_document(&nested).is_err());

        let numeric_id = Document::new().with("_id", 7i64);
        assert!(validate_document(&numeric_id).is_ok());

        let object_id = Document::from_json(json!({"_id": {"a": 1}})).unwrap();
        assert!(validate_document(&object_id).is_err());

        let dotted = Document::from_json(json!({"a.b": 1})).unwrap();
        assert!(matches!(validate_document(&dotted), Err(FolioError::Write(_))));

        let nested_dotted = Document::from_json(json!({"meta": {"x.y": 1}})).unwrap();
        assert!(validate_document(&nested_dotted).is_err());
    }

    #[test]
    fn test_lookup_reads_file_references_in_plain_form() {
        let blob = FileRef::Blob {
            blob_id: crate::blob::BlobId::new("b1"),
        };
        let doc = Document::new()
            .with("link", file_ref::as_url("https://example.com"))
            .with("file", blob);

        assert_eq!(
            doc.lookup("file.blob_id").as_deref(),
            Some(&Value::from("b1"))
        );
        assert!(doc.get("file.blob_id").is_none());
        assert!(doc.lookup("link.href").is_none());
        assert!(doc.contains("file.blob_id"));
        assert!(matches!(doc.lookup("link").as_deref(), Some(Value::FileRef(_))));
    }
}
