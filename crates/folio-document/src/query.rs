//! Folio Document Query
//!
//! Filters for selecting documents, either built with [`QueryBuilder`] or
//! parsed from the familiar JSON syntax:
//!
//! ```text
//! {"age": 24}
//! {"age": {"$gte": 20, "$lt": 30}, "name": {"$regex": "^A"}}
//! {"$or": [{"age": 24}, {"visits": {"$exists": true}}]}
//! ```
//!
//! Equality with `null` also matches a missing field, numbers compare across
//! integer and float, and an equality against an array field matches when
//! any element is equal. File references are matched through their plain
//! form: a URL, path or data URI equals its string, and a blob reference
//! equals `{"blob_id": ...}` and exposes `file.blob_id`.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::types::{Document, DocumentId, NumberKey, Value, ID_FIELD};
use folio_common::{FolioError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as JsonValue;
use std::cmp::Ordering;

// =============================================================================
// Query
// =============================================================================

/// A query for filtering documents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub limit: Option<usize>,
}

impl Query {
    /// A query matching every document.
    pub fn new() -> Self {
        Self::default()
    }

    /// A query matching the document with the given id.
    pub fn by_id(id: &DocumentId) -> Self {
        Self::new().with_filter(Filter::Eq {
            field: ID_FIELD.to_string(),
            value: id.to_value(),
        })
    }

    /// Parse a JSON filter document.
    pub fn from_json(filter: &JsonValue) -> Result<Self> {
        let JsonValue::Object(obj) = filter else {
            return Err(FolioError::InvalidFilter(format!(
                "a filter must be an object, got {}",
                filter
            )));
        };

        let mut query = Self::new();
        for (key, value) in obj {
            query.filters.push(parse_clause(key, value)?);
        }
        Ok(query)
    }

    /// Check if a document matches this query.
    pub fn matches(&self, doc: &Document) -> bool {
        self.filters.iter().all(|f| f.matches(doc))
    }

    /// Add a filter.
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Add limit.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Top-level equality constraints, usable for index lookups.
    pub fn equalities(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.filters.iter().filter_map(|f| match f {
            Filter::Eq { field, value } => Some((field.as_str(), value)),
            _ => None,
        })
    }
}

// =============================================================================
// Filter
// =============================================================================

/// A filter condition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Filter {
    Eq { field: String, value: Value },
    Ne { field: String, value: Value },
    Gt { field: String, value: Value },
    Gte { field: String, value: Value },
    Lt { field: String, value: Value },
    Lte { field: String, value: Value },
    In { field: String, values: Vec<Value> },
    Nin { field: String, values: Vec<Value> },
    Exists { field: String, exists: bool },
    Regex { field: String, pattern: Pattern },
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    /// Check if a document matches this filter.
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Self::Eq { field, value } => field_equals(doc.lookup(field).as_deref(), value),
            Self::Ne { field, value } => !field_equals(doc.lookup(field).as_deref(), value),
            Self::Gt { field, value } => {
                field_compares(doc.lookup(field).as_deref(), value, |o| o == Ordering::Greater)
            }
            Self::Gte { field, value } => {
                field_compares(doc.lookup(field).as_deref(), value, |o| o != Ordering::Less)
            }
            Self::Lt { field, value } => {
                field_compares(doc.lookup(field).as_deref(), value, |o| o == Ordering::Less)
            }
            Self::Lte { field, value } => {
                field_compares(doc.lookup(field).as_deref(), value, |o| o != Ordering::Greater)
            }
            Self::In { field, values } => {
                let found = doc.lookup(field);
                values.iter().any(|v| field_equals(found.as_deref(), v))
            }
            Self::Nin { field, values } => {
                let found = doc.lookup(field);
                !values.iter().any(|v| field_equals(found.as_deref(), v))
            }
            Self::Exists { field, exists } => doc.contains(field) == *exists,
            Self::Regex { field, pattern } => {
                doc.lookup(field).as_deref().is_some_and(|v| pattern.matches_value(v))
            }
            Self::And(filters) => filters.iter().all(|f| f.matches(doc)),
            Self::Or(filters) => filters.iter().any(|f| f.matches(doc)),
            Self::Not(filter) => !filter.matches(doc),
        }
    }
}

// =============================================================================
// Pattern
// =============================================================================

/// A `$regex` pattern, compiled once when the filter is built.
///
/// Serializes as its source text.
#[derive(Debug, Clone)]
pub struct Pattern(regex::Regex);

impl Pattern {
    pub fn new(source: &str) -> Result<Self> {
        regex::Regex::new(source).map(Self).map_err(|e| {
            FolioError::InvalidFilter(format!("invalid pattern '{}': {}", source, e))
        })
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.0.is_match(text)
    }

    /// Strings, file references read as strings, and any string element of an array.
    fn matches_value(&self, value: &Value) -> bool {
        match value {
            Value::String(s) => self.is_match(s),
            Value::FileRef(file) => match file.to_plain() {
                Value::String(s) => self.is_match(&s),
                _ => false,
            },
            Value::Array(items) => items.iter().any(|item| self.matches_value(item)),
            _ => false,
        }
    }
}

impl Serialize for Pattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Pattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let source = String::deserialize(deserializer)?;
        Self::new(&source).map_err(serde::de::Error::custom)
    }
}

fn field_equals(found: Option<&Value>, expected: &Value) -> bool {
    match found {
        None => expected.is_null(),
        Some(Value::Array(items)) if !expected.is_array() => {
            items.iter().any(|item| values_equal(item, expected))
        }
        Some(value) => values_equal(value, expected),
    }
}

fn field_compares(found: Option<&Value>, bound: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    match found {
        Some(Value::Array(items)) if !bound.is_array() => items
            .iter()
            .any(|item| compare_values(item, bound).map(&accept).unwrap_or(false)),
        Some(value) => compare_values(value, bound).map(accept).unwrap_or(false),
        None => false,
    }
}

// =============================================================================
// Value Comparison
// =============================================================================

/// Equality as filters see it.
///
/// Numbers are equal when their [`NumberKey`]s are, the same rule index
/// lookups use. A file reference compares through its plain form.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::FileRef(file), other) | (other, Value::FileRef(file)) => {
            values_equal(&file.to_plain(), other)
        }
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            NumberKey::of(a) == NumberKey::of(b)
        }
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(p, q)| values_equal(p, q))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .zip(y)
                    .all(|((kx, vx), (ky, vy))| kx == ky && values_equal(vx, vy))
        }
        _ => a == b,
    }
}

/// Ordering between comparable values; `None` across incompatible types.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::FileRef(file), _) => compare_values(&file.to_plain(), b),
        (_, Value::FileRef(file)) => compare_values(a, &file.to_plain()),
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
        (Value::Int(a), Value::Float(b)) => compare_int_float(*a, *b),
        (Value::Float(a), Value::Int(b)) => compare_int_float(*b, *a).map(Ordering::reverse),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Exact comparison; agrees with [`values_equal`] on equality.
fn compare_int_float(i: i64, f: f64) -> Option<Ordering> {
    match NumberKey::from_f64(f) {
        NumberKey::Int(n) => Some(i.cmp(&n)),
        NumberKey::Float(_) if f.is_nan() => None,
        NumberKey::Float(_) if f >= i64::MAX as f64 => Some(Ordering::Less),
        NumberKey::Float(_) if f < i64::MIN as f64 => Some(Ordering::Greater),
        NumberKey::Float(_) => (i as f64).partial_cmp(&f),
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Int(_) | Value::Float(_) => 1,
        Value::String(_) => 2,
        Value::Object(_) | Value::FileRef(_) => 3,
        Value::Array(_) => 4,
        Value::Bool(_) => 5,
    }
}

/// Total ordering used for sorting: values of different types are ordered
/// by type (null, numbers, strings, objects, arrays, bools). File references
/// sort by their plain form.
pub fn cmp_values(a: &Value, b: &Value) -> Ordering {
    if let Value::FileRef(file) = a {
        return cmp_values(&file.to_plain(), b);
    }
    if let Value::FileRef(file) = b {
        return cmp_values(a, &file.to_plain());
    }

    let by_type = type_rank(a).cmp(&type_rank(b));
    if by_type != Ordering::Equal {
        return by_type;
    }

    match (a, b) {
        (Value::Array(x), Value::Array(y)) => x
            .iter()
            .zip(y)
            .map(|(p, q)| cmp_values(p, q))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        (Value::Object(x), Value::Object(y)) => x
            .iter()
            .zip(y)
            .map(|((kx, vx), (ky, vy))| kx.cmp(ky).then_with(|| cmp_values(vx, vy)))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        _ => compare_values(a, b).unwrap_or(Ordering::Equal),
    }
}

// =============================================================================
// JSON Filter Parsing
// =============================================================================

fn parse_clause(key: &str, value: &JsonValue) -> Result<Filter> {
    match key {
        "$and" | "$or" => {
            let JsonValue::Array(items) = value else {
                return Err(FolioError::InvalidFilter(format!("{} expects an array", key)));
            };
            if items.is_empty() {
                return Err(FolioError::InvalidFilter(format!("{} must not be empty", key)));
            }
            let branches = items
                .iter()
                .map(|item| Query::from_json(item).map(|q| Filter::And(q.filters)))
                .collect::<Result<Vec<_>>>()?;
            Ok(if key == "$and" {
                Filter::And(branches)
            } else {
                Filter::Or(branches)
            })
        }
        op if op.starts_with('$') => Err(FolioError::InvalidFilter(format!(
            "unknown top-level operator '{}'",
            op
        ))),
        field => match value {
            JsonValue::Object(ops) if is_operator_object(ops) => parse_operators(field, ops),
            JsonValue::Object(ops) if ops.keys().any(|k| k.starts_with('$')) => {
                Err(FolioError::InvalidFilter(format!(
                    "field '{}' mixes operators and plain values",
                    field
                )))
            }
            other => Ok(Filter::Eq {
                field: field.to_string(),
                value: Value::from_json(other.clone()),
            }),
        },
    }
}

fn is_operator_object(ops: &serde_json::Map<String, JsonValue>) -> bool {
    !ops.is_empty() && ops.keys().all(|k| k.starts_with('$'))
}

fn parse_operators(field: &str, ops: &serde_json::Map<String, JsonValue>) -> Result<Filter> {
    let mut filters = Vec::with_capacity(ops.len());
    let options = ops.get("$options").and_then(|o| o.as_str()).unwrap_or("");

    for (op, operand) in ops {
        let field = field.to_string();
        let filter = match op.as_str() {
            "$eq" => Filter::Eq {
                field,
                value: Value::from_json(operand.clone()),
            },
            "$ne" => Filter::Ne {
                field,
                value: Value::from_json(operand.clone()),
            },
            "$gt" => Filter::Gt {
                field,
                value: Value::from_json(operand.clone()),
            },
            "$gte" => Filter::Gte {
                field,
                value: Value::from_json(operand.clone()),
            },
            "$lt" => Filter::Lt {
                field,
                value: Value::from_json(operand.clone()),
            },
            "$lte" => Filter::Lte {
                field,
                value: Value::from_json(operand.clone()),
            },
            "$in" => Filter::In {
                values: operand_list(&field, op, operand)?,
                field,
            },
            "$nin" => Filter::Nin {
                values: operand_list(&field, op, operand)?,
                field,
            },
            "$exists" => Filter::Exists {
                exists: match operand {
                    JsonValue::Bool(b) => *b,
                    JsonValue::Number(n) => n.as_f64().map(|n| n != 0.0).unwrap_or(false),
                    _ => {
                        return Err(FolioError::InvalidFilter(format!(
                            "$exists on '{}' expects a boolean",
                            field
                        )))
                    }
                },
                field,
            },
            "$regex" => {
                let Some(raw) = operand.as_str() else {
                    return Err(FolioError::InvalidFilter(format!(
                        "$regex on '{}' expects a string",
                        field
                    )));
                };
                let pattern = if options.is_empty() {
                    raw.to_string()
                } else {
                    format!("(?{}){}", options, raw)
                };
                let pattern = Pattern::new(&pattern).map_err(|e| {
                    FolioError::InvalidFilter(format!("invalid $regex on '{}': {}", field, e))
                })?;
                Filter::Regex { field, pattern }
            }
            "$options" => {
                if !ops.contains_key("$regex") {
                    return Err(FolioError::InvalidFilter(format!(
                        "$options on '{}' requires $regex",
                        field
                    )));
                }
                continue;
            }
            "$not" => match operand {
                JsonValue::Object(inner) if is_operator_object(inner) => {
                    Filter::Not(Box::new(parse_operators(&field, inner)?))
                }
                _ => {
                    return Err(FolioError::InvalidFilter(format!(
                        "$not on '{}' expects an operator object",
                        field
                    )))
                }
            },
            unknown => {
                return Err(FolioError::InvalidFilter(format!(
                    "unknown operator '{}' on field '{}'",
                    unknown, field
                )))
            }
        };
        filters.push(filter);
    }

    Ok(match filters.len() {
        1 => filters.remove(0),
        _ => Filter::And(filters),
    })
}

fn operand_list(field: &str, op: &str, operand: &JsonValue) -> Result<Vec<Value>> {
    match operand {
        JsonValue::Array(items) => Ok(items.iter().cloned().map(Value::from_json).collect()),
        _ => Err(FolioError::InvalidFilter(format!(
            "{} on '{}' expects an array",
            op, field
        ))),
    }
}

// =============================================================================
// Query Builder
// =============================================================================

/// Builder for constructing queries.
pub struct QueryBuilder {
    query: Query,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self {
            query: Query::new(),
        }
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.query.filters.push(Filter::Eq {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn ne(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.query.filters.push(Filter::Ne {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn gt(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.query.filters.push(Filter::Gt {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn gte(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.query.filters.push(Filter::Gte {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn lt(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.query.filters.push(Filter::Lt {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn lte(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.query.filters.push(Filter::Lte {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn in_values(mut self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.query.filters.push(Filter::In {
            field: field.into(),
            values,
        });
        self
    }

    pub fn not_in(mut self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.query.filters.push(Filter::Nin {
            field: field.into(),
            values,
        });
        self
    }

    pub fn exists(mut self, field: impl Into<String>, exists: bool) -> Self {
        self.query.filters.push(Filter::Exists {
            field: field.into(),
            exists,
        });
        self
    }

    /// Fails with `InvalidFilter` when the pattern does not compile.
    pub fn regex(mut self, field: impl Into<String>, pattern: &str) -> Result<Self> {
        self.query.filters.push(Filter::Regex {
            field: field.into(),
            pattern: Pattern::new(pattern)?,
        });
        Ok(self)
    }

    pub fn and(mut self, filters: Vec<Filter>) -> Self {
        self.query.filters.push(Filter::And(filters));
        self
    }

    pub fn or(mut self, filters: Vec<Filter>) -> Self {
        self.query.filters.push(Filter::Or(filters));
        self
    }

    pub fn not(mut self, filter: Filter) -> Self {
        self.query.filters.push(Filter::Not(Box::new(filter)));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.query.limit = Some(limit);
        self
    }

    pub fn build(self) -> Query {
        self.query
    }
}

impl Default for QueryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
