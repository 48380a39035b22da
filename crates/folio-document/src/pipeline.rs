//! Folio Aggregation Pipeline
//!
//! An ordered sequence of stages, each consuming the full output of the
//! previous one. Pipelines are validated before any stage runs, so a
//! malformed stage never leaves a half-executed aggregation behind.
//!
//! Supported stages: `$match`, `$unwind`, `$group`, `$sort`, `$limit`.
//! Group accumulators: `$sum`, `$avg`, `$min`, `$max`, `$first`, `$last`.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::index::{Direction, IndexKey};
use crate::query::{cmp_values, Query};
use crate::types::{Document, Value, ID_FIELD};
use folio_common::{FolioError, Result};
use serde_json::Value as JsonValue;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

// =============================================================================
// Expressions
// =============================================================================

/// A per-document expression: a field path or a constant.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Field(String),
    Literal(Value),
}

impl Expr {
    pub fn field(path: impl Into<String>) -> Self {
        Self::Field(path.into())
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    /// Evaluate against a document; a missing field evaluates to null.
    pub fn eval(&self, doc: &Document) -> Value {
        match self {
            Self::Field(path) => doc.lookup(path).map(|v| v.into_owned()).unwrap_or(Value::Null),
            Self::Literal(value) => value.clone(),
        }
    }

    /// `"$field"` is a field path; anything else is a literal.
    fn from_json(json: &JsonValue) -> Self {
        match json {
            JsonValue::String(s) if s.starts_with('$') => Self::Field(s[1..].to_string()),
            other => Self::Literal(Value::from_json(other.clone())),
        }
    }
}

// =============================================================================
// Accumulators
// =============================================================================

/// A per-group reduction.
#[derive(Debug, Clone, PartialEq)]
pub enum Accumulator {
    Sum(Expr),
    Avg(Expr),
    Min(Expr),
    Max(Expr),
    First(Expr),
    Last(Expr),
}

impl Accumulator {
    /// `sum(1)`: the number of documents in the group.
    pub fn count() -> Self {
        Self::Sum(Expr::Literal(Value::Int(1)))
    }

    fn expr(&self) -> &Expr {
        match self {
            Self::Sum(e)
            | Self::Avg(e)
            | Self::Min(e)
            | Self::Max(e)
            | Self::First(e)
            | Self::Last(e) => e,
        }
    }

    fn from_json(output: &str, spec: &JsonValue) -> Result<Self> {
        let JsonValue::Object(obj) = spec else {
            return Err(FolioError::Pipeline(format!(
                "$group field '{}' must be an accumulator object",
                output
            )));
        };
        if obj.len() != 1 {
            return Err(FolioError::Pipeline(format!(
                "$group field '{}' must name exactly one accumulator",
                output
            )));
        }

        let Some((name, operand)) = obj.iter().next() else {
            return Err(FolioError::Pipeline(format!("$group field '{}' is empty", output)));
        };
        let expr = Expr::from_json(operand);
        match name.as_str() {
            "$sum" => Ok(Self::Sum(expr)),
            "$avg" => Ok(Self::Avg(expr)),
            "$min" => Ok(Self::Min(expr)),
            "$max" => Ok(Self::Max(expr)),
            "$first" => Ok(Self::First(expr)),
            "$last" => Ok(Self::Last(expr)),
            unknown => Err(FolioError::Pipeline(format!(
                "unknown accumulator '{}' for '{}'",
                unknown, output
            ))),
        }
    }

    fn finish(&self, values: &[Value]) -> Value {
        match self {
            Self::Sum(_) => sum(values),
            Self::Avg(_) => {
                let numbers: Vec<f64> = values.iter().filter_map(|v| v.as_f64()).collect();
                if numbers.is_empty() {
                    Value::Null
                } else {
                    Value::Float(numbers.iter().sum::<f64>() / numbers.len() as f64)
                }
            }
            Self::Min(_) => values
                .iter()
                .filter(|v| !v.is_null())
                .min_by(|a, b| cmp_values(a, b))
                .cloned()
                .unwrap_or(Value::Null),
            Self::Max(_) => values
                .iter()
                .filter(|v| !v.is_null())
                .max_by(|a, b| cmp_values(a, b))
                .cloned()
                .unwrap_or(Value::Null),
            Self::First(_) => values.first().cloned().unwrap_or(Value::Null),
            Self::Last(_) => values.last().cloned().unwrap_or(Value::Null),
        }
    }
}

/// Integer sum while every operand is an integer and nothing overflows.
fn sum(values: &[Value]) -> Value {
    let mut int_total: Option<i64> = Some(0);
    let mut float_total = 0.0;

    for value in values {
        match value {
            Value::Int(n) => {
                int_total = int_total.and_then(|t| t.checked_add(*n));
                float_total += *n as f64;
            }
            Value::Float(f) => {
                int_total = None;
                float_total += f;
            }
            _ => {}
        }
    }

    match int_total {
        Some(total) => Value::Int(total),
        None => Value::Float(float_total),
    }
}

// =============================================================================
// Stages
// =============================================================================

/// One transformation step.
#[derive(Debug, Clone)]
pub enum Stage {
    Match(Query),
    Unwind {
        path: String,
        preserve_empty: bool,
    },
    Group {
        key: Expr,
        accumulators: Vec<(String, Accumulator)>,
    },
    Sort(Vec<(String, Direction)>),
    Limit(usize),
}

impl Stage {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Match(_) => "$match",
            Self::Unwind { .. } => "$unwind",
            Self::Group { .. } => "$group",
            Self::Sort(_) => "$sort",
            Self::Limit(_) => "$limit",
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            Self::Match(_) => Ok(()),
            Self::Unwind { path, .. } => check_path("$unwind", path),
            Self::Group { key, accumulators } => {
                if let Expr::Field(path) = key {
                    check_path("$group _id", path)?;
                }
                for (i, (output, acc)) in accumulators.iter().enumerate() {
                    if output.is_empty() || output.contains('.') || output.starts_with('$') {
                        return Err(FolioError::Pipeline(format!(
                            "invalid $group output field '{}'",
                            output
                        )));
                    }
                    if output == ID_FIELD {
                        return Err(FolioError::Pipeline(
                            "$group output field '_id' is reserved for the group key".to_string(),
                        ));
                    }
                    if accumulators[..i].iter().any(|(o, _)| o == output) {
                        return Err(FolioError::Pipeline(format!(
                            "$group output field '{}' is defined twice",
                            output
                        )));
                    }
                    if let Expr::Field(path) = acc.expr() {
                        check_path(output, path)?;
                    }
                }
                Ok(())
            }
            Self::Sort(keys) => {
                if keys.is_empty() {
                    return Err(FolioError::Pipeline("$sort needs at least one key".to_string()));
                }
                keys.iter().try_for_each(|(field, _)| check_path("$sort", field))
            }
            Self::Limit(0) => Err(FolioError::Pipeline("$limit must be positive".to_string())),
            Self::Limit(_) => Ok(()),
        }
    }

    fn execute(&self, input: Vec<Document>) -> Result<Vec<Document>> {
        match self {
            Self::Match(query) => Ok(input.into_iter().filter(|doc| query.matches(doc)).collect()),
            Self::Unwind {
                path,
                preserve_empty,
            } => unwind(input, path, *preserve_empty),
            Self::Group { key, accumulators } => Ok(group(input, key, accumulators)),
            Self::Sort(keys) => Ok(sort(input, keys)),
            Self::Limit(n) => Ok(input.into_iter().take(*n).collect()),
        }
    }
}

fn check_path(context: &str, path: &str) -> Result<()> {
    if path.is_empty() || path.split('.').any(|part| part.is_empty() || part.starts_with('$')) {
        return Err(FolioError::Pipeline(format!(
            "{}: invalid field path '{}'",
            context, path
        )));
    }
    Ok(())
}

fn unwind(input: Vec<Document>, path: &str, preserve_empty: bool) -> Result<Vec<Document>> {
    let mut output = Vec::with_capacity(input.len());

    for doc in input {
        match doc.get(path) {
            Some(Value::Array(items)) if !items.is_empty() => {
                for item in items.clone() {
                    let mut row = doc.clone();
                    row.set_path(path, item)
                        .map_err(|e| FolioError::Pipeline(format!("$unwind: {}", e)))?;
                    output.push(row);
                }
            }
            Some(Value::Array(_)) => {
                if preserve_empty {
                    let mut row = doc;
                    row.remove(path);
                    output.push(row);
                }
            }
            None | Some(Value::Null) => {
                if preserve_empty {
                    output.push(doc);
                }
            }
            Some(_) => output.push(doc),
        }
    }

    Ok(output)
}

fn group(input: Vec<Document>, key: &Expr, accumulators: &[(String, Accumulator)]) -> Vec<Document> {
    // Groups keep first-appearance order.
    let mut order: Vec<(Value, Vec<Vec<Value>>)> = Vec::new();
    let mut slots: HashMap<IndexKey, usize> = HashMap::new();

    for doc in &input {
        let key_value = key.eval(doc);
        let slot = *slots
            .entry(IndexKey::from_value(&key_value))
            .or_insert_with(|| {
                order.push((key_value, vec![Vec::new(); accumulators.len()]));
                order.len() - 1
            });

        for (i, (_, acc)) in accumulators.iter().enumerate() {
            order[slot].1[i].push(acc.expr().eval(doc));
        }
    }

    order
        .into_iter()
        .map(|(key_value, columns)| {
            let mut fields = BTreeMap::new();
            fields.insert(ID_FIELD.to_string(), key_value);
            for ((output, acc), values) in accumulators.iter().zip(columns) {
                fields.insert(output.clone(), acc.finish(&values));
            }
            Document::from_fields(fields)
        })
        .collect()
}

fn sort(mut input: Vec<Document>, keys: &[(String, Direction)]) -> Vec<Document> {
    input.sort_by(|a, b| {
        keys.iter()
            .map(|(field, direction)| {
                let (left, right) = (a.lookup(field), b.lookup(field));
                let ord = cmp_values(
                    left.as_deref().unwrap_or(&Value::Null),
                    right.as_deref().unwrap_or(&Value::Null),
                );
                match direction {
                    Direction::Ascending => ord,
                    Direction::Descending => ord.reverse(),
                }
            })
            .find(|ord| *ord != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });
    input
}

// =============================================================================
// Pipeline
// =============================================================================

/// An ordered sequence of aggregation stages.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn filter(self, query: Query) -> Self {
        self.stage(Stage::Match(query))
    }

    pub fn unwind(self, path: impl Into<String>, preserve_empty: bool) -> Self {
        self.stage(Stage::Unwind {
            path: path.into(),
            preserve_empty,
        })
    }

    pub fn group(self, key: Expr, accumulators: Vec<(&str, Accumulator)>) -> Self {
        self.stage(Stage::Group {
            key,
            accumulators: accumulators
                .into_iter()
                .map(|(name, acc)| (name.to_string(), acc))
                .collect(),
        })
    }

    pub fn sort(self, field: impl Into<String>, direction: Direction) -> Self {
        self.stage(Stage::Sort(vec![(field.into(), direction)]))
    }

    pub fn limit(self, n: usize) -> Self {
        self.stage(Stage::Limit(n))
    }

    /// Parse the JSON stage list, e.g.
    /// `[{"$unwind": "$courses"}, {"$group": {"_id": "$courses", "count": {"$sum": 1}}}]`.
    pub fn from_json(json: &JsonValue) -> Result<Self> {
        let JsonValue::Array(items) = json else {
            return Err(FolioError::Pipeline("a pipeline must be an array of stages".to_string()));
        };

        let mut pipeline = Self::new();
        for (i, item) in items.iter().enumerate() {
            let stage = parse_stage(item)
                .map_err(|e| FolioError::Pipeline(format!("stage {}: {}", i, strip_kind(e))))?;
            pipeline.stages.push(stage);
        }
        pipeline.validate()?;
        Ok(pipeline)
    }

    /// Check every stage without executing any.
    pub fn validate(&self) -> Result<()> {
        for (i, stage) in self.stages.iter().enumerate() {
            stage.validate().map_err(|e| {
                FolioError::Pipeline(format!("stage {} ({}): {}", i, stage.kind(), strip_kind(e)))
            })?;
        }
        Ok(())
    }

    /// Validate, then run every stage eagerly.
    pub fn execute(&self, input: Vec<Document>) -> Result<Vec<Document>> {
        self.validate()?;

        let mut stream = input;
        for stage in &self.stages {
            stream = stage.execute(stream)?;
        }
        Ok(stream)
    }
}

/// Message of a nested error without its kind prefix.
fn strip_kind(err: FolioError) -> String {
    match err {
        FolioError::Pipeline(msg) | FolioError::InvalidFilter(msg) => msg,
        other => other.to_string(),
    }
}

fn parse_stage(item: &JsonValue) -> Result<Stage> {
    let JsonValue::Object(obj) = item else {
        return Err(FolioError::Pipeline(format!("a stage must be an object, got {}", item)));
    };
    if obj.len() != 1 {
        return Err(FolioError::Pipeline(
            "a stage must have exactly one operator".to_string(),
        ));
    }
    let Some((kind, spec)) = obj.iter().next() else {
        return Err(FolioError::Pipeline("empty stage".to_string()));
    };

    match kind.as_str() {
        "$match" => Ok(Stage::Match(Query::from_json(spec)?)),
        "$unwind" => parse_unwind(spec),
        "$group" => parse_group(spec),
        "$sort" => {
            let JsonValue::Object(fields) = spec else {
                return Err(FolioError::Pipeline("$sort expects an object".to_string()));
            };
            let keys = fields
                .iter()
                .map(|(field, dir)| {
                    dir.as_i64()
                        .and_then(Direction::from_i64)
                        .map(|d| (field.clone(), d))
                        .ok_or_else(|| {
                            FolioError::Pipeline(format!(
                                "$sort direction for '{}' must be 1 or -1",
                                field
                            ))
                        })
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Stage::Sort(keys))
        }
        "$limit" => spec
            .as_u64()
            .map(|n| Stage::Limit(n as usize))
            .ok_or_else(|| FolioError::Pipeline("$limit expects a non-negative integer".to_string())),
        unknown => Err(FolioError::Pipeline(format!("unknown stage '{}'", unknown))),
    }
}

fn field_reference(context: &str, json: &JsonValue) -> Result<String> {
    match json.as_str().and_then(|s| s.strip_prefix('$')) {
        Some(path) => Ok(path.to_string()),
        None => Err(FolioError::Pipeline(format!(
            "{} expects a field path such as \"$courses\", got {}",
            context, json
        ))),
    }
}

fn parse_unwind(spec: &JsonValue) -> Result<Stage> {
    match spec {
        JsonValue::String(_) => Ok(Stage::Unwind {
            path: field_reference("$unwind", spec)?,
            preserve_empty: false,
        }),
        JsonValue::Object(obj) => {
            let path = obj
                .get("path")
                .ok_or_else(|| FolioError::Pipeline("$unwind requires 'path'".to_string()))?;
            let preserve_empty = match obj.get("preserveNullAndEmptyArrays") {
                None => false,
                Some(JsonValue::Bool(b)) => *b,
                Some(_) => {
                    return Err(FolioError::Pipeline(
                        "preserveNullAndEmptyArrays must be a boolean".to_string(),
                    ))
                }
            };
            if let Some(unknown) = obj
                .keys()
                .find(|k| *k != "path" && *k != "preserveNullAndEmptyArrays")
            {
                return Err(FolioError::Pipeline(format!("unknown $unwind option '{}'", unknown)));
            }
            Ok(Stage::Unwind {
                path: field_reference("$unwind", path)?,
                preserve_empty,
            })
        }
        other => Err(FolioError::Pipeline(format!(
            "$unwind expects a string or an object, got {}",
            other
        ))),
    }
}

fn parse_group(spec: &JsonValue) -> Result<Stage> {
    let JsonValue::Object(obj) = spec else {
        return Err(FolioError::Pipeline("$group expects an object".to_string()));
    };
    let key = obj
        .get(ID_FIELD)
        .map(Expr::from_json)
        .ok_or_else(|| FolioError::Pipeline("$group requires an _id expression".to_string()))?;

    let accumulators = obj
        .iter()
        .filter(|(name, _)| name.as_str() != ID_FIELD)
        .map(|(name, acc)| Ok((name.clone(), Accumulator::from_json(name, acc)?)))
        .collect::<Result<Vec<_>>>()?;

    Ok(Stage::Group { key, accumulators })
}

// =============================================================================
// Tests
// =============================================================================
