//! Folio Document Update
//!
//! Partial mutation operators. Only the targeted fields change; untouched
//! fields and `_id` are preserved.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::types::{Document, Value, ID_FIELD};
use folio_common::{FolioError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

// =============================================================================
// Update Operators
// =============================================================================

/// A single named mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UpdateOp {
    /// Create or overwrite a field.
    Set { field: String, value: Value },
    /// Add a numeric delta; an absent field counts as zero.
    Inc { field: String, delta: Value },
    /// Remove a field.
    Unset { field: String },
}

impl UpdateOp {
    pub fn field(&self) -> &str {
        match self {
            Self::Set { field, .. } | Self::Inc { field, .. } | Self::Unset { field } => field,
        }
    }

    fn apply(&self, doc: &mut Document) -> Result<()> {
        match self {
            Self::Set { field, value } => doc.set_path(field, value.clone()),
            Self::Inc { field, delta } => {
                let next = increment(field, doc.get(field), delta)?;
                doc.set_path(field, next)
            }
            Self::Unset { field } => {
                doc.remove(field);
                Ok(())
            }
        }
    }
}

fn increment(field: &str, current: Option<&Value>, delta: &Value) -> Result<Value> {
    match (current, delta) {
        (None, Value::Int(_) | Value::Float(_)) => Ok(delta.clone()),
        (Some(Value::Int(a)), Value::Int(d)) => a.checked_add(*d).map(Value::Int).ok_or_else(|| {
            FolioError::InvalidUpdate(format!("$inc on '{}' overflows a 64-bit integer", field))
        }),
        (Some(current @ (Value::Int(_) | Value::Float(_))), Value::Int(_) | Value::Float(_)) => {
            let sum = current.as_f64().unwrap_or(0.0) + delta.as_f64().unwrap_or(0.0);
            Ok(Value::Float(sum))
        }
        (Some(other), Value::Int(_) | Value::Float(_)) => Err(FolioError::InvalidUpdate(format!(
            "cannot apply $inc to '{}' of type {}",
            field,
            other.type_name()
        ))),
        (_, other) => Err(FolioError::InvalidUpdate(format!(
            "$inc on '{}' needs a numeric delta, got {}",
            field,
            other.type_name()
        ))),
    }
}

// =============================================================================
// Update
// =============================================================================

/// A set of mutation operators applied together.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Update {
    pub ops: Vec<UpdateOp>,
}

impl Update {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.ops.push(UpdateOp::Set {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn inc(mut self, field: impl Into<String>, delta: impl Into<Value>) -> Self {
        self.ops.push(UpdateOp::Inc {
            field: field.into(),
            delta: delta.into(),
        });
        self
    }

    pub fn unset(mut self, field: impl Into<String>) -> Self {
        self.ops.push(UpdateOp::Unset {
            field: field.into(),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Parse `{"$set": {...}, "$inc": {...}, "$unset": {...}}`.
    pub fn from_json(update: &JsonValue) -> Result<Self> {
        let JsonValue::Object(obj) = update else {
            return Err(FolioError::InvalidUpdate(format!(
                "an update must be an object, got {}",
                update
            )));
        };

        let mut result = Self::new();
        for (op, operand) in obj {
            if !op.starts_with('$') {
                return Err(FolioError::InvalidUpdate(format!(
                    "replacement documents are not supported (found field '{}'); use $set",
                    op
                )));
            }

            let JsonValue::Object(fields) = operand else {
                return Err(FolioError::InvalidUpdate(format!("{} expects an object", op)));
            };

            for (field, value) in fields {
                let field = field.clone();
                let parsed = match op.as_str() {
                    "$set" => UpdateOp::Set {
                        field,
                        value: Value::from_json(value.clone()),
                    },
                    "$inc" => UpdateOp::Inc {
                        field,
                        delta: Value::from_json(value.clone()),
                    },
                    "$unset" => UpdateOp::Unset { field },
                    unknown => {
                        return Err(FolioError::InvalidUpdate(format!(
                            "unknown update operator '{}'",
                            unknown
                        )))
                    }
                };
                result.ops.push(parsed);
            }
        }

        result.validate()?;
        Ok(result)
    }

    /// Reject updates that could not be applied cleanly to any document.
    pub fn validate(&self) -> Result<()> {
        if self.ops.is_empty() {
            return Err(FolioError::InvalidUpdate(
                "an update needs at least one operator".to_string(),
            ));
        }

        let mut seen: Vec<&str> = Vec::with_capacity(self.ops.len());
        for op in &self.ops {
            let field = op.field();

            if field.is_empty() || field.split('.').any(|part| part.is_empty()) {
                return Err(FolioError::InvalidUpdate(format!(
                    "invalid field path '{}'",
                    field
                )));
            }
            if field.split('.').any(|part| part.starts_with('$')) {
                return Err(FolioError::InvalidUpdate(format!(
                    "field path '{}' must not contain '$' segments",
                    field
                )));
            }
            if field == ID_FIELD || field.starts_with("_id.") {
                return Err(FolioError::InvalidUpdate("_id is immutable".to_string()));
            }
            if let UpdateOp::Inc { delta, .. } = op {
                if !delta.is_number() {
                    return Err(FolioError::InvalidUpdate(format!(
                        "$inc on '{}' needs a numeric delta, got {}",
                        field,
                        delta.type_name()
                    )));
                }
            }

            if let Some(other) = seen.iter().find(|other| paths_conflict(other, field)) {
                return Err(FolioError::InvalidUpdate(format!(
                    "'{}' and '{}' target the same field",
                    other, field
                )));
            }
            seen.push(field);
        }

        Ok(())
    }

    /// Apply every operator in order.
    pub fn apply(&self, doc: &mut Document) -> Result<()> {
        for op in &self.ops {
            op.apply(doc)?;
        }
        Ok(())
    }
}

fn paths_conflict(a: &str, b: &str) -> bool {
    a == b
        || b.strip_prefix(a).is_some_and(|rest| rest.starts_with('.'))
        || a.strip_prefix(b).is_some_and(|rest| rest.starts_with('.'))
}

// =============================================================================
// Tests
// =============================================================================
