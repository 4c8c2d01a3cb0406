//! Normalized field values.
//!
//! A [`NormalValue`] keeps the exact logical type of a field value, so the
//! canonical block encoding of a delta is the same on every replica.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Number, Value};

use crate::catalog::{FieldKind, ScalarKind};
use crate::document::error::{DocumentError, DocumentResult};

/// A typed field value.
#[derive(Debug, Clone, PartialEq)]
pub enum NormalValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    /// RFC 3339, normalized to UTC
    DateTime(String),
    BoolArray(Vec<bool>),
    IntArray(Vec<i64>),
    FloatArray(Vec<f64>),
    StringArray(Vec<String>),
    /// Objects, empty or mixed arrays, and integers beyond `i64`. Other JSON
    /// values take their typed variant; see [`NormalValue::from_untyped`].
    Json(Value),
}

impl NormalValue {
    /// Normalize a JSON input value for a field of the given kind.
    pub fn from_json(field: &str, kind: &FieldKind, value: &Value) -> DocumentResult<Self> {
        if value.is_null() {
            return Ok(NormalValue::Null);
        }

        match kind {
            FieldKind::Scalar { scalar } => scalar_from_json(field, *scalar, value),
            FieldKind::ScalarArray { scalar } => array_from_json(field, *scalar, value),
            FieldKind::Object { .. } | FieldKind::SelfReference => {
                let normal = match value {
                    Value::String(s) => NormalValue::String(s.clone()),
                    other => return Err(mismatch(field, kind.to_string(), other)),
                };
                if !kind.matches(&normal) {
                    return Err(DocumentError::InvalidRelation {
                        field: field.to_string(),
                        value: value.to_string(),
                    });
                }
                Ok(normal)
            }
            FieldKind::Json => Ok(NormalValue::from_untyped(value.clone())),
        }
    }

    /// The typed form of an untyped JSON value.
    ///
    /// Values of JSON fields are held in this form, and decoding a block
    /// yields the same form, so a value reads back as the variant it was
    /// committed with.
    pub fn from_untyped(value: Value) -> Self {
        match value {
            Value::Null => NormalValue::Null,
            Value::Bool(b) => NormalValue::Bool(b),
            Value::Number(n) => match (n.as_i64(), n.as_f64()) {
                (Some(i), _) => NormalValue::Int(i),
                (None, Some(f)) if n.is_f64() => NormalValue::Float(f),
                _ => NormalValue::Json(Value::Number(n)),
            },
            Value::String(s) => NormalValue::String(s),
            Value::Array(items) => classify_array(items),
            other => NormalValue::Json(other),
        }
    }

    /// The JSON rendering used by query results and materialized documents.
    pub fn to_json(&self) -> Value {
        match self {
            NormalValue::Null => Value::Null,
            NormalValue::Bool(b) => Value::Bool(*b),
            NormalValue::Int(i) => Value::from(*i),
            NormalValue::Float(f) => Number::from_f64(*f).map_or(Value::Null, Value::Number),
            NormalValue::String(s) | NormalValue::DateTime(s) => Value::String(s.clone()),
            NormalValue::Bytes(b) => Value::String(hex::encode(b)),
            NormalValue::BoolArray(items) => Value::from(items.clone()),
            NormalValue::IntArray(items) => Value::from(items.clone()),
            NormalValue::FloatArray(items) => Value::Array(
                items
                    .iter()
                    .map(|f| Number::from_f64(*f).map_or(Value::Null, Value::Number))
                    .collect(),
            ),
            NormalValue::StringArray(items) => Value::from(items.clone()),
            NormalValue::Json(v) => v.clone(),
        }
    }

    /// short name of the value's type, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            NormalValue::Null => "null",
            NormalValue::Bool(_) => "bool",
            NormalValue::Int(_) => "int",
            NormalValue::Float(_) => "float",
            NormalValue::String(_) => "string",
            NormalValue::Bytes(_) => "bytes",
            NormalValue::DateTime(_) => "datetime",
            NormalValue::BoolArray(_) => "[bool]",
            NormalValue::IntArray(_) => "[int]",
            NormalValue::FloatArray(_) => "[float]",
            NormalValue::StringArray(_) => "[string]",
            NormalValue::Json(_) => "json",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, NormalValue::Null)
    }
}

fn scalar_from_json(field: &str, kind: ScalarKind, value: &Value) -> DocumentResult<NormalValue> {
    let normal = match (kind, value) {
        (ScalarKind::Bool, Value::Bool(b)) => NormalValue::Bool(*b),
        (ScalarKind::Int, Value::Number(n)) => match n.as_i64() {
            Some(i) => NormalValue::Int(i),
            None => return Err(mismatch(field, kind.name(), value)),
        },
        (ScalarKind::Float, Value::Number(n)) => match n.as_f64() {
            Some(f) => NormalValue::Float(f),
            None => return Err(mismatch(field, kind.name(), value)),
        },
        (ScalarKind::String, Value::String(s)) => NormalValue::String(s.clone()),
        (ScalarKind::Blob, Value::String(s)) => {
            let bytes = hex::decode(s).map_err(|e| DocumentError::InvalidValue {
                field: field.to_string(),
                reason: format!("blob must be hex: {e}"),
            })?;
            NormalValue::Bytes(bytes)
        }
        (ScalarKind::DateTime, Value::String(s)) => NormalValue::DateTime(normalize_datetime(field, s)?),
        _ => return Err(mismatch(field, kind.name(), value)),
    };
    Ok(normal)
}

fn array_from_json(field: &str, kind: ScalarKind, value: &Value) -> DocumentResult<NormalValue> {
    let expected = format!("[{}]", kind.name());
    let Value::Array(items) = value else {
        return Err(mismatch(field, expected, value));
    };

    // every element must normalize to the same scalar kind
    let mut scalars = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let normal = scalar_from_json(field, kind, item).map_err(|_| DocumentError::ArrayElement {
            field: field.to_string(),
            index,
            expected: kind.name().to_string(),
            actual: json_type_name(item).to_string(),
        })?;
        scalars.push(normal);
    }

    let normal = match kind {
        ScalarKind::Bool => NormalValue::BoolArray(
            scalars
                .into_iter()
                .filter_map(|v| match v {
                    NormalValue::Bool(b) => Some(b),
                    _ => None,
                })
                .collect(),
        ),
        ScalarKind::Int => NormalValue::IntArray(
            scalars
                .into_iter()
                .filter_map(|v| match v {
                    NormalValue::Int(i) => Some(i),
                    _ => None,
                })
                .collect(),
        ),
        ScalarKind::Float => NormalValue::FloatArray(
            scalars
                .into_iter()
                .filter_map(|v| match v {
                    NormalValue::Float(f) => Some(f),
                    _ => None,
                })
                .collect(),
        ),
        ScalarKind::String | ScalarKind::DateTime => NormalValue::StringArray(
            scalars
                .into_iter()
                .filter_map(|v| match v {
                    NormalValue::String(s) | NormalValue::DateTime(s) => Some(s),
                    _ => None,
                })
                .collect(),
        ),
        ScalarKind::Blob => {
            return Err(DocumentError::InvalidValue {
                field: field.to_string(),
                reason: "blob arrays are not supported".to_string(),
            })
        }
    };
    Ok(normal)
}

fn normalize_datetime(field: &str, raw: &str) -> DocumentResult<String> {
    let parsed = DateTime::parse_from_rfc3339(raw).map_err(|e| DocumentError::InvalidValue {
        field: field.to_string(),
        reason: format!("invalid RFC 3339 timestamp {raw:?}: {e}"),
    })?;
    Ok(parsed
        .with_timezone(&Utc)
        .to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

fn mismatch(field: &str, expected: impl Into<String>, actual: &Value) -> DocumentError {
    DocumentError::KindMismatch {
        field: field.to_string(),
        expected: expected.into(),
        actual: json_type_name(actual).to_string(),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// homogeneous scalar arrays get their typed variant
fn classify_array(items: Vec<Value>) -> NormalValue {
    if items.is_empty() {
        return NormalValue::Json(Value::Array(items));
    }
    if items.iter().all(Value::is_boolean) {
        return NormalValue::BoolArray(items.iter().filter_map(Value::as_bool).collect());
    }
    if items.iter().all(Value::is_i64) {
        return NormalValue::IntArray(items.iter().filter_map(Value::as_i64).collect());
    }
    if items.iter().all(Value::is_f64) {
        return NormalValue::FloatArray(items.iter().filter_map(Value::as_f64).collect());
    }
    if items.iter().all(Value::is_string) {
        return NormalValue::StringArray(
            items
                .into_iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s),
                    _ => None,
                })
                .collect(),
        );
    }
    NormalValue::Json(Value::Array(items))
}
