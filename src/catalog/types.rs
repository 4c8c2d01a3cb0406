//! Field kinds and definitions for collection schemas.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::address::DocId;
use crate::document::NormalValue;
use crate::storage::FieldId;

/// Scalar value kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarKind {
    Bool,
    Int,
    Float,
    String,
    /// binary data, supplied as hex text
    Blob,
    /// RFC 3339 timestamps
    DateTime,
}

impl ScalarKind {
    pub fn name(&self) -> &'static str {
        match self {
            ScalarKind::Bool => "Boolean",
            ScalarKind::Int => "Int",
            ScalarKind::Float => "Float",
            ScalarKind::String => "String",
            ScalarKind::Blob => "Blob",
            ScalarKind::DateTime => "DateTime",
        }
    }
}

/// The kind of a collection field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldKind {
    Scalar { scalar: ScalarKind },
    ScalarArray { scalar: ScalarKind },
    /// relation to a document of another collection, holding its DocID
    Object { collection: String },
    /// relation to a document of the same collection
    SelfReference,
    Json,
}

impl FieldKind {
    pub fn scalar(kind: ScalarKind) -> Self {
        FieldKind::Scalar { scalar: kind }
    }

    pub fn array(kind: ScalarKind) -> Self {
        FieldKind::ScalarArray { scalar: kind }
    }

    pub fn object(collection: impl Into<String>) -> Self {
        FieldKind::Object {
            collection: collection.into(),
        }
    }

    /// is this a relation holding another document's ID
    pub fn is_relation(&self) -> bool {
        matches!(self, FieldKind::Object { .. } | FieldKind::SelfReference)
    }

    /// Check if a normalized value may be stored in a field of this kind.
    ///
    /// Null is accepted by every kind.
    pub fn matches(&self, value: &NormalValue) -> bool {
        match (self, value) {
            (_, NormalValue::Null) => true,
            (FieldKind::Scalar { scalar }, value) => match (scalar, value) {
                (ScalarKind::Bool, NormalValue::Bool(_)) => true,
                (ScalarKind::Int, NormalValue::Int(_)) => true,
                (ScalarKind::Float, NormalValue::Float(_)) => true,
                (ScalarKind::String, NormalValue::String(_)) => true,
                (ScalarKind::Blob, NormalValue::Bytes(_)) => true,
                (ScalarKind::DateTime, NormalValue::DateTime(_)) => true,
                _ => false,
            },
            (FieldKind::ScalarArray { scalar }, value) => match (scalar, value) {
                (ScalarKind::Bool, NormalValue::BoolArray(_)) => true,
                (ScalarKind::Int, NormalValue::IntArray(_)) => true,
                (ScalarKind::Float, NormalValue::FloatArray(_)) => true,
                (ScalarKind::String | ScalarKind::DateTime, NormalValue::StringArray(_)) => true,
                _ => false,
            },
            (FieldKind::Object { .. } | FieldKind::SelfReference, NormalValue::String(s)) => {
                DocId::parse(s).is_ok()
            }
            (FieldKind::Object { .. } | FieldKind::SelfReference, _) => false,
            (FieldKind::Json, NormalValue::Bytes(_) | NormalValue::DateTime(_)) => false,
            (FieldKind::Json, _) => true,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Scalar { scalar } => write!(f, "{}", scalar.name()),
            FieldKind::ScalarArray { scalar } => write!(f, "[{}]", scalar.name()),
            FieldKind::Object { collection } => write!(f, "{}", collection),
            FieldKind::SelfReference => write!(f, "Self"),
            FieldKind::Json => write!(f, "JSON"),
        }
    }
}

/// A field of a collection with its assigned ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub id: FieldId,
    pub name: String,
    pub kind: FieldKind,
}

impl FieldDefinition {
    pub fn new(id: FieldId, name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
        }
    }
}

impl fmt::Display for FieldDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} (#{})", self.name, self.kind, self.id)
    }
}
