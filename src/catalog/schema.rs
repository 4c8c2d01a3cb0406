//! Collection schema definitions and validation.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::types::{FieldDefinition, FieldKind};
use crate::address::Cid;
use crate::storage::{CollectionId, FieldId, StorageError, COMPOSITE_MARKER};

/// A collection as registered in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionDescription {
    pub id: CollectionId,
    pub name: String,
    /// raw CID of the canonical JSON of name and fields
    pub schema_version_id: Cid,
    /// fields in ID order
    pub fields: Vec<FieldDefinition>,
}

impl CollectionDescription {
    /// Get a field definition by name.
    pub fn get_field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn get_field_by_id(&self, id: FieldId) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.id == id)
    }

    /// Get field names in ID order.
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Resolve a field by name or by its numeric ID.
    pub fn resolve_field(&self, name_or_id: &str) -> Option<&FieldDefinition> {
        self.get_field(name_or_id).or_else(|| {
            name_or_id
                .parse::<u32>()
                .ok()
                .and_then(|id| self.get_field_by_id(FieldId::new(id)))
        })
    }

    pub(crate) fn with_id(mut self, id: CollectionId) -> Self {
        self.id = id;
        self
    }
}

/// Schema-related errors.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("invalid name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    #[error("duplicate field: {0}")]
    DuplicateField(String),

    #[error("collection {name} has no fields")]
    NoFields { name: String },

    #[error("collection already exists: {0}")]
    CollectionExists(String),

    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<serde_json::Error> for SchemaError {
    fn from(e: serde_json::Error) -> Self {
        SchemaError::Storage(StorageError::Serialization(e))
    }
}

/// Builder for creating collection descriptions.
///
/// Field IDs are assigned from 1 in ascending field-name order, so two
/// replicas that declare the same fields in any order agree on the IDs and on
/// the schema version.
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    name: String,
    fields: Vec<(String, FieldKind)>,
}

impl SchemaBuilder {
    /// Start building a new schema.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Add a field.
    pub fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push((name.into(), kind));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Build the description. The collection ID is assigned by the catalog.
    pub fn build(self) -> Result<CollectionDescription, SchemaError> {
        validate_name(&self.name)?;
        if self.fields.is_empty() {
            return Err(SchemaError::NoFields { name: self.name });
        }

        let mut seen = HashSet::new();
        for (name, _) in &self.fields {
            validate_field_name(name)?;
            if !seen.insert(name.as_str()) {
                return Err(SchemaError::DuplicateField(name.clone()));
            }
        }

        let mut fields = self.fields;
        fields.sort_by(|a, b| a.0.cmp(&b.0));
        let fields: Vec<FieldDefinition> = fields
            .into_iter()
            .zip(1u32..)
            .map(|((name, kind), id)| FieldDefinition::new(FieldId::new(id), name, kind))
            .collect();

        let schema_version_id = schema_version_id(&self.name, &fields)?;
        Ok(CollectionDescription {
            id: CollectionId::new(0),
            name: self.name,
            schema_version_id,
            fields,
        })
    }
}

fn schema_version_id(name: &str, fields: &[FieldDefinition]) -> Result<Cid, SchemaError> {
    // serde_json maps are sorted by key, which keeps this encoding canonical
    let bytes = serde_json::to_vec(&json!({ "name": name, "fields": fields }))?;
    Ok(Cid::for_raw(&bytes))
}

// the composite marker names the document chain in queries and head keys
fn validate_field_name(name: &str) -> Result<(), SchemaError> {
    if name == COMPOSITE_MARKER {
        return Err(SchemaError::InvalidName {
            name: name.to_string(),
            reason: format!("'{}' names the composite chain", COMPOSITE_MARKER),
        });
    }
    validate_name(name)
}

fn validate_name(name: &str) -> Result<(), SchemaError> {
    let invalid = |reason: &str| SchemaError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    let Some(first) = name.chars().next() else {
        return Err(invalid("name is empty"));
    };
    if first == '_' {
        return Err(invalid("names starting with '_' are reserved"));
    }
    if !first.is_ascii_alphabetic() {
        return Err(invalid("name must start with a letter"));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(invalid("name may only contain letters, digits and '_'"));
    }
    Ok(())
}
