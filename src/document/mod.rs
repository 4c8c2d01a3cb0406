//! Documents and their field values.
//!
//! A [`Document`] is the input of the commit builder: the typed values of
//! a collection's fields plus the set of fields changed since it was loaded.
//! A new document's ID is derived from the content of its initial fields.

mod error;
mod value;

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::address::{Cid, DocId};
use crate::catalog::{CollectionDescription, FieldDefinition};
use crate::storage::{encode_fields, CollectionId, FieldId};

pub use error::{DocumentError, DocumentResult};
pub use value::NormalValue;

/// A document of one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    doc_id: DocId,
    collection_id: CollectionId,
    schema_version_id: Cid,
    values: BTreeMap<FieldId, (String, NormalValue)>,
    dirty: BTreeSet<FieldId>,
}

impl Document {
    /// Create a new document. Every given field is dirty.
    ///
    /// The DocID is derived from the raw CID of the canonical encoding of
    /// the initial field map, so equal content yields an equal DocID.
    pub fn new<I, S>(collection: &CollectionDescription, values: I) -> DocumentResult<Self>
    where
        I: IntoIterator<Item = (S, NormalValue)>,
        S: AsRef<str>,
    {
        let mut checked = BTreeMap::new();
        for (name, value) in values {
            let field = lookup(collection, name.as_ref())?;
            check_kind(field, &value)?;
            checked.insert(field.id, (field.name.clone(), value));
        }

        let source = encode_fields(checked.values().map(|(name, value)| (name.as_str(), value)))?;
        let doc_id = DocId::new(Cid::for_raw(&source));

        Ok(Self {
            doc_id,
            collection_id: collection.id,
            schema_version_id: collection.schema_version_id,
            dirty: checked.keys().copied().collect(),
            values: checked,
        })
    }

    /// Create a new document from a JSON object.
    pub fn from_json(collection: &CollectionDescription, input: &Value) -> DocumentResult<Self> {
        let values = normalize_object(collection, input)?;
        Self::new(collection, values)
    }

    /// A handle on an existing document with no loaded values, for updates
    /// and deletes.
    pub fn existing(collection: &CollectionDescription, doc_id: DocId) -> Self {
        Self {
            doc_id,
            collection_id: collection.id,
            schema_version_id: collection.schema_version_id,
            values: BTreeMap::new(),
            dirty: BTreeSet::new(),
        }
    }

    /// Set a field and mark it dirty.
    pub fn set(
        &mut self,
        collection: &CollectionDescription,
        name: &str,
        value: NormalValue,
    ) -> DocumentResult<()> {
        let field = lookup(collection, name)?;
        check_kind(field, &value)?;
        self.values.insert(field.id, (field.name.clone(), value));
        self.dirty.insert(field.id);
        Ok(())
    }

    /// Set every field of a JSON object.
    pub fn set_json(&mut self, collection: &CollectionDescription, input: &Value) -> DocumentResult<()> {
        for (name, value) in normalize_object(collection, input)? {
            self.set(collection, &name, value)?;
        }
        Ok(())
    }

    pub fn doc_id(&self) -> &DocId {
        &self.doc_id
    }

    pub fn collection_id(&self) -> CollectionId {
        self.collection_id
    }

    pub fn schema_version_id(&self) -> &Cid {
        &self.schema_version_id
    }

    pub fn get(&self, name: &str) -> Option<&NormalValue> {
        self.values
            .values()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Changed fields in field ID order.
    pub fn dirty_fields(&self) -> impl Iterator<Item = (&str, FieldId, &NormalValue)> + '_ {
        self.dirty.iter().filter_map(|id| {
            self.values
                .get(id)
                .map(|(name, value)| (name.as_str(), *id, value))
        })
    }

    /// Forget the dirty set once the changes are committed.
    pub fn clear_dirty(&mut self) {
        self.dirty.clear();
    }
}

fn lookup<'a>(collection: &'a CollectionDescription, name: &str) -> DocumentResult<&'a FieldDefinition> {
    collection
        .get_field(name)
        .ok_or_else(|| DocumentError::UnknownField {
            collection: collection.name.clone(),
            field: name.to_string(),
        })
}

fn check_kind(field: &FieldDefinition, value: &NormalValue) -> DocumentResult<()> {
    if field.kind.matches(value) {
        return Ok(());
    }
    Err(DocumentError::KindMismatch {
        field: field.name.clone(),
        expected: field.kind.to_string(),
        actual: value.type_name().to_string(),
    })
}

fn normalize_object(
    collection: &CollectionDescription,
    input: &Value,
) -> DocumentResult<Vec<(String, NormalValue)>> {
    let Value::Object(object) = input else {
        return Err(DocumentError::NotAnObject {
            actual: input.to_string(),
        });
    };

    object
        .iter()
        .map(|(name, raw)| {
            let field = lookup(collection, name)?;
            let value = NormalValue::from_json(name, &field.kind, raw)?;
            Ok((field.name.clone(), value))
        })
        .collect()
}
