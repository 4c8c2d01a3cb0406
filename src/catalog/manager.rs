//! Catalog manager for collection persistence and retrieval.
//!
//! Collections live next to the commit graph in the same store:
//! - `/collection/<id>` holds the description as JSON
//! - `/collection-name/<name>` maps a name to its ID
//! - `/sequence/collection` holds the last assigned ID

use tracing::info;

use super::schema::{CollectionDescription, SchemaBuilder, SchemaError};
use crate::storage::{CollectionId, Key, KvReader, KvWriter};

/// Reads and writes collection descriptions.
pub struct Catalog;

impl Catalog {
    /// Register a new collection and assign it the next collection ID.
    pub fn create_collection(
        writer: &mut dyn KvWriter,
        schema: SchemaBuilder,
    ) -> Result<CollectionDescription, SchemaError> {
        let description = schema.build()?;

        let name_key = Key::collection_name(&description.name);
        let observed = writer.get(&name_key)?;
        if observed.is_some() {
            return Err(SchemaError::CollectionExists(description.name));
        }
        writer.expect(name_key.clone(), observed)?;

        let sequence_key = Key::collection_sequence();
        let last = writer.get(&sequence_key)?;
        writer.expect(sequence_key.clone(), last.clone())?;
        let last: u32 = match last {
            Some(bytes) => serde_json::from_slice(&bytes)?,
            None => 0,
        };
        let id = CollectionId::new(last + 1);
        let description = description.with_id(id);

        writer.put(sequence_key, serde_json::to_vec(&id.get())?)?;
        writer.put(name_key, serde_json::to_vec(&id)?)?;
        writer.put(Key::collection(id), serde_json::to_vec(&description)?)?;

        info!(
            collection = %description.name,
            id = id.get(),
            schema_version_id = %description.schema_version_id,
            "collection created"
        );
        Ok(description)
    }

    /// Get a collection by name.
    pub fn get_by_name(
        reader: &dyn KvReader,
        name: &str,
    ) -> Result<Option<CollectionDescription>, SchemaError> {
        let Some(bytes) = reader.get(&Key::collection_name(name))? else {
            return Ok(None);
        };
        let id: CollectionId = serde_json::from_slice(&bytes)?;
        Self::get_by_id(reader, id)
    }

    pub fn get_by_id(
        reader: &dyn KvReader,
        id: CollectionId,
    ) -> Result<Option<CollectionDescription>, SchemaError> {
        reader
            .get(&Key::collection(id))?
            .map(|bytes| serde_json::from_slice(&bytes).map_err(SchemaError::from))
            .transpose()
    }

    /// Check if a collection exists.
    pub fn exists(reader: &dyn KvReader, name: &str) -> Result<bool, SchemaError> {
        Ok(reader.has(&Key::collection_name(name))?)
    }

    /// List all collections in ID order.
    pub fn list(reader: &dyn KvReader) -> Result<Vec<CollectionDescription>, SchemaError> {
        reader
            .scan_prefix(&Key::collections_prefix())?
            .into_iter()
            .map(|(_, bytes)| serde_json::from_slice(&bytes).map_err(SchemaError::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::types::{FieldKind, ScalarKind};
    use crate::storage::{BufferedWriter, Datastore, MemoryDatastore};

    fn setup_catalog() -> MemoryDatastore {
        MemoryDatastore::new()
    }

    fn users() -> SchemaBuilder {
        SchemaBuilder::new("User")
            .field("name", FieldKind::scalar(ScalarKind::String))
            .field("age", FieldKind::scalar(ScalarKind::Int))
    }

    fn create(
        store: &MemoryDatastore,
        schema: SchemaBuilder,
    ) -> Result<CollectionDescription, SchemaError> {
        let mut writer = BufferedWriter::new(store.snapshot());
        let description = Catalog::create_collection(&mut writer, schema)?;
        store.apply(writer.into_batch())?;
        Ok(description)
    }

    #[test]
    fn test_create_and_get_collection() {
        let store = setup_catalog();
        let created = create(&store, users()).unwrap();
        assert_eq!(created.id, CollectionId::new(1));

        let by_name = Catalog::get_by_name(&store, "User").unwrap().unwrap();
        assert_eq!(by_name, created);
        let by_id = Catalog::get_by_id(&store, created.id).unwrap().unwrap();
        assert_eq!(by_id.fields.len(), 2);
        assert!(Catalog::exists(&store, "User").unwrap());
    }

    #[test]
    fn test_missing_collection_is_none() {
        let store = setup_catalog();
        assert!(Catalog::get_by_name(&store, "User").unwrap().is_none());
        assert!(Catalog::get_by_id(&store, CollectionId::new(7)).unwrap().is_none());
        assert!(Catalog::list(&store).unwrap().is_empty());
    }

    #[test]
    fn test_create_duplicate_collection() {
        let store = setup_catalog();
        create(&store, users()).unwrap();

        let result = create(&store, users());
        assert!(matches!(result, Err(SchemaError::CollectionExists(_))));
    }

    #[test]
    fn test_ids_are_sequential() {
        let store = setup_catalog();
        create(&store, users()).unwrap();
        let books = create(
            &store,
            SchemaBuilder::new("Book").field("title", FieldKind::scalar(ScalarKind::String)),
        )
        .unwrap();
        assert_eq!(books.id, CollectionId::new(2));

        let names: Vec<_> = Catalog::list(&store)
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["User", "Book"]);
    }
}
