//! Turns document mutations into commit batches.

use std::fmt;

use tracing::debug;

use crate::address::DocId;
use crate::builder::error::{BuildError, BuildResult};
use crate::clock::FieldClock;
use crate::document::Document;
use crate::storage::{
    Chain, CommitBatch, CommitLink, CommitStore, CompositeDelta, Delta, DocumentHeads,
    DocumentStatus, FieldDelta, KvReader,
};

/// The kind of change being committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    Create,
    Update,
    Delete,
}

impl fmt::Display for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mutation::Create => write!(f, "create"),
            Mutation::Update => write!(f, "update"),
            Mutation::Delete => write!(f, "delete"),
        }
    }
}

/// Builds the commits of one mutation against the heads visible to `reader`.
///
/// The builder only reads. Its output is handed to
/// [`CommitStore::put`] in the same transaction, so the head moves it
/// computed are checked against what was read.
///
/// # Example
///
/// ```ignore
/// let batch = CommitBuilder::new(&tx).create(&document)?;
/// CommitStore::put(&mut tx, &batch)?;
/// ```
pub struct CommitBuilder<'a> {
    reader: &'a dyn KvReader,
}

impl<'a> CommitBuilder<'a> {
    pub fn new(reader: &'a dyn KvReader) -> Self {
        Self { reader }
    }

    /// One field commit per dirty field plus a root composite linking them.
    pub fn create(&self, doc: &Document) -> BuildResult<CommitBatch> {
        self.build(doc, Mutation::Create)
    }

    /// One field commit per dirty field plus a composite linking them and
    /// the previous composite. Unchanged fields are not relinked; with no
    /// dirty field nothing is built.
    pub fn update(&self, doc: &Document) -> BuildResult<CommitBatch> {
        self.build(doc, Mutation::Update)
    }

    /// A single composite commit with status `Deleted`, linking the previous
    /// composite and the current head of every field.
    pub fn delete(&self, doc: &Document) -> BuildResult<CommitBatch> {
        self.build(doc, Mutation::Delete)
    }

    pub fn build(&self, doc: &Document, mutation: Mutation) -> BuildResult<CommitBatch> {
        let heads = CommitStore::get_heads(self.reader, doc.doc_id())?;
        self.check_status(doc.doc_id(), &heads, mutation)?;

        let mut batch = CommitBatch::default();
        let mut links = Vec::new();
        let status = match mutation {
            Mutation::Create | Mutation::Update => {
                if mutation == Mutation::Update && !doc.is_dirty() {
                    return Ok(batch);
                }
                for (name, field_id, value) in doc.dirty_fields() {
                    let clock = FieldClock::new(self.reader, doc.doc_id().clone(), Chain::Field(field_id));
                    let tick = clock.advance(Delta::Field(FieldDelta {
                        doc_id: doc.doc_id().clone(),
                        collection_id: doc.collection_id(),
                        schema_version_id: *doc.schema_version_id(),
                        field_id,
                        field_name: name.to_string(),
                        priority: 0,
                        data: value.clone(),
                    }))?;
                    links.push(CommitLink::new(name, *tick.commit.commit.cid()));
                    batch.commits.push(tick.commit);
                    batch.heads.push(tick.update);
                }
                DocumentStatus::Active
            }
            Mutation::Delete => {
                links = self.field_head_links(&heads)?;
                DocumentStatus::Deleted
            }
        };

        let composite = FieldClock::new(self.reader, doc.doc_id().clone(), Chain::Composite);
        let tick = composite.advance_with_links(
            Delta::Composite(CompositeDelta {
                doc_id: doc.doc_id().clone(),
                collection_id: doc.collection_id(),
                schema_version_id: *doc.schema_version_id(),
                priority: 0,
                status,
            }),
            links,
        )?;

        debug!(
            doc_id = %doc.doc_id(),
            %mutation,
            composite = %tick.commit.commit.cid(),
            height = tick.commit.commit.height(),
            field_commits = batch.commits.len(),
            "commits built"
        );

        batch.commits.push(tick.commit);
        batch.heads.push(tick.update);
        Ok(batch)
    }

    fn check_status(&self, doc_id: &DocId, heads: &DocumentHeads, mutation: Mutation) -> BuildResult<()> {
        let Some(composite) = &heads.composite else {
            return match mutation {
                Mutation::Create => Ok(()),
                Mutation::Update | Mutation::Delete => Err(BuildError::DocumentNotFound {
                    doc_id: doc_id.clone(),
                }),
            };
        };

        if mutation == Mutation::Create {
            return Err(BuildError::DocumentExists {
                doc_id: doc_id.clone(),
            });
        }

        let deleted = CommitStore::get_by_cid(self.reader, &composite.head().cid)?
            .is_some_and(|commit| commit.status() == DocumentStatus::Deleted);
        if deleted {
            return Err(BuildError::DocumentDeleted {
                doc_id: doc_id.clone(),
            });
        }
        Ok(())
    }

    // the field heads, named by the field names recorded in their commits
    fn field_head_links(&self, heads: &DocumentHeads) -> BuildResult<Vec<CommitLink>> {
        let mut links = Vec::with_capacity(heads.fields.len());
        for (chain, tips) in &heads.fields {
            let head = tips.head();
            let name = match CommitStore::get_by_cid(self.reader, &head.cid)? {
                Some(commit) => commit.field_name().map(str::to_string),
                None => None,
            };
            let name = name.unwrap_or_else(|| chain.to_string());
            links.push(CommitLink::new(name, head.cid));
        }
        Ok(links)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CollectionDescription, FieldKind, ScalarKind, SchemaBuilder};
    use crate::document::NormalValue;
    use crate::storage::{BufferedWriter, Datastore, FieldId, MemoryDatastore, HEAD_LINK_NAME};
    use serde_json::json;

    fn setup_collection() -> CollectionDescription {
        SchemaBuilder::new("User")
            .field("Name", FieldKind::scalar(ScalarKind::String))
            .field("Age", FieldKind::scalar(ScalarKind::Int))
            .build()
            .unwrap()
    }

    fn commit(store: &MemoryDatastore, doc: &Document, mutation: Mutation) -> BuildResult<CommitBatch> {
        let mut writer = BufferedWriter::new(store.snapshot());
        let batch = CommitBuilder::new(&writer).build(doc, mutation)?;
        CommitStore::put(&mut writer, &batch)?;
        store.apply(writer.into_batch())?;
        Ok(batch)
    }

    fn setup_john(store: &MemoryDatastore, collection: &CollectionDescription) -> (Document, CommitBatch) {
        let doc = Document::from_json(collection, &json!({"Name": "John", "Age": 21})).unwrap();
        let batch = commit(store, &doc, Mutation::Create).unwrap();
        (doc, batch)
    }

    fn link_names(batch: &CommitBatch) -> Vec<String> {
        batch
            .composite()
            .unwrap()
            .links()
            .into_iter()
            .map(|l| l.name)
            .collect()
    }

    #[test]
    fn test_create_produces_field_commits_and_root_composite() {
        let store = MemoryDatastore::new();
        let collection = setup_collection();
        let (_, batch) = setup_john(&store, &collection);

        assert_eq!(batch.len(), 3);
        assert_eq!(batch.field_commits().count(), 2);
        assert!(batch.commits.iter().all(|c| c.commit.height() == 1));

        let composite = batch.composite().unwrap();
        assert!(composite.heads().is_empty());
        assert_eq!(link_names(&batch), vec!["Age", "Name"]);

        // each composite link points at a field commit of the same batch
        for link in composite.named_links() {
            assert!(batch.field_commits().any(|c| *c.cid() == link.cid));
        }
    }

    #[test]
    fn test_update_links_only_changed_fields() {
        let store = MemoryDatastore::new();
        let collection = setup_collection();
        let (doc, created) = setup_john(&store, &collection);
        let old_composite = *created.composite().unwrap().cid();
        let old_age = created
            .field_commits()
            .find(|c| c.field_name() == Some("Age"))
            .map(|c| *c.cid())
            .unwrap();

        let mut update = Document::existing(&collection, doc.doc_id().clone());
        update.set(&collection, "Age", NormalValue::Int(22)).unwrap();
        let batch = commit(&store, &update, Mutation::Update).unwrap();

        assert_eq!(batch.len(), 2);
        let age = batch.field_commits().next().unwrap();
        assert_eq!(age.height(), 2);
        assert_eq!(age.heads(), &[old_age]);
        assert_eq!(age.value(), Some(&NormalValue::Int(22)));

        let composite = batch.composite().unwrap();
        assert_eq!(composite.height(), 2);
        assert_eq!(composite.heads(), &[old_composite]);
        assert_eq!(link_names(&batch), vec![HEAD_LINK_NAME, "Age"]);
        assert_eq!(composite.named_links()[0].cid, *age.cid());
    }

    #[test]
    fn test_update_without_changes_builds_nothing() {
        let store = MemoryDatastore::new();
        let collection = setup_collection();
        let (doc, _) = setup_john(&store, &collection);

        let untouched = Document::existing(&collection, doc.doc_id().clone());
        let batch = commit(&store, &untouched, Mutation::Update).unwrap();
        assert!(batch.is_empty());
    }

    #[test]
    fn test_delete_adds_one_composite() {
        let store = MemoryDatastore::new();
        let collection = setup_collection();
        let (doc, created) = setup_john(&store, &collection);

        let batch = commit(&store, &doc, Mutation::Delete).unwrap();
        assert_eq!(batch.len(), 1);
        let composite = batch.composite().unwrap();
        assert_eq!(composite.status(), DocumentStatus::Deleted);
        assert_eq!(composite.height(), 2);
        assert_eq!(composite.heads(), &[*created.composite().unwrap().cid()]);
        assert_eq!(link_names(&batch), vec![HEAD_LINK_NAME, "Age", "Name"]);

        // history stays readable
        for sealed in &created.commits {
            assert!(CommitStore::get_by_cid(&store, sealed.commit.cid()).unwrap().is_some());
        }
    }

    #[test]
    fn test_status_checks() {
        let store = MemoryDatastore::new();
        let collection = setup_collection();
        let (doc, _) = setup_john(&store, &collection);

        let err = commit(&store, &doc, Mutation::Create).unwrap_err();
        assert!(matches!(err, BuildError::DocumentExists { .. }));

        let unknown = Document::from_json(&collection, &json!({"Name": "Nobody"})).unwrap();
        let err = commit(&store, &unknown, Mutation::Update).unwrap_err();
        assert!(matches!(err, BuildError::DocumentNotFound { .. }));

        commit(&store, &doc, Mutation::Delete).unwrap();
        let mut update = Document::existing(&collection, doc.doc_id().clone());
        update.set(&collection, "Age", NormalValue::Int(22)).unwrap();
        let err = commit(&store, &update, Mutation::Update).unwrap_err();
        assert!(matches!(err, BuildError::DocumentDeleted { .. }));
        let err = commit(&store, &doc, Mutation::Delete).unwrap_err();
        assert!(matches!(err, BuildError::DocumentDeleted { .. }));
    }

    #[test]
    fn test_identical_mutations_yield_identical_cids() {
        let collection = setup_collection();
        let a = MemoryDatastore::new();
        let b = MemoryDatastore::new();
        let (_, first) = setup_john(&a, &collection);
        let (_, second) = setup_john(&b, &collection);
        assert_eq!(first, second);
    }

    #[test]
    fn test_encoding_failure_writes_nothing() {
        let store = MemoryDatastore::new();
        let collection = SchemaBuilder::new("Point")
            .field("x", FieldKind::scalar(ScalarKind::Float))
            .field("y", FieldKind::scalar(ScalarKind::Float))
            .build()
            .unwrap();
        let doc = Document::new(
            &collection,
            [("x", NormalValue::Float(1.0)), ("y", NormalValue::Float(2.0))],
        )
        .unwrap();
        commit(&store, &doc, Mutation::Create).unwrap();
        let before = store.len();

        let mut update = Document::existing(&collection, doc.doc_id().clone());
        update.set(&collection, "x", NormalValue::Float(3.0)).unwrap();
        update.set(&collection, "y", NormalValue::Float(f64::INFINITY)).unwrap();
        let err = commit(&store, &update, Mutation::Update).unwrap_err();
        assert!(matches!(err, BuildError::Encoding(_)));
        assert_eq!(store.len(), before);
        let heads = CommitStore::get_heads(&store, doc.doc_id()).unwrap();
        assert_eq!(heads.field(Chain::Field(FieldId::new(1))).unwrap().height(), 1);
    }
}
