//! Database API - high-level interface for docdag.

use std::path::Path;
use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info};

use crate::address::{Cid, DocId};
use crate::builder::{BuildError, CommitBuilder, Mutation};
use crate::catalog::{Catalog, CollectionDescription, SchemaBuilder, SchemaError};
use crate::clock::{ClockError, FieldClock};
use crate::document::{Document, DocumentError};
use crate::query::{CommitQuery, QueryContext, QueryEngine, QueryError, QueryOutput};
use crate::storage::{
    Chain, CommitStore, Datastore, DocumentStatus, HeadManager, KvReader, MemoryDatastore, PutOutcome,
    StorageError,
};
use crate::transaction::{Retryable, TransactionError, TransactionManager};

use super::config::{ConfigError, DatabaseConfig};
use super::logging::{init_logging, LoggingError};

/// Result type for database operations.
pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Database errors.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("transaction error: {0}")]
    Transaction(#[from] TransactionError),

    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("document error: {0}")]
    Document(#[from] DocumentError),

    #[error("commit error: {0}")]
    Build(#[from] BuildError),

    #[error("clock error: {0}")]
    Clock(#[from] ClockError),

    #[error("query error: {0}")]
    Query(#[from] QueryError),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("logging error: {0}")]
    Logging(#[from] LoggingError),
}

impl Retryable for DatabaseError {
    fn is_retryable(&self) -> bool {
        match self {
            DatabaseError::Storage(e) => e.is_retriable(),
            DatabaseError::Transaction(e) => e.is_retryable(),
            DatabaseError::Schema(SchemaError::Storage(e)) => e.is_retriable(),
            DatabaseError::Build(e) => e.is_retryable(),
            DatabaseError::Clock(e) => e.is_retryable(),
            _ => false,
        }
    }
}

/// What a merge of remote blocks changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub received: usize,
    /// blocks not already present
    pub stored: usize,
    pub heads_moved: usize,
}

/// The main database handle.
///
/// Cheap to clone; clones share the store.
#[derive(Clone)]
pub struct Database {
    config: DatabaseConfig,
    tx_manager: TransactionManager,
}

impl Database {
    /// Create a new in-memory database.
    pub fn in_memory() -> Self {
        Self::with_config(DatabaseConfig::default())
    }

    pub fn with_config(config: DatabaseConfig) -> Self {
        Self::with_store(Arc::new(MemoryDatastore::new()), config)
    }

    /// Open a database over an existing store.
    pub fn with_store(store: Arc<dyn Datastore>, config: DatabaseConfig) -> Self {
        let tx_manager = TransactionManager::with_max_retries(store, config.transaction.max_retries);
        Self { config, tx_manager }
    }

    /// Load a JSON configuration file, install logging from it and open an
    /// in-memory database.
    pub fn from_config_file(path: impl AsRef<Path>) -> DatabaseResult<Self> {
        let config = DatabaseConfig::from_file(path)?;
        init_logging(&config.logging)?;
        Ok(Self::with_config(config))
    }

    /// Get the configuration.
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn transaction_manager(&self) -> &TransactionManager {
        &self.tx_manager
    }

    /// Register a collection.
    pub fn create_collection(&self, schema: SchemaBuilder) -> DatabaseResult<CollectionDescription> {
        self.tx_manager
            .with_transaction(|tx| Ok(Catalog::create_collection(tx, schema.clone())?))
    }

    pub fn get_collection(&self, name: &str) -> DatabaseResult<Option<CollectionDescription>> {
        let snapshot = self.tx_manager.snapshot();
        Ok(Catalog::get_by_name(&*snapshot, name)?)
    }

    pub fn collections(&self) -> DatabaseResult<Vec<CollectionDescription>> {
        let snapshot = self.tx_manager.snapshot();
        Ok(Catalog::list(&*snapshot)?)
    }

    /// Create a document from a JSON object and return its DocID.
    pub fn create_document(&self, collection: &str, input: &Value) -> DatabaseResult<DocId> {
        let collection = self.require_collection(collection)?;
        let doc = Document::from_json(&collection, input)?;
        self.write(&collection, &doc, Mutation::Create)?;
        Ok(doc.doc_id().clone())
    }

    /// Set the fields of a JSON object on an existing document.
    pub fn update_document(&self, collection: &str, doc_id: &DocId, patch: &Value) -> DatabaseResult<()> {
        let collection = self.require_collection(collection)?;
        let mut doc = Document::existing(&collection, doc_id.clone());
        doc.set_json(&collection, patch)?;
        self.write(&collection, &doc, Mutation::Update)
    }

    pub fn delete_document(&self, collection: &str, doc_id: &DocId) -> DatabaseResult<()> {
        let collection = self.require_collection(collection)?;
        let doc = Document::existing(&collection, doc_id.clone());
        self.write(&collection, &doc, Mutation::Delete)
    }

    fn write(&self, collection: &CollectionDescription, doc: &Document, mutation: Mutation) -> DatabaseResult<()> {
        let outcome = self.tx_manager.with_transaction(|tx| -> DatabaseResult<PutOutcome> {
            if mutation != Mutation::Create && !belongs_to(&*tx, collection, doc.doc_id())? {
                return Err(BuildError::DocumentNotFound {
                    doc_id: doc.doc_id().clone(),
                }
                .into());
            }
            let batch = CommitBuilder::new(&*tx).build(doc, mutation)?;
            Ok(CommitStore::put(tx, &batch)?)
        })?;

        info!(
            collection = %collection.name,
            doc_id = %doc.doc_id(),
            %mutation,
            commits = outcome.written,
            "document written"
        );
        Ok(())
    }

    /// The current value of a document: the value at each field head.
    ///
    /// Unknown and deleted documents are `None`.
    pub fn get_document(&self, collection: &str, doc_id: &DocId) -> DatabaseResult<Option<Value>> {
        let collection = self.require_collection(collection)?;
        let snapshot = self.tx_manager.snapshot();
        let heads = HeadManager::for_document(&*snapshot, doc_id)?;

        let Some(composite) = heads.composite else {
            return Ok(None);
        };
        let Some(root) = CommitStore::get_by_cid(&*snapshot, &composite.head().cid)? else {
            return Ok(None);
        };
        if root.status() == DocumentStatus::Deleted || root.collection_id() != collection.id {
            return Ok(None);
        }

        let mut object = Map::new();
        object.insert("_docID".to_string(), Value::from(doc_id.to_string()));
        for (_, tips) in heads.fields {
            let Some(commit) = CommitStore::get_by_cid(&*snapshot, &tips.head().cid)? else {
                continue;
            };
            if let (Some(name), Some(value)) = (commit.field_name(), commit.value()) {
                object.insert(name.to_string(), value.to_json());
            }
        }
        Ok(Some(Value::Object(object)))
    }

    /// Run a commit query against a snapshot of the store.
    pub fn commits(&self, query: &CommitQuery, ctx: &QueryContext) -> DatabaseResult<QueryOutput> {
        let snapshot = self.tx_manager.snapshot();
        let engine = QueryEngine::with_options(&*snapshot, self.config.query_options());
        Ok(engine.execute(query, ctx)?)
    }

    /// Run a commit query given as JSON arguments and render the result.
    pub fn commits_json(&self, args: &Value) -> DatabaseResult<Value> {
        let query = CommitQuery::from_json(args)?;
        Ok(self.commits(&query, &QueryContext::new())?.to_json())
    }

    /// The raw block of a commit, as exchanged between replicas.
    pub fn get_block(&self, cid: &Cid) -> DatabaseResult<Option<Vec<u8>>> {
        let snapshot = self.tx_manager.snapshot();
        Ok(CommitStore::get_block(&*snapshot, cid)?)
    }

    /// Apply blocks received from another replica.
    ///
    /// Each block is checked against its CID and stored once. An incoming
    /// commit replaces the chain tips it descends from; a concurrent one is
    /// kept as an extra tip, and the next local commit of that chain links
    /// every tip. The value of a chain is read from its highest tip, or on
    /// equal height the one with the greater CID. Blocks whose ancestors are
    /// missing are accepted. Either every block is applied or none is.
    pub fn merge_blocks(&self, blocks: impl IntoIterator<Item = (Cid, Vec<u8>)>) -> DatabaseResult<MergeOutcome> {
        let blocks: Vec<(Cid, Vec<u8>)> = blocks.into_iter().collect();

        let outcome = self.tx_manager.with_transaction(|tx| -> DatabaseResult<MergeOutcome> {
            let mut outcome = MergeOutcome {
                received: blocks.len(),
                ..MergeOutcome::default()
            };
            for (cid, bytes) in &blocks {
                let (commit, stored) = CommitStore::put_block(tx, *cid, bytes)?;
                if stored {
                    outcome.stored += 1;
                }

                let update = FieldClock::new(&*tx, commit.doc_id().clone(), commit.chain()).merge(&commit)?;
                if let Some(update) = update {
                    HeadManager::update_if_unchanged(tx, &update)?;
                    outcome.heads_moved += 1;
                }
            }
            Ok(outcome)
        })?;

        debug!(
            received = outcome.received,
            stored = outcome.stored,
            heads_moved = outcome.heads_moved,
            "blocks merged"
        );
        Ok(outcome)
    }

    fn require_collection(&self, name: &str) -> DatabaseResult<CollectionDescription> {
        self.get_collection(name)?
            .ok_or_else(|| SchemaError::CollectionNotFound(name.to_string()).into())
    }
}

/// A document that has no composite head yet belongs to no collection.
fn belongs_to(reader: &dyn KvReader, collection: &CollectionDescription, doc_id: &DocId) -> DatabaseResult<bool> {
    let Some(heads) = HeadManager::get(reader, doc_id, Chain::Composite)? else {
        return Ok(true);
    };
    Ok(CommitStore::get_by_cid(reader, &heads.head().cid)?
        .map_or(true, |commit| commit.collection_id() == collection.id))
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("config", &self.config)
            .field("transactions", &self.tx_manager)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{FieldKind, ScalarKind};
    use crate::query::{FieldSelector, GroupField};
    use serde_json::json;

    fn setup() -> Database {
        let db = Database::in_memory();
        db.create_collection(user_schema()).unwrap();
        db
    }

    fn user_schema() -> SchemaBuilder {
        SchemaBuilder::new("User")
            .field("Name", FieldKind::scalar(ScalarKind::String))
            .field("Age", FieldKind::scalar(ScalarKind::Int))
    }

    fn export(db: &Database, doc_id: &DocId) -> Vec<(Cid, Vec<u8>)> {
        let output = db
            .commits(&CommitQuery::new().with_doc_id(doc_id), &QueryContext::new())
            .unwrap();
        output
            .commits()
            .iter()
            .map(|record| (record.cid, db.get_block(&record.cid).unwrap().unwrap()))
            .collect()
    }

    #[test]
    fn test_collections() {
        let db = setup();
        let users = db.get_collection("User").unwrap().unwrap();
        assert_eq!(users.id.get(), 1);
        assert_eq!(users.field_names(), vec!["Age", "Name"]);
        assert!(db.get_collection("Book").unwrap().is_none());

        let err = db.create_collection(user_schema()).unwrap_err();
        assert!(matches!(err, DatabaseError::Schema(SchemaError::CollectionExists(_))));
        assert_eq!(db.collections().unwrap().len(), 1);
    }

    #[test]
    fn test_document_lifecycle() {
        let db = setup();
        let doc_id = db
            .create_document("User", &json!({"Name": "John", "Age": 21}))
            .unwrap();
        assert!(doc_id.to_string().starts_with("bae-"));
        assert_eq!(
            db.get_document("User", &doc_id).unwrap(),
            Some(json!({"_docID": doc_id.to_string(), "Name": "John", "Age": 21}))
        );

        db.update_document("User", &doc_id, &json!({"Age": 22})).unwrap();
        let current = db.get_document("User", &doc_id).unwrap().unwrap();
        assert_eq!(current["Age"], 22);
        assert_eq!(current["Name"], "John");

        db.delete_document("User", &doc_id).unwrap();
        assert!(db.get_document("User", &doc_id).unwrap().is_none());

        let err = db.update_document("User", &doc_id, &json!({"Age": 23})).unwrap_err();
        assert!(matches!(err, DatabaseError::Build(BuildError::DocumentDeleted { .. })));
    }

    #[test]
    fn test_document_errors() {
        let db = setup();
        let input = json!({"Name": "John", "Age": 21});
        let doc_id = db.create_document("User", &input).unwrap();

        let err = db.create_document("User", &input).unwrap_err();
        assert!(matches!(err, DatabaseError::Build(BuildError::DocumentExists { .. })));

        let err = db.create_document("Book", &input).unwrap_err();
        assert!(matches!(err, DatabaseError::Schema(SchemaError::CollectionNotFound(_))));

        let err = db.update_document("User", &doc_id, &json!({"Age": "old"})).unwrap_err();
        assert!(matches!(err, DatabaseError::Document(DocumentError::KindMismatch { .. })));

        let unknown = DocId::new(Cid::for_raw(b"nobody"));
        let err = db.delete_document("User", &unknown).unwrap_err();
        assert!(matches!(err, DatabaseError::Build(BuildError::DocumentNotFound { .. })));
        assert!(db.get_document("User", &unknown).unwrap().is_none());
    }

    #[test]
    fn test_document_of_other_collection() {
        let db = setup();
        db.create_collection(SchemaBuilder::new("Book").field("Name", FieldKind::scalar(ScalarKind::String)))
            .unwrap();
        let doc_id = db.create_document("User", &json!({"Name": "John"})).unwrap();

        assert!(db.get_document("Book", &doc_id).unwrap().is_none());
        let err = db.update_document("Book", &doc_id, &json!({"Name": "Dune"})).unwrap_err();
        assert!(matches!(err, DatabaseError::Build(BuildError::DocumentNotFound { .. })));
    }

    #[test]
    fn test_commits_json() {
        let db = setup();
        let doc_id = db
            .create_document("User", &json!({"Name": "John", "Age": 21}))
            .unwrap();
        db.update_document("User", &doc_id, &json!({"Age": 22})).unwrap();

        let rendered = db
            .commits_json(&json!({"dockey": doc_id.to_string(), "groupBy": ["height"]}))
            .unwrap();
        let groups = rendered.as_array().unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0]["height"], 2);
        assert_eq!(groups[0]["_count"], 2);
        assert_eq!(groups[1]["_count"], 3);
        assert_eq!(groups[1]["_group"][0]["collectionID"], 1);

        let err = db.commits_json(&json!({"docid": "x"})).unwrap_err();
        assert!(matches!(err, DatabaseError::Query(QueryError::InvalidArgument { .. })));
    }

    #[test]
    fn test_query_config_applies() {
        let db = Database::with_config(DatabaseConfig::new().default_limit(2));
        db.create_collection(user_schema()).unwrap();
        let doc_id = db
            .create_document("User", &json!({"Name": "John", "Age": 21}))
            .unwrap();

        let query = CommitQuery::new().with_doc_id(&doc_id);
        assert_eq!(db.commits(&query, &QueryContext::new()).unwrap().len(), 2);
        assert_eq!(
            db.commits(&query.with_limit(10), &QueryContext::new())
                .unwrap()
                .len(),
            3
        );
    }

    #[test]
    fn test_replicas_converge() {
        let a = setup();
        let b = setup();
        let doc_id = a
            .create_document("User", &json!({"Name": "John", "Age": 21}))
            .unwrap();
        assert_eq!(
            b.create_document("User", &json!({"Name": "John", "Age": 21})).unwrap(),
            doc_id
        );

        a.update_document("User", &doc_id, &json!({"Age": 22})).unwrap();
        b.update_document("User", &doc_id, &json!({"Age": 23})).unwrap();

        let from_a = export(&a, &doc_id);
        let from_b = export(&b, &doc_id);
        let merged_into_b = b.merge_blocks(from_a.clone()).unwrap();
        let merged_into_a = a.merge_blocks(from_b).unwrap();

        // the shared create commits are already known on both sides
        assert_eq!(merged_into_b.received, 5);
        assert_eq!(merged_into_b.stored, 2);
        assert_eq!(merged_into_a.stored, 2);

        assert_eq!(a.get_document("User", &doc_id).unwrap(), b.get_document("User", &doc_id).unwrap());

        let heads = CommitQuery::new().with_doc_id(&doc_id).with_depth(1);
        let ctx = QueryContext::new();
        assert_eq!(a.commits(&heads, &ctx).unwrap(), b.commits(&heads, &ctx).unwrap());

        let again = b.merge_blocks(from_a).unwrap();
        assert_eq!(again.stored, 0);
        assert_eq!(again.heads_moved, 0);
    }

    #[test]
    fn test_concurrent_branches_stay_in_history() {
        let a = setup();
        let b = setup();
        let doc_id = a
            .create_document("User", &json!({"Name": "John", "Age": 21}))
            .unwrap();
        b.create_document("User", &json!({"Name": "John", "Age": 21}))
            .unwrap();

        a.update_document("User", &doc_id, &json!({"Age": 22})).unwrap();
        b.update_document("User", &doc_id, &json!({"Age": 23})).unwrap();
        let from_a = export(&a, &doc_id);
        let from_b = export(&b, &doc_id);
        b.merge_blocks(from_a).unwrap();
        a.merge_blocks(from_b).unwrap();

        // both branches are tips until the next local write
        let tips = a
            .commits(&CommitQuery::new().with_doc_id(&doc_id).with_depth(1), &QueryContext::new())
            .unwrap();
        assert_eq!(tips.len(), 5);

        a.update_document("User", &doc_id, &json!({"Age": 30})).unwrap();

        let age = CommitQuery::new()
            .with_doc_id(&doc_id)
            .with_field(FieldSelector::Name("Age".to_string()));
        let history = a.commits(&age, &QueryContext::new()).unwrap();
        assert_eq!(history.len(), 4);
        let latest = &history.commits()[0];
        assert_eq!(latest.height, 3);
        assert_eq!(latest.links.len(), 2);

        let full = a
            .commits(&CommitQuery::new().with_doc_id(&doc_id), &QueryContext::new())
            .unwrap();
        assert_eq!(full.len(), 9);

        // the other replica catches up through the joining commits
        let outcome = b.merge_blocks(export(&a, &doc_id)).unwrap();
        assert_eq!(outcome.stored, 2);
        assert_eq!(b.get_document("User", &doc_id).unwrap().unwrap()["Age"], 30);
        assert_eq!(
            b.commits(&CommitQuery::new().with_doc_id(&doc_id), &QueryContext::new())
                .unwrap()
                .len(),
            9
        );
    }

    #[test]
    fn test_merge_into_empty_replica() {
        let a = setup();
        let doc_id = a
            .create_document("User", &json!({"Name": "John", "Age": 21}))
            .unwrap();
        a.update_document("User", &doc_id, &json!({"Age": 22})).unwrap();

        let b = setup();
        let outcome = b.merge_blocks(export(&a, &doc_id)).unwrap();
        assert_eq!(outcome.stored, 5);
        assert_eq!(b.get_document("User", &doc_id).unwrap(), a.get_document("User", &doc_id).unwrap());

        let composite = b
            .commits(
                &CommitQuery::new()
                    .with_doc_id(&doc_id)
                    .with_field(FieldSelector::Composite)
                    .group_by(GroupField::Height),
                &QueryContext::new(),
            )
            .unwrap();
        assert_eq!(composite.len(), 2);
    }

    #[test]
    fn test_merge_rejects_mismatched_block() {
        let a = setup();
        let doc_id = a.create_document("User", &json!({"Name": "John"})).unwrap();
        let blocks = export(&a, &doc_id);
        let (claimed, _) = blocks[0].clone();
        let (_, bytes) = blocks[1].clone();

        let b = setup();
        assert!(b.merge_blocks(vec![(claimed, bytes)]).is_err());
        assert!(b.get_block(&claimed).unwrap().is_none());
    }

    #[test]
    fn test_partial_history_merge() {
        let a = setup();
        let doc_id = a.create_document("User", &json!({"Name": "John"})).unwrap();
        a.update_document("User", &doc_id, &json!({"Name": "Johnny"})).unwrap();

        let latest = a
            .commits(
                &CommitQuery::new().with_doc_id(&doc_id).with_depth(1),
                &QueryContext::new(),
            )
            .unwrap();
        let blocks: Vec<_> = latest
            .commits()
            .iter()
            .map(|r| (r.cid, a.get_block(&r.cid).unwrap().unwrap()))
            .collect();

        let b = setup();
        b.merge_blocks(blocks).unwrap();
        assert_eq!(b.get_document("User", &doc_id).unwrap().unwrap()["Name"], "Johnny");

        // traversal stops where the ancestors are missing
        let history = b
            .commits(&CommitQuery::new().with_doc_id(&doc_id), &QueryContext::new())
            .unwrap();
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_from_config_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("docdag.json");
        std::fs::write(&path, r#"{"query": {"default_limit": 1}, "transaction": {"max_retries": 0}}"#).unwrap();

        let db = Database::from_config_file(&path).unwrap();
        assert_eq!(db.config().query.default_limit, Some(1));
        assert_eq!(db.transaction_manager().max_retries(), 0);

        std::fs::write(&path, "not json").unwrap();
        let err = Database::from_config_file(&path).unwrap_err();
        assert!(matches!(err, DatabaseError::Config(_)));
    }

    #[test]
    fn test_database_error_retryable() {
        let conflict: DatabaseError = TransactionError::conflict("tx", "/heads/x/C").into();
        assert!(conflict.is_retryable());

        let missing: DatabaseError = SchemaError::CollectionNotFound("User".into()).into();
        assert!(!missing.is_retryable());
    }
}
