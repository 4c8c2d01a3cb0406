//! Query result types.

use serde_json::{json, Map, Value};

use crate::address::{Cid, DocId};
use crate::storage::{Commit, CommitLink, CollectionId, DocumentStatus, COMPOSITE_MARKER};

/// One commit as returned by a commit query.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitRecord {
    pub cid: Cid,
    pub doc_id: DocId,
    pub collection_id: CollectionId,
    pub height: u64,
    /// `None` for composite commits
    pub field_name: Option<String>,
    /// the numeric field ID, or `"C"` for composite commits
    pub field_id: String,
    pub schema_version_id: Cid,
    /// the field value; `None` for composite commits
    pub delta: Option<Value>,
    /// `_head` links first, then named links
    pub links: Vec<CommitLink>,
    pub status: DocumentStatus,
}

impl CommitRecord {
    pub fn from_commit(commit: &Commit) -> Self {
        Self {
            cid: *commit.cid(),
            doc_id: commit.doc_id().clone(),
            collection_id: commit.collection_id(),
            height: commit.height(),
            field_name: commit.field_name().map(str::to_string),
            field_id: match commit.field_id() {
                Some(id) => id.to_string(),
                None => COMPOSITE_MARKER.to_string(),
            },
            schema_version_id: *commit.schema_version_id(),
            delta: commit.value().map(|value| value.to_json()),
            links: commit.links(),
            status: commit.status(),
        }
    }

    pub fn is_composite(&self) -> bool {
        self.field_id == COMPOSITE_MARKER
    }

    /// Render the record. `_count` counts the links.
    pub fn to_json(&self) -> Value {
        let doc_id = self.doc_id.to_string();
        json!({
            "cid": self.cid.to_string(),
            "docID": doc_id,
            "dockey": doc_id,
            "collectionID": self.collection_id.get(),
            "height": self.height,
            "fieldName": self.field_name,
            "fieldId": self.field_id,
            "schemaVersionId": self.schema_version_id.to_string(),
            "delta": self.delta,
            "links": self.links.iter().map(|link| json!({
                "cid": link.cid.to_string(),
                "name": link.name,
            })).collect::<Vec<_>>(),
            "_count": self.links.len(),
        })
    }
}

/// Commits sharing the same values of the grouped fields.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitGroup {
    /// grouped field name and shared value, in `groupBy` order
    pub key: Vec<(&'static str, Value)>,
    pub members: Vec<CommitRecord>,
}

impl CommitGroup {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Render the group: its key fields, `_group` and the member `_count`.
    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        for (name, value) in &self.key {
            object.insert(name.to_string(), value.clone());
        }
        object.insert(
            "_group".to_string(),
            Value::Array(self.members.iter().map(CommitRecord::to_json).collect()),
        );
        object.insert("_count".to_string(), Value::from(self.members.len()));
        Value::Object(object)
    }
}

/// The result of a commit query.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutput {
    Commits(Vec<CommitRecord>),
    Groups(Vec<CommitGroup>),
}

impl QueryOutput {
    /// number of commits, or of groups when grouped
    pub fn len(&self) -> usize {
        match self {
            QueryOutput::Commits(commits) => commits.len(),
            QueryOutput::Groups(groups) => groups.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The commits of an ungrouped result; empty for grouped results.
    pub fn commits(&self) -> &[CommitRecord] {
        match self {
            QueryOutput::Commits(commits) => commits,
            QueryOutput::Groups(_) => &[],
        }
    }

    pub fn groups(&self) -> &[CommitGroup] {
        match self {
            QueryOutput::Commits(_) => &[],
            QueryOutput::Groups(groups) => groups,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            QueryOutput::Commits(commits) => {
                Value::Array(commits.iter().map(CommitRecord::to_json).collect())
            }
            QueryOutput::Groups(groups) => Value::Array(groups.iter().map(CommitGroup::to_json).collect()),
        }
    }
}
