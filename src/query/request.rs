//! Arguments of a commit query.
//!
//! [`CommitQuery`] deserializes from the arguments of the `commits` query,
//! e.g. `{"docID": "bae-...", "order": {"height": "DESC"}, "groupBy": ["height"]}`.
//! An explicit `null` means the same as leaving the argument out.

use std::fmt;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::address::{Cid, DocId};
use crate::query::error::{QueryError, QueryResult};
use crate::storage::{FieldId, COMPOSITE_MARKER};

/// The arguments of a commit query. Every argument is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommitQuery {
    #[serde(default)]
    pub cid: Option<String>,

    #[serde(default, rename = "docID", alias = "dockey")]
    pub doc_id: Option<String>,

    /// field by name, by numeric ID, or `"C"` for the composite chain
    #[serde(default)]
    pub field: Option<FieldSelector>,

    #[serde(default, rename = "fieldId", alias = "fieldID")]
    pub field_id: Option<FieldSelector>,

    /// generations to walk from each head; absent means the full history
    #[serde(default)]
    pub depth: Option<u64>,

    #[serde(default, deserialize_with = "deserialize_order")]
    pub order: Vec<OrderBy>,

    #[serde(default, rename = "groupBy", deserialize_with = "null_as_default")]
    pub group_by: Vec<GroupField>,

    #[serde(default)]
    pub limit: Option<usize>,

    #[serde(default)]
    pub offset: Option<usize>,
}

impl CommitQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse query arguments from JSON.
    pub fn from_json(args: &Value) -> QueryResult<Self> {
        serde_json::from_value(args.clone()).map_err(|e| QueryError::invalid("commits", e))
    }

    pub fn with_cid(mut self, cid: &Cid) -> Self {
        self.cid = Some(cid.to_string());
        self
    }

    pub fn with_doc_id(mut self, doc_id: &DocId) -> Self {
        self.doc_id = Some(doc_id.to_string());
        self
    }

    pub fn with_field(mut self, field: FieldSelector) -> Self {
        self.field = Some(field);
        self
    }

    pub fn with_depth(mut self, depth: u64) -> Self {
        self.depth = Some(depth);
        self
    }

    pub fn order_by(mut self, field: OrderField, direction: Direction) -> Self {
        self.order.push(OrderBy { field, direction });
        self
    }

    pub fn group_by(mut self, field: GroupField) -> Self {
        self.group_by.push(field);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub(crate) fn parsed_cid(&self) -> QueryResult<Option<Cid>> {
        Ok(self.cid.as_deref().map(Cid::parse).transpose()?)
    }

    pub(crate) fn parsed_doc_id(&self) -> QueryResult<Option<DocId>> {
        Ok(self.doc_id.as_deref().map(DocId::parse).transpose()?)
    }
}

/// Selects one chain of a document.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RawSelector")]
pub enum FieldSelector {
    Composite,
    Id(FieldId),
    Name(String),
}

impl FieldSelector {
    /// `"C"` is the composite chain, digits are a field ID, anything else a name.
    pub fn parse(raw: &str) -> Self {
        if raw == COMPOSITE_MARKER {
            return FieldSelector::Composite;
        }
        match raw.parse::<u32>() {
            Ok(id) => FieldSelector::Id(FieldId::new(id)),
            Err(_) => FieldSelector::Name(raw.to_string()),
        }
    }
}

impl fmt::Display for FieldSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldSelector::Composite => f.write_str(COMPOSITE_MARKER),
            FieldSelector::Id(id) => write!(f, "{id}"),
            FieldSelector::Name(name) => f.write_str(name),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawSelector {
    Id(u32),
    Text(String),
}

impl From<RawSelector> for FieldSelector {
    fn from(raw: RawSelector) -> Self {
        match raw {
            RawSelector::Id(id) => FieldSelector::Id(FieldId::new(id)),
            RawSelector::Text(text) => FieldSelector::parse(&text),
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Asc,
    Desc,
}

/// Fields a commit query can be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderField {
    Height,
    Cid,
    DocId,
}

/// One ordering term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderBy {
    pub field: OrderField,
    pub direction: Direction,
}

/// Fields a commit query can be grouped by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum GroupField {
    #[serde(rename = "height")]
    Height,
    #[serde(rename = "cid")]
    Cid,
    #[serde(rename = "docID", alias = "dockey")]
    DocId,
    #[serde(rename = "fieldName")]
    FieldName,
    #[serde(rename = "fieldId", alias = "fieldID")]
    FieldId,
    #[serde(rename = "collectionID")]
    CollectionId,
}

impl GroupField {
    /// the key of this field in rendered results
    pub fn name(&self) -> &'static str {
        match self {
            GroupField::Height => "height",
            GroupField::Cid => "cid",
            GroupField::DocId => "docID",
            GroupField::FieldName => "fieldName",
            GroupField::FieldId => "fieldId",
            GroupField::CollectionId => "collectionID",
        }
    }
}

// `{height: DESC}` as in GraphQL; keys of one object apply in the order
// height, cid, docID. A list of objects gives an explicit order.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct OrderArgs {
    #[serde(default)]
    height: Option<Direction>,
    #[serde(default)]
    cid: Option<Direction>,
    #[serde(default, rename = "docID", alias = "dockey")]
    doc_id: Option<Direction>,
}

impl OrderArgs {
    fn terms(self) -> impl Iterator<Item = OrderBy> {
        [
            (OrderField::Height, self.height),
            (OrderField::Cid, self.cid),
            (OrderField::DocId, self.doc_id),
        ]
        .into_iter()
        .filter_map(|(field, direction)| direction.map(|direction| OrderBy { field, direction }))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(OrderArgs),
    Many(Vec<OrderArgs>),
}

fn deserialize_order<'de, D>(deserializer: D) -> Result<Vec<OrderBy>, D::Error>
where
    D: Deserializer<'de>,
{
    let terms = match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(args)) => args.terms().collect(),
        Some(OneOrMany::Many(list)) => list.into_iter().flat_map(OrderArgs::terms).collect(),
    };
    Ok(terms)
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
