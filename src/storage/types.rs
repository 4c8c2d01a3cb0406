//! core type-safe identifiers shared by the storage layer and everything above it.

use std::fmt;
use std::fmt::Formatter;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::address::Cid;

/// the literal marker naming the composite chain of a document
pub const COMPOSITE_MARKER: &str = "C";

/// the link name pointing at the previous commit of the same chain
pub const HEAD_LINK_NAME: &str = "_head";

/// Numeric identifier of a field within a collection schema.
///
/// IDs start at 1; 0 is never assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldId(u32);

impl FieldId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Numeric identifier of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionId(u32);

impl CollectionId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One causal chain of a document: either a single field or the composite.
///
/// Sorts fields first (by ID) and the composite last, matching the order
/// of head keys in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Chain {
    Field(FieldId),
    Composite,
}

impl Chain {
    pub fn is_composite(&self) -> bool {
        matches!(self, Chain::Composite)
    }

    pub fn field_id(&self) -> Option<FieldId> {
        match self {
            Chain::Field(id) => Some(*id),
            Chain::Composite => None,
        }
    }
}

impl From<FieldId> for Chain {
    fn from(id: FieldId) -> Self {
        Chain::Field(id)
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Chain::Field(id) => write!(f, "{}", id),
            Chain::Composite => f.write_str(COMPOSITE_MARKER),
        }
    }
}

impl FromStr for Chain {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == COMPOSITE_MARKER {
            return Ok(Chain::Composite);
        }
        s.parse::<u32>().map(|id| Chain::Field(FieldId(id)))
    }
}

/// Current tip of a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Head {
    pub cid: Cid,
    pub height: u64,
}

impl Head {
    pub fn new(cid: Cid, height: u64) -> Self {
        Self { cid, height }
    }

    /// deterministic tie-break between two tips of the same chain
    ///
    /// the higher commit wins; equal heights fall back to the greater CID string
    pub fn supersedes(&self, other: &Head) -> bool {
        match self.height.cmp(&other.height) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Equal => self.cid > other.cid,
        }
    }
}

/// The tips of one chain.
///
/// A chain that only grew locally has a single tip. Merging a concurrent
/// commit from another replica leaves several, and the next local commit
/// links all of them. The tip picked by [`Head::supersedes`] carries the
/// value of the chain; the others stay reachable until that next commit.
///
/// Stored as `{cid, height}` of the winning tip, plus `concurrent` when
/// there is more than one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadSet {
    #[serde(flatten)]
    winner: Head,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    concurrent: Vec<Head>,
}

impl HeadSet {
    pub fn single(head: Head) -> Self {
        Self {
            winner: head,
            concurrent: Vec::new(),
        }
    }

    /// Build a set from tips that do not descend from one another.
    ///
    /// Duplicate CIDs collapse; an empty input has no set.
    pub fn from_tips(mut tips: Vec<Head>) -> Option<Self> {
        tips.sort_by(|a, b| a.cid.cmp(&b.cid));
        tips.dedup_by(|a, b| a.cid == b.cid);

        let winner = tips
            .iter()
            .copied()
            .reduce(|best, tip| if tip.supersedes(&best) { tip } else { best })?;
        tips.retain(|tip| tip.cid != winner.cid);
        Some(Self {
            winner,
            concurrent: tips,
        })
    }

    /// the tip whose commit holds the chain's value
    pub fn head(&self) -> Head {
        self.winner
    }

    /// The height of the highest tip; the next commit sits one above it.
    pub fn height(&self) -> u64 {
        self.winner.height
    }

    /// every tip, the winner first
    pub fn tips(&self) -> impl Iterator<Item = Head> + '_ {
        std::iter::once(self.winner).chain(self.concurrent.iter().copied())
    }

    pub fn cids(&self) -> Vec<Cid> {
        self.tips().map(|tip| tip.cid).collect()
    }

    pub fn contains(&self, cid: &Cid) -> bool {
        self.tips().any(|tip| tip.cid == *cid)
    }

    pub fn len(&self) -> usize {
        1 + self.concurrent.len()
    }

    pub fn is_concurrent(&self) -> bool {
        !self.concurrent.is_empty()
    }
}

impl From<Head> for HeadSet {
    fn from(head: Head) -> Self {
        HeadSet::single(head)
    }
}

/// Lifecycle status recorded on composite commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    #[default]
    Active,
    Deleted,
}

impl DocumentStatus {
    /// wire code used in canonical blocks
    pub fn code(&self) -> u8 {
        match self {
            DocumentStatus::Active => 1,
            DocumentStatus::Deleted => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(DocumentStatus::Active),
            2 => Some(DocumentStatus::Deleted),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            DocumentStatus::Active => f.write_str("Active"),
            DocumentStatus::Deleted => f.write_str("Deleted"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_display_and_parse() {
        assert_eq!(Chain::Composite.to_string(), "C");
        assert_eq!(Chain::Field(FieldId::new(3)).to_string(), "3");
        assert_eq!("C".parse::<Chain>().unwrap(), Chain::Composite);
        assert_eq!("7".parse::<Chain>().unwrap(), Chain::Field(FieldId::new(7)));
        assert!("name".parse::<Chain>().is_err());
    }

    #[test]
    fn test_chain_ordering_puts_composite_last() {
        let mut chains = vec![
            Chain::Composite,
            Chain::Field(FieldId::new(2)),
            Chain::Field(FieldId::new(1)),
        ];
        chains.sort();
        assert_eq!(
            chains,
            vec![
                Chain::Field(FieldId::new(1)),
                Chain::Field(FieldId::new(2)),
                Chain::Composite
            ]
        );
    }

    #[test]
    fn test_head_supersedes() {
        let a = Head::new(Cid::for_block(b"a"), 2);
        let b = Head::new(Cid::for_block(b"b"), 1);
        assert!(a.supersedes(&b));
        assert!(!b.supersedes(&a));

        let c = Head::new(Cid::for_block(b"c"), 2);
        // exactly one of two equal-height tips wins
        assert_ne!(a.supersedes(&c), c.supersedes(&a));
        assert!(!a.supersedes(&a));
    }

    #[test]
    fn test_head_set_picks_winner() {
        let low = Head::new(Cid::for_block(b"low"), 1);
        let a = Head::new(Cid::for_block(b"a"), 2);
        let b = Head::new(Cid::for_block(b"b"), 2);

        let set = HeadSet::from_tips(vec![a, low, b, a]).unwrap();
        assert_eq!(set.len(), 3);
        assert!(set.is_concurrent());
        assert_eq!(set.height(), 2);
        let expected = if a.supersedes(&b) { a } else { b };
        assert_eq!(set.head(), expected);
        assert_eq!(set.tips().next(), Some(expected));
        assert!(set.contains(&low.cid));

        // the same tips in any order give the same set
        assert_eq!(HeadSet::from_tips(vec![b, a, low]), Some(set));
        assert!(HeadSet::from_tips(Vec::new()).is_none());
    }

    #[test]
    fn test_head_set_record_format() {
        let head = Head::new(Cid::for_block(b"a"), 3);
        let json = serde_json::to_value(HeadSet::single(head)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"cid": head.cid.to_string(), "height": 3})
        );

        let other = Head::new(Cid::for_block(b"b"), 3);
        let set = HeadSet::from_tips(vec![head, other]).unwrap();
        let json = serde_json::to_string(&set).unwrap();
        assert!(json.contains("concurrent"));
        assert_eq!(serde_json::from_str::<HeadSet>(&json).unwrap(), set);
    }

    #[test]
    fn test_status_codes() {
        for status in [DocumentStatus::Active, DocumentStatus::Deleted] {
            assert_eq!(DocumentStatus::from_code(status.code()), Some(status));
        }
        assert_eq!(DocumentStatus::from_code(9), None);
    }
}
