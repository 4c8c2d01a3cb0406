//! Key layout of the datastore.
//!
//! ```text
//! /blocks/<cid>                                        canonical block bytes
//! /heads/<docID>/<fieldID|C>                           head record {cid, height}
//! /index/height/<docID>/<height:020>/<cid>             empty
//! /index/collection/<collectionID:010>/<docID>/<cid>   empty
//! /collection/<id:010>                                 collection description
//! /collection-name/<name>                              collection id
//! /sequence/collection                                 last assigned collection id
//! ```
//!
//! Numeric segments are zero padded so that lexicographic key order equals
//! numeric order. Field IDs in head keys are padded to ten digits, which keeps
//! every field chain ahead of the composite marker `C`.

use std::fmt;

use crate::address::{Cid, DocId};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::{Chain, CollectionId, COMPOSITE_MARKER};

const BLOCKS: &str = "/blocks/";
const HEADS: &str = "/heads/";
const HEIGHT_INDEX: &str = "/index/height/";
const COLLECTION_INDEX: &str = "/index/collection/";
const COLLECTIONS: &str = "/collection/";
const COLLECTION_NAMES: &str = "/collection-name/";
const COLLECTION_SEQUENCE: &str = "/sequence/collection";

/// An ordered datastore key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key(String);

impl Key {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn starts_with(&self, prefix: &Key) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// the path segments after `prefix`, if the key lives under it
    pub fn segments_after<'a>(&'a self, prefix: &Key) -> Option<Vec<&'a str>> {
        self.0
            .strip_prefix(&prefix.0)
            .map(|rest| rest.split('/').filter(|s| !s.is_empty()).collect())
    }

    // -- blocks --

    pub fn block(cid: &Cid) -> Self {
        Self(format!("{BLOCKS}{cid}"))
    }

    // -- heads --

    pub fn head(doc_id: &DocId, chain: Chain) -> Self {
        Self(format!("{HEADS}{doc_id}/{}", chain_segment(chain)))
    }

    pub fn doc_heads_prefix(doc_id: &DocId) -> Self {
        Self(format!("{HEADS}{doc_id}/"))
    }

    pub fn all_heads_prefix() -> Self {
        Self(HEADS.to_string())
    }

    /// split a head key back into its document and chain
    pub fn parse_head(&self) -> StorageResult<(DocId, Chain)> {
        let segments = self
            .segments_after(&Self::all_heads_prefix())
            .ok_or_else(|| self.invalid("not a head key"))?;
        let [doc, chain] = segments.as_slice() else {
            return Err(self.invalid("expected /heads/<docID>/<chain>"));
        };
        let doc_id = DocId::parse(doc)?;
        let chain = chain
            .parse::<Chain>()
            .map_err(|e| self.invalid(&e.to_string()))?;
        Ok((doc_id, chain))
    }

    // -- secondary indexes --

    pub fn height_index(doc_id: &DocId, height: u64, cid: &Cid) -> Self {
        Self(format!("{HEIGHT_INDEX}{doc_id}/{height:020}/{cid}"))
    }

    pub fn height_index_prefix(doc_id: &DocId, height: u64) -> Self {
        Self(format!("{HEIGHT_INDEX}{doc_id}/{height:020}/"))
    }

    pub fn collection_index(collection: CollectionId, doc_id: &DocId, cid: &Cid) -> Self {
        Self(format!(
            "{COLLECTION_INDEX}{:010}/{doc_id}/{cid}",
            collection.get()
        ))
    }

    pub fn collection_index_prefix(collection: CollectionId) -> Self {
        Self(format!("{COLLECTION_INDEX}{:010}/", collection.get()))
    }

    /// the CID at the end of an index key
    pub fn trailing_cid(&self) -> StorageResult<Cid> {
        let last = self
            .0
            .rsplit('/')
            .next()
            .ok_or_else(|| self.invalid("missing cid segment"))?;
        Ok(Cid::parse(last)?)
    }

    // -- catalog --

    pub fn collection(id: CollectionId) -> Self {
        Self(format!("{COLLECTIONS}{:010}", id.get()))
    }

    pub fn collections_prefix() -> Self {
        Self(COLLECTIONS.to_string())
    }

    pub fn collection_name(name: &str) -> Self {
        Self(format!("{COLLECTION_NAMES}{name}"))
    }

    pub fn collection_sequence() -> Self {
        Self(COLLECTION_SEQUENCE.to_string())
    }

    fn invalid(&self, reason: &str) -> StorageError {
        StorageError::InvalidKey {
            key: self.0.clone(),
            reason: reason.to_string(),
        }
    }
}

fn chain_segment(chain: Chain) -> String {
    match chain {
        Chain::Field(id) => format!("{:010}", id.get()),
        Chain::Composite => COMPOSITE_MARKER.to_string(),
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::FieldId;

    fn setup_doc() -> DocId {
        DocId::new(Cid::for_raw(b"doc"))
    }

    #[test]
    fn test_head_key_round_trip() {
        let doc = setup_doc();
        for chain in [Chain::Composite, Chain::Field(FieldId::new(12))] {
            let key = Key::head(&doc, chain);
            assert!(key.starts_with(&Key::doc_heads_prefix(&doc)));
            assert_eq!(key.parse_head().unwrap(), (doc.clone(), chain));
        }
    }

    #[test]
    fn test_field_heads_sort_before_composite() {
        let doc = setup_doc();
        let composite = Key::head(&doc, Chain::Composite);
        let field_2 = Key::head(&doc, Chain::Field(FieldId::new(2)));
        let field_10 = Key::head(&doc, Chain::Field(FieldId::new(10)));

        assert!(field_2 < field_10);
        assert!(field_10 < composite);
    }

    #[test]
    fn test_height_index_orders_numerically() {
        let doc = setup_doc();
        let cid = Cid::for_block(b"x");
        assert!(Key::height_index(&doc, 9, &cid) < Key::height_index(&doc, 10, &cid));
        assert!(Key::height_index(&doc, 3, &cid).starts_with(&Key::height_index_prefix(&doc, 3)));
    }

    #[test]
    fn test_trailing_cid() {
        let doc = setup_doc();
        let cid = Cid::for_block(b"x");
        let key = Key::collection_index(CollectionId::new(1), &doc, &cid);
        assert_eq!(key.trailing_cid().unwrap(), cid);
    }

    #[test]
    fn test_parse_head_rejects_other_keys() {
        let key = Key::block(&Cid::for_block(b"x"));
        assert!(matches!(
            key.parse_head(),
            Err(StorageError::InvalidKey { .. })
        ));
    }
}
