//! Canonical block codec (codec v1).
//!
//! Blocks are deterministic CBOR:
//! - definite lengths only
//! - map keys ordered by length, then bytewise
//! - floats always as 64-bit, never NaN or infinite
//! - links as tag 42 over `0x00 ‖ cid-bytes`
//!
//! ```text
//! {
//!   "delta": { "crdt": "lww", "data": .., "docID": .., "fieldID": ..,
//!              "priority": .., "fieldName": .., "collectionID": ..,
//!              "schemaVersionID": .. }
//!          | { "crdt": "composite", "docID": .., "status": ..,
//!              "priority": .., "collectionID": .., "schemaVersionID": .. },
//!   "heads": [ link, .. ],                       (omitted when empty)
//!   "links": [ { "link": link, "name": .. }, .. ] (omitted when empty)
//! }
//! ```
//!
//! Any change to this layout changes every CID, so it needs a new `crdt`
//! discriminator rather than an edit in place.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::convert::Infallible;

use minicbor::data::{Tag, Type};
use minicbor::{Decoder, Encoder};
use serde_json::{Map, Number, Value};
use thiserror::Error;

use crate::address::{AddressError, Cid, DocId};
use crate::document::NormalValue;
use crate::storage::commit::{
    CommitLink, CompositeDelta, Delta, FieldDelta, COMPOSITE_CRDT, LWW_CRDT,
};
use crate::storage::types::{CollectionId, DocumentStatus, FieldId};

/// deepest JSON nesting accepted inside a field value
pub const MAX_NESTING: usize = 64;

const CID_TAG: u64 = 42;
const DATETIME_TAG: u64 = 0;

type Enc<'a> = Encoder<&'a mut Vec<u8>>;

/// A value that cannot be canonically encoded.
#[derive(Debug, Error)]
pub enum EncodingError {
    #[error("field {field}: non-finite float cannot be encoded")]
    NonFiniteFloat { field: String },

    #[error("field {field}: nesting depth {depth} exceeds {MAX_NESTING}")]
    NestingTooDeep { field: String, depth: usize },

    #[error("cbor encode: {0}")]
    Cbor(#[from] minicbor::encode::Error<Infallible>),
}

/// A block that is not a valid codec v1 encoding.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("indefinite-length CBOR not allowed")]
    IndefiniteLength,

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("unknown crdt type: {0}")]
    UnknownCrdt(String),

    #[error("duplicate map key: {0}")]
    DuplicateKey(String),

    #[error("nesting depth exceeds {MAX_NESTING}")]
    NestingTooDeep,

    #[error("trailing bytes after block")]
    TrailingBytes,

    #[error(transparent)]
    Address(#[from] AddressError),

    #[error("cbor decode: {0}")]
    Cbor(#[from] minicbor::decode::Error),
}

/// The parts of a decoded block.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedBlock {
    pub delta: Delta,
    pub heads: Vec<Cid>,
    pub links: Vec<CommitLink>,
}

/// Order of map keys in canonical encodings.
pub fn canonical_key_cmp(a: &str, b: &str) -> Ordering {
    a.len()
        .cmp(&b.len())
        .then_with(|| a.as_bytes().cmp(b.as_bytes()))
}

/// Encode a commit block. `heads` and `links` must already be sorted.
pub fn encode_block(
    delta: &Delta,
    heads: &[Cid],
    links: &[CommitLink],
) -> Result<Vec<u8>, EncodingError> {
    let mut buf = Vec::new();
    let mut enc = Encoder::new(&mut buf);

    let len = 1 + u64::from(!heads.is_empty()) + u64::from(!links.is_empty());
    enc.map(len)?;

    enc.str("delta")?;
    encode_delta(&mut enc, delta)?;

    if !heads.is_empty() {
        enc.str("heads")?;
        enc.array(heads.len() as u64)?;
        for head in heads {
            encode_cid(&mut enc, head)?;
        }
    }

    if !links.is_empty() {
        enc.str("links")?;
        enc.array(links.len() as u64)?;
        for link in links {
            enc.map(2)?;
            enc.str("link")?;
            encode_cid(&mut enc, &link.cid)?;
            enc.str("name")?;
            enc.str(&link.name)?;
        }
    }

    Ok(buf)
}

/// Encode the initial field map of a document; the raw CID of these bytes
/// is the DocID source.
pub fn encode_fields<'a, I>(fields: I) -> Result<Vec<u8>, EncodingError>
where
    I: IntoIterator<Item = (&'a str, &'a NormalValue)>,
{
    let mut entries: Vec<_> = fields.into_iter().collect();
    entries.sort_by(|a, b| canonical_key_cmp(a.0, b.0));

    let mut buf = Vec::new();
    let mut enc = Encoder::new(&mut buf);
    enc.map(entries.len() as u64)?;
    for (name, value) in entries {
        enc.str(name)?;
        encode_value(&mut enc, name, value)?;
    }
    Ok(buf)
}

fn encode_delta(enc: &mut Enc<'_>, delta: &Delta) -> Result<(), EncodingError> {
    match delta {
        Delta::Field(d) => {
            enc.map(8)?;
            enc.str("crdt")?.str(LWW_CRDT)?;
            enc.str("data")?;
            encode_value(enc, &d.field_name, &d.data)?;
            enc.str("docID")?.str(&d.doc_id.to_string())?;
            enc.str("fieldID")?.u32(d.field_id.get())?;
            enc.str("priority")?.u64(d.priority)?;
            enc.str("fieldName")?.str(&d.field_name)?;
            enc.str("collectionID")?.u32(d.collection_id.get())?;
            enc.str("schemaVersionID")?
                .str(&d.schema_version_id.to_string())?;
        }
        Delta::Composite(d) => {
            enc.map(6)?;
            enc.str("crdt")?.str(COMPOSITE_CRDT)?;
            enc.str("docID")?.str(&d.doc_id.to_string())?;
            enc.str("status")?.u8(d.status.code())?;
            enc.str("priority")?.u64(d.priority)?;
            enc.str("collectionID")?.u32(d.collection_id.get())?;
            enc.str("schemaVersionID")?
                .str(&d.schema_version_id.to_string())?;
        }
    }
    Ok(())
}

fn encode_cid(enc: &mut Enc<'_>, cid: &Cid) -> Result<(), EncodingError> {
    let raw = cid.to_bytes();
    let mut bytes = Vec::with_capacity(raw.len() + 1);
    bytes.push(0x00);
    bytes.extend_from_slice(&raw);
    enc.tag(Tag::new(CID_TAG))?.bytes(&bytes)?;
    Ok(())
}

fn encode_float(enc: &mut Enc<'_>, field: &str, value: f64) -> Result<(), EncodingError> {
    if !value.is_finite() {
        return Err(EncodingError::NonFiniteFloat {
            field: field.to_string(),
        });
    }
    enc.f64(value)?;
    Ok(())
}

fn encode_value(enc: &mut Enc<'_>, field: &str, value: &NormalValue) -> Result<(), EncodingError> {
    match value {
        NormalValue::Null => {
            enc.null()?;
        }
        NormalValue::Bool(b) => {
            enc.bool(*b)?;
        }
        NormalValue::Int(i) => {
            enc.i64(*i)?;
        }
        NormalValue::Float(f) => encode_float(enc, field, *f)?,
        NormalValue::String(s) => {
            enc.str(s)?;
        }
        NormalValue::Bytes(b) => {
            enc.bytes(b)?;
        }
        NormalValue::DateTime(s) => {
            enc.tag(Tag::new(DATETIME_TAG))?.str(s)?;
        }
        NormalValue::BoolArray(items) => {
            enc.array(items.len() as u64)?;
            for b in items {
                enc.bool(*b)?;
            }
        }
        NormalValue::IntArray(items) => {
            enc.array(items.len() as u64)?;
            for i in items {
                enc.i64(*i)?;
            }
        }
        NormalValue::FloatArray(items) => {
            enc.array(items.len() as u64)?;
            for f in items {
                encode_float(enc, field, *f)?;
            }
        }
        NormalValue::StringArray(items) => {
            enc.array(items.len() as u64)?;
            for s in items {
                enc.str(s)?;
            }
        }
        NormalValue::Json(json) => encode_json(enc, field, json, 0)?,
    }
    Ok(())
}

fn encode_json(
    enc: &mut Enc<'_>,
    field: &str,
    value: &Value,
    depth: usize,
) -> Result<(), EncodingError> {
    if depth > MAX_NESTING {
        return Err(EncodingError::NestingTooDeep {
            field: field.to_string(),
            depth,
        });
    }
    match value {
        Value::Null => {
            enc.null()?;
        }
        Value::Bool(b) => {
            enc.bool(*b)?;
        }
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                enc.i64(i)?;
            } else if let Some(u) = n.as_u64() {
                enc.u64(u)?;
            } else {
                encode_float(enc, field, n.as_f64().unwrap_or(f64::NAN))?;
            }
        }
        Value::String(s) => {
            enc.str(s)?;
        }
        Value::Array(items) => {
            enc.array(items.len() as u64)?;
            for item in items {
                encode_json(enc, field, item, depth + 1)?;
            }
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_by(|a, b| canonical_key_cmp(a, b));
            enc.map(keys.len() as u64)?;
            for key in keys {
                enc.str(key)?;
                encode_json(enc, field, &map[key.as_str()], depth + 1)?;
            }
        }
    }
    Ok(())
}

/// Decode a commit block.
pub fn decode_block(bytes: &[u8]) -> Result<DecodedBlock, DecodeError> {
    let mut dec = Decoder::new(bytes);
    let map_len = decode_map_len(&mut dec)?;

    let mut seen_keys = BTreeSet::new();
    let mut delta = None;
    let mut heads = Vec::new();
    let mut links = Vec::new();

    for _ in 0..map_len {
        let key = dec.str()?;
        ensure_unique_key(&mut seen_keys, key)?;
        match key {
            "delta" => delta = Some(decode_delta(&mut dec)?),
            "heads" => {
                let len = decode_array_len(&mut dec)?;
                for _ in 0..len {
                    heads.push(decode_cid(&mut dec, "heads")?);
                }
            }
            "links" => {
                let len = decode_array_len(&mut dec)?;
                for _ in 0..len {
                    links.push(decode_link(&mut dec)?);
                }
            }
            other => {
                return Err(DecodeError::InvalidField {
                    field: "block",
                    reason: format!("unexpected key {other:?}"),
                })
            }
        }
    }
    if dec.datatype().is_ok() {
        return Err(DecodeError::TrailingBytes);
    }

    Ok(DecodedBlock {
        delta: delta.ok_or(DecodeError::MissingField("delta"))?,
        heads,
        links,
    })
}

fn decode_delta(dec: &mut Decoder<'_>) -> Result<Delta, DecodeError> {
    let map_len = decode_map_len(dec)?;

    let mut seen_keys = BTreeSet::new();
    let mut crdt: Option<String> = None;
    let mut data = None;
    let mut doc_id = None;
    let mut field_id = None;
    let mut priority = None;
    let mut field_name = None;
    let mut collection_id = None;
    let mut schema_version_id = None;
    let mut status = None;

    for _ in 0..map_len {
        let key = dec.str()?;
        ensure_unique_key(&mut seen_keys, key)?;
        match key {
            "crdt" => crdt = Some(dec.str()?.to_string()),
            "data" => data = Some(decode_value(dec)?),
            "docID" => doc_id = Some(DocId::parse(dec.str()?)?),
            "fieldID" => field_id = Some(FieldId::new(dec.u32()?)),
            "priority" => priority = Some(dec.u64()?),
            "fieldName" => field_name = Some(dec.str()?.to_string()),
            "collectionID" => collection_id = Some(CollectionId::new(dec.u32()?)),
            "schemaVersionID" => schema_version_id = Some(Cid::parse(dec.str()?)?),
            "status" => {
                let code = dec.u8()?;
                status = Some(DocumentStatus::from_code(code).ok_or_else(|| {
                    DecodeError::InvalidField {
                        field: "status",
                        reason: format!("unknown status code {code}"),
                    }
                })?);
            }
            other => {
                return Err(DecodeError::InvalidField {
                    field: "delta",
                    reason: format!("unexpected key {other:?}"),
                })
            }
        }
    }

    let doc_id = doc_id.ok_or(DecodeError::MissingField("docID"))?;
    let collection_id = collection_id.ok_or(DecodeError::MissingField("collectionID"))?;
    let schema_version_id = schema_version_id.ok_or(DecodeError::MissingField("schemaVersionID"))?;
    let priority = priority.ok_or(DecodeError::MissingField("priority"))?;

    match crdt.as_deref() {
        Some(LWW_CRDT) => Ok(Delta::Field(FieldDelta {
            doc_id,
            collection_id,
            schema_version_id,
            field_id: field_id.ok_or(DecodeError::MissingField("fieldID"))?,
            field_name: field_name.ok_or(DecodeError::MissingField("fieldName"))?,
            priority,
            data: data.ok_or(DecodeError::MissingField("data"))?,
        })),
        Some(COMPOSITE_CRDT) => Ok(Delta::Composite(CompositeDelta {
            doc_id,
            collection_id,
            schema_version_id,
            priority,
            status: status.ok_or(DecodeError::MissingField("status"))?,
        })),
        Some(other) => Err(DecodeError::UnknownCrdt(other.to_string())),
        None => Err(DecodeError::MissingField("crdt")),
    }
}

fn decode_link(dec: &mut Decoder<'_>) -> Result<CommitLink, DecodeError> {
    let map_len = decode_map_len(dec)?;
    let mut seen_keys = BTreeSet::new();
    let mut cid = None;
    let mut name = None;
    for _ in 0..map_len {
        let key = dec.str()?;
        ensure_unique_key(&mut seen_keys, key)?;
        match key {
            "link" => cid = Some(decode_cid(dec, "link")?),
            "name" => name = Some(dec.str()?.to_string()),
            other => {
                return Err(DecodeError::InvalidField {
                    field: "links",
                    reason: format!("unexpected key {other:?}"),
                })
            }
        }
    }
    Ok(CommitLink {
        name: name.ok_or(DecodeError::MissingField("name"))?,
        cid: cid.ok_or(DecodeError::MissingField("link"))?,
    })
}

fn decode_cid(dec: &mut Decoder<'_>, field: &'static str) -> Result<Cid, DecodeError> {
    let tag = dec.tag()?;
    if tag.as_u64() != CID_TAG {
        return Err(DecodeError::InvalidField {
            field,
            reason: format!("expected tag {CID_TAG}, got {}", tag.as_u64()),
        });
    }
    match dec.bytes()? {
        [0x00, rest @ ..] => Ok(Cid::from_bytes(rest)?),
        _ => Err(DecodeError::InvalidField {
            field,
            reason: "missing identity multibase prefix".to_string(),
        }),
    }
}

fn decode_value(dec: &mut Decoder<'_>) -> Result<NormalValue, DecodeError> {
    match dec.datatype()? {
        Type::Tag => {
            let tag = dec.tag()?;
            if tag.as_u64() != DATETIME_TAG {
                return Err(DecodeError::InvalidField {
                    field: "data",
                    reason: format!("unexpected tag {}", tag.as_u64()),
                });
            }
            Ok(NormalValue::DateTime(dec.str()?.to_string()))
        }
        Type::Bytes => Ok(NormalValue::Bytes(dec.bytes()?.to_vec())),
        _ => Ok(NormalValue::from_untyped(decode_json(dec, 0)?)),
    }
}

fn decode_json(dec: &mut Decoder<'_>, depth: usize) -> Result<Value, DecodeError> {
    if depth > MAX_NESTING {
        return Err(DecodeError::NestingTooDeep);
    }
    let value = match dec.datatype()? {
        Type::Null => {
            dec.null()?;
            Value::Null
        }
        Type::Bool => Value::Bool(dec.bool()?),
        Type::U8 | Type::U16 | Type::U32 | Type::U64 => Value::from(dec.u64()?),
        Type::I8 | Type::I16 | Type::I32 | Type::I64 => Value::from(dec.i64()?),
        Type::F64 => {
            let f = dec.f64()?;
            Value::Number(Number::from_f64(f).ok_or_else(|| DecodeError::InvalidField {
                field: "data",
                reason: "non-finite float".to_string(),
            })?)
        }
        Type::String => Value::String(dec.str()?.to_string()),
        Type::Array => {
            let len = decode_array_len(dec)?;
            let mut items = Vec::with_capacity(len.min(1024) as usize);
            for _ in 0..len {
                items.push(decode_json(dec, depth + 1)?);
            }
            Value::Array(items)
        }
        Type::Map => {
            let len = decode_map_len(dec)?;
            let mut map = Map::new();
            for _ in 0..len {
                let key = dec.str()?.to_string();
                if map.contains_key(&key) {
                    return Err(DecodeError::DuplicateKey(key));
                }
                let value = decode_json(dec, depth + 1)?;
                map.insert(key, value);
            }
            Value::Object(map)
        }
        Type::ArrayIndef | Type::MapIndef | Type::BytesIndef | Type::StringIndef => {
            return Err(DecodeError::IndefiniteLength)
        }
        other => {
            return Err(DecodeError::InvalidField {
                field: "data",
                reason: format!("unsupported cbor type {other:?}"),
            })
        }
    };
    Ok(value)
}

fn decode_map_len(dec: &mut Decoder<'_>) -> Result<u64, DecodeError> {
    dec.map()?.ok_or(DecodeError::IndefiniteLength)
}

fn decode_array_len(dec: &mut Decoder<'_>) -> Result<u64, DecodeError> {
    dec.array()?.ok_or(DecodeError::IndefiniteLength)
}

fn ensure_unique_key<'a>(seen: &mut BTreeSet<&'a str>, key: &'a str) -> Result<(), DecodeError> {
    if !seen.insert(key) {
        return Err(DecodeError::DuplicateKey(key.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn setup_field_delta(data: NormalValue) -> Delta {
        Delta::Field(FieldDelta {
            doc_id: DocId::new(Cid::for_raw(b"doc")),
            collection_id: CollectionId::new(1),
            schema_version_id: Cid::for_raw(b"schema"),
            field_id: FieldId::new(2),
            field_name: "name".to_string(),
            priority: 1,
            data,
        })
    }

    fn reencode(bytes: &[u8]) -> Vec<u8> {
        let decoded = decode_block(bytes).unwrap();
        encode_block(&decoded.delta, &decoded.heads, &decoded.links).unwrap()
    }

    #[test]
    fn test_canonical_key_order() {
        let mut keys = vec!["schemaVersionID", "priority", "data", "crdt", "docID", "fieldID"];
        keys.sort_by(|a, b| canonical_key_cmp(a, b));
        assert_eq!(
            keys,
            vec!["crdt", "data", "docID", "fieldID", "priority", "schemaVersionID"]
        );
    }

    #[test]
    fn test_decode_then_encode_is_byte_identical() {
        let values = vec![
            NormalValue::Null,
            NormalValue::Bool(true),
            NormalValue::Int(-7),
            NormalValue::Float(1.5),
            NormalValue::String("John".into()),
            NormalValue::Bytes(vec![1, 2, 3]),
            NormalValue::DateTime("2017-07-23T03:00:00Z".into()),
            NormalValue::IntArray(vec![1, 2]),
            NormalValue::FloatArray(vec![0.5]),
            NormalValue::StringArray(vec!["a".into(), "b".into()]),
            NormalValue::Json(json!({"b": [1, {"z": null}], "aa": 2.5})),
        ];
        for value in values {
            let heads = vec![Cid::for_block(b"prev")];
            let links = vec![CommitLink::new("x", Cid::for_block(b"x"))];
            let bytes = encode_block(&setup_field_delta(value.clone()), &heads, &links).unwrap();
            assert_eq!(reencode(&bytes), bytes, "{value:?}");
        }
    }

    #[test]
    fn test_typed_values_survive_decoding() {
        for value in [
            NormalValue::Int(21),
            NormalValue::Float(2.0),
            NormalValue::String("x".into()),
            NormalValue::BoolArray(vec![true, false]),
            NormalValue::DateTime("2017-07-23T03:00:00Z".into()),
        ] {
            let bytes = encode_block(&setup_field_delta(value.clone()), &[], &[]).unwrap();
            let decoded = decode_block(&bytes).unwrap();
            match decoded.delta {
                Delta::Field(d) => assert_eq!(d.data, value),
                other => panic!("unexpected delta {other:?}"),
            }
        }
    }

    #[test]
    fn test_json_map_keys_are_sorted() {
        let a = encode_block(
            &setup_field_delta(NormalValue::Json(json!({"bb": 1, "a": 2, "c": 3}))),
            &[],
            &[],
        )
        .unwrap();
        let b = encode_block(
            &setup_field_delta(NormalValue::Json(json!({"c": 3, "a": 2, "bb": 1}))),
            &[],
            &[],
        )
        .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_non_finite_float_rejected() {
        let err = encode_block(&setup_field_delta(NormalValue::Float(f64::NAN)), &[], &[])
            .unwrap_err();
        assert!(matches!(err, EncodingError::NonFiniteFloat { ref field } if field == "name"));

        let err = encode_block(
            &setup_field_delta(NormalValue::FloatArray(vec![1.0, f64::INFINITY])),
            &[],
            &[],
        )
        .unwrap_err();
        assert!(matches!(err, EncodingError::NonFiniteFloat { .. }));
    }

    #[test]
    fn test_deep_nesting_rejected() {
        let mut value = json!(1);
        for _ in 0..=MAX_NESTING + 1 {
            value = json!([value]);
        }
        let err = encode_block(&setup_field_delta(NormalValue::Json(value)), &[], &[])
            .unwrap_err();
        assert!(matches!(err, EncodingError::NestingTooDeep { .. }));
    }

    #[test]
    fn test_composite_block() {
        let delta = Delta::Composite(CompositeDelta {
            doc_id: DocId::new(Cid::for_raw(b"doc")),
            collection_id: CollectionId::new(3),
            schema_version_id: Cid::for_raw(b"schema"),
            priority: 4,
            status: DocumentStatus::Deleted,
        });
        let bytes = encode_block(&delta, &[Cid::for_block(b"p")], &[]).unwrap();
        let decoded = decode_block(&bytes).unwrap();
        assert_eq!(decoded.delta, delta);
        assert_eq!(decoded.heads, vec![Cid::for_block(b"p")]);
        assert!(decoded.links.is_empty());
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(decode_block(b"\x01\x02").is_err());

        let mut bytes = encode_block(&setup_field_delta(NormalValue::Int(1)), &[], &[]).unwrap();
        bytes.push(0x00);
        assert!(matches!(decode_block(&bytes), Err(DecodeError::TrailingBytes)));
    }

    #[test]
    fn test_encode_fields_ignores_input_order() {
        let name = NormalValue::String("John".into());
        let age = NormalValue::Int(21);
        let a = encode_fields([("name", &name), ("age", &age)]).unwrap();
        let b = encode_fields([("age", &age), ("name", &name)]).unwrap();
        assert_eq!(a, b);
    }
}
