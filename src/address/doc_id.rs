//! Stable per-document identifiers.
//!
//! A DocID is derived once from the CID of the document's first committed
//! content and never changes afterwards. The text form is
//! `multibase32(varint(version))-<uuid>`, which for version 1 renders as
//! `bae-xxxxxxxx-xxxx-5xxx-xxxx-xxxxxxxxxxxx`.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use multibase::Base;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::address::content_id::Cid;
use crate::address::error::{AddressError, AddressResult};

/// Namespace for the UUIDv5 derivation of DocIDs.
pub const DOC_ID_NAMESPACE: Uuid = Uuid::from_u128(0xc94a_cbfa_dd53_40d0_97f3_29ce_16c3_33fc);

/// the only DocID version currently produced
pub const DOC_ID_V1: u64 = 1;

const SUPPORTED_VERSIONS: &[u64] = &[DOC_ID_V1];

/// A document identifier.
///
/// `source_cid` is only known for identifiers derived locally; a parsed
/// DocID carries `None`. Equality and hashing ignore it.
#[derive(Debug, Clone)]
pub struct DocId {
    version: u64,
    uuid: Uuid,
    source_cid: Option<Cid>,
}

impl DocId {
    /// derive a DocID from the CID of the document's source content
    pub fn new(source_cid: Cid) -> Self {
        let uuid = Uuid::new_v5(&DOC_ID_NAMESPACE, source_cid.to_string().as_bytes());
        Self {
            version: DOC_ID_V1,
            uuid,
            source_cid: Some(source_cid),
        }
    }

    /// parse the text form
    pub fn parse(value: &str) -> AddressResult<Self> {
        let (prefix, uuid) = value
            .split_once('-')
            .ok_or_else(|| AddressError::malformed(value))?;

        let (_, version_bytes) =
            multibase::decode(prefix).map_err(|_| AddressError::malformed(value))?;
        let (version, rest) = unsigned_varint::decode::u64(&version_bytes)
            .map_err(|_| AddressError::malformed(value))?;
        if !rest.is_empty() {
            return Err(AddressError::malformed(value));
        }
        if !SUPPORTED_VERSIONS.contains(&version) {
            return Err(AddressError::InvalidDocIdVersion {
                version,
                value: value.to_string(),
            });
        }

        let uuid = Uuid::parse_str(uuid).map_err(|_| AddressError::malformed(value))?;
        Ok(Self {
            version,
            uuid,
            source_cid: None,
        })
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn source_cid(&self) -> Option<&Cid> {
        self.source_cid.as_ref()
    }

    fn version_prefix(&self) -> String {
        let mut buf = unsigned_varint::encode::u64_buffer();
        let bytes = unsigned_varint::encode::u64(self.version, &mut buf);
        multibase::encode(Base::Base32Lower, bytes)
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.version_prefix(), self.uuid.hyphenated())
    }
}

impl PartialEq for DocId {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version && self.uuid == other.uuid
    }
}

impl Eq for DocId {}

impl Hash for DocId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.version.hash(state);
        self.uuid.hash(state);
    }
}

impl PartialOrd for DocId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DocId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.to_string().cmp(&other.to_string())
    }
}

impl FromStr for DocId {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for DocId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DocId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derivation_is_deterministic() {
        let source = Cid::for_raw(b"{\"age\":21,\"name\":\"John\"}");
        let a = DocId::new(source);
        let b = DocId::new(source);

        assert_eq!(a, b);
        assert_eq!(a.to_string(), b.to_string());
        assert_eq!(a.source_cid(), Some(&source));
    }

    #[test]
    fn test_text_form() {
        let id = DocId::new(Cid::for_raw(b"content"));
        let text = id.to_string();

        assert!(text.starts_with("bae-"));
        assert_eq!(text.len(), "bae-".len() + 36);
        assert_eq!(id.uuid().get_version_num(), 5);
    }

    #[test]
    fn test_round_trip() {
        let id = DocId::new(Cid::for_raw(b"content"));
        let parsed = DocId::parse(&id.to_string()).unwrap();

        assert_eq!(parsed.to_string(), id.to_string());
        assert_eq!(parsed, id);
        assert!(parsed.source_cid().is_none());
    }

    #[test]
    fn test_malformed() {
        for bad in ["", "bae", "baec9fb0fa4", "zzz-not-a-uuid", "bae-not-a-uuid"] {
            let err = DocId::parse(bad).unwrap_err();
            assert!(
                matches!(err, AddressError::MalformedDocId { .. }),
                "{bad} -> {err:?}"
            );
        }
    }

    #[test]
    fn test_unknown_version() {
        // varint(2) in base32 lower
        let err = DocId::parse("bai-c9fb0fa4-1195-589c-aa54-e68333fb90b3").unwrap_err();
        assert_eq!(
            err,
            AddressError::InvalidDocIdVersion {
                version: 2,
                value: "bai-c9fb0fa4-1195-589c-aa54-e68333fb90b3".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_known_literal() {
        let id = DocId::parse("bae-c9fb0fa4-1195-589c-aa54-e68333fb90b3").unwrap();
        assert_eq!(id.version(), DOC_ID_V1);
        assert_eq!(id.to_string(), "bae-c9fb0fa4-1195-589c-aa54-e68333fb90b3");
    }
}
