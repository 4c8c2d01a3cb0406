//! Content identifiers for blocks and source data.
//!
//! Every identifier is a CIDv1 over a SHA2-256 multihash. Two codecs are in use:
//! - `dag-cbor` (0x71) for commit blocks
//! - `raw` (0x55) for DocID source data and schema descriptions

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use cid::multihash::Multihash;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::address::error::{AddressError, AddressResult};

/// multicodec code for SHA2-256
pub const SHA2_256: u64 = 0x12;

/// multicodec code for dag-cbor encoded blocks
pub const DAG_CBOR: u64 = 0x71;

/// multicodec code for raw bytes
pub const RAW: u64 = 0x55;

/// A content identifier.
///
/// Ordering and equality follow the canonical string form so that sorting
/// is identical on every replica regardless of how the CID was obtained.
#[derive(Clone, Copy)]
pub struct Cid(cid::Cid);

impl Cid {
    /// address a canonical commit block
    pub fn for_block(bytes: &[u8]) -> Self {
        Self::compute(DAG_CBOR, bytes)
    }

    /// address raw source bytes
    pub fn for_raw(bytes: &[u8]) -> Self {
        Self::compute(RAW, bytes)
    }

    fn compute(codec: u64, bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        // a 32 byte digest always fits the 64 byte multihash buffer
        let hash = Multihash::<64>::wrap(SHA2_256, &digest)
            .unwrap_or_else(|_| unreachable!("sha2-256 digest exceeds multihash size"));
        Self(cid::Cid::new_v1(codec, hash))
    }

    /// parse the multibase string form
    pub fn parse(value: &str) -> AddressResult<Self> {
        let inner = cid::Cid::try_from(value).map_err(|e| AddressError::invalid_cid(value, e))?;
        Ok(Self(inner))
    }

    /// decode the binary form
    pub fn from_bytes(bytes: &[u8]) -> AddressResult<Self> {
        let inner = cid::Cid::try_from(bytes)
            .map_err(|e| AddressError::invalid_cid(hex::encode(bytes), e))?;
        Ok(Self(inner))
    }

    /// the binary form
    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.to_bytes()
    }

    /// multicodec of the addressed content
    pub fn codec(&self) -> u64 {
        self.0.codec()
    }

    /// check that `bytes` hash to this identifier
    pub fn verifies(&self, bytes: &[u8]) -> bool {
        Self::compute(self.codec(), bytes) == *self
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cid({})", self.0)
    }
}

impl PartialEq for Cid {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Cid {}

impl Hash for Cid {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Hash::hash(&self.0, state);
    }
}

impl PartialOrd for Cid {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Cid {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_string().cmp(&other.to_string())
    }
}

impl FromStr for Cid {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Cid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Cid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
