use hex::FromHex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Position of a header or block in a chain, genesis is zero.
pub type Height = u64;

/// A 32-byte double SHA-256 digest identifying a header, block or transaction.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct HashDigest(pub [u8; 32]);

impl HashDigest {
    pub const fn zero() -> Self {
        HashDigest([0u8; 32])
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|byte| *byte == 0)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Byte-reversed copy, for converting to and from the conventional
    /// big-endian display order of block explorers.
    pub fn reversed(&self) -> Self {
        let mut bytes = self.0;
        bytes.reverse();
        HashDigest(bytes)
    }
}

/// Double SHA-256 over `data`.
pub fn sha256d(data: &[u8]) -> HashDigest {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    let mut out = [0u8; 32];
    out.copy_from_slice(&second);
    HashDigest(out)
}

impl FromStr for HashDigest {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes: [u8; 32] = <[u8; 32]>::from_hex(s.trim_start_matches("0x"))?;
        Ok(HashDigest(bytes))
    }
}

impl fmt::Display for HashDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for HashDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HashDigest({})", hex::encode(self.0))
    }
}

impl From<[u8; 32]> for HashDigest {
    fn from(bytes: [u8; 32]) -> Self {
        HashDigest(bytes)
    }
}

impl Serialize for HashDigest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for HashDigest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}
