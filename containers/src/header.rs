use crate::{sha256d, HashDigest};
use serde::{Deserialize, Serialize};

/// Size of a serialized header in bytes.
pub const HEADER_SIZE: usize = 80;

/// A block header, the unit of the candidate chain.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Header {
    pub version: u32,
    pub previous_block_hash: HashDigest,
    pub merkle_root: HashDigest,
    pub timestamp: u32,
    pub bits: u32,
    pub nonce: u32,
}

impl Header {
    /// Little-endian wire serialization, fields in declaration order.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..4].copy_from_slice(&self.version.to_le_bytes());
        out[4..36].copy_from_slice(self.previous_block_hash.as_bytes());
        out[36..68].copy_from_slice(self.merkle_root.as_bytes());
        out[68..72].copy_from_slice(&self.timestamp.to_le_bytes());
        out[72..76].copy_from_slice(&self.bits.to_le_bytes());
        out[76..80].copy_from_slice(&self.nonce.to_le_bytes());
        out
    }

    pub fn hash(&self) -> HashDigest {
        sha256d(&self.to_bytes())
    }

    /// True if this header builds directly on `parent`.
    pub fn links_to(&self, parent: &Header) -> bool {
        self.previous_block_hash == parent.hash()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(nonce: u32, previous_block_hash: HashDigest) -> Header {
        Header {
            version: 1,
            previous_block_hash,
            nonce,
            ..Default::default()
        }
    }

    #[test]
    fn test_hash_changes_with_nonce() {
        let a = header(1, HashDigest::zero());
        let b = header(2, HashDigest::zero());
        assert_ne!(a.hash(), b.hash());
        assert_eq!(a.hash(), a.clone().hash());
    }

    #[test]
    fn test_serialized_layout() {
        let h = Header {
            version: 2,
            timestamp: 0x0102_0304,
            ..Default::default()
        };
        let bytes = h.to_bytes();
        assert_eq!(&bytes[0..4], &[2, 0, 0, 0]);
        assert_eq!(&bytes[68..72], &[4, 3, 2, 1]);
    }

    #[test]
    fn test_links_to() {
        let parent = header(0, HashDigest::zero());
        let child = header(0, parent.hash());
        assert!(child.links_to(&parent));
        assert!(!parent.links_to(&child));
    }
}
