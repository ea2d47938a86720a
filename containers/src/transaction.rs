use crate::{sha256d, HashDigest};
use serde::{Deserialize, Serialize};

/// An opaque transaction. The node only needs its identity and size.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Transaction {
    pub version: u32,
    pub payload: Vec<u8>,
    pub locktime: u32,
}

impl Transaction {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.payload.len() + 8);
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&self.payload);
        out.extend_from_slice(&self.locktime.to_le_bytes());
        out
    }

    pub fn hash(&self) -> HashDigest {
        sha256d(&self.to_bytes())
    }
}
