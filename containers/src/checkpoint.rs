use crate::{HashDigest, Height};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents a position in the chain's history.
///
/// A checkpoint combines a block identifier with its height. The node keeps
/// two of them: the top confirmed block and the top candidate header.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Checkpoint {
    /// The hash of the checkpoint's header.
    pub hash: HashDigest,
    /// The height of the checkpoint's header.
    pub height: Height,
}

impl Checkpoint {
    pub fn new(hash: HashDigest, height: Height) -> Self {
        Self { hash, height }
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hash, self.height)
    }
}
