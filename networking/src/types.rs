use std::fmt::{self, Display};

use async_trait::async_trait;
use containers::{Block, HashDigest, Height};
use serde::{Deserialize, Serialize};

/// Identity of a download worker, one per attached session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkerId(pub u64);

impl Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a session's peer connection was established.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    /// Configured peer, retried on failure.
    Manual,
    /// Accepted from a listening socket.
    Inbound,
    /// Dialed from the host pool.
    Outbound,
}

impl Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionKind::Manual => "manual",
            SessionKind::Inbound => "inbound",
            SessionKind::Outbound => "outbound",
        };
        f.write_str(name)
    }
}

/// Block fetching seam of the peer-wire layer.
///
/// Abstracts the network transport to allow testing with mocks.
#[async_trait]
pub trait BlockRequester: Send + Sync {
    /// Request the block `hash` at `height` on behalf of `worker`.
    ///
    /// Returns the block if the peer served it, or None if the request failed.
    async fn request_block(&self, worker: WorkerId, hash: HashDigest, height: Height)
    -> Option<Block>;
}
