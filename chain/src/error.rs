use containers::{HashDigest, Height};
use thiserror::Error;

/// Errors reported by the chain index, either as call results or as the
/// error half of a subscription event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("service stopped")]
    ServiceStopped,

    #[error("operation failed: {0}")]
    OperationFailed(String),

    #[error("store corrupted: {0}")]
    StoreCorrupted(String),

    #[error("block {hash} is not the candidate at height {height}")]
    NotCandidate { hash: HashDigest, height: Height },

    #[error("headers do not connect to the candidate chain at height {0}")]
    InvalidFork(Height),
}
