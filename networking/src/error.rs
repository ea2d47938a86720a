use chain::ChainError;
use containers::{HashDigest, Height};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    #[error("service stopped")]
    ServiceStopped,

    #[error("operation failed: {0}")]
    OperationFailed(String),

    #[error("no sessions attached")]
    NoSessions,

    #[error("no async runtime available")]
    NoRuntime,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("expected block {expected} at height {height}, received {actual}")]
    UnexpectedBlock {
        expected: HashDigest,
        actual: HashDigest,
        height: Height,
    },

    #[error("failed to store block at height {height}: {source}")]
    Store {
        height: Height,
        #[source]
        source: ChainError,
    },

    #[error("reservation at height {0} is not held by this session")]
    NotAssigned(Height),
}
