use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NodeError {
    #[error("operation failed: {0}")]
    OperationFailed(String),

    #[error("service stopped")]
    ServiceStopped,

    #[error("chain corrupt: {0}")]
    ChainCorrupt(String),

    #[error("sync failure: {0}")]
    SyncFailure(String),

    #[error("stop failure: {0}")]
    StopFailure(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}
