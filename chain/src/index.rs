use std::sync::Arc;

use containers::{Block, Checkpoint, HashDigest, Height};

use crate::{BlockHandler, ChainError, HeaderHandler, TransactionHandler};

/// Read and notification surface of the chain store.
///
/// The index is the single writer of candidate and confirmed chain state.
/// All methods are callable from any thread.
pub trait ChainIndex: Send + Sync {
    /// Open the index and its subscribers. Returns false on failure.
    fn start(&self) -> bool;

    /// Stop accepting work and notify subscribers with `ServiceStopped`.
    fn stop(&self) -> bool;

    /// Release resources. Implies `stop`.
    fn close(&self) -> bool;

    fn stopped(&self) -> bool;

    /// Top of the candidate chain if `candidate`, otherwise of the confirmed
    /// chain. `None` means the index is unreadable.
    fn get_top(&self, candidate: bool) -> Option<Checkpoint>;

    /// Hash of the candidate header at `height` if its block has not been
    /// downloaded yet.
    fn get_downloadable(&self, height: Height) -> Option<HashDigest>;

    /// Hash of the candidate or confirmed entry at `height`.
    fn get_block_hash(&self, height: Height, candidate: bool) -> Option<HashDigest>;

    /// Height of the highest candidate whose block, and every block below it,
    /// is stored and valid.
    fn top_valid_candidate_height(&self) -> Height;

    /// Hand a downloaded block to the index.
    fn store(&self, block: Arc<Block>, height: Height) -> Result<(), ChainError>;

    fn subscribe_headers(&self, handler: HeaderHandler);

    fn subscribe_blocks(&self, handler: BlockHandler);

    fn subscribe_transactions(&self, handler: TransactionHandler);
}
