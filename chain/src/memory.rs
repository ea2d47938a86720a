//! In-memory chain index.
//!
//! Keeps the candidate header chain, the confirmed block chain and the set
//! of downloaded blocks in memory. It applies no consensus rules: a block is
//! valid once it matches its candidate header. Used by tests and by the
//! loopback simulation of the node binary.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use containers::{Block, Checkpoint, HashDigest, Header, Height, Transaction};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use crate::{
    BlockHandler, BlockReorganization, ChainError, ChainIndex, HeaderHandler,
    HeaderReorganization, Subscriber, TransactionHandler,
};

#[derive(Debug)]
struct State {
    /// Candidate headers indexed by height.
    candidate: Vec<Arc<Header>>,
    /// Confirmed blocks indexed by height.
    confirmed: Vec<Arc<Block>>,
    /// Every downloaded block, confirmed or not.
    blocks: HashMap<HashDigest, Arc<Block>>,
    top_valid_candidate: Height,
}

impl State {
    fn new(genesis: Block) -> Self {
        let genesis = Arc::new(genesis);
        let mut blocks = HashMap::new();
        blocks.insert(genesis.hash(), genesis.clone());

        Self {
            candidate: vec![Arc::new(genesis.header.clone())],
            confirmed: vec![genesis],
            blocks,
            top_valid_candidate: 0,
        }
    }

    fn candidate_top(&self) -> Height {
        (self.candidate.len() - 1) as Height
    }

    fn confirmed_top(&self) -> Height {
        (self.confirmed.len() - 1) as Height
    }

    fn advance_valid(&mut self) {
        while let Some(header) = self.candidate.get(self.top_valid_candidate as usize + 1) {
            if !self.blocks.contains_key(&header.hash()) {
                break;
            }
            self.top_valid_candidate += 1;
        }
    }

    /// Move the confirmed chain onto the valid candidate prefix once that
    /// prefix is strictly higher than the confirmed top.
    fn reorganize_confirmed(&mut self) -> Option<BlockReorganization> {
        if self.top_valid_candidate <= self.confirmed_top() {
            return None;
        }

        let mut fork_height = self.confirmed_top();
        while fork_height > 0
            && self.confirmed[fork_height as usize].hash()
                != self.candidate[fork_height as usize].hash()
        {
            fork_height -= 1;
        }

        let incoming = ((fork_height + 1)..=self.top_valid_candidate)
            .map(|height| {
                let hash = self.candidate[height as usize].hash();
                self.blocks.get(&hash).cloned()
            })
            .collect::<Option<Vec<_>>>()?;

        let outgoing = self.confirmed.split_off(fork_height as usize + 1);
        self.confirmed.extend(incoming.iter().cloned());
        Some(BlockReorganization::new(fork_height, incoming, outgoing))
    }
}

pub struct MemoryChain {
    state: RwLock<State>,
    /// Serializes writers so events are published in the order they occur.
    writer: Mutex<()>,
    stopped: AtomicBool,
    headers: Subscriber<HeaderReorganization>,
    blocks: Subscriber<BlockReorganization>,
    transactions: Subscriber<Arc<Transaction>>,
}

impl MemoryChain {
    /// Create a stopped index holding only `genesis`.
    pub fn new(genesis: Block) -> Self {
        Self {
            state: RwLock::new(State::new(genesis)),
            writer: Mutex::new(()),
            stopped: AtomicBool::new(true),
            headers: Subscriber::new(),
            blocks: Subscriber::new(),
            transactions: Subscriber::new(),
        }
    }

    /// Replace the candidate chain above `fork_height` with `headers`.
    ///
    /// `headers` must connect to the candidate at `fork_height` and to each
    /// other. Publishes a header reorganization when `headers` is non-empty.
    pub fn organize_headers(
        &self,
        fork_height: Height,
        headers: Vec<Header>,
    ) -> Result<(), ChainError> {
        if self.stopped() {
            return Err(ChainError::ServiceStopped);
        }

        if headers.is_empty() {
            return Ok(());
        }

        let _writer = self.writer.lock();
        let (header_event, block_event) = {
            let mut state = self.state.write();
            let parent = state
                .candidate
                .get(fork_height as usize)
                .cloned()
                .ok_or(ChainError::InvalidFork(fork_height))?;

            let mut previous = parent.as_ref();
            for header in &headers {
                if !header.links_to(previous) {
                    return Err(ChainError::InvalidFork(fork_height));
                }
                previous = header;
            }

            let outgoing = state.candidate.split_off(fork_height as usize + 1);
            let incoming: Vec<Arc<Header>> = headers.into_iter().map(Arc::new).collect();
            state.candidate.extend(incoming.iter().cloned());

            if state.top_valid_candidate > fork_height {
                state.top_valid_candidate = fork_height;
            }
            state.advance_valid();

            debug!(
                fork_height,
                incoming = incoming.len(),
                outgoing = outgoing.len(),
                "Reindexed candidate headers"
            );

            let header_event = HeaderReorganization::new(fork_height, incoming, outgoing);
            (header_event, state.reorganize_confirmed())
        };

        self.headers.relay(&header_event);
        if let Some(event) = block_event {
            self.blocks.relay(&event);
        }

        Ok(())
    }

    /// Publish a transaction accepted to the pool.
    pub fn organize_transaction(&self, transaction: Transaction) -> Result<(), ChainError> {
        if self.stopped() {
            return Err(ChainError::ServiceStopped);
        }

        let _writer = self.writer.lock();
        self.transactions.relay(&Arc::new(transaction));
        Ok(())
    }

    pub fn candidate_header(&self, height: Height) -> Option<Arc<Header>> {
        self.state.read().candidate.get(height as usize).cloned()
    }

    pub fn confirmed_block(&self, height: Height) -> Option<Arc<Block>> {
        self.state.read().confirmed.get(height as usize).cloned()
    }

    pub fn block(&self, hash: &HashDigest) -> Option<Arc<Block>> {
        self.state.read().blocks.get(hash).cloned()
    }
}

impl ChainIndex for MemoryChain {
    fn start(&self) -> bool {
        self.headers.start();
        self.blocks.start();
        self.transactions.start();
        self.stopped.store(false, Ordering::SeqCst);
        true
    }

    fn stop(&self) -> bool {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return true;
        }

        // Let in-progress writers publish before subscribers are released.
        let _writer = self.writer.lock();
        self.headers.stop();
        self.blocks.stop();
        self.transactions.stop();
        true
    }

    fn close(&self) -> bool {
        let stopped = self.stop();
        let state = self.state.read();
        info!(
            candidate = state.candidate_top(),
            confirmed = state.confirmed_top(),
            "Closed memory chain"
        );
        stopped
    }

    fn stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn get_top(&self, candidate: bool) -> Option<Checkpoint> {
        let state = self.state.read();
        if candidate {
            let header = state.candidate.last()?;
            Some(Checkpoint::new(header.hash(), state.candidate_top()))
        } else {
            let block = state.confirmed.last()?;
            Some(Checkpoint::new(block.hash(), state.confirmed_top()))
        }
    }

    fn get_downloadable(&self, height: Height) -> Option<HashDigest> {
        let state = self.state.read();
        let hash = state.candidate.get(height as usize)?.hash();
        (!state.blocks.contains_key(&hash)).then_some(hash)
    }

    fn get_block_hash(&self, height: Height, candidate: bool) -> Option<HashDigest> {
        let state = self.state.read();
        if candidate {
            state.candidate.get(height as usize).map(|header| header.hash())
        } else {
            state.confirmed.get(height as usize).map(|block| block.hash())
        }
    }

    fn top_valid_candidate_height(&self) -> Height {
        self.state.read().top_valid_candidate
    }

    fn store(&self, block: Arc<Block>, height: Height) -> Result<(), ChainError> {
        if self.stopped() {
            return Err(ChainError::ServiceStopped);
        }

        let _writer = self.writer.lock();
        let event = {
            let mut state = self.state.write();
            let hash = block.hash();
            let matches = state
                .candidate
                .get(height as usize)
                .is_some_and(|header| header.hash() == hash);

            if !matches {
                return Err(ChainError::NotCandidate { hash, height });
            }

            if state.blocks.insert(hash, block).is_some() {
                return Ok(());
            }

            state.advance_valid();
            state.reorganize_confirmed()
        };

        if let Some(event) = event {
            self.blocks.relay(&event);
        }

        Ok(())
    }

    fn subscribe_headers(&self, handler: HeaderHandler) {
        self.headers.subscribe(handler);
    }

    fn subscribe_blocks(&self, handler: BlockHandler) {
        self.blocks.subscribe(handler);
    }

    fn subscribe_transactions(&self, handler: TransactionHandler) {
        self.transactions.subscribe(handler);
    }
}

/// Build `count` blocks extending `parent`, one transaction each.
///
/// `seed` is mixed into every transaction so that two calls with the same
/// parent and different seeds produce competing branches.
pub fn generate_blocks(parent: &Header, count: usize, seed: u32) -> Vec<Block> {
    let mut blocks = Vec::with_capacity(count);
    let mut previous = parent.hash();

    for index in 0..count {
        let transaction = Transaction {
            version: 1,
            payload: [seed.to_le_bytes(), (index as u32).to_le_bytes()].concat(),
            locktime: 0,
        };
        let mut block = Block::new(
            Header {
                version: 1,
                previous_block_hash: previous,
                timestamp: parent.timestamp.wrapping_add(600 * (index as u32 + 1)),
                bits: parent.bits,
                nonce: seed,
                ..Default::default()
            },
            vec![transaction],
        );
        block.header.merkle_root = block.generate_merkle_root();
        previous = block.hash();
        blocks.push(block);
    }

    blocks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChainSettings;
    use std::sync::atomic::AtomicUsize;

    fn started_chain() -> MemoryChain {
        let chain = MemoryChain::new(ChainSettings::default().genesis_block());
        assert!(chain.start());
        chain
    }

    fn headers(blocks: &[Block]) -> Vec<Header> {
        blocks.iter().map(|block| block.header.clone()).collect()
    }

    #[test]
    fn test_genesis_tops() {
        let chain = started_chain();
        let genesis = ChainSettings::default().genesis_header().hash();
        assert_eq!(chain.get_top(true), Some(Checkpoint::new(genesis, 0)));
        assert_eq!(chain.get_top(false), Some(Checkpoint::new(genesis, 0)));
        assert_eq!(chain.top_valid_candidate_height(), 0);
        assert_eq!(chain.get_downloadable(0), None);
    }

    #[test]
    fn test_organize_headers_makes_downloadable() {
        let chain = started_chain();
        let genesis = chain.candidate_header(0).unwrap();
        let blocks = generate_blocks(&genesis, 3, 1);

        chain.organize_headers(0, headers(&blocks)).unwrap();

        assert_eq!(chain.get_top(true).unwrap().height, 3);
        assert_eq!(chain.get_top(false).unwrap().height, 0);
        assert_eq!(chain.get_downloadable(2), Some(blocks[1].hash()));
        assert_eq!(chain.get_downloadable(4), None);
    }

    #[test]
    fn test_disconnected_headers_rejected() {
        let chain = started_chain();
        let genesis = chain.candidate_header(0).unwrap();
        let blocks = generate_blocks(&genesis, 3, 1);

        let result = chain.organize_headers(0, headers(&blocks[1..]));
        assert_eq!(result, Err(ChainError::InvalidFork(0)));
        assert_eq!(chain.get_top(true).unwrap().height, 0);
    }

    #[test]
    fn test_store_advances_confirmed_chain() {
        let chain = started_chain();
        let genesis = chain.candidate_header(0).unwrap();
        let blocks = generate_blocks(&genesis, 3, 1);
        chain.organize_headers(0, headers(&blocks)).unwrap();

        let reorgs = Arc::new(AtomicUsize::new(0));
        let observed = reorgs.clone();
        chain.subscribe_blocks(Box::new(move |event| {
            if let Ok(event) = event {
                observed.fetch_add(event.incoming.len(), Ordering::SeqCst);
            }
            true
        }));

        // Out of order: height 2 cannot confirm before height 1.
        chain.store(Arc::new(blocks[1].clone()), 2).unwrap();
        assert_eq!(chain.top_valid_candidate_height(), 0);
        assert_eq!(reorgs.load(Ordering::SeqCst), 0);

        chain.store(Arc::new(blocks[0].clone()), 1).unwrap();
        assert_eq!(chain.top_valid_candidate_height(), 2);
        assert_eq!(chain.get_top(false).unwrap().height, 2);
        assert_eq!(reorgs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_store_rejects_non_candidate() {
        let chain = started_chain();
        let genesis = chain.candidate_header(0).unwrap();
        let blocks = generate_blocks(&genesis, 2, 1);
        chain.organize_headers(0, headers(&blocks)).unwrap();

        let result = chain.store(Arc::new(blocks[1].clone()), 1);
        assert!(matches!(result, Err(ChainError::NotCandidate { height: 1, .. })));
    }

    #[test]
    fn test_header_reorg_reports_outgoing() {
        let chain = started_chain();
        let genesis = chain.candidate_header(0).unwrap();
        let first = generate_blocks(&genesis, 2, 1);
        let second = generate_blocks(&genesis, 3, 2);
        chain.organize_headers(0, headers(&first)).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let observed = seen.clone();
        chain.subscribe_headers(Box::new(move |event| {
            if let Ok(event) = event {
                observed
                    .lock()
                    .push((event.fork_height, event.incoming.len(), event.outgoing.len()));
            }
            true
        }));

        chain.organize_headers(0, headers(&second)).unwrap();

        assert_eq!(*seen.lock(), vec![(0, 3, 2)]);
        assert_eq!(chain.get_top(true).unwrap().hash, second[2].hash());
    }

    #[test]
    fn test_stopped_chain_refuses_work() {
        let chain = started_chain();
        assert!(chain.stop());
        assert!(chain.stop());
        assert!(chain.stopped());

        let genesis = chain.candidate_header(0).unwrap();
        let blocks = generate_blocks(&genesis, 1, 1);
        assert_eq!(
            chain.organize_headers(0, headers(&blocks)),
            Err(ChainError::ServiceStopped)
        );
        assert_eq!(
            chain.store(Arc::new(blocks[0].clone()), 1),
            Err(ChainError::ServiceStopped)
        );
    }
}
