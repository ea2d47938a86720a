use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chain::memory::generate_blocks;
use chain::MemoryChain;
use containers::{Block, HashDigest, Height};
use networking::{BlockRequester, WorkerId};
use tracing::{debug, info};

/// Blocks that loopback peers claim to have seen on the network.
pub struct SourceChain {
    blocks: Vec<Block>,
}

impl SourceChain {
    pub fn new(genesis: &Block, count: usize) -> Self {
        Self {
            blocks: generate_blocks(&genesis.header, count, 0),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Hand the source headers to `chain` as a new candidate branch.
    pub fn announce(&self, chain: &MemoryChain) -> Result<()> {
        let headers = self.blocks.iter().map(|block| block.header.clone()).collect();
        chain.organize_headers(0, headers)?;
        info!(headers = self.blocks.len(), "Announced source headers");
        Ok(())
    }
}

/// Block requester answering from a [`SourceChain`] instead of the wire.
pub struct LoopbackPeers {
    blocks: HashMap<HashDigest, Block>,
}

impl LoopbackPeers {
    pub fn new(source: &SourceChain) -> Self {
        Self {
            blocks: source
                .blocks
                .iter()
                .map(|block| (block.hash(), block.clone()))
                .collect(),
        }
    }
}

#[async_trait]
impl BlockRequester for LoopbackPeers {
    async fn request_block(
        &self,
        worker: WorkerId,
        hash: HashDigest,
        height: Height,
    ) -> Option<Block> {
        let block = self.blocks.get(&hash).cloned();
        debug!(%worker, height, served = block.is_some(), "Loopback block request");
        block
    }
}
