use std::path::PathBuf;

use containers::{Block, Checkpoint, HashDigest, Header, Height};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CHAIN_THREADS: usize = 0;
pub const DEFAULT_BLOCK_POOL_CAPACITY: usize = 0;
pub const DEFAULT_DATABASE_DIRECTORY: &str = "blockchain";

pub const GENESIS_VERSION: u32 = 1;
pub const GENESIS_BITS: u32 = 0x1d00_ffff;
pub const GENESIS_MERKLE_ROOT: &str =
    "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b";

pub const MAINNET_GENESIS_TIMESTAMP: u32 = 1_231_006_505;
pub const MAINNET_GENESIS_NONCE: u32 = 2_083_236_893;
pub const TESTNET_GENESIS_TIMESTAMP: u32 = 1_296_688_602;
pub const TESTNET_GENESIS_NONCE: u32 = 414_098_458;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainSettings {
    pub threads: usize,
    pub use_testnet_rules: bool,
    pub block_pool_capacity: usize,
    pub directory: PathBuf,
    /// A node has no use for the address index, it is expensive to build.
    pub index_addresses: bool,
    pub checkpoints: Vec<Checkpoint>,
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self {
            threads: DEFAULT_CHAIN_THREADS,
            use_testnet_rules: false,
            block_pool_capacity: DEFAULT_BLOCK_POOL_CAPACITY,
            directory: PathBuf::from(DEFAULT_DATABASE_DIRECTORY),
            index_addresses: false,
            checkpoints: Vec::new(),
        }
    }
}

impl ChainSettings {
    /// Height below which blocks are covered by configured checkpoints.
    pub fn minimum_start_height(&self) -> Height {
        self.checkpoints
            .last()
            .map(|checkpoint| checkpoint.height)
            .unwrap_or(0)
    }

    pub fn genesis_header(&self) -> Header {
        let (timestamp, nonce) = if self.use_testnet_rules {
            (TESTNET_GENESIS_TIMESTAMP, TESTNET_GENESIS_NONCE)
        } else {
            (MAINNET_GENESIS_TIMESTAMP, MAINNET_GENESIS_NONCE)
        };

        Header {
            version: GENESIS_VERSION,
            previous_block_hash: HashDigest::zero(),
            merkle_root: genesis_merkle_root(),
            timestamp,
            bits: GENESIS_BITS,
            nonce,
        }
    }

    /// Genesis carries only its header, the coinbase is never relayed.
    pub fn genesis_block(&self) -> Block {
        Block::new(self.genesis_header(), Vec::new())
    }
}

fn genesis_merkle_root() -> HashDigest {
    GENESIS_MERKLE_ROOT
        .parse::<HashDigest>()
        .map(|root| root.reversed())
        .unwrap_or_default()
}
