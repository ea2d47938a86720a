//! Chain index interface consumed by the node.
//!
//! The index owns the candidate (header) chain and the confirmed (block)
//! chain. The node only queries it, hands it downloaded blocks, and
//! subscribes to its reorganization events.

pub mod config;
pub mod error;
pub mod events;
pub mod index;
pub mod memory;

pub use config::ChainSettings;
pub use error::ChainError;
pub use events::{
    BlockHandler, BlockReorganization, EventResult, HeaderHandler, HeaderReorganization,
    Reorganization, Subscriber, TransactionHandler,
};
pub use index::ChainIndex;
pub use memory::MemoryChain;
