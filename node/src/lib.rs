//! Full node orchestration.
//!
//! [`FullNode`] owns the reservation table and the sync coordinator, drives
//! the start, run, stop and close lifecycle, and attaches peer sessions to
//! the chain index.

pub mod config;
pub mod error;
pub mod full_node;
pub mod states;

pub use config::{Configuration, NodeSettings};
pub use error::NodeError;
pub use full_node::{FullNode, SyncHandler};
pub use states::NodeState;
