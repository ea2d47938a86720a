pub mod block;
pub mod checkpoint;
pub mod header;
pub mod transaction;
pub mod types;

pub use block::Block;
pub use checkpoint::Checkpoint;
pub use header::Header;
pub use transaction::Transaction;
pub use types::{sha256d, HashDigest, Height};
