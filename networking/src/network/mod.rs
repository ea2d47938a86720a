use std::sync::Arc;

use crate::error::NetworkError;
use crate::session::Session;

mod service;

pub use service::NetworkService;

/// Callback invoked once, when the initial block download finishes or fails.
pub type SynchronizedHandler = Box<dyn FnOnce(Result<(), NetworkError>) + Send>;

/// Peer-to-peer layer driven by the full node.
pub trait P2pNetwork: Send + Sync {
    fn start(&self) -> Result<(), NetworkError>;

    /// Begin downloading through `sessions`.
    ///
    /// Returns immediately. `on_synchronized` fires once the reservation
    /// table drains, or with an error if the network stops first.
    fn run(&self, sessions: Vec<Arc<Session>>, on_synchronized: SynchronizedHandler);

    /// Signal work to wind down. Idempotent.
    fn stop(&self) -> bool;

    /// Stop and release all tasks. Idempotent.
    fn close(&self) -> bool;

    fn stopped(&self) -> bool;
}
