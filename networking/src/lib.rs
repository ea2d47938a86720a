pub mod config;
pub mod error;
pub mod network;
pub mod session;
pub mod sync;
pub mod types;

pub use config::{NetworkSettings, Timeouts};
pub use error::{NetworkError, SessionError};
pub use network::{NetworkService, P2pNetwork, SynchronizedHandler};
pub use session::Session;
pub use types::{BlockRequester, SessionKind, WorkerId};
