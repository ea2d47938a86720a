//! Reorganization events and the subscriber list that publishes them.
//!
//! Handlers return `true` to stay subscribed. A stopped subscriber invokes
//! every handler once with [`ChainError::ServiceStopped`] and drops it.

use std::sync::Arc;

use containers::{Block, Header, Height, Transaction};
use parking_lot::Mutex;

use crate::ChainError;

/// Replacement of a chain suffix above `fork_height`.
///
/// `incoming` is ordered lowest height first and starts at
/// `fork_height + 1`, as does `outgoing`.
#[derive(Debug)]
pub struct Reorganization<T> {
    pub fork_height: Height,
    pub incoming: Arc<Vec<Arc<T>>>,
    pub outgoing: Arc<Vec<Arc<T>>>,
}

impl<T> Reorganization<T> {
    pub fn new(fork_height: Height, incoming: Vec<Arc<T>>, outgoing: Vec<Arc<T>>) -> Self {
        Self {
            fork_height,
            incoming: Arc::new(incoming),
            outgoing: Arc::new(outgoing),
        }
    }

    /// Height of the new top after the reorganization.
    pub fn top_height(&self) -> Height {
        self.fork_height + self.incoming.len() as Height
    }

    /// Number of entries displaced from the previous chain.
    pub fn depth(&self) -> usize {
        self.outgoing.len()
    }
}

impl<T> Clone for Reorganization<T> {
    fn clone(&self) -> Self {
        Self {
            fork_height: self.fork_height,
            incoming: self.incoming.clone(),
            outgoing: self.outgoing.clone(),
        }
    }
}

pub type HeaderReorganization = Reorganization<Header>;
pub type BlockReorganization = Reorganization<Block>;

pub type EventResult<'a, E> = Result<&'a E, &'a ChainError>;

pub type Handler<E> = Box<dyn Fn(EventResult<'_, E>) -> bool + Send + Sync>;
pub type HeaderHandler = Handler<HeaderReorganization>;
pub type BlockHandler = Handler<BlockReorganization>;
pub type TransactionHandler = Handler<Arc<Transaction>>;

/// Ordered handler list for one event stream.
///
/// Relays hold the list lock for the duration of dispatch, so a stream is
/// never re-entered: handlers for one stream run one event at a time, in
/// publication order. A handler must not subscribe to the stream it is
/// being invoked from.
pub struct Subscriber<E> {
    handlers: Mutex<Option<Vec<Handler<E>>>>,
}

impl<E> Default for Subscriber<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Subscriber<E> {
    /// Create a subscriber in the stopped state.
    pub fn new() -> Self {
        Self {
            handlers: Mutex::new(None),
        }
    }

    pub fn start(&self) {
        let mut handlers = self.handlers.lock();
        if handlers.is_none() {
            *handlers = Some(Vec::new());
        }
    }

    pub fn stopped(&self) -> bool {
        self.handlers.lock().is_none()
    }

    /// Register a handler. A stopped subscriber notifies it immediately.
    pub fn subscribe(&self, handler: Handler<E>) {
        let mut handlers = self.handlers.lock();
        if let Some(list) = handlers.as_mut() {
            list.push(handler);
            return;
        }

        drop(handlers);
        handler(Err(&ChainError::ServiceStopped));
    }

    /// Deliver `event` to every handler, dropping those that decline.
    pub fn relay(&self, event: &E) {
        let mut handlers = self.handlers.lock();
        if let Some(list) = handlers.as_mut() {
            list.retain(|handler| handler(Ok(event)));
        }
    }

    /// Notify every handler of the stop and clear the list.
    pub fn stop(&self) {
        let mut handlers = self.handlers.lock();
        if let Some(list) = handlers.take() {
            for handler in list {
                handler(Err(&ChainError::ServiceStopped));
            }
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.lock().as_ref().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
