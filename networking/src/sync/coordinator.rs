use std::sync::Arc;

use chain::{BlockReorganization, ChainError, ChainIndex, EventResult, HeaderReorganization};
use containers::{Checkpoint, Height};
use metrics::SharedMetrics;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::reservations::Reservations;

/// Keeps the reservation table and the cached chain tops in step with the
/// chain index.
///
/// ## Integration
///
/// The coordinator never stops the node itself. A failure reported by the
/// chain cancels the shared shutdown token, and whoever owns the token runs
/// the stop sequence outside the chain's publishing context.
pub struct SyncCoordinator {
    reservations: Arc<Reservations>,
    top_block: RwLock<Checkpoint>,
    top_header: RwLock<Checkpoint>,
    shutdown: CancellationToken,
    metrics: Option<SharedMetrics>,
}

impl SyncCoordinator {
    pub fn new(reservations: Arc<Reservations>, shutdown: CancellationToken) -> Self {
        Self {
            reservations,
            top_block: RwLock::new(Checkpoint::default()),
            top_header: RwLock::new(Checkpoint::default()),
            shutdown,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: SharedMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn reservations(&self) -> &Arc<Reservations> {
        &self.reservations
    }

    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// True once a stop has been requested.
    pub fn stopped(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub fn top_block(&self) -> Checkpoint {
        *self.top_block.read()
    }

    pub fn set_top_block(&self, top: Checkpoint) {
        if let Some(metrics) = &self.metrics {
            metrics.set_top_confirmed_height(top.height);
        }
        *self.top_block.write() = top;
    }

    pub fn top_header(&self) -> Checkpoint {
        *self.top_header.read()
    }

    pub fn set_top_header(&self, top: Checkpoint) {
        if let Some(metrics) = &self.metrics {
            metrics.set_top_candidate_height(top.height);
        }
        *self.top_header.write() = top;
    }

    /// Subscribe to header and block reorganizations of `chain`.
    ///
    /// Handlers hold a weak reference and unsubscribe once the coordinator
    /// is dropped.
    pub fn subscribe(self: &Arc<Self>, chain: &dyn ChainIndex) {
        let coordinator = Arc::downgrade(self);
        chain.subscribe_headers(Box::new(move |event| {
            coordinator
                .upgrade()
                .is_some_and(|coordinator| coordinator.handle_reindexed(event))
        }));

        let coordinator = Arc::downgrade(self);
        chain.subscribe_blocks(Box::new(move |event| {
            coordinator
                .upgrade()
                .is_some_and(|coordinator| coordinator.handle_reorganized(event))
        }));
    }

    /// Queue every downloadable height from `candidate_height` down to just
    /// above the top valid candidate.
    ///
    /// The height right above the top valid candidate is always queued, so
    /// that download resumes there even if the chain reports its block as
    /// already present. Returns the table size afterwards.
    pub fn backfill(&self, chain: &dyn ChainIndex, candidate_height: Height) -> usize {
        let top_valid = chain.top_valid_candidate_height();
        let resume_height = top_valid + 1;
        info!(top_valid, "Top valid candidate block height");

        let mut height = candidate_height;
        while height > top_valid {
            let hash = match chain.get_downloadable(height) {
                Some(hash) => Some(hash),
                None if height == resume_height => chain.get_block_hash(height, true),
                None => None,
            };

            if let Some(hash) = hash {
                self.reservations.push_front(hash, height);
            }

            height -= 1;
        }

        let pending = self.reservations.size();
        info!(pending, "Pending block downloads");
        pending
    }

    /// Header reorganization handler.
    ///
    /// Pops the displaced headers off the back of the table, highest first,
    /// then pushes the incoming headers in order.
    pub fn handle_reindexed(&self, event: EventResult<'_, HeaderReorganization>) -> bool {
        if self.stopped() {
            return false;
        }

        let event = match event {
            Ok(event) => event,
            Err(ChainError::ServiceStopped) => return false,
            Err(err) => {
                error!(%err, "Failure handling reindex");
                self.shutdown.cancel();
                return false;
            }
        };

        let Some(top) = event.incoming.last() else {
            return true;
        };

        let mut height = event.fork_height + event.outgoing.len() as Height;
        for header in event.outgoing.iter().rev() {
            self.reservations.pop_back(&header.hash(), height);
            height -= 1;
        }

        for header in event.incoming.iter() {
            height += 1;
            self.reservations.push_back(header.hash(), height);
        }

        self.set_top_header(Checkpoint::new(top.hash(), height));
        if let Some(metrics) = &self.metrics {
            metrics.observe_header_reorg(event.depth());
        }

        debug!(
            fork_height = event.fork_height,
            incoming = event.incoming.len(),
            outgoing = event.outgoing.len(),
            top = height,
            "Reindexed header reservations"
        );
        true
    }

    /// Block reorganization handler.
    pub fn handle_reorganized(&self, event: EventResult<'_, BlockReorganization>) -> bool {
        if self.stopped() {
            return false;
        }

        let event = match event {
            Ok(event) => event,
            Err(ChainError::ServiceStopped) => return false,
            Err(err) => {
                error!(%err, "Failure handling reorganization");
                self.shutdown.cancel();
                return false;
            }
        };

        let Some(top) = event.incoming.last() else {
            return true;
        };

        for block in event.outgoing.iter() {
            debug!(hash = %block.hash(), "Reorganization moved block to pool");
        }

        let height = event.fork_height + event.incoming.len() as Height;
        self.set_top_block(Checkpoint::new(top.hash(), height));
        if let Some(metrics) = &self.metrics {
            metrics.inc_block_reorgs();
        }

        true
    }
}
