use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use chain::{BlockHandler, ChainIndex, ChainSettings, HeaderHandler, TransactionHandler};
use containers::Checkpoint;
use metrics::SharedMetrics;
use networking::sync::{Reservation, Reservations, SyncCoordinator};
use networking::{NetworkError, NetworkSettings, P2pNetwork, Session, SessionKind, WorkerId};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{Configuration, NodeSettings};
use crate::error::NodeError;
use crate::states::NodeState;

/// Callback invoked once the initial block download finishes or fails.
pub type SyncHandler = Box<dyn FnOnce(Result<(), NodeError>) + Send>;

/// Full node orchestrator.
///
/// Owns the reservation table and the sync coordinator and drives the
/// lifecycle of the chain index and the network layer. The shutdown token
/// is shared with the composition root: a fatal sync failure cancels it,
/// and the root then calls [`FullNode::stop`] and [`FullNode::close`].
pub struct FullNode<N: P2pNetwork> {
    configuration: Configuration,
    chain: Arc<dyn ChainIndex>,
    network: N,
    reservations: Arc<Reservations>,
    coordinator: Arc<SyncCoordinator>,
    shutdown: CancellationToken,
    state: Mutex<NodeState>,
    stop_result: Mutex<Option<bool>>,
    sessions: Mutex<Vec<Arc<Session>>>,
    next_worker: AtomicU64,
    owner: ThreadId,
}

impl<N: P2pNetwork> FullNode<N> {
    pub fn new(
        configuration: Configuration,
        chain: Arc<dyn ChainIndex>,
        network: N,
        shutdown: CancellationToken,
        metrics: Option<SharedMetrics>,
    ) -> Self {
        let mut reservations = Reservations::new(
            configuration.node.maximum_deviation,
            configuration.node.block_latency(),
        );
        if let Some(metrics) = &metrics {
            reservations = reservations.with_metrics(metrics.clone());
        }
        let reservations = Arc::new(reservations);

        let mut coordinator = SyncCoordinator::new(reservations.clone(), shutdown.clone());
        if let Some(metrics) = metrics {
            coordinator = coordinator.with_metrics(metrics);
        }

        Self {
            configuration,
            chain,
            network,
            reservations,
            coordinator: Arc::new(coordinator),
            shutdown,
            state: Mutex::new(NodeState::Idle),
            stop_result: Mutex::new(None),
            sessions: Mutex::new(Vec::new()),
            next_worker: AtomicU64::new(0),
            owner: thread::current().id(),
        }
    }

    /// Start the chain index, then the network layer.
    pub fn start(&self) -> Result<(), NodeError> {
        if !self.transition(NodeState::Starting) {
            return Err(NodeError::OperationFailed(format!(
                "cannot start node in state {:?}",
                self.state()
            )));
        }

        if !self.chain.start() {
            error!(
                directory = %self.configuration.chain.directory.display(),
                "Failure starting blockchain"
            );
            return Err(NodeError::OperationFailed("blockchain failed to start".into()));
        }

        self.network.start().map_err(|err| {
            error!(%err, "Failure starting network");
            NodeError::OperationFailed(err.to_string())
        })?;

        info!("Node started");
        Ok(())
    }

    /// Backfill the reservation table, subscribe to chain events and hand
    /// the attached sessions to the network layer.
    ///
    /// Returns once downloading is under way. `on_synchronized` is invoked
    /// when the initial download completes.
    pub fn run(&self, on_synchronized: SyncHandler) -> Result<(), NodeError> {
        if self.stopped() {
            return Err(NodeError::ServiceStopped);
        }

        if *self.state.lock() != NodeState::Starting {
            return Err(NodeError::OperationFailed(format!(
                "cannot run node in state {:?}",
                self.state()
            )));
        }

        let top_block = self.chain.get_top(false).ok_or_else(|| {
            error!(
                directory = %self.configuration.chain.directory.display(),
                "The block chain is corrupt"
            );
            NodeError::ChainCorrupt("missing top confirmed block".into())
        })?;
        self.coordinator.set_top_block(top_block);
        info!(height = top_block.height, hash = %top_block.hash, "Top confirmed block");

        let top_header = self.chain.get_top(true).ok_or_else(|| {
            error!(
                directory = %self.configuration.chain.directory.display(),
                "The header chain is corrupt"
            );
            NodeError::ChainCorrupt("missing top candidate header".into())
        })?;
        self.coordinator.set_top_header(top_header);
        info!(height = top_header.height, hash = %top_header.hash, "Top candidate header");

        self.coordinator.backfill(self.chain.as_ref(), top_header.height);
        self.coordinator.subscribe(self.chain.as_ref());

        if !self.transition(NodeState::Running) {
            return Err(NodeError::ServiceStopped);
        }

        let sessions = self.sessions.lock().clone();
        self.network.run(
            sessions,
            Box::new(move |result| {
                on_synchronized(result.map_err(|err| match err {
                    NetworkError::ServiceStopped => NodeError::ServiceStopped,
                    err => NodeError::SyncFailure(err.to_string()),
                }))
            }),
        );

        Ok(())
    }

    /// Stop the network, then the chain index. Both are attempted and the
    /// result of the first call is returned by every later call.
    pub fn stop(&self) -> bool {
        let mut result = self.stop_result.lock();
        if let Some(stopped) = *result {
            return stopped;
        }

        self.shutdown.cancel();
        self.transition(NodeState::Stopping);

        let network_stopped = self.network.stop();
        let chain_stopped = self.chain.stop();

        if !network_stopped {
            error!(err = %NodeError::StopFailure("network".into()), "Failed to stop network");
        }

        if !chain_stopped {
            error!(
                err = %NodeError::StopFailure("blockchain".into()),
                directory = %self.configuration.chain.directory.display(),
                "Failed to stop blockchain"
            );
        }

        let stopped = network_stopped && chain_stopped;
        if stopped {
            info!("Node stopped");
        }

        *result = Some(stopped);
        stopped
    }

    /// Stop, then release network and chain resources.
    ///
    /// Must be called on the thread that constructed the node.
    pub fn close(&self) -> bool {
        if thread::current().id() != self.owner {
            error!("Node must be closed on the thread that constructed it");
            return false;
        }

        if !self.stop() {
            return false;
        }

        if self.state() == NodeState::Closed {
            return true;
        }

        let network_closed = self.network.close();
        let chain_closed = self.chain.close();
        if !network_closed || !chain_closed {
            warn!(network_closed, chain_closed, "Failure closing node");
        }

        self.sessions.lock().clear();
        self.reservations.clear();
        self.transition(NodeState::Closed);
        info!("Node closed");
        network_closed && chain_closed
    }

    pub fn attach_manual_session(&self) -> Arc<Session> {
        self.attach_session(SessionKind::Manual)
    }

    pub fn attach_inbound_session(&self) -> Arc<Session> {
        self.attach_session(SessionKind::Inbound)
    }

    pub fn attach_outbound_session(&self) -> Arc<Session> {
        self.attach_session(SessionKind::Outbound)
    }

    /// Take download work on behalf of `worker`.
    pub fn get_reservation(&self, worker: WorkerId) -> Option<Reservation> {
        self.reservations.get(worker)
    }

    pub fn subscribe_headers(&self, handler: HeaderHandler) {
        self.chain.subscribe_headers(handler);
    }

    pub fn subscribe_blocks(&self, handler: BlockHandler) {
        self.chain.subscribe_blocks(handler);
    }

    pub fn subscribe_transactions(&self, handler: TransactionHandler) {
        self.chain.subscribe_transactions(handler);
    }

    pub fn chain(&self) -> &Arc<dyn ChainIndex> {
        &self.chain
    }

    pub fn network(&self) -> &N {
        &self.network
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    pub fn node_settings(&self) -> &NodeSettings {
        &self.configuration.node
    }

    pub fn chain_settings(&self) -> &ChainSettings {
        &self.configuration.chain
    }

    pub fn network_settings(&self) -> &NetworkSettings {
        &self.configuration.network
    }

    pub fn reservations(&self) -> &Arc<Reservations> {
        &self.reservations
    }

    pub fn top_block(&self) -> Checkpoint {
        self.coordinator.top_block()
    }

    pub fn top_header(&self) -> Checkpoint {
        self.coordinator.top_header()
    }

    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    pub fn state(&self) -> NodeState {
        *self.state.lock()
    }

    /// True once a stop was requested or the chain index stopped.
    pub fn stopped(&self) -> bool {
        self.shutdown.is_cancelled() || self.chain.stopped()
    }

    fn attach_session(&self, kind: SessionKind) -> Arc<Session> {
        let id = WorkerId(self.next_worker.fetch_add(1, Ordering::SeqCst));
        let session = Arc::new(Session::new(
            id,
            kind,
            self.chain.clone(),
            self.reservations.clone(),
        ));
        self.sessions.lock().push(session.clone());
        info!(worker = %id, %kind, "Attached session");
        session
    }

    fn transition(&self, target: NodeState) -> bool {
        let mut state = self.state.lock();
        if !state.can_transition_to(target) {
            return false;
        }
        *state = target;
        true
    }
}

impl<N: P2pNetwork> Drop for FullNode<N> {
    fn drop(&mut self) {
        if self.state() != NodeState::Closed && thread::current().id() == self.owner {
            self.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain::memory::generate_blocks;
    use chain::{ChainError, MemoryChain};
    use containers::{Block, HashDigest, Height};
    use networking::SynchronizedHandler;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::sync::mpsc;

    // Network layer double recording lifecycle calls.
    #[derive(Default)]
    struct MockNetwork {
        fail_start: bool,
        fail_stop: bool,
        stopped: AtomicBool,
        stops: AtomicUsize,
        closes: AtomicUsize,
        sessions: Mutex<Vec<WorkerId>>,
        handler: Mutex<Option<SynchronizedHandler>>,
    }

    impl MockNetwork {
        fn synchronize(&self, result: Result<(), NetworkError>) {
            let handler = self.handler.lock().take().unwrap();
            handler(result);
        }
    }

    impl P2pNetwork for MockNetwork {
        fn start(&self) -> Result<(), NetworkError> {
            if self.fail_start {
                return Err(NetworkError::OperationFailed("bind".into()));
            }
            Ok(())
        }

        fn run(&self, sessions: Vec<Arc<Session>>, on_synchronized: SynchronizedHandler) {
            *self.sessions.lock() = sessions.iter().map(|session| session.id()).collect();
            *self.handler.lock() = Some(on_synchronized);
        }

        fn stop(&self) -> bool {
            self.stops.fetch_add(1, Ordering::SeqCst);
            self.stopped.store(true, Ordering::SeqCst);
            !self.fail_stop
        }

        fn close(&self) -> bool {
            self.closes.fetch_add(1, Ordering::SeqCst);
            self.stop()
        }

        fn stopped(&self) -> bool {
            self.stopped.load(Ordering::SeqCst)
        }
    }

    // Chain index double delegating to a memory chain.
    struct MockChain {
        inner: MemoryChain,
        fail_start: bool,
        missing_tops: bool,
    }

    impl MockChain {
        fn new() -> Self {
            Self {
                inner: MemoryChain::new(ChainSettings::default().genesis_block()),
                fail_start: false,
                missing_tops: false,
            }
        }
    }

    impl ChainIndex for MockChain {
        fn start(&self) -> bool {
            !self.fail_start && self.inner.start()
        }

        fn stop(&self) -> bool {
            self.inner.stop()
        }

        fn close(&self) -> bool {
            self.inner.close()
        }

        fn stopped(&self) -> bool {
            self.inner.stopped()
        }

        fn get_top(&self, candidate: bool) -> Option<Checkpoint> {
            if self.missing_tops {
                return None;
            }
            self.inner.get_top(candidate)
        }

        fn get_downloadable(&self, height: Height) -> Option<HashDigest> {
            self.inner.get_downloadable(height)
        }

        fn get_block_hash(&self, height: Height, candidate: bool) -> Option<HashDigest> {
            self.inner.get_block_hash(height, candidate)
        }

        fn top_valid_candidate_height(&self) -> Height {
            self.inner.top_valid_candidate_height()
        }

        fn store(&self, block: Arc<Block>, height: Height) -> Result<(), ChainError> {
            self.inner.store(block, height)
        }

        fn subscribe_headers(&self, handler: HeaderHandler) {
            self.inner.subscribe_headers(handler);
        }

        fn subscribe_blocks(&self, handler: BlockHandler) {
            self.inner.subscribe_blocks(handler);
        }

        fn subscribe_transactions(&self, handler: TransactionHandler) {
            self.inner.subscribe_transactions(handler);
        }
    }

    fn node_with(chain: MockChain, network: MockNetwork) -> (FullNode<MockNetwork>, Arc<MockChain>) {
        let chain = Arc::new(chain);
        let node = FullNode::new(
            Configuration::default(),
            chain.clone(),
            network,
            CancellationToken::new(),
            None,
        );
        (node, chain)
    }

    fn ignore() -> SyncHandler {
        Box::new(|_| {})
    }

    #[test]
    fn test_start_then_run_backfills_from_chain() {
        let (node, chain) = node_with(MockChain::new(), MockNetwork::default());
        node.start().unwrap();

        let genesis = ChainSettings::default().genesis_block();
        let blocks = generate_blocks(&genesis.header, 4, 0);
        let headers = blocks.iter().map(|block| block.header.clone()).collect();
        chain.inner.organize_headers(0, headers).unwrap();
        chain.store(Arc::new(blocks[0].clone()), 1).unwrap();

        node.attach_outbound_session();
        node.attach_manual_session();
        node.run(ignore()).unwrap();

        assert_eq!(node.state(), NodeState::Running);
        assert_eq!(node.reservations().heights(), vec![2, 3, 4]);
        assert_eq!(node.top_header(), Checkpoint::new(blocks[3].hash(), 4));
        assert_eq!(node.top_block(), Checkpoint::new(blocks[0].hash(), 1));
        assert_eq!(*node.network().sessions.lock(), vec![WorkerId(0), WorkerId(1)]);
    }

    #[test]
    fn test_reindex_after_run_extends_reservations() {
        let (node, chain) = node_with(MockChain::new(), MockNetwork::default());
        node.start().unwrap();
        node.run(ignore()).unwrap();
        assert!(node.reservations().is_empty());

        let genesis = ChainSettings::default().genesis_block();
        let blocks = generate_blocks(&genesis.header, 3, 0);
        let headers = blocks.iter().map(|block| block.header.clone()).collect();
        chain.inner.organize_headers(0, headers).unwrap();

        assert_eq!(node.reservations().heights(), vec![1, 2, 3]);
        let reservation = node.get_reservation(WorkerId(9)).unwrap();
        assert_eq!(reservation.height, 1);
        assert_eq!(reservation.hash, blocks[0].hash());
    }

    #[test]
    fn test_start_twice_fails() {
        let (node, _) = node_with(MockChain::new(), MockNetwork::default());
        node.start().unwrap();
        assert!(matches!(node.start(), Err(NodeError::OperationFailed(_))));
    }

    #[test]
    fn test_chain_start_failure_stops_short() {
        let chain = MockChain {
            fail_start: true,
            ..MockChain::new()
        };
        let (node, _) = node_with(chain, MockNetwork::default());

        assert!(matches!(node.start(), Err(NodeError::OperationFailed(_))));
        assert_eq!(node.run(ignore()), Err(NodeError::ServiceStopped));
    }

    #[test]
    fn test_network_start_failure() {
        let network = MockNetwork {
            fail_start: true,
            ..Default::default()
        };
        let (node, _) = node_with(MockChain::new(), network);
        assert!(matches!(node.start(), Err(NodeError::OperationFailed(_))));
    }

    #[test]
    fn test_missing_top_is_chain_corrupt() {
        let chain = MockChain {
            missing_tops: true,
            ..MockChain::new()
        };
        let (node, _) = node_with(chain, MockNetwork::default());
        node.start().unwrap();

        assert!(matches!(node.run(ignore()), Err(NodeError::ChainCorrupt(_))));
    }

    #[test]
    fn test_run_before_start_is_stopped() {
        let (node, _) = node_with(MockChain::new(), MockNetwork::default());
        assert_eq!(node.run(ignore()), Err(NodeError::ServiceStopped));
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (node, chain) = node_with(MockChain::new(), MockNetwork::default());
        node.start().unwrap();

        assert!(node.stop());
        assert!(node.stop());
        assert_eq!(node.network().stops.load(Ordering::SeqCst), 1);
        assert!(node.stopped());
        assert!(chain.stopped());
        assert_eq!(node.state(), NodeState::Stopping);
    }

    #[test]
    fn test_stop_attempts_both_and_reports_failure() {
        let network = MockNetwork {
            fail_stop: true,
            ..Default::default()
        };
        let (node, chain) = node_with(MockChain::new(), network);
        node.start().unwrap();

        assert!(!node.stop());
        assert!(!node.stop());
        assert!(chain.stopped());
        assert!(!node.close());
        assert_eq!(node.network().closes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_close_stops_and_releases() {
        let (node, _) = node_with(MockChain::new(), MockNetwork::default());
        node.start().unwrap();
        node.attach_inbound_session();

        assert!(node.close());
        assert!(node.close());
        assert_eq!(node.state(), NodeState::Closed);
        assert_eq!(node.network().closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_close_from_other_thread_is_refused() {
        let (node, _) = node_with(MockChain::new(), MockNetwork::default());
        node.start().unwrap();

        let refused = thread::scope(|scope| scope.spawn(|| node.close()).join().unwrap());
        assert!(!refused);
        assert!(node.close());
    }

    #[test]
    fn test_sync_failure_cancels_token() {
        let (node, _) = node_with(MockChain::new(), MockNetwork::default());
        node.start().unwrap();
        node.run(ignore()).unwrap();

        let failure = ChainError::StoreCorrupted("bad index".into());
        assert!(!node.coordinator.handle_reindexed(Err(&failure)));

        assert!(node.shutdown_token().is_cancelled());
        assert!(node.stopped());
        assert!(node.stop());
    }

    #[test]
    fn test_synchronized_callback_maps_errors() {
        let (node, _) = node_with(MockChain::new(), MockNetwork::default());
        node.start().unwrap();

        let (sender, receiver) = mpsc::channel();
        node.run(Box::new(move |result| sender.send(result).unwrap()))
            .unwrap();

        node.network()
            .synchronize(Err(NetworkError::OperationFailed("peer".into())));
        assert!(matches!(receiver.recv().unwrap(), Err(NodeError::SyncFailure(_))));
    }

    #[test]
    fn test_sessions_get_distinct_workers() {
        let (node, _) = node_with(MockChain::new(), MockNetwork::default());

        let manual = node.attach_manual_session();
        let inbound = node.attach_inbound_session();
        let outbound = node.attach_outbound_session();

        assert_eq!(manual.kind(), SessionKind::Manual);
        assert_eq!(inbound.kind(), SessionKind::Inbound);
        assert_eq!(outbound.kind(), SessionKind::Outbound);
        assert_eq!(
            vec![manual.id(), inbound.id(), outbound.id()],
            vec![WorkerId(0), WorkerId(1), WorkerId(2)]
        );
    }
}
