use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use metrics::SharedMetrics;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::select;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{P2pNetwork, SynchronizedHandler};
use crate::config::NetworkSettings;
use crate::error::NetworkError;
use crate::session::Session;
use crate::sync::{Reservations, SESSION_POLL_INTERVAL_MS};
use crate::types::BlockRequester;

/// Network service running one download task per session.
///
/// Blocks are fetched through the [`BlockRequester`] seam. A supervisor
/// task reports synchronization once the reservation table drains.
pub struct NetworkService<R: BlockRequester + 'static> {
    settings: NetworkSettings,
    requester: Arc<R>,
    stopped: AtomicBool,
    shutdown: Mutex<CancellationToken>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    poll_interval: Duration,
    metrics: Option<SharedMetrics>,
}

impl<R: BlockRequester + 'static> NetworkService<R> {
    pub fn new(settings: NetworkSettings, requester: Arc<R>) -> Self {
        Self {
            settings,
            requester,
            stopped: AtomicBool::new(true),
            shutdown: Mutex::new(CancellationToken::new()),
            tasks: Mutex::new(Vec::new()),
            poll_interval: Duration::from_millis(SESSION_POLL_INTERVAL_MS),
            metrics: None,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_metrics(mut self, metrics: SharedMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn settings(&self) -> &NetworkSettings {
        &self.settings
    }

    /// Number of tasks spawned and not yet finished.
    pub fn active_tasks(&self) -> usize {
        self.tasks
            .lock()
            .iter()
            .filter(|task| !task.is_finished())
            .count()
    }
}

impl<R: BlockRequester + 'static> P2pNetwork for NetworkService<R> {
    fn start(&self) -> Result<(), NetworkError> {
        if !self.stopped() {
            return Err(NetworkError::OperationFailed("already started".into()));
        }

        *self.shutdown.lock() = CancellationToken::new();
        self.stopped.store(false, Ordering::SeqCst);
        info!(
            inbound = self.settings.inbound_connections,
            outbound = self.settings.outbound_connections,
            manual = self.settings.peers.len(),
            "Network started"
        );
        Ok(())
    }

    fn run(&self, sessions: Vec<Arc<Session>>, on_synchronized: SynchronizedHandler) {
        if self.stopped() {
            on_synchronized(Err(NetworkError::ServiceStopped));
            return;
        }

        let Ok(runtime) = Handle::try_current() else {
            on_synchronized(Err(NetworkError::NoRuntime));
            return;
        };

        let Some(reservations) = sessions.first().map(|session| session.reservations().clone())
        else {
            on_synchronized(Err(NetworkError::NoSessions));
            return;
        };

        let shutdown = self.shutdown.lock().clone();
        let mut tasks = self.tasks.lock();
        for session in sessions {
            info!(worker = %session.id(), kind = %session.kind(), "Starting download session");
            tasks.push(runtime.spawn(download(
                session,
                self.requester.clone(),
                shutdown.clone(),
                self.poll_interval,
                self.metrics.clone(),
            )));
        }

        tasks.push(runtime.spawn(await_synchronized(
            reservations,
            shutdown,
            self.poll_interval,
            on_synchronized,
        )));
    }

    fn stop(&self) -> bool {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return true;
        }

        self.shutdown.lock().cancel();
        info!("Network stopped");
        true
    }

    fn close(&self) -> bool {
        let stopped = self.stop();
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        stopped
    }

    fn stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

async fn download<R: BlockRequester>(
    session: Arc<Session>,
    requester: Arc<R>,
    shutdown: CancellationToken,
    poll_interval: Duration,
    metrics: Option<SharedMetrics>,
) {
    let latency = session.reservations().block_latency();

    while !shutdown.is_cancelled() {
        let Some(reservation) = session.next_reservation() else {
            select! {
                _ = shutdown.cancelled() => break,
                _ = sleep(poll_interval) => {}
            }
            continue;
        };

        // In-flight requests run to completion or timeout, even when stopping.
        let request = requester.request_block(session.id(), reservation.hash, reservation.height);
        match timeout(latency, request).await {
            Ok(Some(block)) => match session.deliver(&reservation, block) {
                Ok(()) => {
                    if let Some(metrics) = &metrics {
                        metrics.inc_blocks_downloaded();
                    }
                }
                Err(err) => {
                    warn!(worker = %session.id(), %err, "Failed to deliver block");
                    if let Some(metrics) = &metrics {
                        metrics.inc_block_downloads_failed();
                    }
                }
            },
            Ok(None) => {
                debug!(worker = %session.id(), height = reservation.height, "Peer did not serve block");
                session.abandon(&reservation);
                if let Some(metrics) = &metrics {
                    metrics.inc_block_downloads_failed();
                }
                sleep(poll_interval).await;
            }
            Err(_) => {
                warn!(
                    worker = %session.id(),
                    height = reservation.height,
                    ?latency,
                    "Block request timed out"
                );
                session.abandon(&reservation);
                if let Some(metrics) = &metrics {
                    metrics.inc_block_downloads_failed();
                }
            }
        }
    }

    debug!(worker = %session.id(), "Download session stopped");
}

async fn await_synchronized(
    reservations: Arc<Reservations>,
    shutdown: CancellationToken,
    poll_interval: Duration,
    on_synchronized: SynchronizedHandler,
) {
    loop {
        if reservations.is_empty() {
            info!("Block download complete");
            on_synchronized(Ok(()));
            return;
        }

        select! {
            _ = shutdown.cancelled() => {
                on_synchronized(Err(NetworkError::ServiceStopped));
                return;
            }
            _ = sleep(poll_interval) => {}
        }
    }
}
