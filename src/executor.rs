use std::time::Duration;

use anyhow::{anyhow, Result};
use networking::P2pNetwork;
use node::{FullNode, NodeError};
use tokio::select;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Interval at which the control loop checks whether the node stopped.
const STOP_SENSITIVITY: Duration = Duration::from_millis(10);

/// Drives a node through start, run, wait for stop, stop and close.
///
/// The shutdown token is cancelled on interrupt, on synchronization
/// failure, and on a fatal chain event inside the node.
pub struct Executor<N: P2pNetwork> {
    node: FullNode<N>,
    shutdown: CancellationToken,
    stop_when_synchronized: bool,
}

impl<N: P2pNetwork> Executor<N> {
    pub fn new(node: FullNode<N>, shutdown: CancellationToken) -> Self {
        Self {
            node,
            shutdown,
            stop_when_synchronized: false,
        }
    }

    pub fn stop_when_synchronized(mut self, stop: bool) -> Self {
        self.stop_when_synchronized = stop;
        self
    }

    /// Run the node until it stops. `seed` runs after start, before the
    /// initial backfill.
    pub async fn run(self, seed: impl FnOnce() -> Result<()>) -> Result<()> {
        info!("Node is starting");

        if let Err(err) = self.node.start() {
            error!(%err, "Node failed to start");
            self.node.close();
            return Err(err.into());
        }

        for peer in &self.node.network_settings().peers {
            let session = self.node.attach_manual_session();
            info!(worker = %session.id(), %peer, "Manual session");
        }
        for _ in 0..self.node.network_settings().outbound_connections {
            self.node.attach_outbound_session();
        }

        if let Err(err) = seed() {
            error!("Failed to seed chain: {err:#}");
            self.node.close();
            return Err(err);
        }

        let shutdown = self.shutdown.clone();
        let stop_when_synchronized = self.stop_when_synchronized;
        let synchronized = self.node.run(Box::new(move |result| match result {
            Ok(()) => {
                info!("Node is synchronized");
                if stop_when_synchronized {
                    shutdown.cancel();
                }
            }
            Err(NodeError::ServiceStopped) => {}
            Err(err) => {
                error!(%err, "Node failed to synchronize");
                shutdown.cancel();
            }
        }));

        if let Err(err) = synchronized {
            error!(%err, "Node failed to run");
            self.node.close();
            return Err(err.into());
        }

        info!(
            top_block = %self.node.top_block(),
            top_header = %self.node.top_header(),
            pending = self.node.reservations().size(),
            "Node is running"
        );

        self.wait_on_stop().await;

        info!("Node is stopping");
        if !self.node.close() {
            error!("Node failed to stop");
            return Err(anyhow!(NodeError::StopFailure("node".into())));
        }

        info!(top_block = %self.node.top_block(), "Node stopped successfully");
        Ok(())
    }

    async fn wait_on_stop(&self) {
        let mut ticker = interval(STOP_SENSITIVITY);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let interrupt = tokio::signal::ctrl_c();
        tokio::pin!(interrupt);

        loop {
            select! {
                _ = self.shutdown.cancelled() => break,
                result = &mut interrupt => {
                    match result {
                        Ok(()) => info!("Interrupt received"),
                        Err(err) => error!(%err, "Failed to listen for interrupt"),
                    }
                    self.shutdown.cancel();
                    break;
                }
                _ = ticker.tick() => {
                    if self.node.stopped() {
                        break;
                    }
                }
            }
        }
    }
}
