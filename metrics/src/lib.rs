pub mod server;

pub use server::{run_metrics_server, MetricsServerConfig};

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    // Reservations
    reservations_pending: IntGauge,
    reservations_assigned: IntGauge,
    reservations_reassigned: IntCounter,
    blocks_downloaded: IntCounter,
    block_downloads_failed: IntCounter,
    // Chain
    top_candidate_height: IntGauge,
    top_confirmed_height: IntGauge,
    header_reorgs: IntCounter,
    block_reorgs: IntCounter,
    header_reorg_depth: Histogram,
}

fn gauge(registry: &Registry, name: &str, help: &str) -> IntGauge {
    let gauge = IntGauge::with_opts(Opts::new(name, help)).unwrap();
    registry.register(Box::new(gauge.clone())).unwrap();
    gauge
}

fn counter(registry: &Registry, name: &str, help: &str) -> IntCounter {
    let counter = IntCounter::with_opts(Opts::new(name, help)).unwrap();
    registry.register(Box::new(counter.clone())).unwrap();
    counter
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let reservations_pending = gauge(&registry, "node_reservations_pending", "Block downloads waiting for a worker");
        let reservations_assigned = gauge(&registry, "node_reservations_assigned", "Block downloads held by a worker");
        let reservations_reassigned = counter(
            &registry,
            "node_reservations_reassigned_total",
            "Stalled block downloads handed to another worker",
        );
        let blocks_downloaded = counter(&registry, "node_blocks_downloaded_total", "Blocks downloaded and stored");
        let block_downloads_failed = counter(
            &registry,
            "node_block_downloads_failed_total",
            "Block downloads that failed or timed out",
        );

        let top_candidate_height = gauge(&registry, "node_top_candidate_height", "Height of the top candidate header");
        let top_confirmed_height = gauge(&registry, "node_top_confirmed_height", "Height of the top confirmed block");
        let header_reorgs = counter(&registry, "node_header_reorgs_total", "Candidate chain reorganizations");
        let block_reorgs = counter(&registry, "node_block_reorgs_total", "Confirmed chain reorganizations");

        let header_reorg_depth = Histogram::with_opts(
            HistogramOpts::new("node_header_reorg_depth", "Headers displaced by a candidate reorganization")
                .buckets(vec![0.0, 1.0, 2.0, 3.0, 5.0, 10.0, 20.0, 50.0, 100.0]),
        ).unwrap();
        registry.register(Box::new(header_reorg_depth.clone())).unwrap();

        Self {
            registry,
            reservations_pending,
            reservations_assigned,
            reservations_reassigned,
            blocks_downloaded,
            block_downloads_failed,
            top_candidate_height,
            top_confirmed_height,
            header_reorgs,
            block_reorgs,
            header_reorg_depth,
        }
    }

    pub fn gather(&self) -> String {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::<u8>::new();
        let encoder = TextEncoder::new();
        encoder.encode(&metric_families, &mut buffer).expect("failed to encode metrics");
        String::from_utf8(buffer).expect("metrics not utf8")
    }

    pub fn set_reservations(&self, pending: usize, assigned: usize) {
        self.reservations_pending.set(pending as i64);
        self.reservations_assigned.set(assigned as i64);
    }

    pub fn inc_reservations_reassigned(&self) {
        self.reservations_reassigned.inc();
    }

    pub fn inc_blocks_downloaded(&self) {
        self.blocks_downloaded.inc();
    }

    pub fn inc_block_downloads_failed(&self) {
        self.block_downloads_failed.inc();
    }

    pub fn set_top_candidate_height(&self, height: u64) {
        self.top_candidate_height.set(height as i64);
    }

    pub fn set_top_confirmed_height(&self, height: u64) {
        self.top_confirmed_height.set(height as i64);
    }

    pub fn observe_header_reorg(&self, depth: usize) {
        self.header_reorgs.inc();
        self.header_reorg_depth.observe(depth as f64);
    }

    pub fn inc_block_reorgs(&self) {
        self.block_reorgs.inc();
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedMetrics = Arc<Metrics>;
