use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Full node service bit.
pub const SERVICE_NODE_NETWORK: u64 = 1;
/// Segregated witness service bit.
pub const SERVICE_NODE_WITNESS: u64 = 1 << 3;

pub const DEFAULT_NETWORK_THREADS: usize = 4;
pub const DEFAULT_INBOUND_PORT: u16 = 8333;
pub const DEFAULT_INBOUND_CONNECTIONS: usize = 100;
pub const DEFAULT_OUTBOUND_CONNECTIONS: usize = 8;
pub const DEFAULT_HOST_POOL_CAPACITY: usize = 10_000;

/// Peer network settings. Timeouts are derived with [`NetworkSettings::timeouts`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    pub threads: usize,
    /// Zero disables inbound connections.
    pub inbound_port: u16,
    pub inbound_connections: usize,
    pub outbound_connections: usize,
    pub manual_attempt_limit: u32,
    pub connect_batch_size: u32,
    pub connect_timeout_seconds: u64,
    pub channel_handshake_seconds: u64,
    pub channel_heartbeat_minutes: u64,
    pub channel_inactivity_minutes: u64,
    pub channel_expiration_minutes: u64,
    pub host_pool_capacity: usize,
    pub relay_transactions: bool,
    pub services: u64,
    pub hosts_file: PathBuf,
    /// Manually configured peers, one manual session each.
    pub peers: Vec<String>,
    pub seeds: Vec<String>,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            threads: DEFAULT_NETWORK_THREADS,
            inbound_port: DEFAULT_INBOUND_PORT,
            inbound_connections: DEFAULT_INBOUND_CONNECTIONS,
            outbound_connections: DEFAULT_OUTBOUND_CONNECTIONS,
            manual_attempt_limit: 0,
            connect_batch_size: 5,
            connect_timeout_seconds: 5,
            channel_handshake_seconds: 30,
            channel_heartbeat_minutes: 5,
            channel_inactivity_minutes: 10,
            channel_expiration_minutes: 60,
            host_pool_capacity: DEFAULT_HOST_POOL_CAPACITY,
            relay_transactions: true,
            services: SERVICE_NODE_NETWORK | SERVICE_NODE_WITNESS,
            hosts_file: PathBuf::from("hosts.cache"),
            peers: Vec::new(),
            seeds: Vec::new(),
        }
    }
}

/// Channel timeouts, derived once from [`NetworkSettings`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Duration,
    pub handshake: Duration,
    pub heartbeat: Duration,
    pub inactivity: Duration,
    pub expiration: Duration,
}

impl NetworkSettings {
    /// Connections the node dials itself: outbound plus manual peers.
    pub fn minimum_connections(&self) -> usize {
        self.outbound_connections + self.peers.len()
    }

    pub fn inbound_enabled(&self) -> bool {
        self.inbound_port != 0 && self.inbound_connections > 0
    }

    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            connect: Duration::from_secs(self.connect_timeout_seconds),
            handshake: Duration::from_secs(self.channel_handshake_seconds),
            heartbeat: Duration::from_secs(self.channel_heartbeat_minutes.saturating_mul(60)),
            inactivity: Duration::from_secs(self.channel_inactivity_minutes.saturating_mul(60)),
            expiration: Duration::from_secs(self.channel_expiration_minutes.saturating_mul(60)),
        }
    }
}
