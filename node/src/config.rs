use std::fs;
use std::path::Path;
use std::time::Duration;

use chain::ChainSettings;
use metrics::MetricsServerConfig;
use networking::sync::{DEFAULT_BLOCK_LATENCY_SECONDS, DEFAULT_MAXIMUM_DEVIATION};
use networking::NetworkSettings;
use serde::{Deserialize, Serialize};

use crate::error::NodeError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSettings {
    /// Heights an assigned download may trail the lowest pending height.
    pub maximum_deviation: u64,
    pub block_latency_seconds: u64,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            maximum_deviation: DEFAULT_MAXIMUM_DEVIATION,
            block_latency_seconds: DEFAULT_BLOCK_LATENCY_SECONDS,
        }
    }
}

impl NodeSettings {
    pub fn block_latency(&self) -> Duration {
        Duration::from_secs(self.block_latency_seconds)
    }
}

/// Complete node configuration, one section per component.
///
/// The metrics endpoint is served only when its section is present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub node: NodeSettings,
    pub chain: ChainSettings,
    pub network: NetworkSettings,
    pub metrics: Option<MetricsServerConfig>,
}

impl Configuration {
    pub fn load(path: &Path) -> Result<Self, NodeError> {
        let text = fs::read_to_string(path)
            .map_err(|err| NodeError::Config(format!("{}: {err}", path.display())))?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> Result<Self, NodeError> {
        serde_yaml::from_str(text).map_err(|err| NodeError::Config(err.to_string()))
    }
}
