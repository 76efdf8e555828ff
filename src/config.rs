//! Node configuration
//!
//! Plain settings with defaults, loadable from a JSON file. Any field
//! missing from the file keeps its default.

use crate::consensus::params::Network;
use crate::network::protocol::{MAX_MESSAGE_SIZE, PROTOCOL_VERSION};
use crate::network::types::NodeServices;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Node configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub network: Network,
    /// Highest protocol version we negotiate
    pub protocol_version: i32,
    /// Largest payload accepted from a peer
    pub max_message_size: u32,
    pub user_agent: String,
    /// Raw service bits advertised in `version`
    pub services: u64,
    /// Ask peers to announce transactions
    pub relay: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            network: Network::Mainnet,
            protocol_version: PROTOCOL_VERSION,
            max_message_size: MAX_MESSAGE_SIZE,
            user_agent: format!("/bitnode:{}/", env!("CARGO_PKG_VERSION")),
            services: (NodeServices::NETWORK | NodeServices::WITNESS).bits(),
            relay: false,
        }
    }
}

impl NodeConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path)?;
        let config = serde_json::from_str(&data)?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let data = serde_json::to_string_pretty(self)?;
        fs::write(path, data)?;
        Ok(())
    }

    pub fn services(&self) -> NodeServices {
        NodeServices::from_bits_retain(self.services)
    }
}
