//! Switch configuration

use serde::{Deserialize, Serialize};

/// Configuration for the switching engine and its listener
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchConfig {
    /// Address the peer listener binds to
    pub bind_address: String,
    /// TCP port the peer listener binds to
    pub listen_port: u16,
    /// Maximum number of simultaneously connected peers
    pub max_connections: usize,
    /// Message slots per storage class
    pub slots_per_class: usize,
    /// Maximum entries in each cell broadcast selector list
    pub cell_broadcast_capacity: usize,
    /// Outbound frames queued per peer before sends to it start failing
    pub peer_queue_depth: usize,
    /// Initial SMS service centre address
    pub smsc: String,
}

impl Default for SwitchConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            listen_port: 5000,
            max_connections: 1,
            slots_per_class: 16,
            cell_broadcast_capacity: 50,
            peer_queue_depth: 32,
            smsc: String::new(),
        }
    }
}

impl SwitchConfig {
    /// Socket address string for the listener
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.listen_port)
    }
}
