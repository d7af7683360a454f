//! Downstream listener configuration.

use std::net::SocketAddr;

use serde::Deserialize;

use super::defaults::default_listen_address;

/// Plain TCP listener for IRC clients.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenConfig {
    /// Address to bind.
    #[serde(default = "default_listen_address")]
    pub address: SocketAddr,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            address: default_listen_address(),
        }
    }
}
