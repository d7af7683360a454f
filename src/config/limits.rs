//! Queue and line-length limits.

use serde::Deserialize;

use super::defaults::{default_max_line_length, default_outbound_queue};

/// Per-connection limits.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Capacity of each connection's outbound queue. A downstream whose queue
    /// fills up is disconnected.
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,
    /// Longest accepted inbound line, including tags and CRLF.
    #[serde(default = "default_max_line_length")]
    pub max_line_length: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            outbound_queue: default_outbound_queue(),
            max_line_length: default_max_line_length(),
        }
    }
}
