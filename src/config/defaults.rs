//! Default value functions for configuration.

// =============================================================================
// Server Defaults
// =============================================================================

pub fn default_server_name() -> String {
    "slbnc".to_string()
}

// =============================================================================
// Listener Defaults
// =============================================================================

pub fn default_listen_address() -> std::net::SocketAddr {
    std::net::SocketAddr::from(([127, 0, 0, 1], 6667))
}

// =============================================================================
// Timeout Defaults
// =============================================================================

pub fn default_registration_timeout() -> u64 {
    60
}

pub fn default_upstream_connect_timeout() -> u64 {
    15
}

// =============================================================================
// Limit Defaults
// =============================================================================

pub fn default_outbound_queue() -> usize {
    64
}

pub fn default_max_line_length() -> usize {
    512
}

// =============================================================================
// History Defaults
// =============================================================================

pub fn default_history_path() -> String {
    "slbnc.db".to_string()
}

pub fn default_query_timeout() -> u64 {
    5
}

// =============================================================================
// Reconnect Defaults
// =============================================================================

pub fn default_reconnect_initial() -> u64 {
    2
}

pub fn default_reconnect_max() -> u64 {
    300
}

// =============================================================================
// Intern Defaults
// =============================================================================

pub fn default_intern_reset_interval() -> u64 {
    24 * 60 * 60
}
