//! Logging setup and span constructors.

use tracing_subscriber::EnvFilter;

/// Install the global `fmt` subscriber. `RUST_LOG` overrides the default
/// `info` filter.
pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();
}

/// Standardized span constructors.
pub mod spans {
    use std::net::SocketAddr;

    use tracing::{Span, debug_span, info_span};

    /// Span for a downstream client connection.
    pub fn downstream(conn_id: u64, addr: SocketAddr) -> Span {
        info_span!("downstream", conn_id = conn_id, addr = %addr)
    }

    /// Span for the upstream connection of one user's network.
    pub fn upstream(user: &str, network: &str) -> Span {
        info_span!("upstream", user = %user, network = %network)
    }

    /// Span for a downstream command execution.
    pub fn command(name: &str, conn_id: u64) -> Span {
        debug_span!("command", name = %name, conn_id = conn_id)
    }
}
