//! Gateway - TCP listener that accepts downstream connections.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{info, instrument, warn};

use super::downstream;
use crate::handlers::Registry;
use crate::state::Server;

/// The Gateway accepts incoming TCP connections and spawns a task for each.
pub struct Gateway {
    listener: TcpListener,
    server: Arc<Server>,
    registry: Arc<Registry>,
}

impl Gateway {
    /// Bind the gateway to the configured listen address.
    pub async fn bind(server: Arc<Server>) -> anyhow::Result<Self> {
        let addr = server.config.listen.address;
        let listener = TcpListener::bind(addr).await?;
        info!(%addr, "Listener bound");
        Ok(Self {
            listener,
            server,
            registry: Arc::new(Registry::new()),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until the server shuts down.
    #[instrument(skip(self), name = "gateway")]
    pub async fn run(self) -> anyhow::Result<()> {
        let shutdown = self.server.shutdown_token();
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Gateway stopping");
                    return Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        if let Err(e) = stream.set_nodelay(true) {
                            warn!(%addr, error = %e, "Failed to set TCP_NODELAY");
                        }
                        info!(%addr, "Connection accepted");
                        tokio::spawn(downstream::run(
                            Arc::clone(&self.server),
                            Arc::clone(&self.registry),
                            stream,
                            addr,
                        ));
                    }
                    Err(e) => warn!(error = %e, "Accept failed"),
                },
            }
        }
    }
}
