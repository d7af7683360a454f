//! slbnc - multi-user IRC bouncer.
//!
//! Keeps one connection per configured network alive on behalf of each
//! account and multiplexes any number of client connections onto it.

mod caps;
mod config;
mod error;
mod handlers;
mod history;
mod intern;
mod network;
mod security;
mod state;
mod telemetry;

use crate::config::Config;
use crate::network::Gateway;
use crate::state::Server;
use tracing::{error, info, warn};
use zeroize::Zeroizing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init();

    let arg = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "slbnc.toml".to_string());
    if arg == "hash-password" {
        return hash_password();
    }
    let config_path = arg;

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;

    info!(
        server = %config.server.name,
        users = config.users.len(),
        history = ?config.history.backend,
        "Starting slbnc"
    );

    let store = history::open(&config.history).await?;
    let server = Server::new(config, store);
    let maintenance = server.spawn_maintenance();

    let gateway = Gateway::bind(std::sync::Arc::clone(&server)).await?;
    info!(addr = %gateway.local_addr()?, "Accepting clients");

    {
        let server = std::sync::Arc::clone(&server);
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Interrupt received, shutting down"),
                Err(e) => warn!(error = %e, "Failed to listen for interrupt, shutting down"),
            }
            server.shutdown();
        });
    }

    gateway.run().await?;
    let _ = maintenance.await;
    info!("Shutdown complete");
    Ok(())
}

/// `slbnc hash-password`: read a password from stdin and print its PHC hash
/// for the `password` field of a `[[user]]` entry.
fn hash_password() -> anyhow::Result<()> {
    let mut line = Zeroizing::new(String::new());
    std::io::stdin().read_line(&mut line)?;
    let password = line.trim_end_matches(['\r', '\n']);
    if password.is_empty() {
        anyhow::bail!("empty password");
    }
    let hash = security::password::hash_password(password)
        .map_err(|e| anyhow::anyhow!("failed to hash password: {e}"))?;
    println!("{hash}");
    Ok(())
}
