//! Upstream connections: one long-lived task per configured network.
//!
//! The task connects, registers, serves the connection until it drops, then
//! waits out an exponential backoff and starts over. It runs until the
//! server shuts down; detaching downstream clients never stops it.

mod session;

use std::sync::Arc;
use std::time::Duration;

use backoff::ExponentialBackoffBuilder;
use backoff::backoff::Backoff;
use slbnc_proto::{Message, ProtocolError};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, warn};

use self::session::UpstreamSession;
use super::transport::{MessageReader, spawn_writer};
use crate::config::NetworkConfig;
use crate::error::ConnectionError;
use crate::state::{Server, UpstreamConn, User};
use crate::telemetry::spans;

/// Start the connection task of one network.
pub fn spawn(server: Arc<Server>, user: Arc<User>, network: Arc<NetworkConfig>) -> JoinHandle<()> {
    let span = spans::upstream(&user.username, &network.name);
    tokio::spawn(run(server, user, network).instrument(span))
}

async fn run(server: Arc<Server>, user: Arc<User>, network: Arc<NetworkConfig>) {
    let reconnect = &server.config.reconnect;
    let mut backoff = ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_secs(reconnect.initial))
        .with_max_interval(Duration::from_secs(reconnect.max))
        .with_max_elapsed_time(None)
        .build();
    let shutdown = server.shutdown_token();

    loop {
        let connected = tokio::select! {
            _ = shutdown.cancelled() => break,
            result = connect(&server, &network) => result,
        };

        match connected {
            Ok(stream) => {
                let registered = serve(&server, &user, &network, stream).await;
                if registered {
                    backoff.reset();
                }
            }
            Err(e) => warn!(address = %network.address, error = %e, "Failed to connect"),
        }
        if shutdown.is_cancelled() {
            break;
        }

        let delay = backoff
            .next_backoff()
            .unwrap_or(Duration::from_secs(reconnect.max));
        info!(delay_secs = delay.as_secs_f64(), "Reconnecting after delay");
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }
    debug!("Upstream task stopped");
}

async fn connect(server: &Server, network: &NetworkConfig) -> Result<TcpStream, ConnectionError> {
    let timeout = server.config.timeouts.upstream_connect();
    info!(address = %network.address, "Connecting");
    match tokio::time::timeout(timeout, TcpStream::connect(&network.address)).await {
        Ok(stream) => Ok(stream?),
        Err(_) => Err(ConnectionError::Io(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "connect timed out",
        ))),
    }
}

/// Run one connection to completion. Returns whether it got registered.
async fn serve(server: &Arc<Server>, user: &Arc<User>, network: &Arc<NetworkConfig>, stream: TcpStream) -> bool {
    let limits = &server.config.limits;
    let (read_half, write_half) = stream.into_split();
    let (tx, rx) = mpsc::channel(limits.outbound_queue);
    let conn = Arc::new(UpstreamConn::new(Arc::clone(network), tx));
    let writer = spawn_writer(write_half, rx, conn.closed_token().clone());
    let mut reader = MessageReader::new(read_half, limits.max_line_length);
    let shutdown = server.shutdown_token();

    let mut session = UpstreamSession::new(Arc::clone(server), Arc::clone(user), Arc::clone(&conn));
    let result = match session.start() {
        Ok(()) => loop {
            tokio::select! {
                _ = conn.closed_token().cancelled() => break Err(ConnectionError::QueueClosed),
                _ = shutdown.cancelled() => {
                    let _ = conn.send(Message::new("QUIT", ["slbnc shutting down"]));
                    break Ok(());
                }
                read = reader.next() => match read {
                    Ok(Some(msg)) => {
                        if let Err(e) = session.handle_message(msg).await {
                            break Err(e);
                        }
                    }
                    Ok(None) => break Ok(()),
                    Err(ProtocolError::Io(e)) => break Err(e.into()),
                    Err(e) => debug!(error = %e, "Discarded malformed upstream line"),
                },
            }
        },
        Err(e) => Err(e),
    };

    match &result {
        Ok(()) => info!("Upstream connection closed"),
        Err(e) => warn!(error = %e, "Upstream connection lost"),
    }
    let registered = session.is_registered();
    session.disconnected();
    conn.shutdown();
    let _ = writer.await;
    registered
}
