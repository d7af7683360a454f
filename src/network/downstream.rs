//! Downstream connection task.
//!
//! One task reads and dispatches client commands; the writer task spawned
//! by [`spawn_writer`] drains the bounded outbound queue.

use std::net::SocketAddr;
use std::sync::Arc;

use slbnc_proto::{Message, ProtocolError};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{Instrument, debug, info, warn};

use super::transport::{MessageReader, spawn_writer};
use crate::caps::downstream_registry;
use crate::error::{ConnectionError, HandlerError};
use crate::handlers::{Context, Registry, Session};
use crate::state::{DownstreamHandle, Server};
use crate::telemetry::spans;

/// Why the read loop stopped.
#[derive(Debug)]
enum Exit {
    Quit(Option<String>),
    Eof,
    Shutdown,
    Failed(ConnectionError),
}

/// Serve one accepted client socket until it closes.
pub async fn run(server: Arc<Server>, registry: Arc<Registry>, stream: TcpStream, addr: SocketAddr) {
    let id = server.next_connection_id();
    serve(server, registry, stream, id, addr)
        .instrument(spans::downstream(id, addr))
        .await
}

async fn serve(
    server: Arc<Server>,
    registry: Arc<Registry>,
    stream: TcpStream,
    id: u64,
    addr: SocketAddr,
) {
    let limits = &server.config.limits;
    let (read_half, write_half) = stream.into_split();
    let (tx, rx) = mpsc::channel(limits.outbound_queue);
    let handle = Arc::new(DownstreamHandle::new(id, addr, tx));
    let writer = spawn_writer(write_half, rx, handle.closed_token().clone());
    let mut reader = MessageReader::new(read_half, limits.max_line_length);

    let mut session = Session::new(
        Arc::clone(&handle),
        downstream_registry(server.store.capabilities()),
    );
    let shutdown = server.shutdown_token();
    let deadline = tokio::time::sleep(server.config.timeouts.registration());
    tokio::pin!(deadline);

    let exit = loop {
        tokio::select! {
            _ = handle.closed_token().cancelled() => break Exit::Failed(handle.close_reason()),
            _ = shutdown.cancelled() => break Exit::Shutdown,
            _ = &mut deadline, if !session.is_registered() => {
                break Exit::Failed(ConnectionError::RegistrationTimeout);
            }
            read = reader.next() => match read {
                Ok(Some(msg)) => {
                    let mut ctx = Context { server: &server, session: &mut session };
                    match registry.dispatch(&mut ctx, &msg).await {
                        Ok(()) => {}
                        Err(HandlerError::Quit(reason)) => break Exit::Quit(reason),
                        Err(HandlerError::Connection(e)) => break Exit::Failed(e),
                        // The registry replies to every other error itself
                        Err(e) => debug!(error = %e, "Unhandled command error"),
                    }
                }
                Ok(None) => break Exit::Eof,
                Err(e @ ProtocolError::Io(_)) => break Exit::Failed(e.into()),
                Err(e) => debug!(error = %e, "Discarded malformed line"),
            },
        }
    };

    let farewell = match &exit {
        Exit::Quit(reason) => Some(format!("Quit: {}", reason.as_deref().unwrap_or("Client quit"))),
        Exit::Failed(ConnectionError::RegistrationTimeout) => {
            warn!("Registration timed out");
            Some("Connection registration timed out".to_string())
        }
        // Registered sessions already got it from `Server::shutdown`
        Exit::Shutdown if !session.is_registered() => Some("Server shutting down".to_string()),
        _ => None,
    };
    if let Some(text) = farewell {
        let _ = handle.send(Message::new("ERROR", [text]));
    }

    if let Err(e) = session.close() {
        warn!(error = %e, "Session close failed");
    }
    let _ = writer.await;
    info!(exit = ?exit, registered = session.user.is_some(), "Connection closed");
}
