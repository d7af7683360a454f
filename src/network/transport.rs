//! Socket plumbing shared by downstream and upstream connections.
//!
//! Reads go through [`MessageReader`], which keeps its buffer across calls so
//! it can sit in a `select!` without losing data. Writes are done by a
//! separate task draining the connection's bounded queue.

use bytes::BytesMut;
use futures_util::SinkExt;
use slbnc_proto::{IrcCodec, Message, ProtocolError};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{Decoder, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Room for IRCv3 tags on top of the classic line limit.
pub const TAG_ALLOWANCE: usize = 8191;

pub struct MessageReader<R> {
    inner: R,
    buf: BytesMut,
    codec: IrcCodec,
}

impl<R: AsyncRead + Unpin> MessageReader<R> {
    pub fn new(inner: R, max_line_length: usize) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(4096),
            codec: IrcCodec::with_max_len(max_line_length + TAG_ALLOWANCE),
        }
    }

    /// Next message, or `None` at end of stream.
    ///
    /// `ProtocolError::Io` is fatal. Any other error concerns a single line
    /// that has already been discarded; reading may continue.
    pub async fn next(&mut self) -> Result<Option<Message>, ProtocolError> {
        loop {
            if let Some(msg) = self.codec.decode(&mut self.buf)? {
                return Ok(Some(msg));
            }
            if self.inner.read_buf(&mut self.buf).await? == 0 {
                return Ok(None);
            }
        }
    }
}

/// Spawn the task writing queued messages to `writer`.
///
/// When `closed` fires, the queue is closed to new messages, whatever is
/// still in it is written, and the write half is shut down. A write failure
/// fires `closed` itself so the reading side stops too.
pub fn spawn_writer<W>(
    writer: W,
    mut rx: mpsc::Receiver<Message>,
    closed: CancellationToken,
) -> JoinHandle<()>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut framed = FramedWrite::new(writer, IrcCodec::new());
        loop {
            tokio::select! {
                biased;
                _ = closed.cancelled() => {
                    rx.close();
                    while let Some(msg) = rx.recv().await {
                        if framed.feed(msg).await.is_err() {
                            break;
                        }
                    }
                    break;
                }
                msg = rx.recv() => match msg {
                    Some(msg) => {
                        if let Err(e) = framed.send(msg).await {
                            debug!(error = %e, "Write failed");
                            closed.cancel();
                            rx.close();
                            break;
                        }
                    }
                    None => break,
                },
            }
        }
        let _ = framed.close().await;
    })
}
