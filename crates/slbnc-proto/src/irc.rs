//! IRC message codec for tokio.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{self, ProtocolError};
use crate::line::LineCodec;
use crate::message::Message;

/// Tokio codec for encoding/decoding IRC messages.
///
/// Wraps [`LineCodec`] and parses lines into [`Message`] values. Blank
/// lines are skipped. Decode errors consume the offending line, so a caller
/// may log the error and keep reading.
#[derive(Debug, Default)]
pub struct IrcCodec {
    inner: LineCodec,
}

impl IrcCodec {
    /// Create a new codec with the default 512-byte limit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new codec with a custom max line length.
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            inner: LineCodec::with_max_len(max_len),
        }
    }

    /// Sanitize outgoing message data.
    ///
    /// A parameter containing a line break would let a relayed message smuggle
    /// a second command onto the wire, so everything after the first line
    /// terminator is dropped.
    pub fn sanitize(mut data: String) -> String {
        if let Some(pos) = data.find(['\r', '\n']) {
            data.truncate(pos);
            data.push_str("\r\n");
        }
        data
    }
}

impl Decoder for IrcCodec {
    type Item = Message;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> error::Result<Option<Message>> {
        loop {
            match self.inner.decode(src)? {
                None => return Ok(None),
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => return line.parse::<Message>().map(Some),
            }
        }
    }
}

impl Encoder<Message> for IrcCodec {
    type Error = ProtocolError;

    fn encode(&mut self, msg: Message, dst: &mut BytesMut) -> error::Result<()> {
        let sanitized = Self::sanitize(msg.to_string());
        self.inner.encode(sanitized, dst)
    }
}
