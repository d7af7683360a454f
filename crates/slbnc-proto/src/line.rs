//! Line-based codec for tokio.
//!
//! Reads and writes newline-terminated UTF-8 lines with a length limit.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{self, ProtocolError};

/// Default line limit, in bytes, including the line terminator.
pub const DEFAULT_MAX_LEN: usize = 512;

/// Line-based codec that handles newline-terminated messages.
///
/// A line that exceeds the limit is reported once as
/// [`ProtocolError::MessageTooLong`] and then skipped up to its terminator,
/// so the codec stays usable after the error.
#[derive(Debug)]
pub struct LineCodec {
    /// Index of next byte to check for newline
    next_index: usize,
    /// Maximum line length
    max_len: usize,
    /// Dropping the remainder of an oversized line
    discarding: bool,
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::with_max_len(DEFAULT_MAX_LEN)
    }
}

impl LineCodec {
    /// Create a new codec with a custom max line length.
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            next_index: 0,
            max_len,
            discarding: false,
        }
    }

    fn validate_line(s: &str) -> error::Result<()> {
        let trimmed = s.trim_end_matches(['\r', '\n']);
        for ch in trimmed.chars() {
            if error::is_illegal_control_char(ch) {
                return Err(ProtocolError::IllegalControlChar(ch));
            }
        }
        Ok(())
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> error::Result<Option<String>> {
        loop {
            let Some(offset) = src[self.next_index..].iter().position(|b| *b == b'\n') else {
                if self.discarding {
                    src.clear();
                    self.next_index = 0;
                    return Ok(None);
                }

                self.next_index = src.len();
                if src.len() > self.max_len {
                    let actual = src.len();
                    src.clear();
                    self.next_index = 0;
                    self.discarding = true;
                    return Err(ProtocolError::MessageTooLong {
                        actual,
                        limit: self.max_len,
                    });
                }
                return Ok(None);
            };

            let line = src.split_to(self.next_index + offset + 1);
            self.next_index = 0;

            if self.discarding {
                self.discarding = false;
                continue;
            }

            if line.len() > self.max_len {
                return Err(ProtocolError::MessageTooLong {
                    actual: line.len(),
                    limit: self.max_len,
                });
            }

            let data = String::from_utf8(line.to_vec()).map_err(|e| {
                ProtocolError::InvalidUtf8 {
                    byte_pos: e.utf8_error().valid_up_to(),
                }
            })?;

            Self::validate_line(&data)?;
            return Ok(Some(data));
        }
    }
}

impl Encoder<String> for LineCodec {
    type Error = ProtocolError;

    fn encode(&mut self, msg: String, dst: &mut BytesMut) -> error::Result<()> {
        dst.extend_from_slice(msg.as_bytes());
        Ok(())
    }
}
