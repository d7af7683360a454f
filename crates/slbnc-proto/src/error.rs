//! Error types for the IRC protocol library.

use thiserror::Error;

/// Convenience type alias for Results using [`ProtocolError`].
pub type Result<T, E = ProtocolError> = std::result::Result<T, E>;

/// Transport-level protocol errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// I/O error during reading or writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The line was not valid UTF-8.
    #[error("invalid utf-8 at byte {byte_pos}")]
    InvalidUtf8 {
        /// Offset of the first invalid byte.
        byte_pos: usize,
    },

    /// A line exceeded the configured length limit.
    #[error("message too long: {actual} bytes (limit {limit})")]
    MessageTooLong {
        /// Observed length in bytes.
        actual: usize,
        /// Configured maximum.
        limit: usize,
    },

    /// A control character that may not appear on the wire.
    #[error("illegal control character: {0:?}")]
    IllegalControlChar(char),

    /// The line could not be parsed as an IRC message.
    #[error("invalid message: {string}")]
    InvalidMessage {
        /// The offending line.
        string: String,
        /// Underlying parse failure.
        #[source]
        cause: MessageParseError,
    },
}

/// Errors produced while parsing a single IRC line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum MessageParseError {
    /// The line was empty.
    #[error("empty message")]
    EmptyMessage,

    /// The command token was missing or not `1*letter / 3digit`.
    #[error("invalid command")]
    InvalidCommand,

    /// The prefix could not be parsed.
    #[error("invalid prefix: {0}")]
    InvalidPrefix(String),

    /// More than 15 parameters were present.
    #[error("too many parameters")]
    TooManyParams,
}

/// Returns true for control characters that must never appear inside a line.
pub(crate) fn is_illegal_control_char(ch: char) -> bool {
    matches!(ch, '\r' | '\n')
}
