//! # slbnc-proto
//!
//! IRC protocol primitives used by the slbnc bouncer.
//!
//! ## Features
//!
//! - IRC message parsing and serialization with IRCv3 tags
//! - Numeric reply codes and constructors for the replies a bouncer emits
//! - A tokio line codec with a configurable line-length limit
//! - RFC 1459 case mapping
//! - Length-aware generators for JOIN, NAMES, ISUPPORT, MONITOR and MOTD
//!
//! ```rust
//! use slbnc_proto::Message;
//!
//! let raw = "@time=2023-01-01T12:00:00.000Z :nick!user@host PRIVMSG #channel :Hello!";
//! let message: Message = raw.parse().expect("valid IRC message");
//! assert_eq!(message.command, "PRIVMSG");
//! assert_eq!(message.server_time(), Some("2023-01-01T12:00:00.000Z"));
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod casemap;
pub mod error;
pub mod generate;
#[cfg(feature = "tokio")]
pub mod irc;
#[cfg(feature = "tokio")]
pub mod line;
pub mod message;
pub mod prefix;
pub mod response;
pub mod server_time;

pub use self::casemap::{irc_eq, irc_to_lower};
pub use self::error::{MessageParseError, ProtocolError};
#[cfg(feature = "tokio")]
pub use self::irc::IrcCodec;
pub use self::message::{Message, Tag};
pub use self::prefix::Prefix;
pub use self::response::Response;
