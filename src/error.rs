//! Unified error handling for slbnc.
//!
//! Handler errors are protocol errors: each maps to the reply sent back to the
//! client that issued the command, and the connection stays open. Connection
//! errors describe transport and lifecycle failures of a single connection.

use slbnc_proto::{Message, Prefix, ProtocolError, Response};
use thiserror::Error;

use crate::history::StoreError;

// ============================================================================
// Handler Errors (command processing)
// ============================================================================

/// Errors that can occur during command handling.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("not enough parameters")]
    NeedMoreParams,

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("invalid CAP subcommand: {0}")]
    InvalidCapCommand(String),

    #[error("not registered")]
    NotRegistered,

    #[error("already registered")]
    AlreadyRegistered,

    /// Unknown account or wrong password; the two are not distinguished.
    #[error("invalid username or password")]
    PasswordMismatch,

    #[error("no such nick/channel: {0}")]
    NoSuchNick(String),

    /// Structured `FAIL <command> <code> [context...] :<description>` reply.
    #[error("{command} {code}: {description}")]
    Fail {
        command: String,
        code: &'static str,
        context: Vec<String>,
        description: String,
    },

    #[error("message store error: {0}")]
    Store(#[from] StoreError),

    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("client quit: {0:?}")]
    Quit(Option<String>),
}

impl HandlerError {
    /// Build a structured FAIL error.
    pub fn fail(
        command: impl Into<String>,
        code: &'static str,
        context: impl IntoIterator<Item = String>,
        description: impl Into<String>,
    ) -> Self {
        Self::Fail {
            command: command.into(),
            code,
            context: context.into_iter().collect(),
            description: description.into(),
        }
    }

    /// Get a static error code string for log labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NeedMoreParams => "need_more_params",
            Self::UnknownCommand(_) => "unknown_command",
            Self::InvalidCapCommand(_) => "invalid_cap_command",
            Self::NotRegistered => "not_registered",
            Self::AlreadyRegistered => "already_registered",
            Self::PasswordMismatch => "password_mismatch",
            Self::NoSuchNick(_) => "no_such_nick",
            Self::Fail { .. } => "fail",
            Self::Store(_) => "store_error",
            Self::Connection(_) => "connection_error",
            Self::Quit(_) => "quit",
        }
    }

    /// Convert to an IRC error reply message.
    ///
    /// Returns `None` for errors that don't warrant a client-visible reply
    /// (e.g., internal errors, connection failures, quit).
    pub fn to_irc_reply(&self, server_name: &str, nick: &str, cmd_name: &str) -> Option<Message> {
        let msg = match self {
            Self::NeedMoreParams => Response::err_needmoreparams(nick, cmd_name),
            Self::UnknownCommand(cmd) => Response::err_unknowncommand(nick, cmd),
            Self::InvalidCapCommand(sub) => Response::err_invalidcapcmd(nick, sub),
            Self::NotRegistered => Response::err_notregistered(nick),
            Self::AlreadyRegistered => Response::err_alreadyregistred(nick),
            Self::PasswordMismatch => Response::err_passwdmismatch(nick),
            Self::NoSuchNick(target) => Response::err_nosuchnick(nick, target),
            Self::Fail {
                command,
                code,
                context,
                description,
            } => {
                let mut params = vec![command.clone(), code.to_string()];
                params.extend(context.iter().cloned());
                params.push(description.clone());
                Message::new("FAIL", params)
            }
            // Backend details stay in the log
            Self::Store(_) => Message::new(
                "FAIL",
                [cmd_name, "MESSAGE_ERROR", "Failed to access message history"],
            ),

            Self::Connection(_) => return None,
            Self::Quit(_) => return None,
        };

        Some(msg.with_prefix(Prefix::ServerName(server_name.to_string())))
    }
}

/// Result type for command handlers.
pub type HandlerResult = Result<(), HandlerError>;

// ============================================================================
// Connection Errors (transport and lifecycle)
// ============================================================================

/// Errors fatal to a single connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// `close` was called on a connection that is already closed.
    #[error("connection already closed")]
    AlreadyClosed,

    /// The outbound queue was full.
    #[error("outbound queue full")]
    SlowConsumer,

    /// The outbound queue has been shut down.
    #[error("outbound queue closed")]
    QueueClosed,

    #[error("registration timed out")]
    RegistrationTimeout,

    #[error("transport error: {0}")]
    Transport(#[from] ProtocolError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
