//! IRC message prefix.
//!
//! A prefix identifies the origin of a message: either a server name or a
//! user's `nick!user@host` mask.

use std::fmt;

use crate::error::MessageParseError;

/// IRC message prefix.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub enum Prefix {
    /// Server name (e.g., "irc.example.com")
    ServerName(String),
    /// User prefix: (nickname, username, hostname)
    Nickname(String, String, String),
}

impl Prefix {
    /// Create a user prefix from nick, user and host components.
    pub fn new(nick: impl Into<String>, user: impl Into<String>, host: impl Into<String>) -> Self {
        Prefix::Nickname(nick.into(), user.into(), host.into())
    }

    /// Lenient parse: a dot before any `!`/`@` marks a server name.
    pub fn new_from_str(s: &str) -> Self {
        let (before_at, host) = match s.split_once('@') {
            Some((before, host)) => (before, Some(host)),
            None => (s, None),
        };
        let (nick, user) = match before_at.split_once('!') {
            Some((nick, user)) => (nick, Some(user)),
            None => (before_at, None),
        };

        if user.is_none() && host.is_none() && nick.contains('.') {
            return Prefix::ServerName(nick.to_owned());
        }

        Prefix::Nickname(
            nick.to_owned(),
            user.unwrap_or_default().to_owned(),
            host.unwrap_or_default().to_owned(),
        )
    }

    /// Parse with validation, rejecting empty prefixes and embedded spaces
    /// or control characters.
    pub fn try_from_str(s: &str) -> Result<Self, MessageParseError> {
        if s.is_empty() || s.chars().any(|c| c == ' ' || c.is_control()) {
            return Err(MessageParseError::InvalidPrefix(s.to_owned()));
        }
        Ok(Self::new_from_str(s))
    }

    /// Nickname, if this is a user prefix.
    pub fn nick(&self) -> Option<&str> {
        match self {
            Prefix::Nickname(nick, _, _) if !nick.is_empty() => Some(nick),
            _ => None,
        }
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Prefix::ServerName(name) => write!(f, "{}", name),
            Prefix::Nickname(name, user, host) => {
                write!(f, "{}", name)?;
                if !user.is_empty() {
                    write!(f, "!{}", user)?;
                }
                if !host.is_empty() {
                    write!(f, "@{}", host)?;
                }
                Ok(())
            }
        }
    }
}
