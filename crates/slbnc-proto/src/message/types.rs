use std::borrow::Cow;

use crate::prefix::Prefix;
use crate::response::Response;

/// An owned IRC message.
///
/// The command is kept as its wire token (`PRIVMSG`, `001`, ...) and the
/// parameters as a flat list with the trailing parameter last, so that
/// messages can be relayed between connections without losing anything.
///
/// ```
/// use slbnc_proto::Message;
///
/// let msg: Message = ":nick!user@host PRIVMSG #channel :Hello there".parse().unwrap();
/// assert_eq!(msg.param(1), Some("Hello there"));
///
/// let reply = Message::new("PONG", ["irc.example.org", "token"]);
/// assert_eq!(reply.to_string(), "PONG irc.example.org token\r\n");
/// ```
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Message {
    /// IRCv3 message tags (e.g., `time`, `msgid`).
    pub tags: Option<Vec<Tag>>,
    /// Message prefix/source (e.g., `nick!user@host`).
    pub prefix: Option<Prefix>,
    /// Command token, upper-cased on parse.
    pub command: String,
    /// Parameters, trailing parameter included.
    pub params: Vec<String>,
}

/// A single IRCv3 message tag.
#[derive(Clone, PartialEq, Eq, Debug, Hash)]
pub struct Tag(
    /// Tag key (e.g., `time`, `msgid`).
    pub Cow<'static, str>,
    /// Optional tag value.
    pub Option<String>,
);

impl Tag {
    /// Create a new tag with a key and optional value.
    pub fn new(key: impl Into<String>, value: Option<String>) -> Self {
        Tag(Cow::Owned(key.into()), value)
    }

    /// Tag key.
    pub fn key(&self) -> &str {
        &self.0
    }

    /// True for client-only tags (`+` prefixed).
    pub fn is_client_only(&self) -> bool {
        self.0.starts_with('+')
    }
}

impl Message {
    /// Create a message from a command and its parameters.
    pub fn new<I, S>(command: impl Into<String>, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Message {
            tags: None,
            prefix: None,
            command: command.into(),
            params: params.into_iter().map(Into::into).collect(),
        }
    }

    /// Create a numeric reply.
    pub fn response<I, S>(response: Response, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Message::new(response.to_string(), params)
    }

    /// Set the prefix, consuming `self`.
    #[must_use]
    pub fn with_prefix(mut self, prefix: Prefix) -> Self {
        self.prefix = Some(prefix);
        self
    }

    /// Add or replace a tag, consuming `self`.
    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: Option<String>) -> Self {
        self.set_tag(key, value);
        self
    }

    /// Add or replace a tag in place.
    pub fn set_tag(&mut self, key: impl Into<String>, value: Option<String>) {
        let key = key.into();
        let tags = self.tags.get_or_insert_with(Vec::new);
        match tags.iter_mut().find(|t| t.0 == key) {
            Some(existing) => existing.1 = value,
            None => tags.push(Tag::new(key, value)),
        }
    }

    /// Remove a tag, returning its value if it was present.
    pub fn remove_tag(&mut self, key: &str) -> Option<Option<String>> {
        let tags = self.tags.as_mut()?;
        let pos = tags.iter().position(|t| t.0 == key)?;
        let removed = tags.remove(pos);
        if tags.is_empty() {
            self.tags = None;
        }
        Some(removed.1)
    }

    /// Keep only the tags for which `keep` returns true.
    pub fn retain_tags(&mut self, mut keep: impl FnMut(&Tag) -> bool) {
        if let Some(tags) = self.tags.as_mut() {
            tags.retain(|t| keep(t));
            if tags.is_empty() {
                self.tags = None;
            }
        }
    }

    /// Get the value of an IRCv3 tag by key.
    pub fn tag_value(&self, key: &str) -> Option<&str> {
        self.tags
            .as_ref()?
            .iter()
            .find(|Tag(k, _)| k.as_ref() == key)
            .and_then(|Tag(_, v)| v.as_deref())
    }

    /// Get the server-time tag value.
    pub fn server_time(&self) -> Option<&str> {
        self.tag_value("time")
    }

    /// Get the message ID tag.
    pub fn msgid(&self) -> Option<&str> {
        self.tag_value("msgid")
    }

    /// Get parameter `index`, if present.
    pub fn param(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }

    /// Get the nickname from the message prefix, if present.
    pub fn source_nickname(&self) -> Option<&str> {
        self.prefix.as_ref().and_then(Prefix::nick)
    }

    /// Interpret the command as a numeric reply.
    pub fn response_code(&self) -> Option<Response> {
        if self.command.len() != 3 {
            return None;
        }
        self.command.parse::<u16>().ok().and_then(Response::from_code)
    }
}
