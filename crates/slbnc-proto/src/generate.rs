//! Length-aware generators for multi-line replies.
//!
//! Every generator keeps each produced line (without its CRLF) within
//! [`MAX_MESSAGE_LENGTH`] bytes whenever a single item fits at all.

use crate::message::Message;
use crate::prefix::Prefix;
use crate::response::Response;

/// Maximum length of a serialized line, excluding CRLF.
pub const MAX_MESSAGE_LENGTH: usize = 512;

/// Maximum number of parameters in one message.
pub const MAX_MESSAGE_PARAMS: usize = 15;

/// Channel visibility symbol used in `RPL_NAMREPLY`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ChannelStatus {
    /// `=`
    #[default]
    Public,
    /// `*`
    Private,
    /// `@`
    Secret,
}

impl ChannelStatus {
    /// Wire symbol.
    pub fn as_str(self) -> &'static str {
        match self {
            ChannelStatus::Public => "=",
            ChannelStatus::Private => "*",
            ChannelStatus::Secret => "@",
        }
    }

    /// Parse the `RPL_NAMREPLY` symbol.
    pub fn from_symbol(s: &str) -> Option<Self> {
        match s {
            "=" => Some(ChannelStatus::Public),
            "*" => Some(ChannelStatus::Private),
            "@" => Some(ChannelStatus::Secret),
            _ => None,
        }
    }
}

/// Build `JOIN` commands for a list of channels and their keys.
///
/// Keyed channels are placed first (then sorted by name), so every key list
/// lines up with the leading entries of its channel list. A missing or empty
/// key means the channel has none.
pub fn generate_join(channels: &[&str], keys: &[&str]) -> Vec<Message> {
    let mut pairs: Vec<(&str, &str)> = channels
        .iter()
        .enumerate()
        .map(|(i, c)| (*c, keys.get(i).copied().unwrap_or("")))
        .collect();
    pairs.sort_by(|a, b| {
        a.1.is_empty()
            .cmp(&b.1.is_empty())
            .then_with(|| a.0.cmp(b.0))
    });

    // "JOIN" plus two separating spaces
    let max_length = MAX_MESSAGE_LENGTH - ("JOIN".len() + 2);

    let mut msgs = Vec::new();
    let mut channels_buf = String::new();
    let mut keys_buf = String::new();

    let flush = |channels_buf: &mut String, keys_buf: &mut String, msgs: &mut Vec<Message>| {
        let mut params = vec![std::mem::take(channels_buf)];
        if !keys_buf.is_empty() {
            params.push(std::mem::take(keys_buf));
        }
        msgs.push(Message::new("JOIN", params));
    };

    for (channel, key) in pairs {
        let mut n = channels_buf.len() + keys_buf.len() + 1 + channel.len();
        if !key.is_empty() {
            n += 1 + key.len();
        }

        if !channels_buf.is_empty() && n > max_length {
            flush(&mut channels_buf, &mut keys_buf, &mut msgs);
        }

        if !channels_buf.is_empty() {
            channels_buf.push(',');
        }
        channels_buf.push_str(channel);
        if !key.is_empty() {
            if !keys_buf.is_empty() {
                keys_buf.push(',');
            }
            keys_buf.push_str(key);
        }
    }

    if !channels_buf.is_empty() {
        flush(&mut channels_buf, &mut keys_buf, &mut msgs);
    }

    msgs
}

/// Build `RPL_ISUPPORT` lines, at most `MAX_MESSAGE_PARAMS - 2` tokens each.
pub fn generate_isupport(prefix: &Prefix, nick: &str, tokens: &[String]) -> Vec<Message> {
    let max_tokens = MAX_MESSAGE_PARAMS - 2;

    tokens
        .chunks(max_tokens)
        .map(|chunk| {
            let mut params = Vec::with_capacity(chunk.len() + 2);
            params.push(nick.to_owned());
            params.extend(chunk.iter().cloned());
            params.push("are supported by this server".to_owned());
            Message::response(Response::RPL_ISUPPORT, params).with_prefix(prefix.clone())
        })
        .collect()
}

/// Build a MOTD block: one `RPL_MOTD` per input line between start and end.
pub fn generate_motd(prefix: &Prefix, nick: &str, motd: &str) -> Vec<Message> {
    let mut msgs = vec![Message::response(
        Response::RPL_MOTDSTART,
        [nick, "- Message of the Day -"],
    )
    .with_prefix(prefix.clone())];

    for line in motd.split('\n') {
        msgs.push(
            Message::response(Response::RPL_MOTD, [nick, line]).with_prefix(prefix.clone()),
        );
    }

    msgs.push(
        Message::response(Response::RPL_ENDOFMOTD, [nick, "End of /MOTD command."])
            .with_prefix(prefix.clone()),
    );
    msgs
}

/// Build `MONITOR <subcmd> target,target,...` commands.
pub fn generate_monitor(subcmd: &str, targets: &[&str]) -> Vec<Message> {
    let max_length = MAX_MESSAGE_LENGTH - format!("MONITOR {} ", subcmd).len();

    let mut msgs = Vec::new();
    let mut buf: Vec<&str> = Vec::new();
    let mut n = 0;
    for target in targets {
        if !buf.is_empty() && n + target.len() + 1 > max_length {
            msgs.push(Message::new("MONITOR", [subcmd.to_owned(), buf.join(",")]));
            buf.clear();
            n = 0;
        }
        buf.push(target);
        n += target.len() + 1;
    }

    if !buf.is_empty() {
        msgs.push(Message::new("MONITOR", [subcmd.to_owned(), buf.join(",")]));
    }
    msgs
}

/// Build `RPL_NAMREPLY` lines for `members`, followed by one `RPL_ENDOFNAMES`.
///
/// Members should already carry their membership prefix (`@nick`).
pub fn generate_names_reply(
    prefix: &Prefix,
    nick: &str,
    channel: &str,
    status: ChannelStatus,
    members: &[String],
) -> Vec<Message> {
    let names_reply = |names: String| {
        Message::response(
            Response::RPL_NAMREPLY,
            [nick.to_owned(), status.as_str().to_owned(), channel.to_owned(), names],
        )
        .with_prefix(prefix.clone())
    };

    let empty_len = names_reply(String::new()).to_string().len() - 2;
    let max_length = MAX_MESSAGE_LENGTH.saturating_sub(empty_len);

    let mut msgs = Vec::new();
    let mut buf = String::new();
    for member in members {
        let n = buf.len() + 1 + member.len();
        if !buf.is_empty() && n > max_length {
            msgs.push(names_reply(std::mem::take(&mut buf)));
        }
        if !buf.is_empty() {
            buf.push(' ');
        }
        buf.push_str(member);
    }

    if !buf.is_empty() {
        msgs.push(names_reply(buf));
    }

    msgs.push(
        Message::response(
            Response::RPL_ENDOFNAMES,
            [nick, channel, "End of /NAMES list"],
        )
        .with_prefix(prefix.clone()),
    );
    msgs
}
