//! Upstream channel state.
//!
//! A [`Channel`] is owned by one upstream connection and mutated only by its
//! read task. It becomes complete once the join burst (topic and the end of
//! the member list) has been received; only complete channels are shown to
//! downstream clients.

use std::collections::BTreeMap;
use std::sync::Arc;

use slbnc_proto::generate::{self, ChannelStatus};
use slbnc_proto::{Message, Prefix, Response, irc_to_lower};

/// Membership prefix symbols assumed until the server sends `PREFIX`.
pub const DEFAULT_MEMBERSHIP_PREFIXES: &str = "~&@%+";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub nick: Arc<str>,
    /// Membership symbols, highest rank first (`@+`).
    pub prefixes: String,
}

#[derive(Debug, Clone)]
pub struct Channel {
    pub name: Arc<str>,
    pub complete: bool,
    pub topic: Option<String>,
    pub status: ChannelStatus,
    members: BTreeMap<String, Member>,
}

impl Channel {
    pub fn new(name: Arc<str>) -> Self {
        Self {
            name,
            complete: false,
            topic: None,
            status: ChannelStatus::Public,
            members: BTreeMap::new(),
        }
    }

    pub fn add_member(&mut self, nick: Arc<str>, prefixes: impl Into<String>) {
        let key = irc_to_lower(&nick);
        self.members.insert(
            key,
            Member {
                nick,
                prefixes: prefixes.into(),
            },
        );
    }

    pub fn remove_member(&mut self, nick: &str) -> bool {
        self.members.remove(&irc_to_lower(nick)).is_some()
    }

    pub fn has_member(&self, nick: &str) -> bool {
        self.members.contains_key(&irc_to_lower(nick))
    }

    pub fn rename_member(&mut self, old: &str, new: Arc<str>) {
        if let Some(mut member) = self.members.remove(&irc_to_lower(old)) {
            member.nick = Arc::clone(&new);
            self.members.insert(irc_to_lower(&new), member);
        }
    }

    #[cfg(test)]
    pub fn member(&self, nick: &str) -> Option<&Member> {
        self.members.get(&irc_to_lower(nick))
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Names as they appear in `RPL_NAMREPLY`. Without `multi_prefix` only
    /// the highest membership symbol is kept.
    pub fn member_names(&self, multi_prefix: bool) -> Vec<String> {
        self.members
            .values()
            .map(|m| {
                let prefixes = match m.prefixes.chars().next() {
                    Some(c) if !multi_prefix => &m.prefixes[..c.len_utf8()],
                    _ => m.prefixes.as_str(),
                };
                format!("{}{}", prefixes, m.nick)
            })
            .collect()
    }

    /// Messages that bring a freshly attached client up to date with this
    /// channel: JOIN, topic, then the member list.
    ///
    /// `display_name` is the channel name as the client sees it.
    pub fn snapshot(
        &self,
        server: &Prefix,
        client: &Prefix,
        nick: &str,
        display_name: &str,
    ) -> Vec<Message> {
        let mut msgs = vec![Message::new("JOIN", [display_name]).with_prefix(client.clone())];

        let topic = match &self.topic {
            Some(topic) => Message::response(Response::RPL_TOPIC, [nick, display_name, topic.as_str()]),
            None => Message::response(
                Response::RPL_NOTOPIC,
                [nick, display_name, "No topic is set"],
            ),
        };
        msgs.push(topic.with_prefix(server.clone()));

        msgs.extend(generate::generate_names_reply(
            server,
            nick,
            display_name,
            self.status,
            &self.member_names(false),
        ));
        msgs
    }
}

/// Split a `RPL_NAMREPLY` entry into its membership symbols and nickname.
pub fn split_member_prefix<'a>(entry: &'a str, symbols: &str) -> (&'a str, &'a str) {
    let nick_start = entry
        .char_indices()
        .find(|(_, c)| !symbols.contains(*c))
        .map_or(entry.len(), |(i, _)| i);
    entry.split_at(nick_start)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> Channel {
        let mut ch = Channel::new(Arc::from("#rust"));
        ch.add_member(Arc::from("alice"), "@+");
        ch.add_member(Arc::from("Bob"), "");
        ch
    }

    #[test]
    fn test_members_case_insensitive() {
        let mut ch = channel();
        assert!(ch.has_member("ALICE"));
        assert!(ch.remove_member("bob"));
        assert_eq!(ch.member_count(), 1);
    }

    #[test]
    fn test_rename_member_keeps_prefixes() {
        let mut ch = channel();
        ch.rename_member("alice", Arc::from("alice2"));
        assert!(!ch.has_member("alice"));
        assert_eq!(ch.member("alice2").unwrap().prefixes, "@+");
    }

    #[test]
    fn test_member_names() {
        let ch = channel();
        let mut single = ch.member_names(false);
        single.sort();
        assert_eq!(single, ["@alice", "Bob"]);
        assert!(ch.member_names(true).contains(&"@+alice".to_string()));
    }

    #[test]
    fn test_split_member_prefix() {
        assert_eq!(split_member_prefix("@+nick", "~&@%+"), ("@+", "nick"));
        assert_eq!(split_member_prefix("nick", "~&@%+"), ("", "nick"));
        assert_eq!(split_member_prefix("@", "@"), ("@", ""));
    }

    #[test]
    fn test_snapshot_shape() {
        let mut ch = channel();
        ch.topic = Some("Rust talk".into());
        let server = Prefix::ServerName("bnc".into());
        let client = Prefix::new("me", "~me", "bnc");
        let msgs = ch.snapshot(&server, &client, "me", "#rust/libera");

        assert_eq!(msgs[0].command, "JOIN");
        assert_eq!(msgs[0].param(0), Some("#rust/libera"));
        assert_eq!(msgs[1].command, "332");
        assert_eq!(msgs[1].param(2), Some("Rust talk"));
        assert_eq!(msgs[2].command, "353");
        assert_eq!(msgs.last().unwrap().command, "366");
    }
}
