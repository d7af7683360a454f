//! Shared handle to a downstream connection.
//!
//! The connection task owns the socket and the registration state. Everything
//! other tasks need to reach it (the bounded outbound queue, the enabled
//! capability flags, the current nickname) lives in a [`DownstreamHandle`]
//! that the owning [`User`](super::User) keeps in its attached set.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use slbnc_proto::{Message, Prefix};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::caps::CapSnapshot;
use crate::error::ConnectionError;

/// Commands whose first parameter is a channel (or a nick).
const TARGET_FIRST: &[&str] = &[
    "JOIN", "PART", "PRIVMSG", "NOTICE", "TAGMSG", "TOPIC", "MODE", "KICK",
];

#[derive(Debug)]
pub struct DownstreamHandle {
    pub id: u64,
    pub addr: SocketAddr,
    sender: mpsc::Sender<Message>,
    caps: RwLock<CapSnapshot>,
    nick: RwLock<String>,
    network: RwLock<Option<i64>>,
    closed: CancellationToken,
    /// Set when the connection was closed for falling behind.
    slow: AtomicBool,
}

impl DownstreamHandle {
    pub fn new(id: u64, addr: SocketAddr, sender: mpsc::Sender<Message>) -> Self {
        Self {
            id,
            addr,
            sender,
            caps: RwLock::new(CapSnapshot::default()),
            nick: RwLock::new("*".to_string()),
            network: RwLock::new(None),
            closed: CancellationToken::new(),
            slow: AtomicBool::new(false),
        }
    }

    /// Queue a message without waiting.
    ///
    /// A full queue closes the connection: dropping a message would leave the
    /// client with a silently inconsistent view.
    pub fn send(&self, msg: Message) -> Result<(), ConnectionError> {
        match self.sender.try_send(msg) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                warn!(conn_id = self.id, "Outbound queue full, closing slow downstream");
                self.slow.store(true, Ordering::Relaxed);
                self.shutdown();
                Err(ConnectionError::SlowConsumer)
            }
            Err(TrySendError::Closed(_)) => Err(ConnectionError::QueueClosed),
        }
    }

    pub fn caps(&self) -> CapSnapshot {
        *self.caps.read()
    }

    pub fn set_caps(&self, caps: CapSnapshot) {
        *self.caps.write() = caps;
    }

    pub fn nick(&self) -> String {
        self.nick.read().clone()
    }

    pub fn set_nick(&self, nick: &str) {
        *self.nick.write() = nick.to_string();
    }

    /// Network this session is bound to, if any.
    pub fn network(&self) -> Option<i64> {
        *self.network.read()
    }

    pub fn set_network(&self, network: Option<i64>) {
        *self.network.write() = network;
    }

    /// Whether traffic from `network` is relevant to this session.
    pub fn follows(&self, network: i64) -> bool {
        self.network().is_none_or(|bound| bound == network)
    }

    /// Ask the connection task to close.
    pub fn shutdown(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    pub fn closed_token(&self) -> &CancellationToken {
        &self.closed
    }

    /// Why the connection was closed from outside its own task.
    pub fn close_reason(&self) -> ConnectionError {
        if self.slow.load(Ordering::Relaxed) {
            ConnectionError::SlowConsumer
        } else {
            ConnectionError::QueueClosed
        }
    }

    /// Translate a message received from an upstream into what this client
    /// should see, or `None` if it should not see it at all.
    ///
    /// Tags are cut down to the enabled capabilities, the upstream nickname
    /// is replaced by the client's, and channel names get a `/network` suffix
    /// when the session is not bound to a single network.
    pub fn marshal(&self, msg: &Message, network_name: &str, upstream_nick: &str) -> Option<Message> {
        let caps = self.caps();
        if msg.command == "TAGMSG" && !caps.message_tags {
            return None;
        }

        let mut out = msg.clone();
        filter_tags(&mut out, caps);

        let nick = self.nick();
        if let Some(Prefix::Nickname(n, _, _)) = &mut out.prefix
            && slbnc_proto::irc_eq(n, upstream_nick)
        {
            *n = nick.clone();
        }
        let addressed = out.response_code().is_some() || TARGET_FIRST.contains(&out.command.as_str());
        if addressed
            && let Some(first) = out.params.first_mut()
            && slbnc_proto::irc_eq(first, upstream_nick)
        {
            *first = nick;
        }

        if self.network().is_none() {
            suffix_channels(&mut out, network_name);
        }
        Some(out)
    }
}

/// Drop the tags a client has not asked for.
pub fn filter_tags(msg: &mut Message, caps: CapSnapshot) {
    msg.retain_tags(|tag| match tag.key() {
        "time" => caps.server_time,
        _ => caps.message_tags,
    });
}

/// Whether `name` is a channel name (`#` or `&` prefixed).
pub fn is_channel(name: &str) -> bool {
    name.starts_with(['#', '&'])
}

/// Append `/network` to every channel name a message carries.
pub fn suffix_channels(msg: &mut Message, network_name: &str) {
    let index = match msg.command.as_str() {
        cmd if TARGET_FIRST.contains(&cmd) => 0,
        "INVITE" | "331" | "332" | "333" | "366" => 1,
        "353" => 2,
        _ => return,
    };
    if let Some(param) = msg.params.get_mut(index)
        && is_channel(param)
    {
        *param = format!("{param}/{network_name}");
    }
}

/// Split a client-side target into its name and optional network suffix.
pub fn split_network_suffix(target: &str) -> (&str, Option<&str>) {
    match target.rsplit_once('/') {
        Some((name, network)) if !name.is_empty() && !network.is_empty() => (name, Some(network)),
        _ => (target, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> (DownstreamHandle, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(2);
        let handle = DownstreamHandle::new(1, "127.0.0.1:1".parse().unwrap(), tx);
        (handle, rx)
    }

    #[test]
    fn test_full_queue_closes_connection() {
        let (handle, _rx) = handle();
        handle.send(Message::new("PING", ["a"])).unwrap();
        handle.send(Message::new("PING", ["b"])).unwrap();
        assert!(matches!(
            handle.send(Message::new("PING", ["c"])),
            Err(ConnectionError::SlowConsumer)
        ));
        assert!(handle.is_closed());
        assert!(matches!(handle.close_reason(), ConnectionError::SlowConsumer));
    }

    #[test]
    fn test_close_reason_without_overflow() {
        let (handle, _rx) = handle();
        handle.shutdown();
        assert!(matches!(handle.close_reason(), ConnectionError::QueueClosed));
    }

    #[test]
    fn test_closed_queue() {
        let (handle, rx) = handle();
        drop(rx);
        assert!(matches!(
            handle.send(Message::new("PING", ["a"])),
            Err(ConnectionError::QueueClosed)
        ));
    }

    #[test]
    fn test_marshal_filters_tags() {
        let (handle, _rx) = handle();
        let msg: Message = "@time=2024-01-01T00:00:00.000Z;msgid=abc :bob!b@h PRIVMSG #a :hi"
            .parse()
            .unwrap();

        handle.set_network(Some(1));
        let plain = handle.marshal(&msg, "net", "me").unwrap();
        assert!(plain.tags.is_none());

        handle.set_caps(CapSnapshot {
            server_time: true,
            ..Default::default()
        });
        let timed = handle.marshal(&msg, "net", "me").unwrap();
        assert!(timed.server_time().is_some());
        assert!(timed.msgid().is_none());
    }

    #[test]
    fn test_marshal_drops_tagmsg_without_message_tags() {
        let (handle, _rx) = handle();
        let msg = Message::new("TAGMSG", ["#a"]);
        assert!(handle.marshal(&msg, "net", "me").is_none());
    }

    #[test]
    fn test_marshal_rewrites_nick_and_suffixes() {
        let (handle, _rx) = handle();
        handle.set_nick("alice");
        let join: Message = ":alice_!u@h JOIN #rust".parse().unwrap();
        let out = handle.marshal(&join, "libera", "alice_").unwrap();
        assert_eq!(out.to_string(), ":alice!u@h JOIN #rust/libera\r\n");

        let topic: Message = ":srv 332 alice_ #rust :hello".parse().unwrap();
        let out = handle.marshal(&topic, "libera", "alice_").unwrap();
        assert_eq!(out.params, ["alice", "#rust/libera", "hello"]);

        let query: Message = ":bob!b@h PRIVMSG alice_ :hi".parse().unwrap();
        let out = handle.marshal(&query, "libera", "alice_").unwrap();
        assert_eq!(out.params, ["alice", "hi"]);
    }

    #[test]
    fn test_private_targets_not_suffixed() {
        let mut msg: Message = ":bob!b@h PRIVMSG me :hi".parse().unwrap();
        suffix_channels(&mut msg, "net");
        assert_eq!(msg.param(0), Some("me"));
    }

    #[test]
    fn test_split_network_suffix() {
        assert_eq!(split_network_suffix("#rust/libera"), ("#rust", Some("libera")));
        assert_eq!(split_network_suffix("#rust"), ("#rust", None));
        assert_eq!(split_network_suffix("#a/"), ("#a/", None));
    }

    #[test]
    fn test_follows() {
        let (handle, _rx) = handle();
        assert!(handle.follows(3));
        handle.set_network(Some(2));
        assert!(handle.follows(2));
        assert!(!handle.follows(3));
    }
}
