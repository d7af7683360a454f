//! Protocol state of one upstream connection.
//!
//! [`UpstreamSession`] registers with the IRC server, keeps the channel map of
//! its [`UpstreamConn`] in sync with the traffic it reads, stores messages and
//! hands everything a client should see to the owning [`User`].

use std::sync::Arc;

use slbnc_proto::generate::{ChannelStatus, generate_join};
use slbnc_proto::{Message, Prefix, server_time};
use tracing::{debug, info, warn};

use crate::caps::{CapRegistry, UPSTREAM_WANTED};
use crate::error::ConnectionError;
use crate::history::STORED_COMMANDS;
use crate::state::{
    Channel, DEFAULT_MEMBERSHIP_PREFIXES, DownstreamHandle, Server, UpstreamConn, User,
    is_channel, split_member_prefix,
};

/// Numerics of the registration burst, consumed by the bouncer.
const WELCOME_BURST: &[&str] = &[
    "002", "003", "004", "250", "251", "252", "253", "254", "255", "265", "266", "372", "375",
    "376", "422",
];

pub(super) struct UpstreamSession {
    server: Arc<Server>,
    user: Arc<User>,
    conn: Arc<UpstreamConn>,
    caps: CapRegistry,
    registered: bool,
    /// Membership symbols from `PREFIX`, highest rank first.
    membership: String,
}

/// What to do with a message once state has been updated.
enum Disposition {
    Forward,
    Consume,
}

impl UpstreamSession {
    pub(super) fn new(server: Arc<Server>, user: Arc<User>, conn: Arc<UpstreamConn>) -> Self {
        Self {
            server,
            user,
            conn,
            caps: CapRegistry::new(),
            registered: false,
            membership: DEFAULT_MEMBERSHIP_PREFIXES.to_string(),
        }
    }

    pub(super) fn is_registered(&self) -> bool {
        self.registered
    }

    /// Send the registration burst.
    pub(super) fn start(&self) -> Result<(), ConnectionError> {
        let network = &self.conn.network;
        self.conn.send(Message::new("CAP", ["LS", "302"]))?;
        if let Some(password) = &network.password {
            self.conn.send(Message::new("PASS", [password.as_str()]))?;
        }
        self.conn.send(Message::new("NICK", [network.nick.as_str()]))?;
        self.conn.send(Message::new(
            "USER",
            [network.username(), "0", "*", network.realname()],
        ))
    }

    /// Process one message read from the server.
    pub(super) async fn handle_message(&mut self, mut msg: Message) -> Result<(), ConnectionError> {
        match msg.command.as_str() {
            "PING" => return self.conn.send(Message::new("PONG", msg.params)),
            "PONG" => return Ok(()),
            "CAP" => return self.handle_cap(&msg),
            "ERROR" => {
                warn!(reason = msg.param(0).unwrap_or(""), "Upstream sent ERROR");
                return Ok(());
            }
            _ => {}
        }

        if !self.registered {
            return self.handle_unregistered(&msg);
        }

        if msg.server_time().is_none() {
            msg.set_tag("time", Some(server_time::now()));
        }
        if STORED_COMMANDS.contains(&msg.command.as_str()) {
            self.store(&mut msg).await;
        }

        let disposition = match msg.command.as_str() {
            "005" => {
                self.parse_isupport(&msg);
                Disposition::Consume
            }
            cmd if WELCOME_BURST.contains(&cmd) => Disposition::Consume,
            "JOIN" => self.on_join(&msg),
            "PART" => self.on_part(&msg, msg.source_nickname()),
            "KICK" => self.on_part(&msg, msg.param(1)),
            "QUIT" => self.on_quit(&msg),
            "NICK" => self.on_nick(&msg),
            "TOPIC" => self.on_topic(msg.param(0), msg.param(1)),
            "332" => self.on_topic(msg.param(1), msg.param(2)),
            "331" => self.on_topic(msg.param(1), None),
            "353" => self.on_names(&msg),
            "366" => self.on_end_of_names(&msg),
            cmd if STORED_COMMANDS.contains(&cmd) => self.visibility(msg.param(0)),
            _ => Disposition::Forward,
        };

        if let Disposition::Forward = disposition {
            self.user.forward_from_upstream(&self.conn, &msg);
        }
        Ok(())
    }

    /// Called once the connection is gone.
    pub(super) fn disconnected(&mut self) {
        if !self.registered {
            return;
        }
        self.registered = false;
        self.conn.mark_incomplete();
        self.user.set_upstream(self.conn.network_id(), None);
        self.notify(&format!("Disconnected from {}", self.conn.network_name()));
    }

    fn handle_unregistered(&mut self, msg: &Message) -> Result<(), ConnectionError> {
        match msg.command.as_str() {
            "001" => {
                if let Some(nick) = msg.param(0) {
                    self.conn.set_nick(nick);
                }
                self.registered = true;
                self.user
                    .set_upstream(self.conn.network_id(), Some(Arc::clone(&self.conn)));
                info!(nick = %self.conn.nick(), "Registered with upstream");
                self.notify(&format!("Connected to {}", self.conn.network_name()));
                self.autojoin()
            }
            "433" | "437" => {
                let nick = format!("{}_", self.conn.nick());
                debug!(nick = %nick, "Nickname unavailable, retrying");
                self.conn.set_nick(&nick);
                self.conn.send(Message::new("NICK", [nick]))
            }
            _ => Ok(()),
        }
    }

    fn handle_cap(&mut self, msg: &Message) -> Result<(), ConnectionError> {
        match msg.param(1) {
            Some("LS") => {
                // `CAP * LS * :...` marks a continued listing
                let more = msg.params.len() > 3 && msg.param(2) == Some("*");
                let tokens = msg.params.last().map(String::as_str).unwrap_or("");
                for token in tokens.split_whitespace() {
                    let (name, value) = token.split_once('=').unwrap_or((token, ""));
                    self.caps.advertise(name, value);
                }
                if more || self.registered {
                    return Ok(());
                }
                let wanted: Vec<&str> = UPSTREAM_WANTED
                    .iter()
                    .copied()
                    .filter(|cap| self.caps.is_available(cap))
                    .collect();
                if wanted.is_empty() {
                    return self.conn.send(Message::new("CAP", ["END"]));
                }
                self.conn.send(Message::new("CAP", ["REQ".to_string(), wanted.join(" ")]))
            }
            Some("ACK") => {
                let names = msg.param(2).unwrap_or("");
                self.caps.enable(names.split_whitespace());
                debug!(caps = names, "Upstream capabilities enabled");
                self.end_negotiation()
            }
            Some("NAK") => {
                debug!(caps = msg.param(2).unwrap_or(""), "Upstream refused capabilities");
                self.end_negotiation()
            }
            Some("NEW") => {
                let mut wanted = Vec::new();
                for token in msg.param(2).unwrap_or("").split_whitespace() {
                    let (name, value) = token.split_once('=').unwrap_or((token, ""));
                    self.caps.advertise(name, value);
                    if UPSTREAM_WANTED.contains(&name) && !self.caps.is_enabled(name) {
                        wanted.push(name);
                    }
                }
                if wanted.is_empty() {
                    return Ok(());
                }
                self.conn.send(Message::new("CAP", ["REQ".to_string(), wanted.join(" ")]))
            }
            Some("DEL") => {
                let names = msg.param(2).unwrap_or("");
                for name in names.split_whitespace() {
                    self.caps.withdraw(name);
                }
                debug!(caps = names, "Upstream capabilities withdrawn");
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn end_negotiation(&self) -> Result<(), ConnectionError> {
        if self.registered {
            return Ok(());
        }
        self.conn.send(Message::new("CAP", ["END"]))
    }

    fn autojoin(&self) -> Result<(), ConnectionError> {
        let channels = &self.conn.network.channels;
        if channels.is_empty() {
            return Ok(());
        }
        let names: Vec<&str> = channels.iter().map(|c| c.name.as_str()).collect();
        let keys: Vec<&str> = channels
            .iter()
            .map(|c| c.key.as_deref().unwrap_or(""))
            .collect();
        for join in generate_join(&names, &keys) {
            self.conn.send(join)?;
        }
        Ok(())
    }

    fn parse_isupport(&mut self, msg: &Message) {
        // params: nick, tokens..., trailing text
        let tokens = msg.params.iter().skip(1).take(msg.params.len().saturating_sub(2));
        for token in tokens {
            if let Some(value) = token.strip_prefix("PREFIX=") {
                self.membership = value
                    .split_once(')')
                    .map_or(value, |(_, symbols)| symbols)
                    .to_string();
            }
        }
    }

    fn on_join(&self, msg: &Message) -> Disposition {
        let (Some(channel), Some(nick)) = (msg.param(0), msg.source_nickname()) else {
            return Disposition::Consume;
        };
        if self.conn.is_self(msg.prefix.as_ref()) {
            let name = self.server.interner.intern(channel);
            self.conn.with_channels(|chans| {
                chans.insert(slbnc_proto::irc_to_lower(channel), Channel::new(name));
            });
            debug!(channel = %channel, "Joined channel");
            return Disposition::Consume;
        }
        let nick = self.server.interner.intern(nick);
        self.with_channel(channel, |ch| ch.add_member(nick, ""));
        self.visibility(Some(channel))
    }

    fn on_part(&self, msg: &Message, nick: Option<&str>) -> Disposition {
        let (Some(channel), Some(nick)) = (msg.param(0), nick) else {
            return Disposition::Consume;
        };
        let disposition = self.visibility(Some(channel));
        if slbnc_proto::irc_eq(nick, &self.conn.nick()) {
            self.conn.with_channels(|chans| chans.remove(&slbnc_proto::irc_to_lower(channel)));
            debug!(channel = %channel, "Left channel");
        } else {
            self.with_channel(channel, |ch| {
                ch.remove_member(nick);
            });
        }
        disposition
    }

    fn on_quit(&self, msg: &Message) -> Disposition {
        let Some(nick) = msg.source_nickname() else {
            return Disposition::Consume;
        };
        let shared = self.conn.with_channels(|chans| {
            chans
                .values_mut()
                .fold(false, |shared, ch| ch.remove_member(nick) && ch.complete || shared)
        });
        if shared {
            Disposition::Forward
        } else {
            Disposition::Consume
        }
    }

    fn on_nick(&self, msg: &Message) -> Disposition {
        let (Some(old), Some(new)) = (msg.source_nickname(), msg.param(0)) else {
            return Disposition::Consume;
        };
        let is_self = self.conn.is_self(msg.prefix.as_ref());
        let new_name = self.server.interner.intern(new);
        let shared = self.conn.with_channels(|chans| {
            let mut shared = false;
            for ch in chans.values_mut() {
                if ch.has_member(old) {
                    ch.rename_member(old, Arc::clone(&new_name));
                    shared |= ch.complete;
                }
            }
            shared
        });
        if is_self {
            info!(nick = %new, "Upstream nickname changed");
            self.conn.set_nick(new);
            return Disposition::Consume;
        }
        if shared {
            Disposition::Forward
        } else {
            Disposition::Consume
        }
    }

    fn on_topic(&self, channel: Option<&str>, topic: Option<&str>) -> Disposition {
        let Some(channel) = channel else {
            return Disposition::Consume;
        };
        let topic = topic.filter(|t| !t.is_empty()).map(str::to_string);
        self.with_channel(channel, |ch| ch.topic = topic);
        self.visibility(Some(channel))
    }

    fn on_names(&self, msg: &Message) -> Disposition {
        let (Some(symbol), Some(channel), Some(names)) = (msg.param(1), msg.param(2), msg.param(3))
        else {
            return Disposition::Forward;
        };
        if !self.is_joining(channel) {
            return Disposition::Forward;
        }
        let status = ChannelStatus::from_symbol(symbol);
        let interner = &self.server.interner;
        self.with_channel(channel, |ch| {
            if let Some(status) = status {
                ch.status = status;
            }
            for entry in names.split_whitespace() {
                let (prefixes, nick) = split_member_prefix(entry, &self.membership);
                if !nick.is_empty() {
                    ch.add_member(interner.intern(nick), prefixes);
                }
            }
        });
        Disposition::Consume
    }

    fn on_end_of_names(&self, msg: &Message) -> Disposition {
        let Some(channel) = msg.param(1) else {
            return Disposition::Forward;
        };
        if !self.is_joining(channel) {
            return Disposition::Forward;
        }
        if let Some((channel, downstreams)) = self.user.complete_channel(&self.conn, channel) {
            debug!(channel = %channel.name, members = channel.member_count(), "Channel complete");
            self.replay(&channel, &downstreams);
        }
        Disposition::Consume
    }

    /// Store a PRIVMSG/NOTICE/TAGMSG and tag it with its message ID.
    async fn store(&self, msg: &mut Message) {
        let Some(Prefix::Nickname(sender, _, _)) = &msg.prefix else {
            return;
        };
        let Some(target) = msg.param(0) else { return };
        let key = if is_channel(target) || self.conn.is_self(msg.prefix.as_ref()) {
            target.to_string()
        } else {
            sender.clone()
        };
        match self.server.store.append(self.conn.network_id(), &key, msg).await {
            Ok(id) if !id.is_empty() => msg.set_tag("msgid", Some(id)),
            Ok(_) => {}
            Err(e) => warn!(target = %key, error = %e, "Failed to store message"),
        }
    }

    /// Channel traffic is shown only once the channel is complete.
    fn visibility(&self, target: Option<&str>) -> Disposition {
        match target {
            Some(t) if is_channel(t) && !self.conn.is_complete(t) => Disposition::Consume,
            _ => Disposition::Forward,
        }
    }

    fn is_joining(&self, channel: &str) -> bool {
        self.conn.has_channel(channel) && !self.conn.is_complete(channel)
    }

    fn with_channel(&self, channel: &str, f: impl FnOnce(&mut Channel)) {
        self.conn.with_channels(|chans| {
            if let Some(ch) = chans.get_mut(&slbnc_proto::irc_to_lower(channel)) {
                f(ch);
            }
        });
    }

    /// Show a channel that just completed to every client following it.
    fn replay(&self, channel: &Channel, downstreams: &[Arc<DownstreamHandle>]) {
        let network = self.conn.network_id();
        let server_prefix = self.server.prefix();
        let username = format!("~{}", self.user.username);
        for dc in downstreams {
            if !dc.follows(network) {
                continue;
            }
            let nick = dc.nick();
            let display = match dc.network() {
                Some(_) => channel.name.to_string(),
                None => format!("{}/{}", channel.name, self.conn.network_name()),
            };
            let client_prefix = Prefix::new(nick.as_str(), username.as_str(), dc.addr.ip().to_string());
            for msg in channel.snapshot(&server_prefix, &client_prefix, &nick, &display) {
                if dc.send(msg).is_err() {
                    break;
                }
            }
        }
    }

    /// Server NOTICE to every client following this network.
    fn notify(&self, text: &str) {
        let network = self.conn.network_id();
        for dc in self.user.downstreams() {
            if dc.follows(network) {
                let notice = Message::new("NOTICE", [dc.nick().as_str(), text])
                    .with_prefix(self.server.prefix());
                let _ = dc.send(notice);
            }
        }
    }
}
