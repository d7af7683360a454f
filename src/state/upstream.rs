//! Shared handle to a live upstream connection.
//!
//! The upstream task is the only writer of the channel map; downstream tasks
//! read snapshots of it when replaying state and queue outgoing commands
//! through the bounded sender.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use slbnc_proto::{Message, Prefix, irc_to_lower};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::channel::Channel;
use crate::config::NetworkConfig;
use crate::error::ConnectionError;

#[derive(Debug)]
pub struct UpstreamConn {
    pub network: Arc<NetworkConfig>,
    sender: mpsc::Sender<Message>,
    nick: RwLock<String>,
    channels: RwLock<BTreeMap<String, Channel>>,
    closed: CancellationToken,
}

impl UpstreamConn {
    pub fn new(network: Arc<NetworkConfig>, sender: mpsc::Sender<Message>) -> Self {
        let nick = network.nick.clone();
        Self {
            network,
            sender,
            nick: RwLock::new(nick),
            channels: RwLock::new(BTreeMap::new()),
            closed: CancellationToken::new(),
        }
    }

    pub fn network_id(&self) -> i64 {
        self.network.id
    }

    pub fn network_name(&self) -> &str {
        &self.network.name
    }

    /// Queue a command for the upstream server. A full queue tears the
    /// connection down and lets the reconnect policy take over.
    pub fn send(&self, msg: Message) -> Result<(), ConnectionError> {
        match self.sender.try_send(msg) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                warn!(network = %self.network.name, "Upstream queue full, disconnecting");
                self.shutdown();
                Err(ConnectionError::SlowConsumer)
            }
            Err(TrySendError::Closed(_)) => Err(ConnectionError::QueueClosed),
        }
    }

    pub fn nick(&self) -> String {
        self.nick.read().clone()
    }

    pub(crate) fn set_nick(&self, nick: &str) {
        *self.nick.write() = nick.to_string();
    }

    pub fn is_self(&self, prefix: Option<&Prefix>) -> bool {
        prefix
            .and_then(Prefix::nick)
            .is_some_and(|n| slbnc_proto::irc_eq(n, &self.nick.read()))
    }

    /// Copies of every complete channel.
    pub fn complete_channels(&self) -> Vec<Channel> {
        self.channels
            .read()
            .values()
            .filter(|ch| ch.complete)
            .cloned()
            .collect()
    }

    pub fn is_complete(&self, channel: &str) -> bool {
        self.channels
            .read()
            .get(&irc_to_lower(channel))
            .is_some_and(|ch| ch.complete)
    }

    pub fn has_channel(&self, channel: &str) -> bool {
        self.channels.read().contains_key(&irc_to_lower(channel))
    }

    /// Copy of one channel, complete or not.
    #[cfg(test)]
    pub fn channel(&self, channel: &str) -> Option<Channel> {
        self.channels.read().get(&irc_to_lower(channel)).cloned()
    }

    /// Mutate the channel map. Only the upstream read task calls this.
    pub(crate) fn with_channels<R>(&self, f: impl FnOnce(&mut BTreeMap<String, Channel>) -> R) -> R {
        f(&mut self.channels.write())
    }

    /// Forget that any channel is complete, as after a disconnect.
    pub fn mark_incomplete(&self) {
        for ch in self.channels.write().values_mut() {
            ch.complete = false;
        }
    }

    pub fn shutdown(&self) {
        self.closed.cancel();
    }

    pub fn closed_token(&self) -> &CancellationToken {
        &self.closed
    }
}
