//! A bouncer account: the routing hub between its upstream and downstream
//! connections.
//!
//! One [`Mutex`] guards both the network table (with each network's live
//! upstream) and the attached downstream set. Nothing performs I/O while
//! holding it: iteration copies the handles out first, and sends only push
//! onto bounded queues.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use slbnc_proto::{Message, irc_to_lower};
use tracing::{debug, info, warn};

use super::channel::Channel;
use super::downstream::DownstreamHandle;
use super::upstream::UpstreamConn;
use crate::config::{NetworkConfig, UserConfig};

/// A configured network and its connection, absent while offline.
#[derive(Debug)]
pub struct Network {
    pub config: Arc<NetworkConfig>,
    upstream: Option<Arc<UpstreamConn>>,
}

#[derive(Debug, Default)]
struct UserInner {
    networks: BTreeMap<i64, Network>,
    downstreams: HashMap<u64, Arc<DownstreamHandle>>,
}

#[derive(Debug)]
pub struct User {
    pub username: String,
    inner: Mutex<UserInner>,
}

impl User {
    pub fn new(config: &UserConfig) -> Self {
        let networks = config
            .networks
            .iter()
            .map(|n| {
                (
                    n.id,
                    Network {
                        config: Arc::new(n.clone()),
                        upstream: None,
                    },
                )
            })
            .collect();

        Self {
            username: config.username.clone(),
            inner: Mutex::new(UserInner {
                networks,
                downstreams: HashMap::new(),
            }),
        }
    }

    pub fn networks(&self) -> Vec<Arc<NetworkConfig>> {
        self.inner
            .lock()
            .networks
            .values()
            .map(|n| Arc::clone(&n.config))
            .collect()
    }

    pub fn network(&self, id: i64) -> Option<Arc<NetworkConfig>> {
        self.inner
            .lock()
            .networks
            .get(&id)
            .map(|n| Arc::clone(&n.config))
    }

    pub fn network_by_name(&self, name: &str) -> Option<Arc<NetworkConfig>> {
        self.inner
            .lock()
            .networks
            .values()
            .find(|n| n.config.name.eq_ignore_ascii_case(name))
            .map(|n| Arc::clone(&n.config))
    }

    /// Add a registered downstream to the attached set.
    ///
    /// `catch_up` runs inside the same critical section with the live
    /// upstreams, and queues whatever state the client must see first. A
    /// channel completed through [`User::complete_channel`] therefore reaches
    /// `dc` exactly once: through `catch_up` if it completed before the
    /// attach, through the upstream's own replay otherwise.
    pub fn attach<R>(
        &self,
        dc: Arc<DownstreamHandle>,
        catch_up: impl FnOnce(&[Arc<UpstreamConn>]) -> R,
    ) -> R {
        let id = dc.id;
        let (result, count) = {
            let mut inner = self.inner.lock();
            let upstreams: Vec<_> = inner
                .networks
                .values()
                .filter_map(|n| n.upstream.clone())
                .collect();
            let result = catch_up(&upstreams);
            inner.downstreams.insert(id, dc);
            (result, inner.downstreams.len())
        };
        info!(user = %self.username, conn_id = id, attached = count, "Downstream attached");
        result
    }

    /// Mark `channel` complete on `upstream`. Returns a copy of it and the
    /// downstreams attached at that moment, or `None` if it is not tracked.
    pub fn complete_channel(
        &self,
        upstream: &UpstreamConn,
        channel: &str,
    ) -> Option<(Channel, Vec<Arc<DownstreamHandle>>)> {
        let inner = self.inner.lock();
        let snapshot = upstream.with_channels(|chans| {
            chans.get_mut(&irc_to_lower(channel)).map(|ch| {
                ch.complete = true;
                ch.clone()
            })
        })?;
        Some((snapshot, inner.downstreams.values().cloned().collect()))
    }

    /// Remove a downstream. Returns whether it was attached. Upstreams are
    /// left running even when the last downstream goes away.
    pub fn detach(&self, id: u64) -> bool {
        let (removed, count) = {
            let mut inner = self.inner.lock();
            let removed = inner.downstreams.remove(&id).is_some();
            (removed, inner.downstreams.len())
        };
        if removed {
            info!(user = %self.username, conn_id = id, attached = count, "Downstream detached");
        }
        removed
    }

    pub fn downstream_count(&self) -> usize {
        self.inner.lock().downstreams.len()
    }

    /// Install or clear the live connection of a network.
    pub fn set_upstream(&self, network: i64, upstream: Option<Arc<UpstreamConn>>) {
        if let Some(net) = self.inner.lock().networks.get_mut(&network) {
            net.upstream = upstream;
        }
    }

    pub fn upstream(&self, network: i64) -> Option<Arc<UpstreamConn>> {
        self.inner
            .lock()
            .networks
            .get(&network)
            .and_then(|n| n.upstream.clone())
    }

    /// Copy of the live upstream connections.
    pub fn upstreams(&self) -> Vec<Arc<UpstreamConn>> {
        self.inner
            .lock()
            .networks
            .values()
            .filter_map(|n| n.upstream.clone())
            .collect()
    }

    /// Run `f` on each live upstream.
    ///
    /// The set is copied before `f` runs, so an upstream that connects or
    /// drops meanwhile may be missed or visited after it went away.
    pub fn for_each_upstream(&self, mut f: impl FnMut(&Arc<UpstreamConn>)) {
        for uc in self.upstreams() {
            f(&uc);
        }
    }

    pub fn downstreams(&self) -> Vec<Arc<DownstreamHandle>> {
        self.inner.lock().downstreams.values().cloned().collect()
    }

    /// Send `msg` to every attached downstream accepted by `predicate`.
    /// Returns the number of downstreams it was queued for.
    pub fn broadcast(
        &self,
        msg: &Message,
        predicate: impl Fn(&DownstreamHandle) -> bool,
    ) -> usize {
        let mut sent = 0;
        for dc in self.downstreams() {
            if !predicate(&dc) {
                continue;
            }
            match dc.send(msg.clone()) {
                Ok(()) => sent += 1,
                Err(e) => debug!(conn_id = dc.id, error = %e, "Broadcast skipped downstream"),
            }
        }
        sent
    }

    /// Fan a message from one upstream out to the downstreams following that
    /// network, translated for each of them.
    pub fn forward_from_upstream(&self, upstream: &UpstreamConn, msg: &Message) -> usize {
        let network = upstream.network_id();
        let upstream_nick = upstream.nick();
        let mut sent = 0;
        for dc in self.downstreams() {
            if !dc.follows(network) {
                continue;
            }
            let Some(out) = dc.marshal(msg, upstream.network_name(), &upstream_nick) else {
                continue;
            };
            match dc.send(out) {
                Ok(()) => sent += 1,
                Err(e) => warn!(conn_id = dc.id, error = %e, "Failed to forward upstream message"),
            }
        }
        sent
    }
}
