//! Commands relayed to an upstream network.
//!
//! The upstream is picked from the session's bound network, else from a
//! `/network` suffix on the target, else the user's only network.

use std::sync::Arc;

use async_trait::async_trait;
use slbnc_proto::{Message, Prefix, server_time};
use tracing::{debug, warn};

use super::core::{Context, Handler};
use crate::error::{HandlerError, HandlerResult};
use crate::state::{UpstreamConn, User, split_network_suffix};

/// A target resolved to the network it lives on.
pub(super) struct Route {
    pub upstream: Arc<UpstreamConn>,
    /// Target with any network suffix removed.
    pub target: String,
}

/// Resolve a client-side target (possibly a comma list) to one upstream.
pub(super) fn resolve(ctx: &Context<'_>, target: &str) -> Result<Route, HandlerError> {
    let user = ctx.user()?;
    let (network_id, stripped) = resolve_network(ctx, user, target)?;
    let upstream = user
        .upstream(network_id)
        .ok_or_else(|| unavailable(target))?;
    Ok(Route { upstream, target: stripped })
}

fn unavailable(target: &str) -> HandlerError {
    HandlerError::fail(
        "BOUNCER",
        "TEMPORARILY_UNAVAILABLE",
        [target.to_string()],
        "Network is not connected",
    )
}

/// Queue a command upstream. Upstream failures are reported to the client
/// and never end the downstream connection.
fn relay(upstream: &UpstreamConn, msg: Message, target: &str) -> HandlerResult {
    upstream.send(msg).map_err(|e| {
        debug!(network = %upstream.network_name(), error = %e, "Upstream send failed");
        unavailable(target)
    })
}

/// Resolve the network id a target belongs to, without requiring the
/// network to be connected.
pub(super) fn resolve_network(
    ctx: &Context<'_>,
    user: &User,
    target: &str,
) -> Result<(i64, String), HandlerError> {
    if let Some(id) = ctx.session.network_id {
        return Ok((id, target.to_string()));
    }

    let mut network: Option<String> = None;
    let mut names = Vec::new();
    for item in target.split(',') {
        let (name, suffix) = split_network_suffix(item);
        match (suffix, &network) {
            (Some(s), Some(n)) if !s.eq_ignore_ascii_case(n) => {
                return Err(HandlerError::NoSuchNick(target.to_string()));
            }
            (Some(s), None) => network = Some(s.to_string()),
            _ => {}
        }
        names.push(name);
    }

    let config = match network {
        Some(name) => user.network_by_name(&name),
        None => {
            let mut networks = user.networks();
            if networks.len() == 1 { networks.pop() } else { None }
        }
    };
    config
        .map(|n| (n.id, names.join(",")))
        .ok_or_else(|| HandlerError::NoSuchNick(target.to_string()))
}

/// Index of the parameter naming the routing target.
fn target_index(command: &str) -> usize {
    match command {
        "INVITE" => 1,
        _ => 0,
    }
}

/// Copy of `msg` fit to send upstream: client-only tags kept, no prefix.
fn outgoing(msg: &Message, command: &str) -> Message {
    let mut out = msg.clone();
    out.command = command.to_string();
    out.prefix = None;
    out.retain_tags(|tag| tag.is_client_only());
    out
}

/// Handler for commands relayed to one upstream.
pub struct PassthroughHandler;

impl PassthroughHandler {
    pub const COMMANDS: [&'static str; 12] = [
        "PRIVMSG", "NOTICE", "TAGMSG", "JOIN", "PART", "TOPIC", "MODE", "KICK", "INVITE", "WHO",
        "WHOIS", "NAMES",
    ];
}

#[async_trait]
impl Handler for PassthroughHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let command = msg.command.to_ascii_uppercase();
        let index = target_index(&command);
        let raw_target = msg.param(index).ok_or(HandlerError::NeedMoreParams)?;
        let route = resolve(ctx, raw_target)?;

        let mut out = outgoing(msg, &command);
        out.params[index] = route.target.clone();
        relay(&route.upstream, out.clone(), raw_target)?;
        debug!(command = %command, network = %route.upstream.network_name(), "Relayed to upstream");

        if matches!(command.as_str(), "PRIVMSG" | "NOTICE") {
            echo_message(ctx, &route, out).await;
        }
        Ok(())
    }

    fn min_params(&self) -> usize {
        1
    }
}

/// Store a message sent by this client and show it to the user's other
/// clients on the same network.
async fn echo_message(ctx: &Context<'_>, route: &Route, mut msg: Message) {
    let Ok(user) = ctx.user() else { return };
    let upstream = &route.upstream;
    let upstream_nick = upstream.nick();
    let host = ctx.session.handle.addr.ip().to_string();
    let username = ctx.session.username.as_deref().unwrap_or("~");

    msg.prefix = Some(Prefix::new(upstream_nick.as_str(), username, host));
    msg.set_tag("time", Some(server_time::now()));

    for target in route.target.split(',') {
        let mut single = msg.clone();
        single.params[0] = target.to_string();
        match ctx.server.store.append(upstream.network_id(), target, &single).await {
            Ok(id) if !id.is_empty() => single.set_tag("msgid", Some(id)),
            Ok(_) => {}
            Err(e) => warn!(network = upstream.network_id(), target = %target, error = %e, "Failed to store message"),
        }

        for dc in user.downstreams() {
            if dc.id == ctx.session.id() || !dc.follows(upstream.network_id()) {
                continue;
            }
            if let Some(out) = dc.marshal(&single, upstream.network_name(), &upstream_nick) {
                let _ = dc.send(out);
            }
        }
    }
}

/// Handler for AWAY, sent to every network the session follows.
pub struct AwayHandler;

#[async_trait]
impl Handler for AwayHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let user = ctx.user()?;
        let out = outgoing(msg, "AWAY");
        for upstream in user.upstreams() {
            if ctx.session.handle.follows(upstream.network_id()) {
                relay(&upstream, out.clone(), upstream.network_name())?;
            }
        }
        Ok(())
    }
}
