//! NICK command handler.

use async_trait::async_trait;
use slbnc_proto::{Message, Response};
use tracing::{debug, info};

use crate::error::HandlerResult;
use crate::handlers::core::{Context, Handler};

/// Reject nicknames that cannot round-trip through IRC parameters or be
/// mistaken for a channel or a network suffix.
fn is_valid_nick(nick: &str) -> bool {
    !nick.is_empty()
        && nick.len() <= 64
        && !nick.starts_with(['#', '&', ':', '$'])
        && !nick.contains([' ', ',', '*', '?', '!', '@', '/'])
}

/// Handler for NICK.
///
/// Before registration the nickname is only recorded. Afterwards the change
/// is sent to every upstream the session follows and applied to the session
/// right away.
pub struct NickHandler;

#[async_trait]
impl Handler for NickHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let nick = msg.params[0].as_str();
        let current = ctx.nick().to_string();

        if nick.is_empty() {
            return ctx.send_from_server(Response::err_nonicknamegiven(&current));
        }
        if !is_valid_nick(nick) {
            return ctx.reply(
                Response::ERR_ERRONEUSNICKNAME,
                [current.as_str(), nick, "Erroneous nickname"],
            );
        }

        if !ctx.session.is_registered() {
            debug!(nick = %nick, "Nickname recorded");
            ctx.session.nick = Some(nick.to_string());
            return Ok(());
        }

        let user = ctx.user()?;
        let handle = &ctx.session.handle;
        let mut sent = 0;
        user.for_each_upstream(|upstream| {
            if handle.follows(upstream.network_id())
                && upstream.send(Message::new("NICK", [nick])).is_ok()
            {
                sent += 1;
            }
        });
        info!(old = %current, new = %nick, upstreams = sent, "Nickname change");

        let host = handle.addr.ip().to_string();
        let echo = Message::new("NICK", [nick]).with_prefix(ctx.session.prefix(&host));
        ctx.session.nick = Some(nick.to_string());
        ctx.session.handle.set_nick(nick);
        ctx.send(echo)
    }

    fn min_params(&self) -> usize {
        1
    }
}
