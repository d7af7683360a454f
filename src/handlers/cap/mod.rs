//! CAP and AUTHENTICATE handlers.
//!
//! `CAP LS` starts negotiation before registration and holds it until
//! `CAP END`. `CAP REQ` is validated as a whole: one unknown name NAKs the
//! entire request.

mod sasl;

pub use sasl::AuthenticateHandler;

use async_trait::async_trait;
use slbnc_proto::Message;
use tracing::debug;

use super::core::{Context, Handler};
use crate::error::{HandlerError, HandlerResult};

/// Handler for the CAP command.
pub struct CapHandler;

#[async_trait]
impl Handler for CapHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let sub = msg.params[0].to_ascii_uppercase();
        let registered = ctx.session.is_registered();

        match sub.as_str() {
            "LS" => {
                let version = msg.param(1).and_then(|v| v.parse().ok()).unwrap_or(301);
                ctx.session.caps.set_version(version);
                if !registered {
                    ctx.session.caps.set_negotiating(true);
                }
                let tokens = ctx.session.caps.ls_tokens().join(" ");
                cap_reply(ctx, "LS", tokens)
            }
            "LIST" => {
                let enabled = ctx.session.caps.enabled().collect::<Vec<_>>().join(" ");
                cap_reply(ctx, "LIST", enabled)
            }
            "REQ" => {
                let requested = msg.param(1).unwrap_or("");
                if !registered {
                    ctx.session.caps.set_negotiating(true);
                }
                match ctx.session.caps.request(requested.split_whitespace()) {
                    Ok(changes) => {
                        ctx.session.caps.apply(&changes);
                        ctx.session.publish_caps();
                        debug!(caps = %requested, "CAP REQ acknowledged");
                        cap_reply(ctx, "ACK", requested.to_string())
                    }
                    Err(e) => {
                        debug!(caps = %requested, error = %e, "CAP REQ rejected");
                        cap_reply(ctx, "NAK", requested.to_string())
                    }
                }
            }
            "END" => {
                ctx.session.caps.set_negotiating(false);
                Ok(())
            }
            _ => Err(HandlerError::InvalidCapCommand(msg.params[0].clone())),
        }
    }

    fn min_params(&self) -> usize {
        1
    }
}

fn cap_reply(ctx: &Context<'_>, sub: &str, list: String) -> HandlerResult {
    let nick = ctx.nick().to_string();
    ctx.send_from_server(Message::new("CAP", [nick, sub.to_string(), list]))
}
