//! BOUNCER command handler (network binding).

use async_trait::async_trait;
use slbnc_proto::Message;
use tracing::debug;

use crate::error::{HandlerError, HandlerResult};
use crate::handlers::core::{Context, Handler};

/// Handler for BOUNCER. Only `BIND` is supported, and only before
/// registration.
pub struct BouncerHandler;

#[async_trait]
impl Handler for BouncerHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let sub = msg.params[0].to_ascii_uppercase();
        if sub != "BIND" {
            return Err(HandlerError::fail(
                "BOUNCER",
                "UNKNOWN_COMMAND",
                [msg.params[0].clone()],
                "Unknown subcommand",
            ));
        }
        if ctx.session.is_registered() {
            return Err(HandlerError::fail(
                "BOUNCER",
                "REGISTRATION_IS_COMPLETED",
                ["BIND".to_string()],
                "Cannot bind to a network after registration",
            ));
        }

        let raw = msg.param(1).ok_or(HandlerError::NeedMoreParams)?;
        let Ok(id) = raw.parse::<i64>() else {
            return Err(HandlerError::fail(
                "BOUNCER",
                "INVALID_NETID",
                ["BIND".to_string(), raw.to_string()],
                "Invalid network ID",
            ));
        };
        if !ctx.server.network_exists(id) {
            return Err(unknown_network(id));
        }

        debug!(network = id, "Session bound to network");
        ctx.session.network_id = Some(id);
        Ok(())
    }

    fn min_params(&self) -> usize {
        1
    }
}

/// The network-unknown error, also raised at registration when the bound
/// network belongs to another account.
pub(super) fn unknown_network(id: i64) -> HandlerError {
    HandlerError::fail(
        "BOUNCER",
        "BIND_NOT_FOUND",
        ["BIND".to_string(), id.to_string()],
        "Unknown network ID",
    )
}
