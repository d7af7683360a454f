//! QUIT command handler.

use async_trait::async_trait;
use slbnc_proto::Message;
use tracing::info;

use crate::error::{HandlerError, HandlerResult};
use crate::handlers::core::{Context, Handler};

/// Handler for QUIT. Ends the connection; attached upstreams are not told.
pub struct QuitHandler;

#[async_trait]
impl Handler for QuitHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let reason = msg.param(0).map(str::to_string);
        info!(nick = %ctx.nick(), reason = ?reason, "Client quit");
        Err(HandlerError::Quit(reason))
    }
}
