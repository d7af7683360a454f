//! PASS command handler.

use async_trait::async_trait;
use slbnc_proto::Message;
use zeroize::Zeroizing;

use crate::error::{HandlerError, HandlerResult};
use crate::handlers::core::{Context, Handler};

/// Handler for PASS. The password is checked when registration finalizes.
pub struct PassHandler;

#[async_trait]
impl Handler for PassHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        if ctx.session.is_registered() {
            return Err(HandlerError::AlreadyRegistered);
        }
        let Some(password) = msg.param(0) else {
            return Err(HandlerError::NeedMoreParams);
        };
        ctx.session.password = Some(Zeroizing::new(password.to_string()));
        Ok(())
    }
}
