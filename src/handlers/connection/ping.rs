//! PING, PONG handlers.

use async_trait::async_trait;
use slbnc_proto::Message;

use crate::error::HandlerResult;
use crate::handlers::core::{Context, Handler};

/// Handler for PING. The token is echoed back.
pub struct PingHandler;

#[async_trait]
impl Handler for PingHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let pong = Message::new("PONG", [ctx.server.name(), msg.params[0].as_str()]);
        ctx.send_from_server(pong)
    }

    fn min_params(&self) -> usize {
        1
    }
}

/// Handler for PONG.
pub struct PongHandler;

#[async_trait]
impl Handler for PongHandler {
    async fn handle(&self, _ctx: &mut Context<'_>, _msg: &Message) -> HandlerResult {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::core::context::test_support::*;

    #[tokio::test]
    async fn test_ping_echoes_token() {
        let server = server("[server]\nname = \"bnc.test\"\n");
        let (mut session, mut rx) = session();
        let mut ctx = Context { server: &server, session: &mut session };

        let msg: Message = "PING :abc 123".parse().unwrap();
        PingHandler.handle(&mut ctx, &msg).await.unwrap();
        assert_eq!(drain(&mut rx)[0].to_string(), ":bnc.test PONG bnc.test :abc 123\r\n");
    }
}
