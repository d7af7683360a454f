//! USER command handler.

use async_trait::async_trait;
use slbnc_proto::Message;

use crate::error::{HandlerError, HandlerResult};
use crate::handlers::core::{Context, Handler};

/// Handler for USER.
///
/// The username is stored with a `~` marker since no ident lookup is done.
pub struct UserHandler;

#[async_trait]
impl Handler for UserHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        if ctx.session.is_registered() {
            return Err(HandlerError::AlreadyRegistered);
        }
        // USER <username> <mode> <unused> <realname>
        if msg.params.len() < 4 || msg.params[0].is_empty() {
            return Err(HandlerError::NeedMoreParams);
        }

        ctx.session.username = Some(format!("~{}", msg.params[0]));
        ctx.session.realname = Some(msg.params[3].clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::core::context::test_support::*;

    #[tokio::test]
    async fn test_user_records_marked_username() {
        let server = server("[server]\nname = \"bnc.test\"\n");
        let (mut session, _rx) = session();
        let mut ctx = Context { server: &server, session: &mut session };

        let msg: Message = "USER alice 0 * :Alice Liddell".parse().unwrap();
        UserHandler.handle(&mut ctx, &msg).await.unwrap();
        assert_eq!(ctx.session.username.as_deref(), Some("~alice"));
        assert_eq!(ctx.session.realname.as_deref(), Some("Alice Liddell"));

        let short: Message = "USER alice 0 *".parse().unwrap();
        assert!(matches!(
            UserHandler.handle(&mut ctx, &short).await,
            Err(HandlerError::NeedMoreParams)
        ));
    }
}
