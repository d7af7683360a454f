//! Command handler registry and dispatch.
//!
//! Two tables: commands accepted before registration and commands accepted
//! after it. Registration is finalized by the dispatcher as soon as a
//! pre-registration command leaves the session ready for it.

use std::collections::HashMap;

use slbnc_proto::Message;
use tracing::{Instrument, debug, warn};

use super::context::{Context, Handler};
use crate::error::{HandlerError, HandlerResult};
use crate::handlers::{
    cap::{AuthenticateHandler, CapHandler},
    chathistory::ChatHistoryHandler,
    connection::{
        BouncerHandler, NickHandler, PassHandler, PingHandler, PongHandler, QuitHandler,
        UserHandler, register,
    },
    passthrough::{AwayHandler, PassthroughHandler},
    search::SearchHandler,
};

/// Registry of command handlers.
pub struct Registry {
    pre_reg: HashMap<&'static str, Box<dyn Handler>>,
    post_reg: HashMap<&'static str, Box<dyn Handler>>,
}

impl Registry {
    /// Create a new registry with all handlers registered.
    pub fn new() -> Self {
        let mut pre_reg: HashMap<&'static str, Box<dyn Handler>> = HashMap::new();
        pre_reg.insert("NICK", Box::new(NickHandler));
        pre_reg.insert("USER", Box::new(UserHandler));
        pre_reg.insert("PASS", Box::new(PassHandler));
        pre_reg.insert("CAP", Box::new(CapHandler));
        pre_reg.insert("AUTHENTICATE", Box::new(AuthenticateHandler));
        pre_reg.insert("BOUNCER", Box::new(BouncerHandler));
        pre_reg.insert("PING", Box::new(PingHandler));
        pre_reg.insert("PONG", Box::new(PongHandler));
        pre_reg.insert("QUIT", Box::new(QuitHandler));

        let mut post_reg: HashMap<&'static str, Box<dyn Handler>> = HashMap::new();
        // Connection handlers behave differently once registered
        post_reg.insert("NICK", Box::new(NickHandler));
        post_reg.insert("USER", Box::new(UserHandler));
        post_reg.insert("PASS", Box::new(PassHandler));
        post_reg.insert("CAP", Box::new(CapHandler));
        post_reg.insert("AUTHENTICATE", Box::new(AuthenticateHandler));
        post_reg.insert("BOUNCER", Box::new(BouncerHandler));
        post_reg.insert("PING", Box::new(PingHandler));
        post_reg.insert("PONG", Box::new(PongHandler));
        post_reg.insert("QUIT", Box::new(QuitHandler));

        // History
        post_reg.insert("CHATHISTORY", Box::new(ChatHistoryHandler));
        post_reg.insert("SEARCH", Box::new(SearchHandler));

        // Relayed to the upstream network
        for cmd in PassthroughHandler::COMMANDS {
            post_reg.insert(cmd, Box::new(PassthroughHandler));
        }
        post_reg.insert("AWAY", Box::new(AwayHandler));

        Self { pre_reg, post_reg }
    }

    /// Dispatch a message to the appropriate handler.
    ///
    /// Client-visible errors are answered here. Only errors that end the
    /// connection (`Quit`, `Connection`) are returned.
    pub async fn dispatch(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let cmd_name = msg.command.to_ascii_uppercase();
        let registered = ctx.session.is_registered();

        let span = crate::telemetry::spans::command(&cmd_name, ctx.session.id());
        let result = self
            .run(ctx, &cmd_name, registered, msg)
            .instrument(span)
            .await;

        // Finalize registration once NICK, USER and CAP END are all in
        let result = match result {
            Ok(()) if !registered && ctx.session.can_register() => register(ctx).await,
            other => other,
        };

        match result {
            Ok(()) => Ok(()),
            Err(e @ (HandlerError::Quit(_) | HandlerError::Connection(_))) => Err(e),
            Err(e) => {
                match &e {
                    HandlerError::Store(_) => {
                        warn!(command = %cmd_name, error = %e, "Command failed")
                    }
                    _ => debug!(command = %cmd_name, error = %e, code = e.error_code(), "Command error"),
                }
                if let Some(reply) = e.to_irc_reply(ctx.server.name(), ctx.nick(), &cmd_name) {
                    ctx.send(reply)?;
                }
                Ok(())
            }
        }
    }

    async fn run(
        &self,
        ctx: &mut Context<'_>,
        cmd_name: &str,
        registered: bool,
        msg: &Message,
    ) -> HandlerResult {
        let table = if registered { &self.post_reg } else { &self.pre_reg };
        let Some(handler) = table.get(cmd_name) else {
            if !registered && self.post_reg.contains_key(cmd_name) {
                return Err(HandlerError::NotRegistered);
            }
            return Err(HandlerError::UnknownCommand(cmd_name.to_string()));
        };

        if msg.params.len() < handler.min_params() {
            return Err(HandlerError::NeedMoreParams);
        }
        handler.handle(ctx, msg).await
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::super::context::test_support::*;
    use super::*;

    const CONFIG: &str = r#"
[server]
name = "bnc.test"
"#;

    #[tokio::test]
    async fn test_unknown_command_before_registration() {
        let server = server(CONFIG);
        let (mut session, mut rx) = session();
        let registry = Registry::new();
        let mut ctx = Context { server: &server, session: &mut session };

        let msg: Message = "FROB x".parse().unwrap();
        registry.dispatch(&mut ctx, &msg).await.unwrap();

        let out = drain(&mut rx);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].command, "421");
        assert_eq!(out[0].params, vec!["*", "FROB", "Unknown command"]);
    }

    #[tokio::test]
    async fn test_post_registration_command_needs_registration() {
        let server = server(CONFIG);
        let (mut session, mut rx) = session();
        let registry = Registry::new();
        let mut ctx = Context { server: &server, session: &mut session };

        let msg: Message = "PRIVMSG #chan :hi".parse().unwrap();
        registry.dispatch(&mut ctx, &msg).await.unwrap();

        let out = drain(&mut rx);
        assert_eq!(out[0].command, "451");
    }

    #[tokio::test]
    async fn test_missing_params() {
        let server = server(CONFIG);
        let (mut session, mut rx) = session();
        let registry = Registry::new();
        let mut ctx = Context { server: &server, session: &mut session };

        let msg: Message = "USER alice 0".parse().unwrap();
        registry.dispatch(&mut ctx, &msg).await.unwrap();

        let out = drain(&mut rx);
        assert_eq!(out[0].command, "461");
        assert_eq!(out[0].params[1], "USER");
        assert!(ctx.session.username.is_none());
    }

    #[tokio::test]
    async fn test_quit_is_returned() {
        let server = server(CONFIG);
        let (mut session, _rx) = session();
        let registry = Registry::new();
        let mut ctx = Context { server: &server, session: &mut session };

        let msg: Message = "QUIT :bye".parse().unwrap();
        let result = registry.dispatch(&mut ctx, &msg).await;
        assert!(matches!(result, Err(HandlerError::Quit(Some(ref m))) if m == "bye"));
    }
}
