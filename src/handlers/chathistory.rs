//! CHATHISTORY handler.
//!
//! Supports `LATEST <target> * <limit>` and
//! `BEFORE <target> msgid=<id> <limit>`. Results are sent oldest first.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use slbnc_proto::Message;
use tracing::debug;

use super::batch::send_batch;
use super::connection::CHATHISTORY_MAX;
use super::core::{Context, Handler};
use super::passthrough::resolve_network;
use crate::error::{HandlerError, HandlerResult};
use crate::history::{LoadOptions, StoreError};

fn invalid_params(sub: &str, description: &str) -> HandlerError {
    HandlerError::fail("CHATHISTORY", "INVALID_PARAMS", [sub.to_string()], description)
}

/// Parse a page size, clamped to the advertised maximum.
pub(super) fn parse_limit(raw: &str) -> Option<usize> {
    match raw.parse::<usize>() {
        Ok(0) | Err(_) => None,
        Ok(n) => Some(n.min(CHATHISTORY_MAX)),
    }
}

/// Handler for CHATHISTORY.
pub struct ChatHistoryHandler;

#[async_trait]
impl Handler for ChatHistoryHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        if !ctx.server.store.capabilities().chat_history {
            return Err(HandlerError::UnknownCommand("CHATHISTORY".to_string()));
        }

        let sub = msg.params[0].to_ascii_uppercase();
        let display_target = msg.params[1].clone();
        let anchor = msg.params[2].as_str();
        let limit = parse_limit(&msg.params[3])
            .ok_or_else(|| invalid_params(&sub, "Invalid limit"))?;

        let user = ctx.user()?;
        let (network, target) = resolve_network(ctx, user, &display_target)?;
        let config = user
            .network(network)
            .ok_or_else(|| HandlerError::NoSuchNick(display_target.clone()))?;
        let upstream_nick = user
            .upstream(network)
            .map(|u| u.nick())
            .unwrap_or_else(|| config.nick.clone());
        let store = &ctx.server.store;

        let mut messages = match sub.as_str() {
            "LATEST" => {
                if anchor != "*" {
                    return Err(invalid_params(&sub, "Only * is supported"));
                }
                match store.last_msg_id(network, &target, DateTime::<Utc>::MAX_UTC).await? {
                    Some(id) => {
                        let options = LoadOptions { network, target: target.clone(), limit };
                        store.load_before_id(&id, &options).await?
                    }
                    None => Vec::new(),
                }
            }
            "BEFORE" => {
                let Some(id) = anchor.strip_prefix("msgid=") else {
                    return Err(invalid_params(&sub, "Only msgid= is supported"));
                };
                let options = LoadOptions { network, target: target.clone(), limit: limit + 1 };
                let mut loaded = store.load_before_id(id, &options).await.map_err(|e| match e {
                    StoreError::InvalidMsgId(_) => HandlerError::fail(
                        "CHATHISTORY",
                        "INVALID_MSGREFTOKEN",
                        [sub.clone(), anchor.to_string()],
                        "Invalid message reference",
                    ),
                    other => HandlerError::Store(other),
                })?;
                if loaded.first().and_then(Message::msgid) == Some(id) {
                    loaded.remove(0);
                }
                loaded.truncate(limit);
                loaded
            }
            _ => {
                return Err(HandlerError::fail(
                    "CHATHISTORY",
                    "UNKNOWN_COMMAND",
                    [msg.params[0].clone()],
                    "Unknown subcommand",
                ));
            }
        };
        messages.reverse();
        debug!(network, target = %target, count = messages.len(), "CHATHISTORY served");

        let handle = &ctx.session.handle;
        let out: Vec<Message> = messages
            .iter()
            .filter_map(|m| handle.marshal(m, &config.name, &upstream_nick))
            .collect();
        send_batch(ctx, "chathistory", &[display_target], out)
    }

    fn min_params(&self) -> usize {
        4
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::handlers::core::context::test_support::{drain, session};
    use crate::history::MessageStore;
    use crate::history::sqlite::SqliteStore;
    use crate::state::{Server, User};
    use std::sync::Arc;
    use std::time::Duration;

    const CONFIG: &str = r#"
[server]
name = "bnc.test"

[[user]]
username = "alice"
password = "x"

[[user.network]]
id = 1
name = "libera"
address = "127.0.0.1:1"
nick = "alice"
"#;

    #[test]
    fn test_parse_limit() {
        assert_eq!(parse_limit("50"), Some(50));
        assert_eq!(parse_limit("5000"), Some(CHATHISTORY_MAX));
        assert_eq!(parse_limit("0"), None);
        assert_eq!(parse_limit("x"), None);
    }

    async fn fixture() -> (Arc<Server>, Arc<User>, Vec<String>) {
        let store = SqliteStore::open(":memory:", Duration::from_secs(5)).await.unwrap();
        let mut ids = Vec::new();
        for i in 0..5 {
            let msg: Message = format!(":bob!b@h PRIVMSG #rust :line {i}").parse().unwrap();
            ids.push(store.append(1, "#rust", &msg).await.unwrap());
        }
        let config = Config::from_toml(CONFIG).unwrap();
        let user = Arc::new(User::new(&config.users[0]));
        (Server::new(config, Arc::new(store)), user, ids)
    }

    fn texts(out: &[Message]) -> Vec<String> {
        out.iter()
            .filter(|m| m.command == "PRIVMSG")
            .map(|m| m.params[1].clone())
            .collect()
    }

    #[tokio::test]
    async fn test_latest_in_batch() {
        let (server, user, _) = fixture().await;
        let (mut session, mut rx) = session();
        session.user = Some(user);
        session.caps.enable(["batch", "server-time", "message-tags"]);
        session.publish_caps();
        let mut ctx = Context { server: &server, session: &mut session };

        let msg: Message = "CHATHISTORY LATEST #rust/libera * 3".parse().unwrap();
        ChatHistoryHandler.handle(&mut ctx, &msg).await.unwrap();

        let out = drain(&mut rx);
        assert_eq!(out.first().unwrap().command, "BATCH");
        assert_eq!(out.first().unwrap().params[1], "chathistory");
        assert_eq!(out.first().unwrap().params[2], "#rust/libera");
        assert_eq!(texts(&out), vec!["line 2", "line 3", "line 4"]);
        assert!(out[1].tag_value("batch").is_some());
        assert!(out[1].msgid().is_some());
        assert_eq!(out[1].params[0], "#rust/libera");
        assert_eq!(out.last().unwrap().command, "BATCH");
    }

    #[tokio::test]
    async fn test_before_excludes_anchor() {
        let (server, user, ids) = fixture().await;
        let (mut session, mut rx) = session();
        session.user = Some(user);
        let mut ctx = Context { server: &server, session: &mut session };

        let line = format!("CHATHISTORY BEFORE #rust/libera msgid={} 2", ids[3]);
        let msg: Message = line.parse().unwrap();
        ChatHistoryHandler.handle(&mut ctx, &msg).await.unwrap();

        let out = drain(&mut rx);
        assert_eq!(texts(&out), vec!["line 1", "line 2"]);
        assert!(out.iter().all(|m| m.command != "BATCH"));
    }

    #[tokio::test]
    async fn test_bad_reference_and_limit() {
        let (server, user, _) = fixture().await;
        let (mut session, _rx) = session();
        session.user = Some(user);
        let mut ctx = Context { server: &server, session: &mut session };

        let msg: Message = "CHATHISTORY BEFORE #rust/libera msgid=garbage 2".parse().unwrap();
        let err = ChatHistoryHandler.handle(&mut ctx, &msg).await.unwrap_err();
        assert!(matches!(err, HandlerError::Fail { code: "INVALID_MSGREFTOKEN", .. }));

        let msg: Message = "CHATHISTORY LATEST #rust/libera * 0".parse().unwrap();
        let err = ChatHistoryHandler.handle(&mut ctx, &msg).await.unwrap_err();
        assert!(matches!(err, HandlerError::Fail { code: "INVALID_PARAMS", .. }));
    }

    #[tokio::test]
    async fn test_unsupported_without_history() {
        let server = crate::handlers::core::context::test_support::server(CONFIG);
        let (mut session, _rx) = session();
        let mut ctx = Context { server: &server, session: &mut session };

        let msg: Message = "CHATHISTORY LATEST #rust * 3".parse().unwrap();
        let err = ChatHistoryHandler.handle(&mut ctx, &msg).await.unwrap_err();
        assert!(matches!(err, HandlerError::UnknownCommand(_)));
    }
}
