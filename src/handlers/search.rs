//! SEARCH handler (`soju.im/search`).
//!
//! `SEARCH text=<query>[;in=<target>][;limit=<n>]`. Attribute values use
//! message-tag escaping.

use async_trait::async_trait;
use slbnc_proto::Message;
use slbnc_proto::message::tags::unescape_tag_value;
use tracing::debug;

use super::batch::send_batch;
use super::chathistory::parse_limit;
use super::core::{Context, Handler};
use super::passthrough::resolve_network;
use crate::error::{HandlerError, HandlerResult};
use crate::history::SearchOptions;

const DEFAULT_LIMIT: usize = 100;

#[derive(Debug, Default, PartialEq)]
struct SearchQuery {
    text: Option<String>,
    target: Option<String>,
    limit: Option<usize>,
}

fn invalid(description: &str) -> HandlerError {
    HandlerError::fail("SEARCH", "INVALID_PARAMS", Vec::new(), description)
}

fn parse_query(raw: &str) -> Result<SearchQuery, HandlerError> {
    let mut query = SearchQuery::default();
    for attr in raw.split(';').filter(|a| !a.is_empty()) {
        let (key, value) = attr.split_once('=').unwrap_or((attr, ""));
        let value = unescape_tag_value(value);
        match key {
            "text" => query.text = Some(value),
            "in" => query.target = Some(value),
            "limit" => {
                query.limit = Some(parse_limit(&value).ok_or_else(|| invalid("Invalid limit"))?)
            }
            // Unsupported filters
            "from" | "after" | "before" => {}
            _ => return Err(invalid("Unknown search attribute")),
        }
    }
    Ok(query)
}

/// Handler for SEARCH.
pub struct SearchHandler;

#[async_trait]
impl Handler for SearchHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        if !ctx.server.store.capabilities().search {
            return Err(HandlerError::UnknownCommand("SEARCH".to_string()));
        }

        let query = parse_query(&msg.params[0])?;
        let Some(text) = query.text.filter(|t| !t.is_empty()) else {
            return Err(invalid("Missing search text"));
        };

        let user = ctx.user()?;
        let scope = query.target.as_deref().unwrap_or("");
        let (network, target) = resolve_network(ctx, user, scope)?;
        let config = user
            .network(network)
            .ok_or_else(|| HandlerError::NoSuchNick(scope.to_string()))?;
        let upstream_nick = user
            .upstream(network)
            .map(|u| u.nick())
            .unwrap_or_else(|| config.nick.clone());

        let options = SearchOptions {
            network,
            target: query.target.as_ref().map(|_| target),
            text,
            limit: query.limit.unwrap_or(DEFAULT_LIMIT),
        };
        let mut found = ctx.server.store.search(&options).await?;
        found.reverse();
        debug!(network, count = found.len(), "SEARCH served");

        let handle = &ctx.session.handle;
        let out: Vec<Message> = found
            .iter()
            .filter_map(|m| handle.marshal(m, &config.name, &upstream_nick))
            .collect();
        send_batch(ctx, "soju.im/search", &[], out)
    }

    fn min_params(&self) -> usize {
        1
    }
}
