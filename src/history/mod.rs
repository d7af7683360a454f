//! Message store abstraction.
//!
//! A [`MessageStore`] keeps the PRIVMSG/NOTICE traffic of every upstream
//! network so that downstream clients can page back through it with
//! CHATHISTORY. Positions are exposed on the wire as opaque message IDs
//! produced by [`msgid`]; each backend picks its own local position type.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use slbnc_proto::{Message, server_time};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{HistoryBackend, HistoryConfig};

pub mod msgid;
pub mod noop;
pub mod redb;
pub mod sqlite;

pub use msgid::MsgIdError;

/// Commands kept by every backend.
pub const STORED_COMMANDS: &[&str] = &["PRIVMSG", "NOTICE", "TAGMSG"];

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("backend error: {0}")]
    Backend(String),
    #[error("operation timed out")]
    Timeout,
    #[error("invalid message ID: {0}")]
    InvalidMsgId(#[from] MsgIdError),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("operation not supported by this backend")]
    Unsupported,
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// What a backend can serve, used to decide which capabilities downstream
/// clients are offered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCapabilities {
    pub chat_history: bool,
    pub search: bool,
}

/// Bounds for [`MessageStore::load_before_id`].
#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub network: i64,
    pub target: String,
    pub limit: usize,
}

/// Bounds for [`MessageStore::search`].
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub network: i64,
    /// Restrict to one target; `None` searches the whole network.
    pub target: Option<String>,
    pub text: String,
    pub limit: usize,
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    fn capabilities(&self) -> StoreCapabilities;

    /// Store a message and return its message ID.
    async fn append(&self, network: i64, target: &str, msg: &Message) -> Result<String, StoreError>;

    /// ID of the newest message for `target` strictly older than `before`.
    async fn last_msg_id(
        &self,
        network: i64,
        target: &str,
        before: DateTime<Utc>,
    ) -> Result<Option<String>, StoreError>;

    /// Messages at or before `id`, newest first, at most `options.limit`.
    ///
    /// Each returned message carries its `msgid` and `time` tags.
    async fn load_before_id(
        &self,
        id: &str,
        options: &LoadOptions,
    ) -> Result<Vec<Message>, StoreError>;

    /// Substring search over message text, newest first.
    async fn search(&self, options: &SearchOptions) -> Result<Vec<Message>, StoreError>;
}

/// Open the store selected by the configuration.
pub async fn open(config: &HistoryConfig) -> Result<Arc<dyn MessageStore>, StoreError> {
    let timeout = config.query_timeout();
    Ok(match config.backend {
        HistoryBackend::Sqlite => {
            info!(path = %config.path, "Initializing SQLite message store");
            Arc::new(sqlite::SqliteStore::open(&config.path, timeout).await?)
        }
        HistoryBackend::Redb => {
            info!(path = %config.path, "Initializing Redb message store");
            Arc::new(redb::RedbStore::open(&config.path, timeout)?)
        }
        HistoryBackend::None => {
            info!("Message store disabled. Using NoOp.");
            Arc::new(noop::NoOpStore)
        }
    })
}

/// Run a store operation under the configured time bound.
pub(crate) async fn bounded<T, F>(timeout: Duration, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| StoreError::Timeout)?
}

/// Timestamp used to file a message.
///
/// Taken from the `time` tag; an absent or unparsable tag means now.
pub(crate) fn message_time(msg: &Message) -> DateTime<Utc> {
    match msg.server_time() {
        None => Utc::now(),
        Some(raw) => server_time::parse_server_time(raw).unwrap_or_else(|| {
            warn!(time = %raw, "Malformed server-time tag, using current time");
            Utc::now()
        }),
    }
}

/// Serialized form kept by backends: the line without CRLF and without the
/// tags the store assigns itself.
pub(crate) fn raw_line(msg: &Message) -> String {
    let mut msg = msg.clone();
    msg.remove_tag("msgid");
    msg.remove_tag("time");
    let mut line = msg.to_string();
    line.truncate(line.trim_end_matches(['\r', '\n']).len());
    line
}

/// Rebuild a stored message with its store-assigned tags.
pub(crate) fn restore(raw: &str, msgid: String, time_ms: i64) -> Result<Message, StoreError> {
    let mut msg: Message = raw
        .parse()
        .map_err(|e: slbnc_proto::ProtocolError| StoreError::Serialization(e.to_string()))?;
    let time = DateTime::<Utc>::from_timestamp_millis(time_ms).unwrap_or_else(Utc::now);
    msg.set_tag("time", Some(server_time::format_server_time(time)));
    msg.set_tag("msgid", Some(msgid));
    Ok(msg)
}

/// Case-folded key under which a target is filed.
pub(crate) fn target_key(target: &str) -> String {
    slbnc_proto::irc_to_lower(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_time_from_tag() {
        let msg = Message::new("PRIVMSG", ["#a", "hi"])
            .with_tag("time", Some("2020-05-01T10:00:00.000Z".into()));
        assert_eq!(message_time(&msg).timestamp(), 1588327200);
    }

    #[test]
    fn test_message_time_fallbacks() {
        let before = Utc::now();
        let absent = Message::new("PRIVMSG", ["#a", "hi"]);
        assert!(message_time(&absent) >= before);

        let malformed = absent.clone().with_tag("time", Some("not a time".into()));
        assert!(message_time(&malformed) >= before);
    }

    #[test]
    fn test_raw_line_strips_store_tags() {
        let msg: Message = "@time=2020-05-01T10:00:00.000Z;msgid=x;+client=1 :n!u@h PRIVMSG #a :hi"
            .parse()
            .unwrap();
        assert_eq!(raw_line(&msg), "@+client=1 :n!u@h PRIVMSG #a hi");
    }

    #[test]
    fn test_restore_sets_tags() {
        let msg = restore(":n!u@h PRIVMSG #a :hi there", "abc".into(), 1_588_327_200_000).unwrap();
        assert_eq!(msg.msgid(), Some("abc"));
        assert_eq!(msg.server_time(), Some("2020-05-01T10:00:00.000Z"));
        assert_eq!(msg.param(1), Some("hi there"));
    }

    #[tokio::test]
    async fn test_bounded_times_out() {
        let result: Result<(), _> = bounded(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(StoreError::Timeout)));
    }
}
