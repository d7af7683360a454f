//! SQLite message store.
//!
//! Messages live in one table keyed by an autoincrement row id, which doubles
//! as the backend-local position inside message IDs. Supports both paging
//! and text search.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use slbnc_proto::Message;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::{info, warn};

use super::msgid::{self, DbMsgId};
use super::{
    LoadOptions, MessageStore, STORED_COMMANDS, SearchOptions, StoreCapabilities, StoreError,
    bounded, message_time, raw_line, restore, target_key,
};

static MEMDB_COUNTER: AtomicU64 = AtomicU64::new(0);

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS message (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    network INTEGER NOT NULL,
    target TEXT NOT NULL,
    command TEXT NOT NULL,
    raw TEXT NOT NULL,
    text TEXT NOT NULL,
    time INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS message_target_idx ON message(network, target, id);
"#;

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    timeout: Duration,
}

impl SqliteStore {
    const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);
    const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Open (creating if needed) the database at `path`. `:memory:` gives a
    /// private in-memory database.
    pub async fn open(path: &str, timeout: Duration) -> Result<Self, StoreError> {
        let pool = if path == ":memory:" {
            let id = MEMDB_COUNTER.fetch_add(1, Ordering::Relaxed);
            let memdb_uri = format!(
                "file:slbnc-memdb-{}-{}?mode=memory&cache=shared",
                std::process::id(),
                id
            );
            let options = SqliteConnectOptions::new()
                .filename(&memdb_uri)
                .shared_cache(true)
                .create_if_missing(true);

            SqlitePoolOptions::new()
                .max_connections(1)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(Some(Self::IDLE_TIMEOUT))
                .connect_with(options)
                .await?
        } else {
            if let Some(parent) = Path::new(path).parent()
                && !parent.as_os_str().is_empty()
                && let Err(e) = std::fs::create_dir_all(parent)
            {
                warn!(path = %parent.display(), error = %e, "Failed to create database directory");
            }
            let options = SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true);

            SqlitePoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(Some(Self::IDLE_TIMEOUT))
                .connect_with(options)
                .await?
        };

        sqlx::query("PRAGMA journal_mode=WAL").execute(&pool).await?;
        sqlx::query("PRAGMA synchronous=NORMAL").execute(&pool).await?;
        sqlx::raw_sql(SCHEMA).execute(&pool).await?;

        info!(path = %path, "Message database ready");
        Ok(Self { pool, timeout })
    }

    fn restore_row(
        network: i64,
        target: &str,
        id: i64,
        raw: &str,
        time: i64,
    ) -> Result<Message, StoreError> {
        let msgid = msgid::format(network, target, &DbMsgId(id))?;
        restore(raw, msgid, time)
    }
}

/// Escape `%`, `_` and `\` for a LIKE pattern using `\` as escape.
fn like_pattern(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('%');
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}

#[async_trait]
impl MessageStore for SqliteStore {
    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities {
            chat_history: true,
            search: true,
        }
    }

    async fn append(&self, network: i64, target: &str, msg: &Message) -> Result<String, StoreError> {
        let target = target_key(target);
        let time = message_time(msg).timestamp_millis();
        let raw = raw_line(msg);
        let text = msg.params.last().cloned().unwrap_or_default();

        bounded(self.timeout, async {
            let id: i64 = sqlx::query_scalar(
                "INSERT INTO message (network, target, command, raw, text, time) \
                 VALUES (?, ?, ?, ?, ?, ?) RETURNING id",
            )
            .bind(network)
            .bind(&target)
            .bind(&msg.command)
            .bind(&raw)
            .bind(&text)
            .bind(time)
            .fetch_one(&self.pool)
            .await?;
            Ok(msgid::format(network, &target, &DbMsgId(id))?)
        })
        .await
    }

    async fn last_msg_id(
        &self,
        network: i64,
        target: &str,
        before: DateTime<Utc>,
    ) -> Result<Option<String>, StoreError> {
        let target = target_key(target);
        bounded(self.timeout, async {
            let id: Option<i64> = sqlx::query_scalar(
                "SELECT id FROM message WHERE network = ? AND target = ? AND time < ? \
                 ORDER BY id DESC LIMIT 1",
            )
            .bind(network)
            .bind(&target)
            .bind(before.timestamp_millis())
            .fetch_optional(&self.pool)
            .await?;
            id.map(|id| msgid::format(network, &target, &DbMsgId(id)))
                .transpose()
                .map_err(StoreError::from)
        })
        .await
    }

    async fn load_before_id(
        &self,
        id: &str,
        options: &LoadOptions,
    ) -> Result<Vec<Message>, StoreError> {
        let (network, target, DbMsgId(row)) = msgid::parse::<DbMsgId>(id)?;
        if network != options.network || target != target_key(&options.target) {
            return Err(msgid::MsgIdError::Malformed("identifier belongs to another target").into());
        }

        bounded(self.timeout, async {
            let rows: Vec<(i64, String, i64)> = sqlx::query_as(
                "SELECT id, raw, time FROM message \
                 WHERE network = ? AND target = ? AND id <= ? AND command IN (?, ?, ?) \
                 ORDER BY id DESC LIMIT ?",
            )
            .bind(network)
            .bind(&target)
            .bind(row)
            .bind(STORED_COMMANDS[0])
            .bind(STORED_COMMANDS[1])
            .bind(STORED_COMMANDS[2])
            .bind(options.limit as i64)
            .fetch_all(&self.pool)
            .await?;

            rows.iter()
                .map(|(id, raw, time)| Self::restore_row(network, &target, *id, raw, *time))
                .collect()
        })
        .await
    }

    async fn search(&self, options: &SearchOptions) -> Result<Vec<Message>, StoreError> {
        let pattern = like_pattern(&options.text);
        let target = options.target.as_deref().map(target_key);

        bounded(self.timeout, async {
            let rows: Vec<(i64, String, String, i64)> = sqlx::query_as(
                "SELECT id, target, raw, time FROM message \
                 WHERE network = ? AND (? IS NULL OR target = ?) \
                 AND text LIKE ? ESCAPE '\\' \
                 ORDER BY id DESC LIMIT ?",
            )
            .bind(options.network)
            .bind(target.as_deref())
            .bind(target.as_deref())
            .bind(&pattern)
            .bind(options.limit as i64)
            .fetch_all(&self.pool)
            .await?;

            rows.iter()
                .map(|(id, target, raw, time)| {
                    Self::restore_row(options.network, target, *id, raw, *time)
                })
                .collect()
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    async fn store() -> SqliteStore {
        SqliteStore::open(":memory:", Duration::from_secs(5))
            .await
            .unwrap()
    }

    fn privmsg(target: &str, text: &str, time: &str) -> Message {
        Message::new("PRIVMSG", [target, text])
            .with_prefix(slbnc_proto::Prefix::new("alice", "a", "host"))
            .with_tag("time", Some(time.to_string()))
    }

    #[tokio::test]
    async fn test_append_and_load_newest_first() {
        let store = store().await;
        let mut last = String::new();
        for (i, text) in ["one", "two", "three"].iter().enumerate() {
            let time = format!("2024-01-01T00:00:0{i}.000Z");
            last = store.append(1, "#Rust", &privmsg("#Rust", text, &time)).await.unwrap();
        }

        let opts = LoadOptions {
            network: 1,
            target: "#rust".into(),
            limit: 2,
        };
        let msgs = store.load_before_id(&last, &opts).await.unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].param(1), Some("three"));
        assert_eq!(msgs[1].param(1), Some("two"));
        assert_eq!(msgs[0].msgid(), Some(last.as_str()));
        assert_eq!(msgs[1].server_time(), Some("2024-01-01T00:00:01.000Z"));
    }

    #[tokio::test]
    async fn test_load_skips_other_commands_and_targets() {
        let store = store().await;
        store.append(1, "#a", &privmsg("#a", "keep", "2024-01-01T00:00:00.000Z")).await.unwrap();
        store.append(1, "#b", &privmsg("#b", "other", "2024-01-01T00:00:01.000Z")).await.unwrap();
        store.append(2, "#a", &privmsg("#a", "other net", "2024-01-01T00:00:02.000Z")).await.unwrap();
        let join = Message::new("JOIN", ["#a"]);
        let last = store.append(1, "#a", &join).await.unwrap();

        let opts = LoadOptions {
            network: 1,
            target: "#a".into(),
            limit: 10,
        };
        let msgs = store.load_before_id(&last, &opts).await.unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].param(1), Some("keep"));
    }

    #[tokio::test]
    async fn test_last_msg_id_is_strictly_before() {
        let store = store().await;
        let first = store
            .append(1, "#a", &privmsg("#a", "early", "2024-01-01T00:00:00.000Z"))
            .await
            .unwrap();
        store
            .append(1, "#a", &privmsg("#a", "late", "2024-01-01T00:00:10.000Z"))
            .await
            .unwrap();

        let cutoff = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 10).unwrap();
        assert_eq!(store.last_msg_id(1, "#A", cutoff).await.unwrap(), Some(first));

        let too_early = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(store.last_msg_id(1, "#a", too_early).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_load_rejects_foreign_id() {
        let store = store().await;
        let id = store
            .append(1, "#a", &privmsg("#a", "x", "2024-01-01T00:00:00.000Z"))
            .await
            .unwrap();
        let opts = LoadOptions {
            network: 1,
            target: "#b".into(),
            limit: 10,
        };
        assert!(matches!(
            store.load_before_id(&id, &opts).await,
            Err(StoreError::InvalidMsgId(_))
        ));
        assert!(matches!(
            store.load_before_id("garbage", &opts).await,
            Err(StoreError::InvalidMsgId(_))
        ));
    }

    #[tokio::test]
    async fn test_search() {
        let store = store().await;
        store.append(1, "#a", &privmsg("#a", "hello world", "2024-01-01T00:00:00.000Z")).await.unwrap();
        store.append(1, "#b", &privmsg("#b", "HELLO there", "2024-01-01T00:00:01.000Z")).await.unwrap();
        store.append(1, "#b", &privmsg("#b", "100% sure", "2024-01-01T00:00:02.000Z")).await.unwrap();

        let all = store
            .search(&SearchOptions {
                network: 1,
                target: None,
                text: "hello".into(),
                limit: 10,
            })
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].param(0), Some("#b"));

        let scoped = store
            .search(&SearchOptions {
                network: 1,
                target: Some("#A".into()),
                text: "hello".into(),
                limit: 10,
            })
            .await
            .unwrap();
        assert_eq!(scoped.len(), 1);

        let literal = store
            .search(&SearchOptions {
                network: 1,
                target: None,
                text: "0%".into(),
                limit: 10,
            })
            .await
            .unwrap();
        assert_eq!(literal.len(), 1);
        assert_eq!(literal[0].param(1), Some("100% sure"));
    }

    #[test]
    fn test_like_pattern_escapes() {
        assert_eq!(like_pattern("a_b%c\\"), "%a\\_b\\%c\\\\%");
    }
}
