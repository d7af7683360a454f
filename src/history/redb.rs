//! Redb message store.
//!
//! Entries are filed under `network\0target\0seq` where `seq` is a
//! zero-padded per-target counter, so a range scan over one target walks
//! messages in arrival order. The counter value is the backend-local
//! position inside message IDs. Text search is not supported.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use slbnc_proto::Message;

use super::msgid::{self, MsgIdError, RedbMsgId};
use super::{
    LoadOptions, MessageStore, STORED_COMMANDS, SearchOptions, StoreCapabilities, StoreError,
    bounded, message_time, raw_line, restore, target_key,
};

const MESSAGES: TableDefinition<&str, &[u8]> = TableDefinition::new("messages");
const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");

#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    command: String,
    raw: String,
    time: i64,
}

pub struct RedbStore {
    db: Arc<Database>,
    timeout: Duration,
}

fn db_err(e: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn target_prefix(network: i64, target: &str) -> String {
    format!("{network}\0{target}\0")
}

fn make_key(network: i64, target: &str, seq: u64) -> String {
    format!("{network}\0{target}\0{seq:020}")
}

fn seq_of(key: &str) -> Option<u64> {
    key.rsplit('\0').next()?.parse().ok()
}

impl RedbStore {
    pub fn open(path: &str, timeout: Duration) -> Result<Self, StoreError> {
        let db = Database::create(path).map_err(db_err)?;
        Ok(Self {
            db: Arc::new(db),
            timeout,
        })
    }

    /// Run a blocking redb transaction off the async runtime, under the
    /// store's time bound.
    async fn blocking<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T, StoreError> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        bounded(self.timeout, async move {
            tokio::task::spawn_blocking(move || f(&db))
                .await
                .map_err(db_err)?
        })
        .await
    }
}

#[async_trait]
impl MessageStore for RedbStore {
    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities {
            chat_history: true,
            search: false,
        }
    }

    async fn append(&self, network: i64, target: &str, msg: &Message) -> Result<String, StoreError> {
        let target = target_key(target);
        let entry = StoredEntry {
            command: msg.command.clone(),
            raw: raw_line(msg),
            time: message_time(msg).timestamp_millis(),
        };
        let value =
            serde_json::to_vec(&entry).map_err(|e| StoreError::Serialization(e.to_string()))?;

        self.blocking(move |db| {
            let seq_key = format!("{network}\0{target}");
            let write_txn = db.begin_write().map_err(db_err)?;
            let seq = {
                let mut seqs = write_txn.open_table(SEQUENCES).map_err(db_err)?;
                let next = seqs
                    .get(seq_key.as_str())
                    .map_err(db_err)?
                    .map(|v| v.value() + 1)
                    .unwrap_or(1);
                seqs.insert(seq_key.as_str(), next).map_err(db_err)?;

                let mut table = write_txn.open_table(MESSAGES).map_err(db_err)?;
                let key = make_key(network, &target, next);
                table
                    .insert(key.as_str(), value.as_slice())
                    .map_err(db_err)?;
                next
            };
            write_txn.commit().map_err(db_err)?;
            Ok(msgid::format(network, &target, &RedbMsgId(seq))?)
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
        let before = before.timestamp_millis();

        self.blocking(move |db| {
            let read_txn = db.begin_read().map_err(db_err)?;
            let table = match read_txn.open_table(MESSAGES) {
                Ok(table) => table,
                Err(redb::TableError::TableDoesNotExist(_)) => return Ok(None),
                Err(e) => return Err(db_err(e)),
            };

            let start = target_prefix(network, &target);
            let end = make_key(network, &target, u64::MAX);
            for item in table
                .range(start.as_str()..=end.as_str())
                .map_err(db_err)?
                .rev()
            {
                let (k, v) = item.map_err(db_err)?;
                let entry: StoredEntry = serde_json::from_slice(v.value())
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                if entry.time < before {
                    let seq = seq_of(k.value())
                        .ok_or_else(|| StoreError::Backend("corrupt message key".into()))?;
                    return Ok(Some(msgid::format(network, &target, &RedbMsgId(seq))?));
                }
            }
            Ok(None)
        })
        .await
    }

    async fn load_before_id(
        &self,
        id: &str,
        options: &LoadOptions,
    ) -> Result<Vec<Message>, StoreError> {
        let (network, target, RedbMsgId(seq)) = msgid::parse::<RedbMsgId>(id)?;
        if network != options.network || target != target_key(&options.target) {
            return Err(MsgIdError::Malformed("identifier belongs to another target").into());
        }
        let limit = options.limit;

        self.blocking(move |db| {
            let read_txn = db.begin_read().map_err(db_err)?;
            let table = match read_txn.open_table(MESSAGES) {
                Ok(table) => table,
                Err(redb::TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
                Err(e) => return Err(db_err(e)),
            };

            let start = target_prefix(network, &target);
            let end = make_key(network, &target, seq);
            let mut messages = Vec::with_capacity(limit.min(1000));
            for item in table
                .range(start.as_str()..=end.as_str())
                .map_err(db_err)?
                .rev()
            {
                if messages.len() >= limit {
                    break;
                }
                let (k, v) = item.map_err(db_err)?;
                let entry: StoredEntry = serde_json::from_slice(v.value())
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                if !STORED_COMMANDS.contains(&entry.command.as_str()) {
                    continue;
                }
                let seq = seq_of(k.value())
                    .ok_or_else(|| StoreError::Backend("corrupt message key".into()))?;
                let msgid = msgid::format(network, &target, &RedbMsgId(seq))?;
                messages.push(restore(&entry.raw, msgid, entry.time)?);
            }
            Ok(messages)
        })
        .await
    }

    async fn search(&self, _options: &SearchOptions) -> Result<Vec<Message>, StoreError> {
        Err(StoreError::Unsupported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn store() -> (TempDir, RedbStore) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.redb");
        let store = RedbStore::open(path.to_str().unwrap(), Duration::from_secs(5)).unwrap();
        (dir, store)
    }

    fn notice(target: &str, text: &str, second: u32) -> Message {
        Message::new("NOTICE", [target, text]).with_tag(
            "time",
            Some(format!("2024-01-01T00:00:{second:02}.000Z")),
        )
    }

    #[tokio::test]
    async fn test_sequence_per_target() {
        let (_dir, store) = store();
        let a1 = store.append(1, "#a", &notice("#a", "a1", 0)).await.unwrap();
        let b1 = store.append(1, "#b", &notice("#b", "b1", 1)).await.unwrap();
        let a2 = store.append(1, "#A", &notice("#A", "a2", 2)).await.unwrap();

        assert_eq!(msgid::parse::<RedbMsgId>(&a1).unwrap().2, RedbMsgId(1));
        assert_eq!(msgid::parse::<RedbMsgId>(&b1).unwrap().2, RedbMsgId(1));
        assert_eq!(msgid::parse::<RedbMsgId>(&a2).unwrap().2, RedbMsgId(2));
    }

    #[tokio::test]
    async fn test_load_before_id() {
        let (_dir, store) = store();
        let mut ids = Vec::new();
        for i in 0..5 {
            ids.push(
                store
                    .append(7, "#chan", &notice("#chan", &format!("m{i}"), i))
                    .await
                    .unwrap(),
            );
        }
        store.append(7, "#chan", &Message::new("PART", ["#chan"])).await.unwrap();

        let opts = LoadOptions {
            network: 7,
            target: "#chan".into(),
            limit: 3,
        };
        let msgs = store.load_before_id(&ids[3], &opts).await.unwrap();
        let texts: Vec<_> = msgs.iter().filter_map(|m| m.param(1)).collect();
        assert_eq!(texts, ["m3", "m2", "m1"]);
        assert_eq!(msgs[0].msgid(), Some(ids[3].as_str()));
    }

    #[tokio::test]
    async fn test_last_msg_id() {
        let (_dir, store) = store();
        let first = store.append(1, "#a", &notice("#a", "x", 5)).await.unwrap();
        store.append(1, "#a", &notice("#a", "y", 30)).await.unwrap();

        let cutoff = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 30).unwrap();
        assert_eq!(store.last_msg_id(1, "#a", cutoff).await.unwrap(), Some(first));
        assert_eq!(store.last_msg_id(1, "#zzz", cutoff).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_empty_store_and_foreign_ids() {
        let (_dir, store) = store();
        let cutoff = Utc::now();
        assert_eq!(store.last_msg_id(1, "#a", cutoff).await.unwrap(), None);

        let sqlite_id = msgid::format(1, "#a", &msgid::DbMsgId(1)).unwrap();
        let opts = LoadOptions {
            network: 1,
            target: "#a".into(),
            limit: 10,
        };
        assert!(matches!(
            store.load_before_id(&sqlite_id, &opts).await,
            Err(StoreError::InvalidMsgId(_))
        ));
        assert!(matches!(
            store.search(&SearchOptions {
                network: 1,
                target: None,
                text: "x".into(),
                limit: 1,
            })
            .await,
            Err(StoreError::Unsupported)
        ));
    }
}
