//! Store used when history is disabled.
//!
//! Appends succeed and hand out nothing; reads are rejected so that the
//! chat-history capability is never advertised on top of it.

use super::{LoadOptions, MessageStore, SearchOptions, StoreCapabilities, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use slbnc_proto::Message;

pub struct NoOpStore;

#[async_trait]
impl MessageStore for NoOpStore {
    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities::default()
    }

    async fn append(&self, _network: i64, _target: &str, _msg: &Message) -> Result<String, StoreError> {
        Ok(String::new())
    }

    async fn last_msg_id(
        &self,
        _network: i64,
        _target: &str,
        _before: DateTime<Utc>,
    ) -> Result<Option<String>, StoreError> {
        Ok(None)
    }

    async fn load_before_id(
        &self,
        _id: &str,
        _options: &LoadOptions,
    ) -> Result<Vec<Message>, StoreError> {
        Err(StoreError::Unsupported)
    }

    async fn search(&self, _options: &SearchOptions) -> Result<Vec<Message>, StoreError> {
        Err(StoreError::Unsupported)
    }
}
