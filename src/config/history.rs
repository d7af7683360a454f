//! Message store configuration.

use std::time::Duration;

use serde::Deserialize;

use super::defaults::{default_history_path, default_query_timeout};

/// Which message store backs chat history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryBackend {
    /// Nothing is stored; history capabilities are not advertised.
    #[default]
    None,
    /// SQLite database (history and search).
    Sqlite,
    /// Embedded redb key-value store (history only).
    Redb,
}

/// History configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryConfig {
    #[serde(default)]
    pub backend: HistoryBackend,
    /// Path to the database file.
    #[serde(default = "default_history_path")]
    pub path: String,
    /// Upper bound on any single store call, in seconds.
    #[serde(default = "default_query_timeout")]
    pub query_timeout: u64,
}

impl HistoryConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout)
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            backend: HistoryBackend::default(),
            path: default_history_path(),
            query_timeout: default_query_timeout(),
        }
    }
}
