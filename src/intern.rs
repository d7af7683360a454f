//! String de-duplication for nicknames and channel names.
//!
//! Many users of one bouncer tend to share the same channels, so the upstream
//! state trackers intern the names they store. The cache only grows, so the
//! owning [`Server`](crate::state::Server) clears it on a schedule; strings
//! handed out before a reset stay valid and are simply no longer shared.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashSet;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Default)]
pub struct StringInterner {
    strings: DashSet<Arc<str>>,
}

impl StringInterner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the shared copy of `s`, inserting it if missing.
    pub fn intern(&self, s: &str) -> Arc<str> {
        if let Some(existing) = self.strings.get(s) {
            return Arc::clone(&existing);
        }
        let value: Arc<str> = Arc::from(s);
        self.strings.insert(Arc::clone(&value));
        value
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    /// Drop every cached string. Returns how many were dropped.
    pub fn reset(&self) -> usize {
        let count = self.strings.len();
        self.strings.clear();
        count
    }
}

/// Spawn the periodic reset task. It exits when `shutdown` fires.
pub fn spawn_reset_task(
    interner: Arc<StringInterner>,
    every: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let dropped = interner.reset();
                    debug!(dropped, "String cache reset");
                }
                _ = shutdown.cancelled() => break,
            }
        }
    })
}
