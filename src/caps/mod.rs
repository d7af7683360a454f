//! IRCv3 capability negotiation state.
//!
//! Each connection owns one [`CapRegistry`]. Downstream connections publish a
//! [`CapSnapshot`] of the flags the broadcast path cares about, so other tasks
//! can filter messages without touching the registry itself.

mod registry;

pub use registry::CapRegistry;

use crate::history::StoreCapabilities;

pub const SERVER_TIME: &str = "server-time";
pub const MESSAGE_TAGS: &str = "message-tags";
pub const BATCH: &str = "batch";
pub const SASL: &str = "sasl";
pub const MULTI_PREFIX: &str = "multi-prefix";
pub const CHATHISTORY: &str = "draft/chathistory";
pub const SEARCH: &str = "soju.im/search";
pub const CAP_NOTIFY: &str = "cap-notify";

/// SASL mechanisms offered to downstream clients.
pub const SASL_MECHANISMS: &str = "PLAIN";

/// Build the registry a new downstream connection starts with.
///
/// History capabilities are advertised only when the active message store
/// supports them.
pub fn downstream_registry(store: StoreCapabilities) -> CapRegistry {
    let mut caps = CapRegistry::new();
    caps.advertise(SERVER_TIME, "");
    caps.advertise(MESSAGE_TAGS, "");
    caps.advertise(BATCH, "");
    caps.advertise(CAP_NOTIFY, "");
    caps.advertise(SASL, SASL_MECHANISMS);
    if store.chat_history {
        caps.advertise(CHATHISTORY, "");
    }
    if store.search {
        caps.advertise(SEARCH, "");
    }
    caps
}

/// Capabilities an upstream connection asks for when the server offers them.
pub const UPSTREAM_WANTED: &[&str] = &[SERVER_TIME, MESSAGE_TAGS, MULTI_PREFIX];

/// Copyable view of the enabled downstream capabilities that gate outbound
/// traffic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapSnapshot {
    pub server_time: bool,
    pub message_tags: bool,
    pub batch: bool,
    pub chat_history: bool,
    pub search: bool,
}

impl CapSnapshot {
    pub fn from_registry(caps: &CapRegistry) -> Self {
        Self {
            server_time: caps.is_enabled(SERVER_TIME),
            message_tags: caps.is_enabled(MESSAGE_TAGS),
            batch: caps.is_enabled(BATCH),
            chat_history: caps.is_enabled(CHATHISTORY),
            search: caps.is_enabled(SEARCH),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_caps_follow_store() {
        let none = downstream_registry(StoreCapabilities::default());
        assert!(!none.is_available(CHATHISTORY));
        assert!(!none.is_available(SEARCH));

        let full = downstream_registry(StoreCapabilities {
            chat_history: true,
            search: true,
        });
        assert!(full.is_available(CHATHISTORY));
        assert!(full.is_available(SEARCH));
        assert_eq!(full.available_value(SASL), Some("PLAIN"));
    }

    #[test]
    fn test_snapshot() {
        let mut caps = downstream_registry(StoreCapabilities::default());
        caps.enable([SERVER_TIME, BATCH]);
        let snap = CapSnapshot::from_registry(&caps);
        assert!(snap.server_time && snap.batch);
        assert!(!snap.message_tags && !snap.chat_history);
    }
}
