//! Engine configuration, read from the environment

use std::str::FromStr;

pub const DEFAULT_UPDATE_CAPACITY: usize = 256;
pub const DEFAULT_EVENT_QUEUE_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Buffer of the message-update broadcast channel
    pub update_capacity: usize,
    /// Capacity of the push-event channel
    pub event_queue_capacity: usize,
    /// Drop tool ids missing from the catalog snapshot on optimistic writes
    pub prune_unknown_tools: bool,
    /// Emit logs as JSON lines
    pub log_json: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            update_capacity: DEFAULT_UPDATE_CAPACITY,
            event_queue_capacity: DEFAULT_EVENT_QUEUE_CAPACITY,
            prune_unknown_tools: true,
            log_json: false,
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            update_capacity: parse_or(&lookup, "SESSION_SYNC_UPDATE_CAPACITY", defaults.update_capacity),
            event_queue_capacity: parse_or(
                &lookup,
                "SESSION_SYNC_EVENT_QUEUE",
                defaults.event_queue_capacity,
            ),
            prune_unknown_tools: parse_or(
                &lookup,
                "SESSION_SYNC_PRUNE_UNKNOWN_TOOLS",
                defaults.prune_unknown_tools,
            ),
            log_json: parse_or(&lookup, "SESSION_SYNC_LOG_JSON", defaults.log_json),
        }
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "Ignoring unparsable configuration value");
            default
        }),
        None => default,
    }
}
