//! Session configuration

use serde::{Deserialize, Serialize};

/// History retention and compaction policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Soft threshold in bytes that triggers an autoreset. The effective
    /// threshold grows with the baseline left by the previous reset and
    /// is capped at 90% of `size_limit_bytes`. 0 disables autoreset.
    #[serde(default = "default_autoreset_threshold_bytes")]
    pub autoreset_threshold_bytes: u64,

    /// Hard limit on stored history in bytes. Commands that would exceed
    /// it are refused.
    #[serde(default = "default_size_limit_bytes")]
    pub size_limit_bytes: u64,

    /// Take a snapshot every this many commands
    #[serde(default = "default_snapshot_interval_commands")]
    pub snapshot_interval_commands: u64,

    /// Take a snapshot at least this often, in seconds
    #[serde(default = "default_snapshot_interval_secs")]
    pub snapshot_interval_secs: u64,

    /// Number of snapshots to retain
    #[serde(default = "default_snapshot_retain")]
    pub snapshot_retain: usize,
}

fn default_autoreset_threshold_bytes() -> u64 {
    1024 * 1024
}

fn default_size_limit_bytes() -> u64 {
    15 * 1024 * 1024
}

fn default_snapshot_interval_commands() -> u64 {
    500
}

fn default_snapshot_interval_secs() -> u64 {
    300
}

fn default_snapshot_retain() -> usize {
    3
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            autoreset_threshold_bytes: default_autoreset_threshold_bytes(),
            size_limit_bytes: default_size_limit_bytes(),
            snapshot_interval_commands: default_snapshot_interval_commands(),
            snapshot_interval_secs: default_snapshot_interval_secs(),
            snapshot_retain: default_snapshot_retain(),
        }
    }
}

/// Per-session policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// History policy
    #[serde(default)]
    pub history: HistoryConfig,

    /// Depth of the actor's inbound request queue; when full, submissions
    /// are refused as busy
    #[serde(default = "default_inbound_queue_depth")]
    pub inbound_queue_depth: usize,

    /// Maximum concurrent users
    #[serde(default = "default_max_users")]
    pub max_users: usize,

    /// Join password, if any
    #[serde(default)]
    pub password: Option<String>,

    /// Initial canvas width for new sessions
    #[serde(default = "default_canvas_dimension")]
    pub canvas_width: u32,

    /// Initial canvas height for new sessions
    #[serde(default = "default_canvas_dimension")]
    pub canvas_height: u32,
}

fn default_inbound_queue_depth() -> usize {
    256
}

fn default_max_users() -> usize {
    64
}

fn default_canvas_dimension() -> u32 {
    1024
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            history: HistoryConfig::default(),
            inbound_queue_depth: default_inbound_queue_depth(),
            max_users: default_max_users(),
            password: None,
            canvas_width: default_canvas_dimension(),
            canvas_height: default_canvas_dimension(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_applied_from_empty_document() {
        let config: SessionConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.history.size_limit_bytes, 15 * 1024 * 1024);
        assert_eq!(config.inbound_queue_depth, 256);
        assert!(config.password.is_none());
    }

    #[test]
    fn test_partial_override() {
        let config: HistoryConfig =
            serde_json::from_str(r#"{"autoreset_threshold_bytes": 0}"#).unwrap();
        assert_eq!(config.autoreset_threshold_bytes, 0);
        assert_eq!(config.snapshot_retain, 3);
    }
}
