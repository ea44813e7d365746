//! Snapshot Manager
//!
//! Decides when to take snapshots of session state, retains a bounded
//! number of them, and computes the autoreset threshold that triggers
//! history compaction.

use std::collections::VecDeque;
use std::time::Instant;

use easel_canvas::Snapshot;
use tracing::debug;

use crate::config::HistoryConfig;

/// Bounded snapshot retention with interval-based cadence
#[derive(Debug)]
pub struct SnapshotManager {
    interval_commands: u64,
    interval_secs: u64,
    retain: usize,
    autoreset_threshold_bytes: u64,
    size_limit_bytes: u64,
    snapshots: VecDeque<Snapshot>,
    commands_since: u64,
    last_taken: Instant,
}

impl SnapshotManager {
    /// Create a manager from history policy
    #[must_use]
    pub fn new(config: &HistoryConfig) -> Self {
        Self {
            interval_commands: config.snapshot_interval_commands,
            interval_secs: config.snapshot_interval_secs,
            retain: config.snapshot_retain.max(1),
            autoreset_threshold_bytes: config.autoreset_threshold_bytes,
            size_limit_bytes: config.size_limit_bytes,
            snapshots: VecDeque::new(),
            commands_since: 0,
            last_taken: Instant::now(),
        }
    }

    /// Count a sequenced command against the snapshot cadence
    pub fn note_command(&mut self) {
        self.commands_since += 1;
    }

    /// Whether a snapshot is due, by command count or by elapsed time
    #[must_use]
    pub fn should_snapshot(&self) -> bool {
        if self.commands_since == 0 {
            return false;
        }
        self.commands_since >= self.interval_commands
            || self.last_taken.elapsed().as_secs() >= self.interval_secs
    }

    /// Store a snapshot, discarding the oldest beyond the retention bound
    pub fn record(&mut self, snapshot: Snapshot) {
        debug!(sequence = snapshot.sequence, "snapshot recorded");
        self.snapshots.push_back(snapshot);
        while self.snapshots.len() > self.retain {
            self.snapshots.pop_front();
        }
        self.commands_since = 0;
        self.last_taken = Instant::now();
    }

    /// Most recent snapshot, if any
    #[must_use]
    pub fn latest(&self) -> Option<&Snapshot> {
        self.snapshots.back()
    }

    /// Number of retained snapshots
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Whether no snapshot has been recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Effective autoreset threshold given the history size left behind
    /// by the previous reset. Returns `None` when autoreset is disabled.
    ///
    /// The configured threshold measures growth since the last reset, so
    /// the baseline is added on top; the result is capped at 90% of the
    /// hard limit so a reset always happens before admission control
    /// starts refusing commands.
    #[must_use]
    pub fn effective_autoreset_threshold(&self, base_bytes: u64) -> Option<u64> {
        if self.autoreset_threshold_bytes == 0 {
            return None;
        }
        let cap = self.size_limit_bytes / 10 * 9;
        Some((self.autoreset_threshold_bytes + base_bytes).min(cap))
    }
}
