//! Command Log
//!
//! The ordered, gap-free record of every sequenced command in a session.
//! The log is append-only except for compaction, which discards a prefix
//! that has been folded into a snapshot baseline. Sequence numbers are
//! never reused, so a suffix request is unambiguous even across resets.

use std::collections::VecDeque;

use easel_protocol::SequencedCommand;

/// Append-only sequenced command history with prefix compaction
#[derive(Debug, Default)]
pub struct CommandLog {
    entries: VecDeque<SequencedCommand>,
    size_bytes: u64,
    /// Lowest sequence number still serveable; suffix requests below it
    /// must fall back to a baseline snapshot
    truncated_before: u64,
    last_sequence: u64,
}

impl CommandLog {
    /// Create an empty log
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
            size_bytes: 0,
            truncated_before: 1,
            last_sequence: 0,
        }
    }

    /// Append a sequenced command. The caller assigns contiguous
    /// sequence numbers; the log only records.
    pub fn append(&mut self, command: SequencedCommand) {
        self.size_bytes += command.encoded_len() as u64;
        self.last_sequence = command.sequence;
        self.entries.push_back(command);
    }

    /// Highest sequence number appended so far (0 before any command)
    #[must_use]
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    /// Total serialized size of retained entries
    #[must_use]
    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Number of retained entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entries are retained
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether appending `bytes` more would exceed `limit_bytes`
    #[must_use]
    pub fn is_out_of_space(&self, bytes: u64, limit_bytes: u64) -> bool {
        self.size_bytes + bytes > limit_bytes
    }

    /// Entries strictly after `sequence`, or `None` if that part of the
    /// log was compacted away and the client needs a baseline instead
    #[must_use]
    pub fn entries_after(&self, sequence: u64) -> Option<Vec<SequencedCommand>> {
        if sequence + 1 < self.truncated_before {
            return None;
        }
        Some(
            self.entries
                .iter()
                .filter(|e| e.sequence > sequence)
                .cloned()
                .collect(),
        )
    }

    /// Discard entries with sequence numbers below `sequence`
    pub fn truncate_before(&mut self, sequence: u64) {
        while let Some(front) = self.entries.front() {
            if front.sequence >= sequence {
                break;
            }
            self.size_bytes -= front.encoded_len() as u64;
            self.entries.pop_front();
        }
        if sequence > self.truncated_before {
            self.truncated_before = sequence;
        }
    }
}
