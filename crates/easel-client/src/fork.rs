//! Local Fork
//!
//! The ordered queue of commands the local user has issued but the server
//! has not yet acknowledged. Entries are removed strictly in submission
//! order as acknowledgments arrive; if the fork outgrows its budget the
//! whole thing is discarded and the client resynchronizes (fallbehind).

use std::collections::VecDeque;

use easel_protocol::Command;
use serde::{Deserialize, Serialize};

/// Budget for the local fork. Both limits are operator policy; the
/// mechanism does not prescribe the numbers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForkConfig {
    /// Maximum number of unconfirmed commands
    #[serde(default = "default_max_commands")]
    pub max_commands: usize,
    /// Maximum total serialized size of unconfirmed commands
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
}

fn default_max_commands() -> usize {
    128
}

fn default_max_bytes() -> usize {
    4 * 1024 * 1024
}

impl Default for ForkConfig {
    fn default() -> Self {
        Self {
            max_commands: default_max_commands(),
            max_bytes: default_max_bytes(),
        }
    }
}

/// A command awaiting acknowledgment
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCommand {
    /// Id the acknowledgment will carry
    pub client_local_id: u64,
    /// The command
    pub command: Command,
    /// Serialized size counted against the byte budget
    pub bytes: usize,
}

/// The speculative command queue
#[derive(Debug, Default)]
pub struct LocalFork {
    entries: VecDeque<PendingCommand>,
    bytes: usize,
    next_local_id: u64,
}

impl LocalFork {
    /// Create an empty fork
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
            bytes: 0,
            next_local_id: 1,
        }
    }

    /// Append a command, assigning it the next client-local id
    pub fn push(&mut self, command: Command) -> u64 {
        let id = self.next_local_id;
        self.next_local_id += 1;
        let bytes = command.encoded_len();
        self.bytes += bytes;
        self.entries.push_back(PendingCommand {
            client_local_id: id,
            command,
            bytes,
        });
        id
    }

    /// Whether adding a command of `bytes` serialized size would exceed
    /// the budget
    #[must_use]
    pub fn would_exceed(&self, config: &ForkConfig, bytes: usize) -> bool {
        self.entries.len() + 1 > config.max_commands || self.bytes + bytes > config.max_bytes
    }

    /// The oldest unconfirmed command
    #[must_use]
    pub fn head(&self) -> Option<&PendingCommand> {
        self.entries.front()
    }

    /// Remove and return the oldest unconfirmed command
    pub fn pop_head(&mut self) -> Option<PendingCommand> {
        let entry = self.entries.pop_front()?;
        self.bytes -= entry.bytes;
        Some(entry)
    }

    /// Discard every entry
    pub fn clear(&mut self) {
        self.entries.clear();
        self.bytes = 0;
    }

    /// Number of unconfirmed commands
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the fork is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total serialized size of unconfirmed commands
    #[must_use]
    pub fn bytes(&self) -> usize {
        self.bytes
    }

    /// Iterate the unconfirmed commands oldest-first
    pub fn iter(&self) -> impl Iterator<Item = &PendingCommand> {
        self.entries.iter()
    }
}
