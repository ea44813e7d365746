//! Playback Engine
//!
//! Deterministic playback of binary recordings. `seek` restores the
//! nearest preceding index snapshot and replays forward, so the state at
//! any sequence number is identical to what a linear replay from the
//! start would produce.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use easel_canvas::{CanvasState, Snapshot};
use tracing::debug;

use crate::error::{Error, Result};
use crate::index::RecordingIndex;
use crate::recording::{sha256_file, BinaryReader, HEADER_LEN};

/// Recording playback with optional index-accelerated seeking
pub struct Player {
    reader: BinaryReader<BufReader<File>>,
    index: Option<RecordingIndex>,
    state: CanvasState,
    sequence: u64,
}

impl Player {
    /// Open a recording without an index; seeking replays from the start
    pub fn open(recording: impl AsRef<Path>) -> Result<Self> {
        let reader = BinaryReader::open(recording)?;
        Ok(Self {
            reader,
            index: None,
            state: CanvasState::blank(),
            sequence: 0,
        })
    }

    /// Open a recording with its index sidecar. The sidecar's stored hash
    /// must match the recording; a mismatch means the recording changed
    /// after the index was built.
    pub fn open_indexed(
        recording: impl AsRef<Path>,
        index_path: impl AsRef<Path>,
    ) -> Result<Self> {
        let index = RecordingIndex::load(index_path)?;
        let hash = sha256_file(&recording)?;
        if hash != index.recording_hash {
            return Err(Error::IndexMismatch(
                "recording does not match the index sidecar".into(),
            ));
        }
        let mut player = Self::open(recording)?;
        player.index = Some(index);
        Ok(player)
    }

    /// Canvas state at the current playback position
    #[must_use]
    pub fn state(&self) -> &CanvasState {
        &self.state
    }

    /// Sequence number of the last applied command (0 at the start)
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Apply the next command; returns its sequence number, or `None` at
    /// the end of the recording
    pub fn step(&mut self) -> Result<Option<u64>> {
        let Some((_, command)) = self.reader.next_frame()? else {
            return Ok(None);
        };
        if let Err(e) = self.state.apply(&command.command) {
            debug!(
                sequence = command.sequence,
                error = %e,
                "command skipped during playback"
            );
        }
        self.sequence = command.sequence;
        Ok(Some(command.sequence))
    }

    /// Position playback exactly after the command with the given
    /// sequence number (0 = before any command).
    ///
    /// Uses the nearest preceding index snapshot when one is available,
    /// otherwise replays from wherever is cheapest. Seeking past the end
    /// of the recording returns `OutOfRange`.
    pub fn seek(&mut self, sequence: u64) -> Result<()> {
        let entry = self
            .index
            .as_ref()
            .and_then(|idx| idx.find(sequence))
            .cloned();

        match entry {
            // Restore a snapshot when it gets us closer than the current
            // position, or when we must rewind
            Some(entry) if entry.sequence > self.sequence || sequence < self.sequence => {
                let bytes = entry
                    .snapshot
                    .as_ref()
                    .ok_or_else(|| Error::IndexMismatch("entry without snapshot".into()))?;
                let snapshot = Snapshot::from_bytes(bytes)?;
                debug!(
                    target = sequence,
                    restored = entry.sequence,
                    "seek restored index snapshot"
                );
                self.state = snapshot.state;
                self.sequence = entry.sequence;
                self.reader.seek_to(entry.offset)?;
            }
            _ if sequence < self.sequence => {
                // No usable snapshot behind the target; rewind to the start
                self.reader.seek_to(HEADER_LEN)?;
                self.state = CanvasState::blank();
                self.sequence = 0;
            }
            _ => {}
        }

        while self.sequence < sequence {
            if self.step()?.is_none() {
                return Err(Error::OutOfRange(sequence));
            }
        }
        Ok(())
    }
}
