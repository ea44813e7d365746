//! Index Sidecar
//!
//! An index maps sequence numbers to byte offsets in a binary recording,
//! with an embedded state snapshot every stride commands so playback can
//! seek without replaying from the start. The sidecar stores the SHA-256
//! of the recording it was built from; a stale index is rejected rather
//! than silently producing wrong frames.

use std::fs;
use std::path::Path;

use easel_canvas::{CanvasState, Snapshot};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::recording::{sha256_file, BinaryReader};

/// File magic for index sidecars
pub const INDEX_MAGIC: &[u8; 8] = b"EASELIDX";
/// Current index container version
pub const INDEX_VERSION: u16 = 1;
/// Default commands between index entries
pub const DEFAULT_STRIDE: u64 = 256;

/// One seek point in a recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Sequence number the recording has reached at this point
    pub sequence: u64,
    /// Byte offset of the first frame after this point
    pub offset: u64,
    /// Encoded state snapshot, absent when the index was built without
    /// snapshots to save space
    pub snapshot: Option<Vec<u8>>,
}

/// Seek index for one binary recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingIndex {
    /// SHA-256 of the recording this index belongs to
    pub recording_hash: [u8; 32],
    /// Commands between entries
    pub stride: u64,
    /// Entries in ascending sequence order
    pub entries: Vec<IndexEntry>,
}

impl RecordingIndex {
    /// Last entry at or before `sequence`, preferring entries that carry
    /// a snapshot
    #[must_use]
    pub fn find(&self, sequence: u64) -> Option<&IndexEntry> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.sequence <= sequence && e.snapshot.is_some())
    }

    /// Write the sidecar, going through a temp file so a crash never
    /// leaves a half-written index behind
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let body = postcard::to_allocvec(self).map_err(|e| Error::Serialization(e.to_string()))?;
        let mut out = Vec::with_capacity(10 + body.len());
        out.extend_from_slice(INDEX_MAGIC);
        out.extend_from_slice(&INDEX_VERSION.to_le_bytes());
        out.extend_from_slice(&body);

        let tmp = path.with_extension("idx.tmp");
        fs::write(&tmp, &out)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Load a sidecar written by [`RecordingIndex::save`]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = fs::read(path)?;
        if bytes.len() < 10 {
            return Err(Error::CorruptRecording("truncated index header".into()));
        }
        if &bytes[..8] != INDEX_MAGIC {
            return Err(Error::CorruptRecording("bad index magic".into()));
        }
        let version = u16::from_le_bytes([bytes[8], bytes[9]]);
        if version != INDEX_VERSION {
            return Err(Error::CorruptRecording(format!(
                "unsupported index version {version}"
            )));
        }
        postcard::from_bytes(&bytes[10..]).map_err(|e| Error::CorruptRecording(e.to_string()))
    }
}

/// One-pass index builder
#[derive(Debug, Clone)]
pub struct IndexBuilder {
    stride: u64,
    with_snapshots: bool,
}

impl IndexBuilder {
    /// Create a builder with the default stride
    #[must_use]
    pub fn new() -> Self {
        Self {
            stride: DEFAULT_STRIDE,
            with_snapshots: true,
        }
    }

    /// Set the number of commands between entries
    #[must_use]
    pub fn with_stride(mut self, stride: u64) -> Self {
        self.stride = stride.max(1);
        self
    }

    /// Omit state snapshots; seeks then replay from the recording start
    #[must_use]
    pub fn without_snapshots(mut self) -> Self {
        self.with_snapshots = false;
        self
    }

    /// Build an index by replaying the whole recording once. The token
    /// is checked between frames, so a cancelled build returns promptly
    /// and writes nothing.
    pub fn build(
        &self,
        recording: impl AsRef<Path>,
        cancel: &CancellationToken,
    ) -> Result<RecordingIndex> {
        let recording = recording.as_ref();
        let recording_hash = sha256_file(recording)?;
        let mut reader = BinaryReader::open(recording)?;

        let mut state = CanvasState::blank();
        let mut entries = Vec::new();
        let mut since_entry = 0u64;
        let mut frames = 0u64;

        while let Some((_, command)) = reader.next_frame()? {
            if cancel.is_cancelled() {
                info!(frames, "index build cancelled");
                return Err(Error::Cancelled);
            }
            if let Err(e) = state.apply(&command.command) {
                debug!(
                    sequence = command.sequence,
                    error = %e,
                    "command skipped during index build"
                );
            }
            frames += 1;
            since_entry += 1;
            if since_entry >= self.stride {
                let snapshot = if self.with_snapshots {
                    Some(Snapshot::new(command.sequence, state.clone()).to_bytes()?)
                } else {
                    None
                };
                entries.push(IndexEntry {
                    sequence: command.sequence,
                    offset: reader.offset(),
                    snapshot,
                });
                since_entry = 0;
            }
        }

        info!(frames, entries = entries.len(), "index built");
        Ok(RecordingIndex {
            recording_hash,
            stride: self.stride,
            entries,
        })
    }

    /// Build and persist an index sidecar next to the recording
    pub fn build_to(
        &self,
        recording: impl AsRef<Path>,
        index_path: impl AsRef<Path>,
        cancel: &CancellationToken,
    ) -> Result<RecordingIndex> {
        let index = self.build(recording, cancel)?;
        index.save(index_path)?;
        Ok(index)
    }
}

impl Default for IndexBuilder {
    fn default() -> Self {
        Self::new()
    }
}
