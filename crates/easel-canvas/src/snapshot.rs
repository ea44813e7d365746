//! Canvas Snapshots
//!
//! A snapshot is a full, self-contained serialization of canvas state
//! tagged with the sequence number it is valid as-of. Replaying the
//! command log strictly after that sequence number, starting from the
//! snapshot, reproduces current state bit-for-bit.

use easel_protocol::Command;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::state::CanvasState;

/// File magic for encoded snapshots
pub const SNAPSHOT_MAGIC: &[u8; 8] = b"EASELSNP";
/// Current snapshot container version
pub const SNAPSHOT_VERSION: u16 = 1;

/// A full canvas state at a given sequence point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Sequence number this snapshot is valid as-of (0 = before any command)
    pub sequence: u64,
    /// The serialized state
    pub state: CanvasState,
}

impl Snapshot {
    /// Take a snapshot of a state at a sequence point
    #[must_use]
    pub fn new(sequence: u64, state: CanvasState) -> Self {
        Self { sequence, state }
    }

    /// Encode into the versioned container format
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let body = postcard::to_allocvec(self)
            .map_err(|e| Error::CorruptSnapshot(e.to_string()))?;
        let mut out = Vec::with_capacity(SNAPSHOT_MAGIC.len() + 2 + body.len());
        out.extend_from_slice(SNAPSHOT_MAGIC);
        out.extend_from_slice(&SNAPSHOT_VERSION.to_le_bytes());
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Decode from the versioned container format
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < SNAPSHOT_MAGIC.len() + 2 {
            return Err(Error::CorruptSnapshot("truncated header".into()));
        }
        if &bytes[..8] != SNAPSHOT_MAGIC {
            return Err(Error::CorruptSnapshot("bad magic".into()));
        }
        let version = u16::from_le_bytes([bytes[8], bytes[9]]);
        if version != SNAPSHOT_VERSION {
            return Err(Error::CorruptSnapshot(format!(
                "unsupported version {version}"
            )));
        }
        postcard::from_bytes(&bytes[10..]).map_err(|e| Error::CorruptSnapshot(e.to_string()))
    }

    /// Size of the encoded snapshot in bytes
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        self.to_bytes().map(|b| b.len()).unwrap_or(0)
    }

    /// Build a bootstrap command sequence that reproduces this snapshot's
    /// state from a blank canvas.
    ///
    /// Used to seed a new session from imported content and to form the
    /// history prefix after an autoreset.
    #[must_use]
    pub fn bootstrap_commands(&self) -> Vec<Command> {
        let s = &self.state;
        let mut commands = Vec::new();
        commands.push(Command::ResizeCanvas {
            top: 0,
            right: s.width as i32,
            bottom: s.height as i32,
            left: 0,
        });
        commands.push(Command::SetBackground {
            color: s.background,
        });
        for layer in &s.layers {
            commands.push(Command::RestoreLayer {
                layer: layer.to_image(),
                above: None,
            });
        }
        for annotation in &s.annotations {
            commands.push(Command::CreateAnnotation {
                id: annotation.id,
                rect: annotation.rect,
                text: annotation.text.clone(),
            });
            commands.push(Command::EditAnnotation {
                id: annotation.id,
                rect: None,
                text: None,
                background: Some(annotation.background),
            });
        }
        if s.selection.is_some() {
            commands.push(Command::SetSelection { rect: s.selection });
        }
        for (key, value) in &s.metadata {
            commands.push(Command::SetMetadata {
                key: key.clone(),
                value: Some(value.clone()),
            });
        }
        commands
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use easel_protocol::{Color, Command, LayerId, Rect};

    fn sample_state() -> CanvasState {
        let mut state = CanvasState::new(4, 4);
        state
            .apply(&Command::CreateLayer {
                id: LayerId(1),
                title: "Background".into(),
                insert_above: None,
            })
            .unwrap();
        state
            .apply(&Command::FillRegion {
                layer: LayerId(1),
                rect: Rect::new(0, 0, 4, 4),
                color: Color(0xFF00FF00),
            })
            .unwrap();
        state
    }

    #[test]
    fn test_snapshot_round_trip() {
        let snapshot = Snapshot::new(42, sample_state());
        let bytes = snapshot.to_bytes().unwrap();
        let decoded = Snapshot::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, snapshot);
    }

    #[test]
    fn test_bad_magic_is_corrupt() {
        let snapshot = Snapshot::new(1, sample_state());
        let mut bytes = snapshot.to_bytes().unwrap();
        bytes[0] = b'X';
        let err = Snapshot::from_bytes(&bytes).unwrap_err();
        assert_eq!(err.code(), "corrupt_snapshot");
    }

    #[test]
    fn test_truncated_snapshot_is_corrupt() {
        assert!(Snapshot::from_bytes(b"EAS").is_err());
    }

    #[test]
    fn test_unsupported_version_is_corrupt() {
        let snapshot = Snapshot::new(1, sample_state());
        let mut bytes = snapshot.to_bytes().unwrap();
        bytes[8] = 0xFF;
        assert!(Snapshot::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_bootstrap_commands_reproduce_state() {
        let mut state = sample_state();
        state
            .apply(&Command::SetMetadata {
                key: "title".into(),
                value: Some("demo".into()),
            })
            .unwrap();
        let snapshot = Snapshot::new(7, state.clone());

        let mut rebuilt = CanvasState::blank();
        for command in snapshot.bootstrap_commands() {
            rebuilt.apply(&command).unwrap();
        }
        assert_eq!(rebuilt, state);
    }

    #[test]
    fn test_bootstrap_commands_carry_selection() {
        let mut state = sample_state();
        state
            .apply(&Command::SetSelection {
                rect: Some(Rect::new(1, 1, 2, 2)),
            })
            .unwrap();
        let snapshot = Snapshot::new(7, state.clone());

        let mut rebuilt = CanvasState::blank();
        for command in snapshot.bootstrap_commands() {
            rebuilt.apply(&command).unwrap();
        }
        assert_eq!(rebuilt.selection, Some(Rect::new(1, 1, 2, 2)));
        assert_eq!(rebuilt, state);
    }
}
