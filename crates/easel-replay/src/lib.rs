//! Recording and playback for Easel sessions
//!
//! Sequenced command streams can be written to disk in a binary frame
//! format, transcribed to a line-oriented text form, or captured as debug
//! dumps. An index sidecar with periodic state snapshots makes seeking
//! cheap; playback without one replays linearly from the start.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod index;
pub mod player;
pub mod recording;

pub use error::{Error, Result};
pub use index::{IndexBuilder, IndexEntry, RecordingIndex, DEFAULT_STRIDE};
pub use player::Player;
pub use recording::{
    sha256_file, transcribe, BinaryReader, BinaryRecorder, DumpFrame, DumpReader, DumpRecorder,
    FrameDirection, TextRecorder, RECORDING_MAGIC, RECORDING_VERSION,
};
