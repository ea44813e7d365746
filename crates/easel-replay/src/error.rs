//! Error types for easel-replay

use thiserror::Error;

/// Replay error type
#[derive(Debug, Error)]
pub enum Error {
    /// The recording file is malformed or truncated
    #[error("corrupt recording: {0}")]
    CorruptRecording(String),

    /// The index sidecar does not belong to this recording
    #[error("index mismatch: {0}")]
    IndexMismatch(String),

    /// The requested sequence number is not in the recording
    #[error("sequence {0} is out of range")]
    OutOfRange(u64),

    /// A command or index entry could not be encoded
    #[error("serialization error: {0}")]
    Serialization(String),

    /// An index build was cancelled before completing
    #[error("index build cancelled")]
    Cancelled,

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Canvas error during playback
    #[error("canvas error: {0}")]
    Canvas(#[from] easel_canvas::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
