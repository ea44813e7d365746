//! Error types for easel-canvas
//!
//! Command application failures are recoverable by design: the caller
//! treats the command as a no-op and logs it, so that a client never
//! diverges because of a command another client could still apply.

use easel_protocol::{AnnotationId, LayerId};
use thiserror::Error;

/// Canvas error type
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or internally inconsistent command
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// Command references a layer or annotation that does not exist
    #[error("unknown target: {0}")]
    UnknownTarget(String),

    /// Snapshot data could not be decoded
    #[error("corrupt snapshot: {0}")]
    CorruptSnapshot(String),
}

impl Error {
    /// Create an invalid-command error
    #[must_use]
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidCommand(msg.into())
    }

    /// Create an unknown-target error for a layer
    #[must_use]
    pub fn unknown_layer(id: LayerId) -> Self {
        Self::UnknownTarget(id.to_string())
    }

    /// Create an unknown-target error for an annotation
    #[must_use]
    pub fn unknown_annotation(id: AnnotationId) -> Self {
        Self::UnknownTarget(id.to_string())
    }

    /// Whether the caller may recover by skipping the offending command
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::InvalidCommand(_) | Self::UnknownTarget(_))
    }

    /// Get the error code for protocol messages
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidCommand(_) => "invalid_command",
            Self::UnknownTarget(_) => "unknown_target",
            Self::CorruptSnapshot(_) => "corrupt_snapshot",
        }
    }
}

/// Result type alias for canvas operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::unknown_layer(LayerId(3)).code(), "unknown_target");
        assert_eq!(Error::invalid("bad rect").code(), "invalid_command");
    }

    #[test]
    fn test_apply_errors_are_recoverable() {
        assert!(Error::unknown_layer(LayerId(1)).is_recoverable());
        assert!(Error::invalid("x").is_recoverable());
        assert!(!Error::CorruptSnapshot("truncated".into()).is_recoverable());
    }

    #[test]
    fn test_error_display() {
        let err = Error::unknown_annotation(AnnotationId(9));
        assert!(err.to_string().contains("annotation#9"));
    }
}
