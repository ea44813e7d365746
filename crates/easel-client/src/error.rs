//! Error types for easel-client

use thiserror::Error;

/// Client error type
#[derive(Debug, Error)]
pub enum Error {
    /// The local fork exceeded its budget and was discarded; the client
    /// must resynchronize from the given sequence number
    #[error("local fork dropped ({pending} pending commands), resync from sequence {resync_from}")]
    ForkDropped {
        /// Commands that were discarded
        pending: usize,
        /// Last confirmed sequence number to catch up from
        resync_from: u64,
    },

    /// A local command was rejected by the canvas state machine and was
    /// not queued for submission
    #[error("command rejected locally: {0}")]
    Rejected(#[from] easel_canvas::Error),

    /// A resynchronization is in progress; local edits are not accepted
    /// until it completes
    #[error("resynchronizing, local edits suspended")]
    Resyncing,

    /// A sequenced command arrived out of order; the log suffix must be
    /// refetched
    #[error("out of sequence: expected {expected}, got {got}")]
    OutOfSequence {
        /// Next sequence number the client expected
        expected: u64,
        /// Sequence number that actually arrived
        got: u64,
    },

    /// The requested undo or redo cannot be performed against current
    /// state; nothing was changed
    #[error("undo unavailable: {0}")]
    UndoUnavailable(String),
}

impl Error {
    /// Whether the client recovers on its own (by resyncing or skipping)
    /// rather than needing user action
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        true
    }

    /// Get the error code for status reporting
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::ForkDropped { .. } => "fork_dropped",
            Self::Rejected(_) => "rejected",
            Self::Resyncing => "resyncing",
            Self::OutOfSequence { .. } => "out_of_sequence",
            Self::UndoUnavailable(_) => "undo_unavailable",
        }
    }
}

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = Error::ForkDropped {
            pending: 21,
            resync_from: 100,
        };
        assert_eq!(err.code(), "fork_dropped");
        assert_eq!(Error::UndoUnavailable("gone".into()).code(), "undo_unavailable");
    }

    #[test]
    fn test_display_mentions_resync_point() {
        let err = Error::ForkDropped {
            pending: 3,
            resync_from: 17,
        };
        assert!(err.to_string().contains("17"));
    }
}
