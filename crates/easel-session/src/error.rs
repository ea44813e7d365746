//! Error types for easel-session

use thiserror::Error;
use uuid::Uuid;

/// Session error type
#[derive(Debug, Error)]
pub enum Error {
    /// Client and server protocol versions do not match
    #[error("incompatible protocol version: client {client}, server {server}")]
    IncompatibleVersion {
        /// Version the client announced
        client: u32,
        /// Version this server speaks
        server: u32,
    },

    /// Wrong or missing session password
    #[error("authentication failed")]
    AuthFailure,

    /// The session has reached its user limit
    #[error("session is full ({max_users} users)")]
    SessionFull {
        /// Configured user limit
        max_users: usize,
    },

    /// The session has shut down
    #[error("session is closed")]
    SessionClosed,

    /// No session with the given id exists
    #[error("session {0} not found")]
    SessionNotFound(Uuid),

    /// Appending the command would exceed the history size limit and
    /// compaction cannot free enough space
    #[error("history quota exceeded: {used_bytes} of {limit_bytes} bytes used")]
    QuotaExceeded {
        /// Bytes of history currently stored
        used_bytes: u64,
        /// Configured hard limit
        limit_bytes: u64,
    },

    /// The session's inbound queue is full; the client may retry
    #[error("session is busy, try again")]
    Busy,

    /// A message could not be parsed or arrived out of protocol order
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// The connection closed before the operation completed
    #[error("connection closed")]
    ConnectionClosed,

    /// Internal failure
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the client may retry the failed operation as-is
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Busy)
    }

    /// Get the stable error code sent over the wire
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::IncompatibleVersion { .. } => "incompatible_version",
            Self::AuthFailure => "auth_failure",
            Self::SessionFull { .. } => "session_full",
            Self::SessionClosed => "session_closed",
            Self::SessionNotFound(_) => "session_not_found",
            Self::QuotaExceeded { .. } => "quota_exceeded",
            Self::Busy => "server_busy",
            Self::InvalidMessage(_) => "invalid_message",
            Self::ConnectionClosed => "connection_closed",
            Self::Internal(_) => "internal",
        }
    }
}

/// Result type alias for session operations
pub type Result<T> = std::result::Result<T, Error>;
