//! WebSocket Wire Messages
//!
//! This module defines the client/server message types exchanged over a
//! session connection. Messages travel as JSON text frames; recorded
//! streams use the binary framing in `easel-replay`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::command::{Command, SequencedCommand, UserId};

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join a session; must be the first message on a connection
    Join {
        /// Session to join
        session_id: Uuid,
        /// Display name
        user_name: String,
        /// Client protocol version
        protocol_version: u32,
        /// Session password, if the session requires one
        password: Option<String>,
    },

    /// Submit a command for sequencing.
    ///
    /// `sequence` is absent on submission; the server assigns it and
    /// echoes it back in the broadcast [`ServerMessage::Command`].
    Submit {
        /// Client-chosen id matched against the acknowledgment
        client_local_id: u64,
        /// The command
        command: Command,
    },

    /// Request the log suffix after a sequence number (resync after a
    /// dropped fork or reconnect)
    CatchUp {
        /// Last sequence number the client has applied
        after_sequence: u64,
    },

    /// Leave the session
    Leave,

    /// Ping to keep the connection alive
    Ping,
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Join accepted; carries the session baseline
    Welcome {
        /// Session id
        session_id: Uuid,
        /// Assigned user id
        user_id: UserId,
        /// Sequence number the snapshot is valid as-of
        sequence: u64,
        /// Encoded canvas snapshot (see `easel-canvas`)
        snapshot: Vec<u8>,
    },

    /// A command was accepted and sequenced.
    ///
    /// Broadcast to every connected client including the originator; the
    /// embedded `client_local_id` is the acknowledgment the originator
    /// matches against its local fork.
    Command {
        /// The sequenced command
        command: SequencedCommand,
    },

    /// History was compacted; the client must adopt the new baseline
    Reset {
        /// Sequence number the new baseline is valid as-of
        sequence: u64,
        /// Encoded canvas snapshot forming the new baseline
        snapshot: Vec<u8>,
    },

    /// One command of a catch-up suffix
    CatchUpCommand {
        /// The sequenced command
        command: SequencedCommand,
    },

    /// The catch-up suffix is complete
    CaughtUp {
        /// Sequence number the client is now current at
        sequence: u64,
    },

    /// History space is running low; an autoreset is pending or has been
    /// refused
    HistoryWarning {
        /// Bytes of history currently stored
        used_bytes: u64,
        /// Configured hard limit
        limit_bytes: u64,
        /// Human-readable explanation
        message: String,
    },

    /// Error report
    Error {
        /// Stable error code
        code: String,
        /// Human-readable message
        message: String,
        /// Whether the client may retry the failed operation as-is
        retriable: bool,
    },

    /// Pong response to ping
    Pong,
}

impl ServerMessage {
    /// Create an error message
    #[must_use]
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
            retriable: false,
        }
    }

    /// Create a retriable error message
    #[must_use]
    pub fn retriable_error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
            retriable: true,
        }
    }

    /// Create a welcome message
    #[must_use]
    pub fn welcome(session_id: Uuid, user_id: UserId, sequence: u64, snapshot: Vec<u8>) -> Self {
        Self::Welcome {
            session_id,
            user_id,
            sequence,
            snapshot,
        }
    }

    /// Create a command broadcast
    #[must_use]
    pub fn command(command: SequencedCommand) -> Self {
        Self::Command { command }
    }

    /// Create a history warning
    #[must_use]
    pub fn history_warning(used_bytes: u64, limit_bytes: u64, message: impl Into<String>) -> Self {
        Self::HistoryWarning {
            used_bytes,
            limit_bytes,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{Color, LayerId, Rect, PROTOCOL_VERSION};

    #[test]
    fn test_join_serialization() {
        let msg = ClientMessage::Join {
            session_id: Uuid::nil(),
            user_name: "ada".to_string(),
            protocol_version: PROTOCOL_VERSION,
            password: None,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"join\""));

        let parsed: ClientMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn test_submit_carries_no_sequence() {
        let msg = ClientMessage::Submit {
            client_local_id: 42,
            command: Command::FillRegion {
                layer: LayerId(1),
                rect: Rect::new(0, 0, 8, 8),
                color: Color::WHITE,
            },
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"client_local_id\":42"));
        assert!(!json.contains("\"sequence\""));
    }

    #[test]
    fn test_command_broadcast_carries_ack_fields() {
        let sc = SequencedCommand::new(7, UserId(2), 42, Command::UndoPoint);
        let msg = ServerMessage::command(sc);
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"sequence\":7"));
        assert!(json.contains("\"client_local_id\":42"));
    }

    #[test]
    fn test_error_helpers() {
        let msg = ServerMessage::retriable_error("server_busy", "inbound queue full");
        match msg {
            ServerMessage::Error {
                code, retriable, ..
            } => {
                assert_eq!(code, "server_busy");
                assert!(retriable);
            }
            other => unreachable!("expected Error, got {:?}", other),
        }
    }

    #[test]
    fn test_history_warning_round_trip() {
        let msg = ServerMessage::history_warning(900, 1000, "history space low");
        let json = serde_json::to_string(&msg).unwrap();
        let parsed: ServerMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, msg);
    }
}
