//! Server-side session management for Easel
//!
//! A session is a single actor owning the authoritative canvas state, the
//! sequenced command log and the snapshot manager. Connections talk to it
//! through a bounded queue and receive updates over a broadcast channel;
//! the WebSocket layer is a thin translation between JSON frames and
//! actor requests.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod actor;
pub mod config;
pub mod error;
pub mod log;
pub mod session;
pub mod snapshots;
pub mod websocket;

pub use actor::{CatchUpReply, JoinAck, SessionActor, SessionRequest};
pub use config::{HistoryConfig, SessionConfig};
pub use error::{Error, Result};
pub use log::CommandLog;
pub use session::{SessionHandle, SessionManager};
pub use snapshots::SnapshotManager;
pub use websocket::{session_ws_handler, ServerState};
