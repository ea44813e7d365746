//! Session Actor
//!
//! Each session runs as a single task that owns the canvas state, the
//! command log and the snapshot manager. All mutation flows through its
//! inbound queue, so sequencing is total and no locks are held across
//! await points.
//!
//! A submitted command is sequenced and broadcast even when it fails to
//! apply: every client applies the log with the same skip rule, so a
//! command that fails on the server fails identically everywhere and
//! convergence is preserved.

use std::collections::HashMap;

use easel_canvas::{CanvasState, Snapshot};
use easel_protocol::{
    Command, SequencedCommand, ServerMessage, UserId, PROTOCOL_VERSION,
};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::log::CommandLog;
use crate::snapshots::SnapshotManager;

/// Capacity of the per-session broadcast channel
const BROADCAST_CAPACITY: usize = 1024;

/// Requests handled by a session actor
#[derive(Debug)]
pub enum SessionRequest {
    /// Join the session
    Join {
        /// Display name
        user_name: String,
        /// Client protocol version
        protocol_version: u32,
        /// Password, if the session requires one
        password: Option<String>,
        /// Join outcome
        reply: oneshot::Sender<Result<JoinAck>>,
    },
    /// Submit a command for sequencing
    Submit {
        /// Submitting user
        user_id: UserId,
        /// Client-chosen id echoed in the broadcast acknowledgment
        client_local_id: u64,
        /// The command
        command: Command,
        /// Assigned sequence number, or the refusal
        reply: oneshot::Sender<Result<u64>>,
    },
    /// Request the log suffix after a sequence number
    CatchUp {
        /// Last sequence number the client has applied
        after_sequence: u64,
        /// Suffix or baseline
        reply: oneshot::Sender<Result<CatchUpReply>>,
    },
    /// Leave the session
    Leave {
        /// Departing user
        user_id: UserId,
    },
}

/// Successful join outcome
#[derive(Debug)]
pub struct JoinAck {
    /// Assigned user id
    pub user_id: UserId,
    /// Sequence number the snapshot is valid as-of
    pub sequence: u64,
    /// Encoded baseline snapshot
    pub snapshot: Vec<u8>,
    /// Subscription to session broadcasts
    pub updates: broadcast::Receiver<ServerMessage>,
}

/// Catch-up outcome
#[derive(Debug)]
pub enum CatchUpReply {
    /// The requested suffix is still retained
    Commands {
        /// Commands strictly after the requested sequence
        commands: Vec<SequencedCommand>,
        /// Sequence number the client is current at after applying them
        sequence: u64,
    },
    /// The suffix was compacted away; adopt this baseline instead
    Baseline {
        /// Sequence number the baseline is valid as-of
        sequence: u64,
        /// Encoded baseline snapshot
        snapshot: Vec<u8>,
    },
}

/// Single-owner session state machine
pub struct SessionActor {
    id: Uuid,
    config: SessionConfig,
    state: CanvasState,
    log: CommandLog,
    snapshots: SnapshotManager,
    broadcast_tx: broadcast::Sender<ServerMessage>,
    users: HashMap<UserId, String>,
    next_user_id: u16,
    next_sequence: u64,
    /// Serialized size of the baseline left by the last reset, counted
    /// against the history quota alongside the live log
    base_size_bytes: u64,
    /// Set when a reset failed to free space; no further resets are
    /// attempted and clients are warned instead
    autoreset_locked: bool,
}

impl SessionActor {
    /// Create an actor with a fresh canvas
    #[must_use]
    pub fn new(id: Uuid, config: SessionConfig) -> Self {
        let state = CanvasState::new(config.canvas_width, config.canvas_height);
        let snapshots = SnapshotManager::new(&config.history);
        let (broadcast_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        let base_size_bytes = Snapshot::new(0, state.clone()).encoded_len() as u64;
        Self {
            id,
            config,
            state,
            log: CommandLog::new(),
            snapshots,
            broadcast_tx,
            users: HashMap::new(),
            next_user_id: 1,
            next_sequence: 1,
            base_size_bytes,
            autoreset_locked: false,
        }
    }

    /// Run the actor until every handle to its queue is dropped
    pub async fn run(mut self, mut rx: mpsc::Receiver<SessionRequest>) {
        info!(session_id = %self.id, "session started");
        while let Some(request) = rx.recv().await {
            match request {
                SessionRequest::Join {
                    user_name,
                    protocol_version,
                    password,
                    reply,
                } => {
                    let _ = reply.send(self.handle_join(&user_name, protocol_version, password));
                }
                SessionRequest::Submit {
                    user_id,
                    client_local_id,
                    command,
                    reply,
                } => {
                    let _ = reply.send(self.handle_submit(user_id, client_local_id, command));
                }
                SessionRequest::CatchUp {
                    after_sequence,
                    reply,
                } => {
                    let _ = reply.send(self.handle_catch_up(after_sequence));
                }
                SessionRequest::Leave { user_id } => self.handle_leave(user_id),
            }
        }
        info!(session_id = %self.id, "session stopped");
    }

    fn handle_join(
        &mut self,
        user_name: &str,
        protocol_version: u32,
        password: Option<String>,
    ) -> Result<JoinAck> {
        if protocol_version != PROTOCOL_VERSION {
            return Err(Error::IncompatibleVersion {
                client: protocol_version,
                server: PROTOCOL_VERSION,
            });
        }
        if let Some(expected) = &self.config.password {
            if password.as_deref() != Some(expected.as_str()) {
                warn!(session_id = %self.id, user_name, "join refused: bad password");
                return Err(Error::AuthFailure);
            }
        }
        if self.users.len() >= self.config.max_users {
            return Err(Error::SessionFull {
                max_users: self.config.max_users,
            });
        }

        let user_id = UserId(self.next_user_id);
        self.next_user_id += 1;
        self.users.insert(user_id, user_name.to_string());

        let sequence = self.log.last_sequence();
        let snapshot = Snapshot::new(sequence, self.state.clone())
            .to_bytes()
            .map_err(|e| Error::Internal(e.to_string()))?;

        info!(session_id = %self.id, user_id = %user_id, user_name, "user joined");
        Ok(JoinAck {
            user_id,
            sequence,
            snapshot,
            updates: self.broadcast_tx.subscribe(),
        })
    }

    fn handle_submit(
        &mut self,
        user_id: UserId,
        client_local_id: u64,
        command: Command,
    ) -> Result<u64> {
        let sc = SequencedCommand::new(self.next_sequence, user_id, client_local_id, command);
        let bytes = sc.encoded_len() as u64;

        let limit = self.config.history.size_limit_bytes;
        if self.used_bytes() + bytes > limit {
            self.try_autoreset();
            if self.used_bytes() + bytes > limit {
                warn!(
                    session_id = %self.id,
                    user_id = %user_id,
                    used = self.used_bytes(),
                    limit,
                    "command refused: history quota exceeded"
                );
                return Err(Error::QuotaExceeded {
                    used_bytes: self.used_bytes(),
                    limit_bytes: limit,
                });
            }
        }

        self.next_sequence += 1;

        // Sequenced regardless of the apply outcome; clients skip failed
        // commands with the same rule
        if let Err(e) = self.state.apply(&sc.command) {
            debug!(
                session_id = %self.id,
                sequence = sc.sequence,
                kind = sc.command.kind(),
                error = %e,
                "command sequenced but not applied"
            );
        }

        let sequence = sc.sequence;
        self.log.append(sc.clone());
        self.broadcast(ServerMessage::command(sc));
        self.snapshots.note_command();

        if self.snapshots.should_snapshot() {
            self.snapshots
                .record(Snapshot::new(self.log.last_sequence(), self.state.clone()));
        }

        if let Some(threshold) = self
            .snapshots
            .effective_autoreset_threshold(self.base_size_bytes)
        {
            if self.used_bytes() >= threshold && !self.autoreset_locked {
                self.try_autoreset();
            }
        } else if self.used_bytes() * 10 >= limit * 9 {
            // Autoreset disabled; the operator gets a warning instead
            self.broadcast(ServerMessage::history_warning(
                self.used_bytes(),
                limit,
                "history space is low and automatic compaction is disabled",
            ));
        }

        Ok(sequence)
    }

    fn handle_catch_up(&mut self, after_sequence: u64) -> Result<CatchUpReply> {
        match self.log.entries_after(after_sequence) {
            Some(commands) => Ok(CatchUpReply::Commands {
                commands,
                sequence: self.log.last_sequence(),
            }),
            None => {
                let sequence = self.log.last_sequence();
                let snapshot = Snapshot::new(sequence, self.state.clone())
                    .to_bytes()
                    .map_err(|e| Error::Internal(e.to_string()))?;
                debug!(
                    session_id = %self.id,
                    after_sequence,
                    sequence,
                    "catch-up served as baseline, suffix was compacted"
                );
                Ok(CatchUpReply::Baseline { sequence, snapshot })
            }
        }
    }

    fn handle_leave(&mut self, user_id: UserId) {
        if self.users.remove(&user_id).is_some() {
            info!(session_id = %self.id, user_id = %user_id, "user left");
        }
    }

    /// History bytes counted against the quota: the live log plus the
    /// baseline it grows from
    fn used_bytes(&self) -> u64 {
        self.base_size_bytes + self.log.size_bytes()
    }

    /// Compact history into a fresh baseline snapshot and tell clients to
    /// adopt it. Repeating a reset with no intervening commands is a
    /// no-op because the log is already empty.
    fn try_autoreset(&mut self) {
        if self.autoreset_locked || self.log.is_empty() {
            return;
        }
        let sequence = self.log.last_sequence();
        let snapshot = Snapshot::new(sequence, self.state.clone());
        let encoded = match snapshot.to_bytes() {
            Ok(b) => b,
            Err(e) => {
                warn!(session_id = %self.id, error = %e, "autoreset failed, locking");
                self.autoreset_locked = true;
                return;
            }
        };

        let before = self.used_bytes();
        self.log.truncate_before(sequence + 1);
        self.base_size_bytes = encoded.len() as u64;
        self.snapshots.record(snapshot);
        info!(
            session_id = %self.id,
            sequence,
            before_bytes = before,
            after_bytes = self.used_bytes(),
            "history reset"
        );
        self.broadcast(ServerMessage::Reset {
            sequence,
            snapshot: encoded,
        });

        // A baseline that alone crosses the threshold cannot be compacted
        // further
        if let Some(threshold) = self
            .snapshots
            .effective_autoreset_threshold(self.base_size_bytes)
        {
            if self.used_bytes() >= threshold {
                self.autoreset_locked = true;
                self.broadcast(ServerMessage::history_warning(
                    self.used_bytes(),
                    self.config.history.size_limit_bytes,
                    "history cannot be compacted further",
                ));
            }
        }
    }

    fn broadcast(&self, message: ServerMessage) {
        // Send fails only when no client is subscribed
        let _ = self.broadcast_tx.send(message);
    }
}
