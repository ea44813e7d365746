//! Session Management
//!
//! Handles to running session actors and the manager that owns them.
//! Sessions are created on first join and live until the manager drops
//! their handle and every connection has disconnected.

use std::collections::HashMap;
use std::sync::Arc;

use easel_protocol::{Command, UserId};
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::info;
use uuid::Uuid;

use crate::actor::{CatchUpReply, JoinAck, SessionActor, SessionRequest};
use crate::config::SessionConfig;
use crate::error::{Error, Result};

/// Cheap-to-clone handle to one session's inbound queue
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: Uuid,
    tx: mpsc::Sender<SessionRequest>,
}

impl SessionHandle {
    /// Session id
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Join the session
    pub async fn join(
        &self,
        user_name: impl Into<String>,
        protocol_version: u32,
        password: Option<String>,
    ) -> Result<JoinAck> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SessionRequest::Join {
                user_name: user_name.into(),
                protocol_version,
                password,
                reply,
            })
            .await
            .map_err(|_| Error::SessionClosed)?;
        rx.await.map_err(|_| Error::SessionClosed)?
    }

    /// Submit a command for sequencing. Refused as busy when the inbound
    /// queue is full, without blocking the connection task.
    pub async fn submit(
        &self,
        user_id: UserId,
        client_local_id: u64,
        command: Command,
    ) -> Result<u64> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .try_send(SessionRequest::Submit {
                user_id,
                client_local_id,
                command,
                reply,
            })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => Error::Busy,
                mpsc::error::TrySendError::Closed(_) => Error::SessionClosed,
            })?;
        rx.await.map_err(|_| Error::SessionClosed)?
    }

    /// Request the log suffix after a sequence number
    pub async fn catch_up(&self, after_sequence: u64) -> Result<CatchUpReply> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SessionRequest::CatchUp {
                after_sequence,
                reply,
            })
            .await
            .map_err(|_| Error::SessionClosed)?;
        rx.await.map_err(|_| Error::SessionClosed)?
    }

    /// Leave the session. Best-effort; a full queue drops the notice.
    pub fn leave(&self, user_id: UserId) {
        let _ = self.tx.try_send(SessionRequest::Leave { user_id });
    }
}

/// Manager for running sessions
pub struct SessionManager {
    sessions: Arc<RwLock<HashMap<Uuid, SessionHandle>>>,
    config: SessionConfig,
}

impl SessionManager {
    /// Create a manager spawning sessions with the given policy
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    /// Get a session handle, spawning the session if it does not exist
    pub async fn get_or_create(&self, session_id: Uuid) -> SessionHandle {
        {
            let sessions = self.sessions.read().await;
            if let Some(handle) = sessions.get(&session_id) {
                return handle.clone();
            }
        }

        let mut sessions = self.sessions.write().await;
        // Another task may have won the race for the write lock
        if let Some(handle) = sessions.get(&session_id) {
            return handle.clone();
        }

        let (tx, rx) = mpsc::channel(self.config.inbound_queue_depth);
        let actor = SessionActor::new(session_id, self.config.clone());
        tokio::spawn(actor.run(rx));

        let handle = SessionHandle { id: session_id, tx };
        sessions.insert(session_id, handle.clone());
        info!(session_id = %session_id, "session created");
        handle
    }

    /// Get a session handle if the session exists
    pub async fn get(&self, session_id: Uuid) -> Result<SessionHandle> {
        let sessions = self.sessions.read().await;
        sessions
            .get(&session_id)
            .cloned()
            .ok_or(Error::SessionNotFound(session_id))
    }

    /// Drop a session's handle; the actor stops once every connection
    /// disconnects
    pub async fn remove(&self, session_id: Uuid) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        sessions
            .remove(&session_id)
            .map(|_| ())
            .ok_or(Error::SessionNotFound(session_id))
    }

    /// Number of running sessions
    pub async fn session_count(&self) -> usize {
        let sessions = self.sessions.read().await;
        sessions.len()
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use easel_protocol::{LayerId, ServerMessage, PROTOCOL_VERSION};

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let manager = SessionManager::default();
        let id = Uuid::new_v4();
        let a = manager.get_or_create(id).await;
        let b = manager.get_or_create(id).await;
        assert_eq!(a.id(), b.id());
        assert_eq!(manager.session_count().await, 1);
    }

    #[tokio::test]
    async fn test_get_unknown_session() {
        let manager = SessionManager::default();
        let err = manager.get(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, Error::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn test_join_and_submit_through_handle() {
        let manager = SessionManager::default();
        let handle = manager.get_or_create(Uuid::new_v4()).await;

        let mut ack = handle.join("ada", PROTOCOL_VERSION, None).await.unwrap();
        let seq = handle
            .submit(
                ack.user_id,
                1,
                Command::CreateLayer {
                    id: LayerId(1),
                    title: "Background".into(),
                    insert_above: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(seq, 1);

        match ack.updates.recv().await.unwrap() {
            ServerMessage::Command { command } => {
                assert_eq!(command.sequence, 1);
                assert_eq!(command.user_id, ack.user_id);
            }
            other => unreachable!("expected Command, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_two_clients_see_the_same_order() {
        let manager = SessionManager::default();
        let handle = manager.get_or_create(Uuid::new_v4()).await;

        let mut ada = handle.join("ada", PROTOCOL_VERSION, None).await.unwrap();
        let mut ben = handle.join("ben", PROTOCOL_VERSION, None).await.unwrap();

        handle
            .submit(ada.user_id, 1, Command::UndoPoint)
            .await
            .unwrap();
        handle
            .submit(ben.user_id, 1, Command::UndoPoint)
            .await
            .unwrap();

        let mut ada_seqs = Vec::new();
        let mut ben_seqs = Vec::new();
        for _ in 0..2 {
            if let ServerMessage::Command { command } = ada.updates.recv().await.unwrap() {
                ada_seqs.push(command.sequence);
            }
            if let ServerMessage::Command { command } = ben.updates.recv().await.unwrap() {
                ben_seqs.push(command.sequence);
            }
        }
        assert_eq!(ada_seqs, vec![1, 2]);
        assert_eq!(ada_seqs, ben_seqs);
    }

    #[tokio::test]
    async fn test_submit_after_remove_reports_closed() {
        let manager = SessionManager::default();
        let id = Uuid::new_v4();
        let handle = manager.get_or_create(id).await;
        let ack = handle.join("ada", PROTOCOL_VERSION, None).await.unwrap();

        manager.remove(id).await.unwrap();
        // The actor keeps running while this handle exists; dropping it
        // is what stops the session. Submitting still works here.
        let seq = handle
            .submit(ack.user_id, 1, Command::UndoPoint)
            .await
            .unwrap();
        assert_eq!(seq, 1);
        assert!(matches!(
            manager.get(id).await,
            Err(Error::SessionNotFound(_))
        ));
    }
}
