//! WebSocket Handler
//!
//! Connection-level protocol for sessions. The first frame must be a
//! `join`; after a successful handshake the connection gets a `welcome`
//! with the baseline snapshot and then receives every sequenced command
//! through the session broadcast.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use easel_protocol::{ClientMessage, ServerMessage};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::actor::CatchUpReply;
use crate::error::Error;
use crate::session::{SessionHandle, SessionManager};

/// Shared state for the WebSocket handler
pub struct ServerState {
    /// Session manager
    pub sessions: Arc<SessionManager>,
}

impl ServerState {
    /// Create handler state around a session manager
    #[must_use]
    pub fn new(sessions: Arc<SessionManager>) -> Self {
        Self { sessions }
    }
}

type WsSender = Arc<Mutex<SplitSink<WebSocket, Message>>>;

/// WebSocket upgrade handler
pub async fn session_ws_handler(
    ws: WebSocketUpgrade,
    Path(session_id): Path<Uuid>,
    State(state): State<Arc<ServerState>>,
) -> impl IntoResponse {
    info!(session_id = %session_id, "WebSocket upgrade requested");
    ws.on_upgrade(move |socket| handle_socket(socket, session_id, state))
}

/// Handle a WebSocket connection
async fn handle_socket(socket: WebSocket, session_id: Uuid, state: Arc<ServerState>) {
    let (sender, mut receiver) = socket.split();
    let sender: WsSender = Arc::new(Mutex::new(sender));

    // The handshake frame must arrive before anything else
    let join = loop {
        match receiver.next().await {
            Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(msg) => break msg,
                Err(e) => {
                    send_error(&sender, &Error::InvalidMessage(e.to_string())).await;
                    return;
                }
            },
            Some(Ok(Message::Ping(data))) => {
                let mut s = sender.lock().await;
                let _ = s.send(Message::Pong(data)).await;
            }
            Some(Ok(Message::Close(_))) | None => return,
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                warn!(error = %e, "WebSocket error before join");
                return;
            }
        }
    };

    let ClientMessage::Join {
        session_id: declared,
        user_name,
        protocol_version,
        password,
    } = join
    else {
        send_error(
            &sender,
            &Error::InvalidMessage("first message must be join".into()),
        )
        .await;
        return;
    };
    if declared != session_id {
        send_error(
            &sender,
            &Error::InvalidMessage("join session id does not match path".into()),
        )
        .await;
        return;
    }

    let handle = state.sessions.get_or_create(session_id).await;
    let ack = match handle.join(&user_name, protocol_version, password).await {
        Ok(ack) => ack,
        Err(e) => {
            info!(session_id = %session_id, user_name, error = %e, "join refused");
            send_error(&sender, &e).await;
            return;
        }
    };
    let user_id = ack.user_id;
    info!(
        session_id = %session_id,
        user_id = %user_id,
        user_name,
        "WebSocket connected"
    );

    let welcome = ServerMessage::welcome(session_id, user_id, ack.sequence, ack.snapshot);
    if let Err(e) = send_message(&sender, &welcome).await {
        error!(error = %e, "Failed to send welcome message");
        handle.leave(user_id);
        return;
    }

    // Forward session broadcasts to this connection
    let mut updates = ack.updates;
    let sender_for_broadcast = sender.clone();
    let broadcast_handle = tokio::spawn(async move {
        loop {
            match updates.recv().await {
                Ok(msg) => {
                    if send_message(&sender_for_broadcast, &msg).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    // The client will notice the sequence gap and catch up
                    warn!(user_id = %user_id, missed, "connection lagged behind broadcasts");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // Main message loop
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                debug!(user_id = %user_id, text = %text, "Received message");
                if handle_client_message(&text, &handle, user_id, &sender).await {
                    break;
                }
            }
            Ok(Message::Close(_)) => {
                info!(user_id = %user_id, "WebSocket closed by client");
                break;
            }
            Ok(Message::Ping(data)) => {
                let mut s = sender.lock().await;
                let _ = s.send(Message::Pong(data)).await;
            }
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "WebSocket error");
                break;
            }
            _ => {}
        }
    }

    broadcast_handle.abort();
    handle.leave(user_id);
    info!(session_id = %session_id, user_id = %user_id, "WebSocket disconnected");
}

/// Handle a post-handshake client message; returns true when the
/// connection should close
async fn handle_client_message(
    text: &str,
    handle: &SessionHandle,
    user_id: easel_protocol::UserId,
    sender: &WsSender,
) -> bool {
    let msg: ClientMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            send_error(sender, &Error::InvalidMessage(e.to_string())).await;
            return false;
        }
    };

    match msg {
        ClientMessage::Submit {
            client_local_id,
            command,
        } => {
            // The broadcast carries the acknowledgment; only refusals are
            // reported directly
            if let Err(e) = handle.submit(user_id, client_local_id, command).await {
                send_error(sender, &e).await;
            }
            false
        }

        ClientMessage::CatchUp { after_sequence } => {
            match handle.catch_up(after_sequence).await {
                Ok(CatchUpReply::Commands { commands, sequence }) => {
                    for command in commands {
                        if send_message(sender, &ServerMessage::CatchUpCommand { command })
                            .await
                            .is_err()
                        {
                            return true;
                        }
                    }
                    let _ = send_message(sender, &ServerMessage::CaughtUp { sequence }).await;
                }
                Ok(CatchUpReply::Baseline { sequence, snapshot }) => {
                    let _ =
                        send_message(sender, &ServerMessage::Reset { sequence, snapshot }).await;
                    let _ = send_message(sender, &ServerMessage::CaughtUp { sequence }).await;
                }
                Err(e) => send_error(sender, &e).await,
            }
            false
        }

        ClientMessage::Ping => {
            let _ = send_message(sender, &ServerMessage::Pong).await;
            false
        }

        ClientMessage::Leave => true,

        ClientMessage::Join { .. } => {
            send_error(sender, &Error::InvalidMessage("already joined".into())).await;
            false
        }
    }
}

/// Send a server message as a JSON text frame
async fn send_message(sender: &WsSender, message: &ServerMessage) -> Result<(), String> {
    let json = serde_json::to_string(message).map_err(|e| e.to_string())?;
    let mut sender = sender.lock().await;
    sender
        .send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}

/// Report an error on this connection only
async fn send_error(sender: &WsSender, error: &Error) {
    let msg = if error.is_retriable() {
        ServerMessage::retriable_error(error.code(), error.to_string())
    } else {
        ServerMessage::error(error.code(), error.to_string())
    };
    let _ = send_message(sender, &msg).await;
}
