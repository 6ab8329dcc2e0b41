//! WebSocket handler for voice sessions
//!
//! One socket is one voice session: the client relays its speech
//! recognizer's final transcripts in and receives typed session events
//! back. Each socket gets its own pipeline task; the registry entry and the
//! pipeline's input channel are removed synchronously on disconnect, so no
//! confirmation timer can outlive the session.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::ApiState;
use crate::db::ActionRecord;
use crate::pipeline::{self, NlpResponse, SessionEvent, SessionInput};

/// Incoming WebSocket message from client
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WsIncoming {
    /// Relayed speech-recognizer callback
    Transcript {
        text: String,
        #[serde(default)]
        is_final: bool,
        #[serde(default)]
        confidence: f32,
    },
    /// Accept the pending confirmation
    ConfirmCommand,
    /// Reject the pending confirmation
    RejectCommand,
    /// Replace the pending command's item and apply it
    CorrectCommand {
        original: String,
        corrected: String,
        #[serde(default)]
        mistake_type: Option<String>,
    },
    /// Reverse the last applied action
    Undo,
    /// Ping to keep connection alive
    Ping,
}

/// Outgoing WebSocket message to client
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WsOutgoing {
    /// Connection established
    Connected { session_id: String },
    /// Raw transcript echo with flags
    Transcription { text: String, is_final: bool },
    /// An inventory mutation was applied and logged
    CommandProcessed { record: ActionRecord },
    /// Human-readable confirmation/notification text
    Feedback { message: String },
    /// The spoken item was ambiguous; pick one of the suggestions
    ClarificationNeeded {
        message: String,
        suggestions: Vec<String>,
    },
    /// Full decision payload
    NlpResponse(NlpResponse),
    /// Error occurred
    Error { code: String, message: String },
    /// Pong response
    Pong,
}

impl From<SessionEvent> for WsOutgoing {
    fn from(event: SessionEvent) -> Self {
        match event {
            SessionEvent::Transcription { text, is_final } => {
                Self::Transcription { text, is_final }
            }
            SessionEvent::CommandProcessed { record } => Self::CommandProcessed { record },
            SessionEvent::Feedback { message } => Self::Feedback { message },
            SessionEvent::ClarificationNeeded {
                message,
                suggestions,
            } => Self::ClarificationNeeded {
                message,
                suggestions,
            },
            SessionEvent::NlpResponse(response) => Self::NlpResponse(response),
            SessionEvent::Error { code, message } => Self::Error { code, message },
        }
    }
}

/// Build WebSocket router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/voice/{session_id}", get(ws_upgrade))
        .with_state(state)
}

/// Handle WebSocket upgrade request
async fn ws_upgrade(
    State(state): State<Arc<ApiState>>,
    Path(session_id): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, session_id))
}

/// Handle WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<ApiState>, session_id: String) {
    let (mut sender, mut receiver) = socket.split();

    // Send connected message
    let connected = WsOutgoing::Connected {
        session_id: session_id.clone(),
    };
    if let Ok(msg) = serde_json::to_string(&connected) {
        if sender.send(Message::Text(msg.into())).await.is_err() {
            return;
        }
    }

    tracing::info!(session_id = %session_id, "voice session connected");

    // Outgoing frames funnel through one channel to the socket
    let (out_tx, mut out_rx) = mpsc::channel::<WsOutgoing>(32);

    // Spawn the session pipeline; its events bridge into the outgoing channel
    let (events_tx, mut events_rx) = mpsc::channel::<SessionEvent>(32);
    let handle = pipeline::spawn(session_id.clone(), state.pipeline_deps.clone(), events_tx);

    if state
        .sessions
        .insert(session_id.clone(), handle.clone())
        .await
        .is_some()
    {
        tracing::warn!(session_id = %session_id, "replaced an existing session with the same id");
    }

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            if let Ok(text) = serde_json::to_string(&msg) {
                if sender.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
        }
    });

    let bridge_tx = out_tx.clone();
    let mut bridge_task = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            if bridge_tx.send(event.into()).await.is_err() {
                break;
            }
        }
    });

    let session_id_recv = session_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    handle_message(&text, &handle, &out_tx).await;
                }
                Message::Ping(data) => {
                    // axum answers pings itself
                    tracing::trace!(len = data.len(), "received ping");
                }
                Message::Close(_) => {
                    tracing::info!(session_id = %session_id_recv, "voice session closed by client");
                    break;
                }
                _ => {}
            }
        }
    });

    // Wait for either direction to finish
    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
            bridge_task.abort();
        }
        _ = &mut recv_task => {
            send_task.abort();
            bridge_task.abort();
        }
    }

    // Deregister synchronously; dropping the last input sender ends the
    // pipeline task, discarding any partial command and pending confirmation
    state.sessions.remove(&session_id).await;

    tracing::info!(session_id = %session_id, "voice session disconnected");
}

/// Handle a single incoming frame
async fn handle_message(
    text: &str,
    handle: &pipeline::SessionHandle,
    out_tx: &mpsc::Sender<WsOutgoing>,
) {
    let incoming: WsIncoming = match serde_json::from_str(text) {
        Ok(incoming) => incoming,
        Err(e) => {
            let _ = out_tx
                .send(WsOutgoing::Error {
                    code: "bad_message".to_string(),
                    message: format!("invalid message: {e}"),
                })
                .await;
            return;
        }
    };

    let input = match incoming {
        WsIncoming::Ping => {
            let _ = out_tx.send(WsOutgoing::Pong).await;
            return;
        }
        WsIncoming::Transcript {
            text,
            is_final,
            confidence,
        } => SessionInput::Transcript {
            text,
            is_final,
            confidence,
        },
        WsIncoming::ConfirmCommand => SessionInput::Confirm,
        WsIncoming::RejectCommand => SessionInput::Reject,
        WsIncoming::CorrectCommand {
            original,
            corrected,
            mistake_type,
        } => SessionInput::Correct {
            original,
            corrected,
            mistake_type,
        },
        WsIncoming::Undo => SessionInput::Undo,
    };

    if handle.input.send(input).await.is_err() {
        let _ = out_tx
            .send(WsOutgoing::Error {
                code: "session_error".to_string(),
                message: "session pipeline stopped".to_string(),
            })
            .await;
    }
}
