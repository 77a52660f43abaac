//! WebSocket endpoint for pushed notifications

use std::sync::Arc;

use assetsync_core::{SessionIdMessage, WsEnvelope, SESSION_ID_MESSAGE};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::clients::OutboundMessage;
use crate::sessions::SessionRegistry;
use crate::AppState;

pub fn create_ws_router(state: Arc<AppState>) -> Router {
    Router::new().route("/", get(ws_handler)).with_state(state)
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let session_id = SessionRegistry::mint_id();
    let context = state.default_context().await;
    state.sessions.create_session(&session_id, context).await;
    info!("Client connected: {}", session_id);

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<OutboundMessage>();

    // Drain this client's queue into the socket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            let frame = match msg {
                OutboundMessage::Text(text) => Message::Text(text),
                OutboundMessage::Pong(data) => Message::Pong(data),
                OutboundMessage::Close => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            };
            if ws_tx.send(frame).await.is_err() {
                debug!("WebSocket send failed, client disconnected");
                break;
            }
        }
    });

    state.clients.add(&session_id, outbound_tx.clone()).await;

    let hello = WsEnvelope::new(
        SESSION_ID_MESSAGE,
        SessionIdMessage {
            session_id: session_id.clone(),
        },
    );
    if let Err(e) = state.clients.send_message(&session_id, &hello).await {
        warn!("Failed to serialize session id message: {}", e);
    }

    while let Some(result) = ws_rx.next().await {
        let text = match result {
            Ok(Message::Text(text)) => text,
            Ok(Message::Ping(data)) => {
                let _ = outbound_tx.send(OutboundMessage::Pong(data));
                continue;
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                warn!("WebSocket error from {}: {}", session_id, e);
                break;
            }
        };

        match WsEnvelope::parse(&text) {
            Ok(envelope) => {
                state.sessions.touch_session(&session_id).await;
                debug!("Message {} from {}", envelope.id, session_id);
            }
            Err(e) => warn!("Dropping malformed message from {}: {}", session_id, e),
        }
    }

    state.clients.remove(&session_id).await;
    state.sessions.remove_session(&session_id).await;
    send_task.abort();
    info!("Client disconnected: {}", session_id);
}
