//! Connected WebSocket clients
//!
//! Every socket gets an outbound queue drained by its own writer task, so a
//! slow client never holds up a broadcast.

use std::collections::HashMap;

use assetsync_core::WsEnvelope;
use serde::Serialize;
use tokio::sync::{mpsc, RwLock};

/// Frames queued for one socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    /// Serialized `{id, message}` envelope
    Text(String),
    /// Reply to a client ping
    Pong(Vec<u8>),
    /// Send a close frame and stop writing
    Close,
}

pub type ClientSender = mpsc::UnboundedSender<OutboundMessage>;

#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: RwLock<HashMap<String, ClientSender>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, session_id: impl Into<String>, sender: ClientSender) {
        self.clients.write().await.insert(session_id.into(), sender);
    }

    pub async fn remove(&self, session_id: &str) -> bool {
        self.clients.write().await.remove(session_id).is_some()
    }

    /// Queue a frame for one client; false if it is unknown or already closed
    pub async fn send(&self, session_id: &str, text: &str) -> bool {
        let clients = self.clients.read().await;
        match clients.get(session_id) {
            Some(sender) if !sender.is_closed() => sender
                .send(OutboundMessage::Text(text.to_string()))
                .is_ok(),
            _ => false,
        }
    }

    /// Ask a client's socket to close; its disconnect handler removes it
    pub async fn close(&self, session_id: &str) -> bool {
        let clients = self.clients.read().await;
        match clients.get(session_id) {
            Some(sender) => sender.send(OutboundMessage::Close).is_ok(),
            None => false,
        }
    }

    /// Queue a frame for every open client, returning how many got it.
    ///
    /// Closed sockets are skipped here and pruned by their disconnect handler.
    pub async fn broadcast(&self, text: &str) -> usize {
        let clients = self.clients.read().await;
        let mut delivered = 0;
        for (session_id, sender) in clients.iter() {
            if sender.is_closed() {
                tracing::debug!("Skipping closed client {}", session_id);
                continue;
            }
            if sender.send(OutboundMessage::Text(text.to_string())).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Serialize an envelope once and broadcast it
    pub async fn broadcast_message<T: Serialize>(
        &self,
        envelope: &WsEnvelope<T>,
    ) -> Result<usize, serde_json::Error> {
        let text = serde_json::to_string(envelope)?;
        Ok(self.broadcast(&text).await)
    }

    pub async fn send_message<T: Serialize>(
        &self,
        session_id: &str,
        envelope: &WsEnvelope<T>,
    ) -> Result<bool, serde_json::Error> {
        let text = serde_json::to_string(envelope)?;
        Ok(self.send(session_id, &text).await)
    }

    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }
}
