//! Inbound relay server - forwarding signaling frames between connections
//!
//! The relay holds no session state. Its only knowledge is the table of
//! currently-connected endpoint identifiers; every frame is forwarded
//! verbatim to the addressed connection with the sender's identifier
//! stamped on, or silently dropped when the recipient is gone.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, trace};

use crate::protocol::{ClientFrame, EndpointId, ServerFrame};

/// Capacity of each connection's outbound queue
const OUTBOUND_QUEUE: usize = 64;

/// Relay state: the live-connection table, nothing else
#[derive(Clone, Default)]
pub struct RelayState {
    conns: Arc<RwLock<HashMap<EndpointId, mpsc::Sender<String>>>>,
}

impl RelayState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of currently attached endpoints
    pub async fn connected_count(&self) -> usize {
        self.conns.read().await.len()
    }
}

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<RelayState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle a WebSocket connection
async fn handle_socket(socket: WebSocket, state: RelayState) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(OUTBOUND_QUEUE);

    // Spawn task to forward messages to this client; the single queue keeps
    // delivery order per recipient
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(Message::Text(msg)).await.is_err() {
                break;
            }
        }
    });

    let id = EndpointId::generate();
    state.conns.write().await.insert(id.clone(), tx.clone());

    info!("Endpoint connected: {}", id.short());

    // Tell the client which identifier it was assigned
    let welcome = serde_json::to_string(&ServerFrame::welcome(id.clone())).unwrap();
    if tx.send(welcome).await.is_err() {
        state.conns.write().await.remove(&id);
        return;
    }

    // Process incoming frames
    while let Some(result) = receiver.next().await {
        let msg = match result {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!("WebSocket error from {}: {}", id.short(), e);
                break;
            }
        };

        trace!("Received from {}: {}", id.short(), msg);

        let frame: ClientFrame = match serde_json::from_str(&msg) {
            Ok(frame) => frame,
            Err(e) => {
                // Not one of the three signaling shapes; drop without
                // feedback, the connection stays usable
                debug!("Undecodable frame from {}: {}", id.short(), e);
                continue;
            }
        };

        let to = frame.recipient().clone();
        let dest = state.conns.read().await.get(&to).cloned();

        match dest {
            Some(dest_tx) => {
                debug!(
                    "Forwarding {} from {} to {}",
                    frame.msg_type(),
                    id.short(),
                    to.short()
                );
                let delivery = serde_json::to_string(&frame.tagged(id.clone())).unwrap();
                if dest_tx.send(delivery).await.is_err() {
                    // Recipient went away between lookup and send
                    debug!("Recipient {} gone, frame dropped", to.short());
                }
            }
            None => {
                // Best effort: the sender cannot distinguish "offline" from
                // "busy" at this layer, so no error is surfaced
                debug!(
                    "No route for {} from {} to {}, dropped",
                    frame.msg_type(),
                    id.short(),
                    to.short()
                );
            }
        }
    }

    state.conns.write().await.remove(&id);
    info!("Endpoint disconnected: {}", id.short());
    send_task.abort();
}
