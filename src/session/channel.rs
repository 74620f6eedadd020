//! WebSocket-backed signaling channel
//!
//! Bridges the manager's frame queues to a relay connection. The channel is
//! an explicit, owned handle; nothing here is process-global, so one
//! process can hold any number of independent channels.

use beckon_relay::{ClientFrame, ServerFrame};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, warn};

use super::error::SessionError;

const CHANNEL_CAPACITY: usize = 100;

/// The two halves a [`super::SessionManager`] is built from
pub struct SignalChannel {
    pub outbound: mpsc::Sender<ClientFrame>,
    pub inbound: mpsc::Receiver<ServerFrame>,
}

impl SignalChannel {
    /// Connect to a relay and run the bridge task until either side closes
    pub async fn connect(url: &str) -> Result<Self, SessionError> {
        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| SessionError::Channel(e.to_string()))?;
        let (mut write, mut read) = ws_stream.split();

        let (outbound_tx, mut outbound_rx) = mpsc::channel::<ClientFrame>(CHANNEL_CAPACITY);
        let (inbound_tx, inbound_rx) = mpsc::channel::<ServerFrame>(CHANNEL_CAPACITY);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(frame) = outbound_rx.recv() => {
                        let json = serde_json::to_string(&frame).unwrap();
                        if write.send(Message::Text(json)).await.is_err() {
                            warn!("Relay connection lost while sending");
                            break;
                        }
                    }
                    msg = read.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                match serde_json::from_str::<ServerFrame>(&text) {
                                    Ok(frame) => {
                                        if inbound_tx.send(frame).await.is_err() {
                                            break;
                                        }
                                    }
                                    Err(e) => debug!("Undecodable frame from relay: {}", e),
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                warn!("Relay connection closed");
                                break;
                            }
                            Some(Err(e)) => {
                                error!("WebSocket error: {}", e);
                                break;
                            }
                            Some(Ok(_)) => {}
                        }
                    }
                    else => break,
                }
            }
            // Dropping inbound_tx signals the manager that the channel is
            // gone
        });

        Ok(Self {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}
