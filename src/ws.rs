//! WebSocket transport (native only)
//!
//! Frames are JSON text: `{"event": "<name>", "data": {...}}`.

use crate::error::{MatchError, Result};
use crate::rt;
use crate::transport::{Subscribers, Subscription, Transport, TransportEvent};
use crate::types::{ClientMessage, ServerMessage};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// Transport over a single WebSocket connection
pub struct WsTransport {
    url: String,
    outbound: mpsc::UnboundedSender<ClientMessage>,
    subscribers: Arc<Subscribers>,
    connected: Arc<AtomicBool>,
}

impl WsTransport {
    /// Open the connection and start the reader and writer tasks
    pub async fn connect(url: &str) -> Result<Self> {
        let (stream, _response) = connect_async(url)
            .await
            .map_err(|e| MatchError::Transport(e.to_string()))?;
        let (mut sink, mut source) = stream.split();

        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<ClientMessage>();
        let subscribers = Arc::new(Subscribers::default());
        let connected = Arc::new(AtomicBool::new(true));

        rt::spawn("ws-writer", async move {
            while let Some(message) = outbound_rx.recv().await {
                let text = match serde_json::to_string(&message) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("Failed to encode {}: {}", message.event_name(), e);
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(text)).await {
                    warn!("WebSocket write failed: {}", e);
                    break;
                }
            }
            let _ = sink.close().await;
        });

        {
            let subscribers = subscribers.clone();
            let connected = connected.clone();

            rt::spawn("ws-reader", async move {
                let reason = loop {
                    match source.next().await {
                        Some(Ok(Message::Text(text))) => match decode_frame(&text) {
                            Some(message) => {
                                subscribers.broadcast(TransportEvent::Message(message))
                            }
                            None => debug!("Ignoring unrecognised frame: {}", text),
                        },
                        Some(Ok(Message::Close(frame))) => {
                            break frame
                                .map(|f| f.reason.to_string())
                                .filter(|r| !r.is_empty())
                                .unwrap_or_else(|| "closed by server".to_string());
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => break e.to_string(),
                        None => break "connection ended".to_string(),
                    }
                };

                connected.store(false, Ordering::SeqCst);
                warn!("WebSocket disconnected: {}", reason);
                subscribers.broadcast(TransportEvent::Disconnected { reason });
            });
        }

        info!("Connected to {}", url);
        Ok(Self {
            url: url.to_string(),
            outbound,
            subscribers,
            connected,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Parse one server frame; anything that is not a known event yields `None`.
pub fn decode_frame(text: &str) -> Option<ServerMessage> {
    serde_json::from_str(text).ok()
}

impl Transport for WsTransport {
    fn send(&self, message: ClientMessage) -> Result<()> {
        if !self.is_connected() {
            return Err(MatchError::NotConnected);
        }
        self.outbound
            .send(message)
            .map_err(|_| MatchError::Transport("writer task stopped".to_string()))
    }

    fn subscribe(&self) -> Result<Subscription> {
        if !self.is_connected() {
            return Err(MatchError::NotConnected);
        }
        Ok(self.subscribers.add())
    }

    fn unsubscribe(&self, id: u64) {
        self.subscribers.remove(id);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
