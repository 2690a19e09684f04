//! Realtime transport abstraction and the in-memory loopback transport

use crate::error::{MatchError, Result};
use crate::types::{ClientMessage, ServerMessage};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Something that happened on the transport
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Message(ServerMessage),
    Disconnected { reason: String },
}

/// Live subscription to transport events; hand `id` back to
/// [`Transport::unsubscribe`] to end it.
pub struct Subscription {
    pub id: u64,
    rx: mpsc::UnboundedReceiver<TransportEvent>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<TransportEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<TransportEvent> {
        self.rx.try_recv().ok()
    }
}

/// Bidirectional channel to the matchmaking server
pub trait Transport: Send + Sync {
    /// Queue a message for the server. Fire-and-forget.
    fn send(&self, message: ClientMessage) -> Result<()>;

    /// Start receiving server messages and disconnect notices.
    fn subscribe(&self) -> Result<Subscription>;

    /// Stop delivering to subscription `id`. Unknown ids are ignored.
    fn unsubscribe(&self, id: u64);

    fn is_connected(&self) -> bool;
}

/// Fan-out registry used by transport implementations
#[derive(Default)]
pub struct Subscribers {
    next_id: AtomicU64,
    senders: Mutex<HashMap<u64, mpsc::UnboundedSender<TransportEvent>>>,
}

impl Subscribers {
    pub fn add(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.lock().insert(id, tx);
        debug!(subscription = id, "transport subscription added");
        Subscription { id, rx }
    }

    pub fn remove(&self, id: u64) {
        if self.senders.lock().remove(&id).is_some() {
            debug!(subscription = id, "transport subscription removed");
        }
    }

    pub fn len(&self) -> usize {
        self.senders.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver to every live subscriber, pruning the ones whose receiver is gone.
    pub fn broadcast(&self, event: TransportEvent) {
        self.senders
            .lock()
            .retain(|_, tx| tx.send(event.clone()).is_ok());
    }
}

/// In-process transport paired with a [`LoopbackServer`].
///
/// Used by tests and the demo in place of a network connection.
#[derive(Clone)]
pub struct LoopbackTransport {
    outbound: mpsc::UnboundedSender<ClientMessage>,
    subscribers: Arc<Subscribers>,
    connected: Arc<AtomicBool>,
}

/// Server side of a [`LoopbackTransport`]
pub struct LoopbackServer {
    inbound: mpsc::UnboundedReceiver<ClientMessage>,
    subscribers: Arc<Subscribers>,
    connected: Arc<AtomicBool>,
}

impl LoopbackTransport {
    pub fn pair() -> (LoopbackTransport, LoopbackServer) {
        let (outbound, inbound) = mpsc::unbounded_channel();
        let subscribers = Arc::new(Subscribers::default());
        let connected = Arc::new(AtomicBool::new(true));

        (
            LoopbackTransport {
                outbound,
                subscribers: subscribers.clone(),
                connected: connected.clone(),
            },
            LoopbackServer {
                inbound,
                subscribers,
                connected,
            },
        )
    }
}

impl Transport for LoopbackTransport {
    fn send(&self, message: ClientMessage) -> Result<()> {
        if !self.is_connected() {
            return Err(MatchError::NotConnected);
        }
        debug!(event = message.event_name(), "emit");
        self.outbound
            .send(message)
            .map_err(|_| MatchError::Transport("loopback server dropped".to_string()))
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

impl LoopbackServer {
    /// Next message emitted by the client
    pub async fn recv(&mut self) -> Option<ClientMessage> {
        self.inbound.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ClientMessage> {
        self.inbound.try_recv().ok()
    }

    /// Deliver a server message to every subscriber
    pub fn push(&self, message: ServerMessage) {
        if !self.connected.load(Ordering::SeqCst) {
            warn!(event = message.event_name(), "push on disconnected loopback dropped");
            return;
        }
        self.subscribers.broadcast(TransportEvent::Message(message));
    }

    /// Drop the connection and tell subscribers why
    pub fn disconnect(&self, reason: impl Into<String>) {
        self.connected.store(false, Ordering::SeqCst);
        self.subscribers.broadcast(TransportEvent::Disconnected { reason: reason.into() });
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MatchRequest, MatchResult};

    fn join() -> ClientMessage {
        ClientMessage::JoinMatch(MatchRequest {
            user_id: "u1".to_string(),
            game_id: "g1".to_string(),
            entry_fee: 10,
        })
    }

    #[test]
    fn test_loopback_delivers_both_ways() {
        let (transport, mut server) = LoopbackTransport::pair();
        let mut sub = transport.subscribe().unwrap();

        transport.send(join()).unwrap();
        assert_eq!(server.try_recv(), Some(join()));

        let found = ServerMessage::MatchFound(MatchResult {
            opponent_id: "u2".to_string(),
            room_id: "r1".to_string(),
        });
        server.push(found.clone());
        assert_eq!(sub.try_recv(), Some(TransportEvent::Message(found)));
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let (transport, server) = LoopbackTransport::pair();
        let mut sub = transport.subscribe().unwrap();
        assert_eq!(server.subscriber_count(), 1);

        transport.unsubscribe(sub.id);
        assert_eq!(server.subscriber_count(), 0);

        server.push(ServerMessage::RegisterSuccess(crate::types::RegistrationAck {
            room_id: "r1".to_string(),
        }));
        assert_eq!(sub.try_recv(), None);
    }

    #[test]
    fn test_dropped_subscription_is_pruned() {
        let (transport, server) = LoopbackTransport::pair();
        drop(transport.subscribe().unwrap());
        server.disconnect("bye");
        assert_eq!(server.subscriber_count(), 0);
    }

    #[test]
    fn test_send_after_disconnect_fails() {
        let (transport, server) = LoopbackTransport::pair();
        let mut sub = transport.subscribe().unwrap();
        server.disconnect("server restart");

        assert!(matches!(transport.send(join()), Err(MatchError::NotConnected)));
        assert_eq!(
            sub.try_recv(),
            Some(TransportEvent::Disconnected {
                reason: "server restart".to_string()
            })
        );
    }
}
