//! Hands world output to per-connection queues.

use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use realm_core::{EntityId, PacketPriority, Payload, Transport, visibility::ViewerDelta};
use scc::HashMap;

/// One message queued for a connection.
#[derive(Debug, Clone)]
pub enum Outbound {
    /// A player's per-tick visibility delta.
    Delta(ViewerDelta),
    /// A message serialized by game code.
    Payload(Payload),
}

/// A [`Transport`] backed by one bounded channel per connected player.
///
/// Low priority messages are shed once a queue is half full. Anything else is
/// dropped only when the queue is completely full. A queue whose receiver is
/// gone is disconnected.
pub struct ChannelTransport {
    connections: HashMap<EntityId, Sender<Outbound>>,
    capacity: usize,
}

impl ChannelTransport {
    /// Creates a transport whose queues hold `capacity` messages.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            connections: HashMap::new(),
            capacity: capacity.max(2),
        }
    }

    /// Opens the queue for `viewer`, replacing an existing one.
    pub fn connect(&self, viewer: EntityId) -> Receiver<Outbound> {
        let (tx, rx) = channel::bounded(self.capacity);
        self.connections.remove_sync(&viewer);
        let _ = self.connections.insert_sync(viewer, tx);
        rx
    }

    /// Closes the queue for `viewer`.
    pub fn disconnect(&self, viewer: EntityId) {
        if self.connections.remove_sync(&viewer).is_some() {
            log::debug!("Closed queue of {viewer}");
        }
    }

    /// Number of open queues.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    fn push(&self, viewer: EntityId, message: Outbound, priority: PacketPriority) {
        let shed_at = self.capacity / 2;
        let result = self.connections.read_sync(&viewer, |_, tx| {
            if priority == PacketPriority::Low && tx.len() >= shed_at {
                return Err(TrySendError::Full(()));
            }
            tx.try_send(message).map_err(|err| match err {
                TrySendError::Full(_) => TrySendError::Full(()),
                TrySendError::Disconnected(_) => TrySendError::Disconnected(()),
            })
        });

        match result {
            None | Some(Ok(())) => {}
            Some(Err(TrySendError::Full(()))) if priority == PacketPriority::Low => {
                log::trace!("Shed low priority message to congested {viewer}");
            }
            Some(Err(TrySendError::Full(()))) => {
                log::warn!("Queue of {viewer} is full, dropped a {priority:?} message");
            }
            Some(Err(TrySendError::Disconnected(()))) => self.disconnect(viewer),
        }
    }
}

impl Transport for ChannelTransport {
    fn send_delta(&self, viewer: EntityId, delta: ViewerDelta) {
        self.push(viewer, Outbound::Delta(delta), PacketPriority::High);
    }

    fn send(&self, viewer: EntityId, payload: Payload, priority: PacketPriority) {
        self.push(viewer, Outbound::Payload(payload), priority);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn payload() -> Payload {
        Arc::from(&b"ping"[..])
    }

    #[test]
    fn test_delivers_in_order() {
        let transport = ChannelTransport::new(8);
        let rx = transport.connect(EntityId(1));

        transport.send_delta(EntityId(1), ViewerDelta::default());
        transport.send(EntityId(1), payload(), PacketPriority::Normal);
        transport.send(EntityId(2), payload(), PacketPriority::High);

        let received: Vec<_> = rx.try_iter().collect();
        assert_eq!(received.len(), 2);
        assert!(matches!(received[0], Outbound::Delta(_)));
        assert!(matches!(received[1], Outbound::Payload(_)));
    }

    #[test]
    fn test_sheds_low_priority_first() {
        let transport = ChannelTransport::new(4);
        let rx = transport.connect(EntityId(1));

        for _ in 0..4 {
            transport.send(EntityId(1), payload(), PacketPriority::Low);
        }
        assert_eq!(rx.len(), 2);

        for _ in 0..4 {
            transport.send(EntityId(1), payload(), PacketPriority::High);
        }
        assert_eq!(rx.len(), 4);
    }

    #[test]
    fn test_dropped_receiver_disconnects() {
        let transport = ChannelTransport::new(4);
        drop(transport.connect(EntityId(1)));
        assert_eq!(transport.connection_count(), 1);

        transport.send(EntityId(1), payload(), PacketPriority::Normal);
        assert_eq!(transport.connection_count(), 0);
    }
}
