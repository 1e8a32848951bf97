//! Channel transport
//!
//! Bridges the world task and the connection tasks. Each connection registers
//! an unbounded sender; flushed batches are forwarded to it without waiting
//! for delivery.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::game::entity::EntityId;
use crate::game::outbound::Transport;
use crate::protocol::Message;

/// Sender half used by a connection to receive its batches
pub type BatchSender = mpsc::UnboundedSender<Vec<Message>>;

/// Transport forwarding batches to per-connection channels
#[derive(Debug, Default)]
pub struct ChannelTransport {
    senders: HashMap<EntityId, BatchSender>,
}

impl ChannelTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the writer of a connection
    pub fn attach(&mut self, player: EntityId, sender: BatchSender) {
        self.senders.insert(player, sender);
    }

    /// Forget the writer of a connection
    pub fn detach(&mut self, player: EntityId) {
        self.senders.remove(&player);
    }

    pub fn len(&self) -> usize {
        self.senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }
}

impl Transport for ChannelTransport {
    fn deliver(&mut self, player: EntityId, batch: Vec<Message>) {
        let Some(sender) = self.senders.get(&player) else {
            debug!(player = player, size = batch.len(), "No writer for player, batch dropped");
            return;
        };
        let size = batch.len();
        if sender.send(batch).is_err() {
            debug!(player = player, "Connection writer is gone, batch dropped");
            self.senders.remove(&player);
        } else {
            trace!(player = player, size = size, "Batch handed to connection");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deliver_to_attached_writer() {
        let mut transport = ChannelTransport::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        transport.attach(3, tx);

        transport.deliver(3, vec![Message::Despawn { id: 1 }]);
        transport.deliver(4, vec![Message::Despawn { id: 2 }]);

        assert_eq!(rx.try_recv().unwrap(), vec![Message::Despawn { id: 1 }]);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_closed_writer_is_detached() {
        let mut transport = ChannelTransport::new();
        let (tx, rx) = mpsc::unbounded_channel();
        transport.attach(1, tx);
        drop(rx);

        transport.deliver(1, vec![Message::Blink { id: 5 }]);
        assert!(transport.is_empty());
    }
}
