//! Outbound message pipeline
//!
//! Each connected player owns a FIFO queue of messages. Game logic pushes to
//! players, groups or group halos at any time; once per tick the incoming
//! buffers are turned into spawn messages and every non-empty queue is handed
//! to the transport as one ordered batch.

use std::collections::BTreeMap;

use tracing::{debug, error, trace};

use super::entity::{Entity, EntityId, EntityKind};
use super::map::{GroupId, SpatialPartition};
use super::registry::EntityRegistry;
use super::zone::ZoneTable;
use crate::protocol::Message;

/// Delivery edge for flushed batches
pub trait Transport {
    /// Hand one ordered batch to a player's connection
    fn deliver(&mut self, player: EntityId, batch: Vec<Message>);
}

/// Transport that keeps every delivered batch in memory
#[derive(Debug, Default)]
pub struct CollectingTransport {
    pub batches: Vec<(EntityId, Vec<Message>)>,
}

impl CollectingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every message delivered to `player`, across batches
    pub fn messages_for(&self, player: EntityId) -> Vec<Message> {
        self.batches
            .iter()
            .filter(|(id, _)| *id == player)
            .flat_map(|(_, batch)| batch.iter().cloned())
            .collect()
    }

    pub fn clear(&mut self) {
        self.batches.clear();
    }
}

impl Transport for CollectingTransport {
    fn deliver(&mut self, player: EntityId, batch: Vec<Message>) {
        self.batches.push((player, batch));
    }
}

/// Per-player outbound queues
#[derive(Debug, Default)]
pub struct Outbox {
    queues: BTreeMap<EntityId, Vec<Message>>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a queue for a newly connected player
    pub fn add_player(&mut self, player: EntityId) {
        self.queues.entry(player).or_default();
    }

    /// Drop a player's queue, discarding anything unsent
    pub fn remove_player(&mut self, player: EntityId) {
        if let Some(queue) = self.queues.remove(&player) {
            if !queue.is_empty() {
                debug!(player = player, dropped = queue.len(), "Discarded unsent messages");
            }
        }
    }

    pub fn is_connected(&self, player: EntityId) -> bool {
        self.queues.contains_key(&player)
    }

    pub fn connected_count(&self) -> usize {
        self.queues.len()
    }

    /// Pending messages for a player
    pub fn pending(&self, player: EntityId) -> &[Message] {
        self.queues
            .get(&player)
            .map(|q| q.as_slice())
            .unwrap_or(&[])
    }

    /// Append a message to a player's queue
    pub fn push_to_player(&mut self, player: EntityId, msg: Message) {
        match self.queues.get_mut(&player) {
            Some(queue) => {
                trace!(player = player, message = msg.name(), "Queued message");
                queue.push(msg);
            }
            None => error!(
                player = player,
                message = msg.name(),
                "Player has no outbound queue, message dropped"
            ),
        }
    }

    /// Send to every player whose primary group is `group`
    pub fn push_to_group(&mut self, zones: &ZoneTable, group: GroupId, msg: Message, ignored: Option<EntityId>) {
        for &player in zones.players_in(group) {
            if Some(player) != ignored {
                self.push_to_player(player, msg.clone());
            }
        }
    }

    /// Send to every player in the halo of `group`
    pub fn push_to_adjacent_groups(
        &mut self,
        zones: &ZoneTable,
        map: &dyn SpatialPartition,
        group: GroupId,
        msg: Message,
        ignored: Option<EntityId>,
    ) {
        for gid in map.adjacent_groups(group) {
            self.push_to_group(zones, gid, msg.clone(), ignored);
        }
    }

    /// Send to the groups an entity just left, then forget them
    pub fn push_to_previous_groups(&mut self, zones: &ZoneTable, entity: &mut Entity, msg: Message) {
        for gid in std::mem::take(&mut entity.recently_left_groups) {
            self.push_to_group(zones, gid, msg.clone(), None);
        }
    }

    /// Send to every connected player
    pub fn push_broadcast(&mut self, msg: Message, ignored: Option<EntityId>) {
        for (&player, queue) in self.queues.iter_mut() {
            if Some(player) != ignored {
                queue.push(msg.clone());
            }
        }
    }

    /// Announce pending arrivals to each group's players, then clear them
    pub fn flush_incoming(&mut self, zones: &mut ZoneTable, registry: &EntityRegistry) {
        for gid in zones.groups_with_incoming() {
            for id in zones.take_incoming(gid) {
                let Some(entity) = registry.get(id) else {
                    debug!(id = id, group = %gid, "Incoming entity already gone");
                    continue;
                };
                let ignored = (entity.kind() == EntityKind::Player).then_some(id);
                let msg = Message::Spawn {
                    entity: entity.snapshot(),
                };
                self.push_to_group(zones, gid, msg, ignored);
            }
        }
    }

    /// Hand every non-empty queue to the transport as one batch
    pub fn flush_queues(&mut self, transport: &mut dyn Transport) {
        for (&player, queue) in self.queues.iter_mut() {
            if queue.is_empty() {
                continue;
            }
            let batch = std::mem::take(queue);
            trace!(player = player, size = batch.len(), "Flushing outbound batch");
            transport.deliver(player, batch);
        }
    }
}
