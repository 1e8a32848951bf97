//! Outbound messages
//!
//! Every message carries the minimal fields needed to rebuild client-side
//! state. A tick's worth of messages for one player is sent as a single JSON
//! array.

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::game::entity::{EntityId, EntityKind};

/// Client-facing description of an entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub id: EntityId,
    pub kind: EntityKind,
    /// Content kind name ("rat", "burger", ...)
    pub kind_name: String,
    pub x: i32,
    pub y: i32,
    /// Player name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Current target of a mob
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<EntityId>,
}

/// Messages emitted by the world
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// Sent to a player entering the game
    Welcome {
        id: EntityId,
        name: String,
        x: i32,
        y: i32,
        hp: i32,
    },
    /// Connected player count
    Population { world: usize, total: usize },
    /// Ids of the entities relevant to a player's group
    List { ids: Vec<EntityId> },
    /// An entity became visible
    Spawn { entity: EntitySnapshot },
    /// An entity left the world (death, pickup, disconnect)
    Despawn { id: EntityId },
    /// An entity left the viewer's area or was removed by a timer
    Destroy { id: EntityId },
    Move { id: EntityId, x: i32, y: i32 },
    Attack { attacker: EntityId, target: EntityId },
    /// Damage inflicted by the recipient
    Damage { id: EntityId, points: i32 },
    /// The recipient killed a mob of this kind
    Kill { mob_kind: String },
    /// The recipient's own health
    Health { points: i32, regen: bool },
    /// Loot dropped by a killed mob
    Drop {
        mob: EntityId,
        item: EntityId,
        kind: String,
        haters: Vec<EntityId>,
    },
    /// A dropped item is about to despawn
    Blink { id: EntityId },
    Chat { id: EntityId, text: String },
}

impl Message {
    /// Short message name, used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Message::Welcome { .. } => "welcome",
            Message::Population { .. } => "population",
            Message::List { .. } => "list",
            Message::Spawn { .. } => "spawn",
            Message::Despawn { .. } => "despawn",
            Message::Destroy { .. } => "destroy",
            Message::Move { .. } => "move",
            Message::Attack { .. } => "attack",
            Message::Damage { .. } => "damage",
            Message::Kill { .. } => "kill",
            Message::Health { .. } => "health",
            Message::Drop { .. } => "drop",
            Message::Blink { .. } => "blink",
            Message::Chat { .. } => "chat",
        }
    }
}

/// Encode an ordered batch of messages as one JSON array
pub fn encode_batch(batch: &[Message]) -> Result<String, ProtocolError> {
    serde_json::to_string(batch).map_err(|e| ProtocolError::MalformedMessage(e.to_string()))
}
