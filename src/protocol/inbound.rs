//! Inbound client commands

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::game::entity::EntityId;

/// Maximum accepted chat message length in characters
pub const MAX_CHAT_LENGTH: usize = 60;

/// Commands sent by a connected client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Enter (or re-enter after death) the game
    Hello { name: String },
    Move { x: i32, y: i32 },
    /// Announce an attack on a mob
    Attack { mob: EntityId },
    /// The player hit a mob
    Hit { mob: EntityId },
    /// A mob hit the player
    Hurt { mob: EntityId },
    /// Pick up an item
    Loot { item: EntityId },
    Open { chest: EntityId },
    /// Request spawn data for unknown ids
    Who { ids: Vec<EntityId> },
    Chat { text: String },
    /// The player reached a checkpoint
    Check { x: i32, y: i32 },
}

impl ClientMessage {
    /// Parse a client text frame
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::MalformedMessage(e.to_string()))
    }

    /// Short command name, used in logs
    pub fn name(&self) -> &'static str {
        match self {
            ClientMessage::Hello { .. } => "hello",
            ClientMessage::Move { .. } => "move",
            ClientMessage::Attack { .. } => "attack",
            ClientMessage::Hit { .. } => "hit",
            ClientMessage::Hurt { .. } => "hurt",
            ClientMessage::Loot { .. } => "loot",
            ClientMessage::Open { .. } => "open",
            ClientMessage::Who { .. } => "who",
            ClientMessage::Chat { .. } => "chat",
            ClientMessage::Check { .. } => "check",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            ClientMessage::parse(r#"{"type":"hello","name":"Ana"}"#).unwrap(),
            ClientMessage::Hello {
                name: "Ana".to_string()
            }
        );
        assert_eq!(
            ClientMessage::parse(r#"{"type":"hit","mob":12}"#).unwrap(),
            ClientMessage::Hit { mob: 12 }
        );
        assert_eq!(
            ClientMessage::parse(r#"{"type":"who","ids":[1,2]}"#).unwrap(),
            ClientMessage::Who { ids: vec![1, 2] }
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(ClientMessage::parse("not json").is_err());
        assert!(ClientMessage::parse(r#"{"type":"teleport","x":1}"#).is_err());
        assert!(ClientMessage::parse(r#"{"type":"move","x":"a","y":1}"#).is_err());
    }
}
