//! Error handling module
//!
//! Defines custom error types for the Rustquest server.

use std::io;

use thiserror::Error;

use crate::game::entity::{EntityId, EntityKind};

/// Main error type for the Rustquest server
#[derive(Error, Debug)]
pub enum RustquestError {
    /// Network-related errors
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// Protocol-related errors
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Game logic errors
    #[error("Game error: {0}")]
    Game(#[from] GameError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Network-specific errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Connection closed")]
    ConnectionClosed,

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("World is full")]
    WorldFull,

    #[error("World task is not running")]
    WorldUnavailable,
}

/// Protocol-specific errors
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Unexpected binary frame")]
    UnexpectedBinary,

    #[error("Message sent before hello")]
    NotInGame,
}

/// Game logic errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GameError {
    #[error("Entity not found: {0}")]
    EntityNotFound(EntityId),

    #[error("Entity {id} is {actual}, expected {expected}")]
    WrongKind {
        id: EntityId,
        expected: EntityKind,
        actual: EntityKind,
    },

    #[error("Invalid position: ({x}, {y})")]
    InvalidPosition { x: i32, y: i32 },

    #[error("Player {0} is already in the world")]
    AlreadyInWorld(EntityId),

    #[error("Player {0} is not connected")]
    NotConnected(EntityId),

    #[error("No valid position available in area")]
    NoValidPosition,
}

/// Result type alias for Rustquest operations
pub type Result<T> = std::result::Result<T, RustquestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = NetworkError::ConnectionClosed;
        assert_eq!(err.to_string(), "Connection closed");

        let err = GameError::InvalidPosition { x: -1, y: 4 };
        assert_eq!(err.to_string(), "Invalid position: (-1, 4)");

        let err = GameError::WrongKind {
            id: 7,
            expected: EntityKind::Mob,
            actual: EntityKind::Item,
        };
        assert_eq!(err.to_string(), "Entity 7 is item, expected mob");
    }

    #[test]
    fn test_game_error_wraps() {
        let err: RustquestError = GameError::EntityNotFound(12).into();
        assert_eq!(err.to_string(), "Game error: Entity not found: 12");
    }
}
