//! Rustquest World Server Library
//!
//! This library provides the authoritative simulation core of the Rustquest
//! world server along with the network edge that drives it.
//!
//! ## Modules
//!
//! - `config` - Server configuration management
//! - `error` - Error types and result definitions
//! - `game` - World simulation (zones, entities, combat, timers)
//! - `net` - WebSocket handling and batch delivery
//! - `protocol` - Inbound commands and outbound messages
//! - `state` - Shared application state

pub mod config;
pub mod error;
pub mod game;
pub mod net;
pub mod protocol;
pub mod state;

// Re-export commonly used types
pub use config::ServerConfig;
pub use error::{Result, RustquestError};
pub use game::world::World;
pub use state::AppState;

/// Server version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
