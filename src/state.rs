//! Application state module
//!
//! Contains the shared state used across all server connections.

use tokio::sync::broadcast;

use crate::config::ServerConfig;
use crate::game::scheduler::WorldHandle;

/// Application state shared across all connections
pub struct AppState {
    /// Server configuration
    pub config: ServerConfig,
    /// Handle to the world task
    pub world: WorldHandle,
    /// Shutdown signal sender
    pub shutdown_tx: broadcast::Sender<()>,
}

impl AppState {
    pub fn new(config: ServerConfig, world: WorldHandle, shutdown_tx: broadcast::Sender<()>) -> Self {
        Self {
            config,
            world,
            shutdown_tx,
        }
    }
}
