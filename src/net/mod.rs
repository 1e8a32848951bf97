//! Networking module
//!
//! This module handles the edge between sockets and the world task:
//! - WebSocket handling for browser clients
//! - Channel transport delivering flushed batches to connections

pub mod handler;
pub mod transport;
