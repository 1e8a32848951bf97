//! Game module
//!
//! This module contains the authoritative simulation core:
//! - Map partitioning and zone-based interest management
//! - Entities, registry and spawn areas
//! - Aggro and combat, loot tables
//! - Outbound message batching and deferred timers
//! - The world and the task that drives it

pub mod area;
pub mod combat;
pub mod content;
pub mod entity;
pub mod loot;
pub mod map;
pub mod outbound;
pub mod registry;
pub mod scheduler;
pub mod timers;
pub mod world;
pub mod zone;
