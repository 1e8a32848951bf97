//! Protocol module
//!
//! The message catalogue exchanged with clients:
//! - `outbound` - messages emitted by the world (spawn, despawn, combat, ...)
//! - `inbound` - commands sent by clients
//!
//! Both sides are serde-tagged JSON objects. The world only ever handles the
//! typed enums; encoding happens at the transport edge.

pub mod inbound;
pub mod outbound;

pub use inbound::ClientMessage;
pub use outbound::{encode_batch, EntitySnapshot, Message};
