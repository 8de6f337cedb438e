//! parlor-core – Gemeinsame Typen
//!
//! Dieses Crate stellt die ID-Typen bereit, die von allen anderen
//! Parlor-Crates gemeinsam genutzt werden.

pub mod types;

pub use types::{ChannelId, ConnectionId, MessageId, ReactionId, UserId};
