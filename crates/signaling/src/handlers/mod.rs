//! Handler fuer die authentifizierten Umschlag-Typen

pub mod channel_handler;
pub mod message_handler;
pub mod reaction_handler;
