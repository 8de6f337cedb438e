//! parlor-signaling – Echtzeit-Relay
//!
//! Nimmt Client-Verbindungen an, verwaltet Kanal-Abos und verteilt
//! verschluesselte Nachrichten, Tipp-Hinweise und Reaktionen. Das Relay
//! sieht nie Klartext.
//!
//! ## Architektur
//!
//! ```text
//! TCP Listener (SignalingServer)
//!     |
//!     v
//! ClientConnection (pro Verbindung ein Task)
//!     |
//!     v
//! MessageDispatcher
//!     |
//!     +-- channel_handler   (Join, Leave, Typing)
//!     +-- message_handler   (Send -> speichern -> verteilen)
//!     +-- reaction_handler  (Add, Remove)
//!
//! EventBroadcaster – Verbindungs-Register, Abonnenten pro Kanal
//! ```

pub mod broadcast;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod server_state;
pub mod tcp;

pub use broadcast::EventBroadcaster;
pub use connection::ClientConnection;
pub use dispatcher::MessageDispatcher;
pub use error::{SignalingError, SignalingResult};
pub use server_state::{SignalingConfig, SignalingState};
pub use tcp::SignalingServer;
