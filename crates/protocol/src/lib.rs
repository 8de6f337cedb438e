//! parlor-protocol – Netzwerkprotokoll-Definitionen
//!
//! Dieses Crate definiert die Umschlaege (`{ type, payload }`), die zwischen
//! Client und Relay ueber die Echtzeit-Verbindung fliessen, die JSON-Typen des
//! Schluessel-Verzeichnisses und den Frame-Codec fuer TCP.

pub mod envelope;
pub mod error;
pub mod keys;
pub mod wire;

pub use envelope::{ClientEnvelope, ErrorCode, ServerEnvelope};
pub use error::ProtocolError;
pub use wire::{ClientCodec, FrameCodec, ServerCodec};
