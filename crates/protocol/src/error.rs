//! Fehlertypen fuer das Protokoll-Crate

use thiserror::Error;

/// Fehler beim Interpretieren eines empfangenen Frames
///
/// Der Frame selbst war vollstaendig, nur sein Inhalt ist unbrauchbar.
/// Die Verbindung bleibt deshalb nutzbar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Ungueltiger Umschlag: {0}")]
    UngueltigerUmschlag(String),
}
