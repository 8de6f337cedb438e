//! Fehlertypen fuer den Client

use parlor_crypto::CryptoError;
use parlor_protocol::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport verloren oder Sende-Queue geschlossen
    #[error("Verbindung getrennt")]
    Getrennt,

    /// Alle Wiederverbindungs-Versuche erschoepft
    #[error("Offline nach {versuche} Verbindungsversuchen")]
    Offline { versuche: u32 },

    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    #[error("Server-Fehler ({code:?}): {message}")]
    Server { code: ErrorCode, message: String },

    #[error("Unerwartete Antwort: {0}")]
    UnerwarteteAntwort(String),

    #[error("Krypto-Fehler: {0}")]
    Crypto(#[from] CryptoError),
}

pub type ClientResult<T> = Result<T, ClientError>;
