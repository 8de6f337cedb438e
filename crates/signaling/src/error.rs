//! Fehlertypen fuer das Relay

use parlor_db::DbError;
use parlor_protocol::ErrorCode;
use thiserror::Error;

/// Fehlertyp fuer das Relay
///
/// Fehler aus den Handlern werden vom Dispatcher in einen `error`-Umschlag
/// an den Absender uebersetzt, siehe [`SignalingError::code`].
#[derive(Debug, Error)]
pub enum SignalingError {
    /// IO-Fehler (TCP, Socket)
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    /// Operation vor `auth`
    #[error("Nicht authentifiziert")]
    NichtAuthentifiziert,

    /// Identische Reaktion existiert bereits
    #[error("Reaktion existiert bereits")]
    DoppelteReaktion,

    /// Ressource nicht gefunden
    #[error("Nicht gefunden: {0}")]
    NichtGefunden(String),

    /// Speichern fehlgeschlagen
    #[error("Speichern fehlgeschlagen: {0}")]
    Persistenz(#[source] DbError),

    /// Interner Fehler
    #[error("Interner Fehler: {0}")]
    Intern(String),
}

impl SignalingError {
    /// Erstellt einen internen Fehler
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }

    /// Fehlercode fuer den `error`-Umschlag
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NichtAuthentifiziert => ErrorCode::AuthenticationRequired,
            Self::DoppelteReaktion => ErrorCode::DuplicateReaction,
            Self::NichtGefunden(_) => ErrorCode::NotFound,
            Self::Persistenz(_) => ErrorCode::PersistenceFailed,
            Self::Io(_) | Self::Intern(_) => ErrorCode::InternalError,
        }
    }
}

/// Result-Typ fuer das Relay
pub type SignalingResult<T> = Result<T, SignalingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fehler_codes() {
        assert_eq!(
            SignalingError::NichtAuthentifiziert.code(),
            ErrorCode::AuthenticationRequired
        );
        assert_eq!(
            SignalingError::Persistenz(DbError::intern("x")).code(),
            ErrorCode::PersistenceFailed
        );
        assert_eq!(
            SignalingError::NichtGefunden("x".into()).code(),
            ErrorCode::NotFound
        );
    }
}
