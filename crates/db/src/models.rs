//! Datenbankmodelle fuer Parlor
//!
//! Diese Typen repraesentieren Datensaetze aus der Datenbank.
//! Die Schluessel-Verzeichnis-Typen kommen direkt aus `parlor-protocol`,
//! weil sie unveraendert ueber HTTP ausgeliefert werden.

use chrono::{DateTime, Utc};
use parlor_core::{ChannelId, MessageId, ReactionId, UserId};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Nachrichten
// ---------------------------------------------------------------------------

/// Gespeicherte verschluesselte Nachricht
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NachrichtRecord {
    pub id: MessageId,
    pub channel_id: ChannelId,
    pub sender_id: UserId,
    /// Anzeigename aus dem veroeffentlichten Schluessel-Buendel, falls vorhanden
    pub sender_display_name: Option<String>,
    pub ciphertext: String,
    pub reply_to_id: Option<MessageId>,
    pub created_at: DateTime<Utc>,
}

/// Daten zum Speichern einer neuen Nachricht
#[derive(Debug, Clone)]
pub struct NeueNachricht<'a> {
    pub channel_id: ChannelId,
    pub sender_id: UserId,
    pub ciphertext: &'a str,
    pub reply_to_id: Option<MessageId>,
}

/// Filter fuer das Blaettern durch den Verlauf
#[derive(Debug, Clone)]
pub struct NachrichtenFilter {
    pub channel_id: ChannelId,
    /// Nur Nachrichten vor diesem Zeitpunkt
    pub before: Option<DateTime<Utc>>,
    /// Standard: 50
    pub limit: Option<i64>,
}

// ---------------------------------------------------------------------------
// Reaktionen
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaktionRecord {
    pub id: ReactionId,
    pub message_id: MessageId,
    pub user_id: UserId,
    pub emoji: String,
    pub created_at: DateTime<Utc>,
}
