//! Repository-Trait-Definitionen
//!
//! Das Repository-Pattern entkoppelt Relay und Schluessel-API von der
//! konkreten Datenbank. Die Traits sind objekt-sicher (`async_trait`),
//! damit der Server sie als `Arc<dyn ..>` in seine Tasks reichen kann.

use async_trait::async_trait;
use parlor_core::{ChannelId, MessageId, ReactionId, UserId};
use parlor_protocol::keys::{
    DistributionRecord, KeyBundle, OneTimePreKey, PublicKeyBundle, WrappedKeyEntry,
};
use uuid::Uuid;

use crate::error::DbResult;
use crate::models::{NachrichtRecord, NachrichtenFilter, NeueNachricht, ReaktionRecord};

/// Konfiguration fuer die Datenbankverbindung
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Verbindungs-URL (z.B. "sqlite://parlor.db")
    pub url: String,
    /// Maximale Anzahl gleichzeitiger Verbindungen im Pool
    pub max_verbindungen: u32,
    /// Ob WAL-Modus aktiviert werden soll
    pub sqlite_wal: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://parlor.db".into(),
            max_verbindungen: 5,
            sqlite_wal: true,
        }
    }
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Speichert eine Nachricht; die Reihenfolge der Inserts ist die
    /// einzige Ordnung zwischen verschiedenen Absendern
    async fn create(&self, data: NeueNachricht<'_>) -> DbResult<NachrichtRecord>;

    async fn get_by_id(&self, id: MessageId) -> DbResult<Option<NachrichtRecord>>;

    /// Verlauf eines Kanals, aelteste zuerst
    async fn get_history(&self, filter: NachrichtenFilter) -> DbResult<Vec<NachrichtRecord>>;
}

#[async_trait]
pub trait ReactionRepository: Send + Sync {
    async fn find(
        &self,
        message_id: MessageId,
        user_id: UserId,
        emoji: &str,
    ) -> DbResult<Option<ReaktionRecord>>;

    /// Fuegt eine Reaktion hinzu; ein identisches Tripel ergibt
    /// `DbError::Eindeutigkeit`, eine unbekannte Nachricht `NichtGefunden`
    async fn add(&self, message_id: MessageId, user_id: UserId, emoji: &str)
        -> DbResult<ReaktionRecord>;

    /// Entfernt eine eigene Reaktion; `None`, wenn es keine solche gibt
    async fn remove(&self, id: ReactionId, user_id: UserId) -> DbResult<Option<ReaktionRecord>>;

    async fn for_message(&self, message_id: MessageId) -> DbResult<Vec<ReaktionRecord>>;
}

#[async_trait]
pub trait KeyBundleRepository: Send + Sync {
    /// Veroeffentlicht ein Buendel; ersetzt ein frueheres samt Prekey-Vorrat
    async fn publish(
        &self,
        user_id: UserId,
        display_name: Option<&str>,
        bundle: &PublicKeyBundle,
    ) -> DbResult<()>;

    /// Laedt das Buendel und verbraucht dabei einen Einmal-Prekey
    async fn fetch_bundle(&self, user_id: UserId) -> DbResult<Option<KeyBundle>>;

    /// Waehlt und loescht atomar einen Einmal-Prekey; `None` bei leerem Vorrat
    async fn consume_one_time_prekey(&self, user_id: UserId) -> DbResult<Option<OneTimePreKey>>;

    async fn remaining_one_time_prekeys(&self, user_id: UserId) -> DbResult<i64>;

    async fn display_name(&self, user_id: UserId) -> DbResult<Option<String>>;
}

#[async_trait]
pub trait DistributionRepository: Send + Sync {
    /// Ersetzt alle Zeilen von `(channel_id, distributor)` in einer Transaktion
    async fn replace(
        &self,
        channel_id: ChannelId,
        distributor: UserId,
        distribution_id: Uuid,
        entries: &[WrappedKeyEntry],
    ) -> DbResult<()>;

    /// Alle Zeilen fuer `recipient` in `channel_id`, ueber alle Verteiler
    async fn for_recipient(
        &self,
        channel_id: ChannelId,
        recipient: UserId,
    ) -> DbResult<Vec<DistributionRecord>>;
}
