//! Schnittstelle zum Schluessel-Verzeichnis des Relays
//!
//! Der [`ChannelKeyBroker`](crate::ChannelKeyBroker) spricht nur ueber dieses
//! Trait mit dem Relay. Der Client nutzt eine HTTP-Implementierung, der
//! Server und die Tests eine direkte Anbindung an die Repositories.

use async_trait::async_trait;
use parlor_core::{ChannelId, UserId};
use parlor_protocol::keys::{DistributionRecord, KeyBundle, PublishBundleRequest, WrappedKeyEntry};
use uuid::Uuid;

use crate::error::CryptoResult;

#[async_trait]
pub trait KeyDirectory: Send + Sync {
    /// Veroeffentlicht (oder ersetzt) das Buendel eines Benutzers
    async fn publish_key_bundle(
        &self,
        user_id: UserId,
        request: PublishBundleRequest,
    ) -> CryptoResult<()>;

    /// Laedt das Buendel eines Benutzers und verbraucht dabei einen
    /// Einmal-Prekey
    async fn fetch_key_bundle(&self, user_id: UserId) -> CryptoResult<KeyBundle>;

    /// Alle Verteilungs-Eintraege fuer `for_user` in `channel_id`,
    /// ueber alle Verteiler hinweg
    async fn fetch_distributions(
        &self,
        channel_id: ChannelId,
        for_user: UserId,
    ) -> CryptoResult<Vec<DistributionRecord>>;

    /// Ersetzt alle Eintraege von `distributor` fuer `channel_id` durch `entries`
    async fn submit_distribution(
        &self,
        channel_id: ChannelId,
        distributor: UserId,
        distribution_id: Uuid,
        entries: Vec<WrappedKeyEntry>,
    ) -> CryptoResult<()>;
}

// ---------------------------------------------------------------------------
// Test-Verzeichnis
// ---------------------------------------------------------------------------
