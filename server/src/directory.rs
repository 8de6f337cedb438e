//! Schluessel-Verzeichnis direkt ueber die Repositories
//!
//! Gleiche Semantik wie die HTTP-API, aber ohne Netzwerk. Fuer eingebettete
//! Clients im selben Prozess und fuer Tests.

use std::sync::Arc;

use async_trait::async_trait;
use parlor_core::{ChannelId, UserId};
use parlor_crypto::{CryptoError, CryptoResult, KeyDirectory};
use parlor_db::{DbError, DistributionRepository, KeyBundleRepository};
use parlor_protocol::keys::{
    DistributionRecord, KeyBundle, PublishBundleRequest, WrappedKeyEntry,
};
use uuid::Uuid;

#[derive(Clone)]
pub struct RepositoryDirectory {
    bundles: Arc<dyn KeyBundleRepository>,
    verteilungen: Arc<dyn DistributionRepository>,
}

impl RepositoryDirectory {
    pub fn neu(
        bundles: Arc<dyn KeyBundleRepository>,
        verteilungen: Arc<dyn DistributionRepository>,
    ) -> Self {
        Self {
            bundles,
            verteilungen,
        }
    }

    pub fn mit_db<D>(db: Arc<D>) -> Self
    where
        D: KeyBundleRepository + DistributionRepository + 'static,
    {
        Self::neu(Arc::clone(&db) as Arc<dyn KeyBundleRepository>, db)
    }
}

fn speicher_fehler(e: DbError) -> CryptoError {
    CryptoError::verzeichnis(e.to_string())
}

#[async_trait]
impl KeyDirectory for RepositoryDirectory {
    async fn publish_key_bundle(
        &self,
        user_id: UserId,
        request: PublishBundleRequest,
    ) -> CryptoResult<()> {
        self.bundles
            .publish(user_id, request.display_name.as_deref(), &request.bundle)
            .await
            .map_err(speicher_fehler)
    }

    async fn fetch_key_bundle(&self, user_id: UserId) -> CryptoResult<KeyBundle> {
        self.bundles
            .fetch_bundle(user_id)
            .await
            .map_err(speicher_fehler)?
            .ok_or_else(|| CryptoError::verzeichnis(format!("kein Buendel fuer {user_id}")))
    }

    async fn fetch_distributions(
        &self,
        channel_id: ChannelId,
        for_user: UserId,
    ) -> CryptoResult<Vec<DistributionRecord>> {
        self.verteilungen
            .for_recipient(channel_id, for_user)
            .await
            .map_err(speicher_fehler)
    }

    async fn submit_distribution(
        &self,
        channel_id: ChannelId,
        distributor: UserId,
        distribution_id: Uuid,
        entries: Vec<WrappedKeyEntry>,
    ) -> CryptoResult<()> {
        self.verteilungen
            .replace(channel_id, distributor, distribution_id, &entries)
            .await
            .map_err(speicher_fehler)
    }
}
