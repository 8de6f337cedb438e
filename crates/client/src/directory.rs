//! Schluessel-Verzeichnis ueber die HTTP-API des Relays

use std::time::Duration;

use async_trait::async_trait;
use parlor_core::{ChannelId, UserId};
use parlor_crypto::{CryptoError, CryptoResult, KeyDirectory};
use parlor_protocol::keys::{
    DistributionRecord, KeyBundle, PublishBundleRequest, SubmitDistributionRequest,
    WrappedKeyEntry,
};
use reqwest::StatusCode;
use uuid::Uuid;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// [`KeyDirectory`] gegen `/api/keys` und `/api/channels` des Relays
#[derive(Debug, Clone)]
pub struct HttpKeyDirectory {
    client: reqwest::Client,
    basis_url: String,
}

impl HttpKeyDirectory {
    /// `basis_url` z.B. `http://127.0.0.1:10080`
    pub fn neu(basis_url: impl Into<String>) -> CryptoResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| CryptoError::verzeichnis(format!("HTTP-Client: {e}")))?;
        Ok(Self::mit_client(client, basis_url))
    }

    pub fn mit_client(client: reqwest::Client, basis_url: impl Into<String>) -> Self {
        let basis_url = basis_url.into().trim_end_matches('/').to_string();
        Self { client, basis_url }
    }

    fn url(&self, pfad: &str) -> String {
        format!("{}{}", self.basis_url, pfad)
    }
}

fn http_fehler(aktion: &str, e: reqwest::Error) -> CryptoError {
    CryptoError::verzeichnis(format!("{aktion}: {e}"))
}

fn status_pruefen(aktion: &str, antwort: &reqwest::Response) -> CryptoResult<()> {
    let status = antwort.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(CryptoError::verzeichnis(format!("{aktion}: HTTP {status}")))
    }
}

#[async_trait]
impl KeyDirectory for HttpKeyDirectory {
    async fn publish_key_bundle(
        &self,
        user_id: UserId,
        request: PublishBundleRequest,
    ) -> CryptoResult<()> {
        let antwort = self
            .client
            .put(self.url(&format!("/api/keys/{}/bundle", user_id.inner())))
            .json(&request)
            .send()
            .await
            .map_err(|e| http_fehler("Buendel veroeffentlichen", e))?;
        status_pruefen("Buendel veroeffentlichen", &antwort)?;
        tracing::debug!(%user_id, "Buendel veroeffentlicht");
        Ok(())
    }

    async fn fetch_key_bundle(&self, user_id: UserId) -> CryptoResult<KeyBundle> {
        let antwort = self
            .client
            .get(self.url(&format!("/api/keys/{}/bundle", user_id.inner())))
            .send()
            .await
            .map_err(|e| http_fehler("Buendel laden", e))?;
        if antwort.status() == StatusCode::NOT_FOUND {
            return Err(CryptoError::verzeichnis(format!("kein Buendel fuer {user_id}")));
        }
        status_pruefen("Buendel laden", &antwort)?;
        antwort
            .json()
            .await
            .map_err(|e| http_fehler("Buendel lesen", e))
    }

    async fn fetch_distributions(
        &self,
        channel_id: ChannelId,
        for_user: UserId,
    ) -> CryptoResult<Vec<DistributionRecord>> {
        let antwort = self
            .client
            .get(self.url(&format!("/api/channels/{}/distributions", channel_id.inner())))
            .query(&[("recipient", for_user.inner().to_string())])
            .send()
            .await
            .map_err(|e| http_fehler("Verteilungen laden", e))?;
        status_pruefen("Verteilungen laden", &antwort)?;
        antwort
            .json()
            .await
            .map_err(|e| http_fehler("Verteilungen lesen", e))
    }

    async fn submit_distribution(
        &self,
        channel_id: ChannelId,
        distributor: UserId,
        distribution_id: Uuid,
        entries: Vec<WrappedKeyEntry>,
    ) -> CryptoResult<()> {
        let antwort = self
            .client
            .put(self.url(&format!(
                "/api/channels/{}/distributions/{}",
                channel_id.inner(),
                distributor.inner()
            )))
            .json(&SubmitDistributionRequest {
                distribution_id,
                entries,
            })
            .send()
            .await
            .map_err(|e| http_fehler("Verteilung senden", e))?;
        status_pruefen("Verteilung senden", &antwort)
    }
}
