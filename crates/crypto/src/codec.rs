//! Klartext <-> Kanal-verschluesselter Blob
//!
//! Der Blob ist Base64 von `nonce(12) || ciphertext+tag` und wird unveraendert
//! als `ciphertext` im `message:send`-Umschlag verschickt.
//!
//! Entschluesseln schlaegt nie fehl: jede Stoerung (kein Schluessel, kaputtes
//! Base64, manipulierter Blob, kein UTF-8) ergibt
//! [`UNDECRYPTABLE_PLACEHOLDER`], damit die Nachricht sichtbar bleibt.

use std::sync::Arc;

use parlor_core::{ChannelId, UserId};
use tracing::debug;

use crate::broker::ChannelKeyBroker;
use crate::engine;
use crate::error::{CryptoError, CryptoResult};

/// Angezeigter Text fuer Nachrichten, die sich nicht entschluesseln lassen
pub const UNDECRYPTABLE_PLACEHOLDER: &str = "[Unable to decrypt message]";

#[derive(Clone)]
pub struct ChannelMessageCodec {
    broker: Arc<ChannelKeyBroker>,
}

impl ChannelMessageCodec {
    pub fn neu(broker: Arc<ChannelKeyBroker>) -> Self {
        Self { broker }
    }

    pub fn broker(&self) -> &Arc<ChannelKeyBroker> {
        &self.broker
    }

    /// Verschluesselt `plaintext` mit dem Kanal-Schluessel (wird bei Bedarf
    /// beschafft oder erzeugt)
    pub async fn encrypt_channel_message(
        &self,
        channel_id: ChannelId,
        plaintext: &str,
        members: &[UserId],
        self_id: UserId,
    ) -> CryptoResult<String> {
        let ensured = self
            .broker
            .ensure_channel_key(channel_id, members, self_id)
            .await?;
        let blob = engine::encrypt(plaintext.as_bytes(), &ensured.key)?;
        Ok(engine::blob_to_base64(&blob))
    }

    /// Entschluesselt einen Base64-Blob; bei jedem Fehler der Platzhalter
    pub async fn decrypt_channel_message(
        &self,
        channel_id: ChannelId,
        blob_b64: &str,
        members: &[UserId],
        self_id: UserId,
    ) -> String {
        match self.entschluesseln(channel_id, blob_b64, members, self_id).await {
            Ok(text) => text,
            Err(e) => {
                debug!(%channel_id, fehler = %e, "Nachricht nicht entschluesselbar");
                UNDECRYPTABLE_PLACEHOLDER.to_string()
            }
        }
    }

    async fn entschluesseln(
        &self,
        channel_id: ChannelId,
        blob_b64: &str,
        members: &[UserId],
        self_id: UserId,
    ) -> CryptoResult<String> {
        let ensured = self
            .broker
            .ensure_channel_key(channel_id, members, self_id)
            .await?;
        let blob = engine::blob_from_base64(blob_b64)?;
        let klartext = engine::decrypt(&blob, &ensured.key)?;
        String::from_utf8(klartext)
            .map_err(|_| CryptoError::UngueltigeDaten("Klartext ist kein UTF-8".to_string()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
