//! Kanal-Nachrichten zwischen Anwendung und Relay
//!
//! Der [`ChannelMessenger`] verschluesselt ausgehende Texte mit dem
//! Kanal-Schluessel und reiht `message:send` in die Queue des
//! [`ReconnectionManager`](crate::ReconnectionManager) ein. Eingehende
//! `message:new`-Umschlaege entschluesselt er zu Klartext oder zum
//! Platzhalter.

use chrono::{DateTime, Utc};
use parlor_core::{ChannelId, MessageId, UserId};
use parlor_crypto::identity::DEFAULT_ONE_TIME_PREKEYS;
use parlor_crypto::{generate_identity, ChannelMessageCodec, KeyDirectory, KeyStore};
use parlor_protocol::envelope::{MessageNewPayload, MessageSendPayload};
use parlor_protocol::keys::PublishBundleRequest;
use parlor_protocol::ClientEnvelope;
use tokio::sync::mpsc;

use crate::error::{ClientError, ClientResult};

/// Entschluesselte Sicht auf eine `message:new`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntschluesselteNachricht {
    pub id: MessageId,
    pub channel_id: ChannelId,
    pub sender_id: UserId,
    pub sender_display_name: Option<String>,
    /// Klartext oder [`UNDECRYPTABLE_PLACEHOLDER`](parlor_crypto::UNDECRYPTABLE_PLACEHOLDER)
    pub text: String,
    pub reply_to_id: Option<MessageId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct ChannelMessenger {
    codec: ChannelMessageCodec,
    self_id: UserId,
    ausgehend: mpsc::Sender<ClientEnvelope>,
}

impl ChannelMessenger {
    pub fn neu(
        codec: ChannelMessageCodec,
        self_id: UserId,
        ausgehend: mpsc::Sender<ClientEnvelope>,
    ) -> Self {
        Self {
            codec,
            self_id,
            ausgehend,
        }
    }

    /// Verschluesselt `text` und reiht `message:send` ein
    ///
    /// `members` ist die aktuelle Mitgliederliste des Kanals; sie wird nur
    /// gebraucht, wenn der Kanal-Schluessel hier erst erzeugt wird.
    pub async fn senden(
        &self,
        channel_id: ChannelId,
        text: &str,
        members: &[UserId],
        reply_to_id: Option<MessageId>,
    ) -> ClientResult<()> {
        let ciphertext = self
            .codec
            .encrypt_channel_message(channel_id, text, members, self.self_id)
            .await?;

        self.ausgehend
            .send(ClientEnvelope::MessageSend(MessageSendPayload {
                channel_id,
                ciphertext,
                reply_to_id,
            }))
            .await
            .map_err(|_| ClientError::Getrennt)
    }

    pub async fn entschluesseln(
        &self,
        nachricht: MessageNewPayload,
        members: &[UserId],
    ) -> EntschluesselteNachricht {
        let text = self
            .codec
            .decrypt_channel_message(nachricht.channel_id, &nachricht.ciphertext, members, self.self_id)
            .await;

        EntschluesselteNachricht {
            id: nachricht.id,
            channel_id: nachricht.channel_id,
            sender_id: nachricht.sender_id,
            sender_display_name: nachricht.sender_display_name,
            text,
            reply_to_id: nachricht.reply_to_id,
            created_at: nachricht.created_at,
        }
    }
}

/// Erzeugt beim ersten Start Identitaet und Prekeys und veroeffentlicht das
/// Buendel
///
/// Gibt `true` zurueck, wenn eine neue Identitaet erzeugt wurde. Eine
/// vorhandene Identitaet wird nie ersetzt. Ist ihr Buendel noch nicht beim
/// Verzeichnis angekommen, wird es erneut veroeffentlicht.
pub async fn identitaet_sicherstellen(
    store: &dyn KeyStore,
    directory: &dyn KeyDirectory,
    user_id: UserId,
    display_name: Option<String>,
) -> ClientResult<bool> {
    let (bundle, neu) = match store.identity()? {
        Some(_) if store.identity_published()? => return Ok(false),
        Some(vorhanden) => {
            tracing::info!(%user_id, "Identitaet noch nicht veroeffentlicht, neuer Versuch");
            (vorhanden.public_bundle(), false)
        }
        None => {
            let erzeugt = generate_identity(DEFAULT_ONE_TIME_PREKEYS)?;
            store.store_identity(erzeugt.private)?;
            (erzeugt.public, true)
        }
    };

    directory
        .publish_key_bundle(
            user_id,
            PublishBundleRequest {
                display_name,
                bundle,
            },
        )
        .await?;
    store.mark_identity_published()?;

    tracing::info!(
        %user_id,
        neu,
        prekeys = DEFAULT_ONE_TIME_PREKEYS,
        "Identitaet veroeffentlicht"
    );
    Ok(neu)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use parlor_crypto::{CryptoError, CryptoResult, MemoryKeyStore};
    use parlor_protocol::keys::{DistributionRecord, KeyBundle, WrappedKeyEntry};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    /// Verzeichnis, dessen erste `fehlschlaege` Veroeffentlichungen scheitern
    #[derive(Default)]
    struct WackeligesVerzeichnis {
        fehlschlaege: AtomicUsize,
        veroeffentlicht: Mutex<Vec<PublishBundleRequest>>,
    }

    #[async_trait]
    impl KeyDirectory for WackeligesVerzeichnis {
        async fn publish_key_bundle(
            &self,
            _user_id: UserId,
            request: PublishBundleRequest,
        ) -> CryptoResult<()> {
            let offen = self.fehlschlaege.load(Ordering::SeqCst);
            if offen > 0 {
                self.fehlschlaege.store(offen - 1, Ordering::SeqCst);
                return Err(CryptoError::verzeichnis("Relay nicht erreichbar"));
            }
            self.veroeffentlicht.lock().push(request);
            Ok(())
        }

        async fn fetch_key_bundle(&self, _user_id: UserId) -> CryptoResult<KeyBundle> {
            Err(CryptoError::verzeichnis("nicht benutzt"))
        }

        async fn fetch_distributions(
            &self,
            _channel_id: ChannelId,
            _for_user: UserId,
        ) -> CryptoResult<Vec<DistributionRecord>> {
            Ok(Vec::new())
        }

        async fn submit_distribution(
            &self,
            _channel_id: ChannelId,
            _distributor: UserId,
            _distribution_id: Uuid,
            _entries: Vec<WrappedKeyEntry>,
        ) -> CryptoResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn fehlgeschlagene_veroeffentlichung_wird_nachgeholt() {
        let store = MemoryKeyStore::new();
        let directory = WackeligesVerzeichnis {
            fehlschlaege: AtomicUsize::new(1),
            ..Default::default()
        };
        let user_id = UserId::new();

        let erster = identitaet_sicherstellen(&store, &directory, user_id, Some("alice".into())).await;
        assert!(erster.is_err());
        let identitaet = store.identity().unwrap().expect("Identitaet lokal gespeichert");
        assert!(!store.identity_published().unwrap());
        assert!(directory.veroeffentlicht.lock().is_empty());

        // Zweiter Start: dieselbe Identitaet, diesmal beim Verzeichnis
        let neu = identitaet_sicherstellen(&store, &directory, user_id, Some("alice".into()))
            .await
            .unwrap();
        assert!(!neu);
        assert!(store.identity_published().unwrap());
        {
            let veroeffentlicht = directory.veroeffentlicht.lock();
            assert_eq!(veroeffentlicht.len(), 1);
            assert_eq!(veroeffentlicht[0].bundle, identitaet.public_bundle());
            assert_eq!(veroeffentlicht[0].display_name.as_deref(), Some("alice"));
        }

        // Danach passiert nichts mehr
        assert!(!identitaet_sicherstellen(&store, &directory, user_id, None).await.unwrap());
        assert_eq!(directory.veroeffentlicht.lock().len(), 1);
    }

    #[tokio::test]
    async fn erster_start_erzeugt_und_veroeffentlicht() {
        let store = MemoryKeyStore::new();
        let directory = WackeligesVerzeichnis::default();

        assert!(identitaet_sicherstellen(&store, &directory, UserId::new(), None)
            .await
            .unwrap());
        assert!(store.identity_published().unwrap());
        assert_eq!(
            directory.veroeffentlicht.lock()[0].bundle.one_time_pre_keys.len(),
            DEFAULT_ONE_TIME_PREKEYS as usize
        );
    }
}
