//! Kanal-Schluessel beschaffen und verteilen
//!
//! ## Ablauf von `ensure_channel_key`
//!
//! 1. Lokaler Speicher hat einen Schluessel -> fertig
//! 2. Verteilungs-Eintraege fuer uns beim Relay -> Verteiler-Schluessel
//!    aufloesen (Cache, sonst Buendel laden, TOFU), auswickeln, speichern
//! 3. Sonst: neuen Schluessel erzeugen, sofort speichern, an alle Mitglieder
//!    verteilen
//!
//! Fehler beim Laden der Verteilungen fuehren zu Schritt 3. Finden zwei
//! Mitglieder gleichzeitig nichts, erzeugen beide einen eigenen Schluessel;
//! beide Verteilungen bestehen nebeneinander, weil eine Runde nur die
//! Eintraege desselben Verteilers ersetzt. Das Protokoll loest diesen Fork
//! nicht auf.
//!
//! Innerhalb eines Brokers laufen Aufrufe fuer denselben Kanal nacheinander
//! (ein Mutex pro Kanal), damit ein Geraet hoechstens eine Erzeugungs- und
//! Verteilungsrunde pro Kanal startet.

use std::sync::Arc;

use dashmap::DashMap;
use parlor_core::{ChannelId, UserId};
use parlor_protocol::keys::{DistributionRecord, WrappedKeyEntry};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::directory::KeyDirectory;
use crate::engine;
use crate::error::{CryptoError, CryptoResult};
use crate::identity::IdentityMaterial;
use crate::keystore::KeyStore;
use crate::types::{ChannelKey, PublicKey};

/// Ergebnis von [`ChannelKeyBroker::ensure_channel_key`]
#[derive(Debug, Clone)]
pub struct EnsuredKey {
    pub key: Arc<ChannelKey>,
    /// `true`, wenn dieser Aufruf den Schluessel erzeugt hat
    pub is_new: bool,
}

pub struct ChannelKeyBroker {
    store: Arc<dyn KeyStore>,
    directory: Arc<dyn KeyDirectory>,
    sperren: DashMap<ChannelId, Arc<Mutex<()>>>,
}

impl ChannelKeyBroker {
    pub fn neu(store: Arc<dyn KeyStore>, directory: Arc<dyn KeyDirectory>) -> Self {
        Self {
            store,
            directory,
            sperren: DashMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn KeyStore> {
        &self.store
    }

    /// Stellt sicher, dass fuer `channel_id` ein Kanal-Schluessel vorliegt
    ///
    /// `members` ist die aktuelle Mitgliederliste des Kanals; sie wird nur
    /// gebraucht, wenn ein neuer Schluessel verteilt werden muss.
    pub async fn ensure_channel_key(
        &self,
        channel_id: ChannelId,
        members: &[UserId],
        self_id: UserId,
    ) -> CryptoResult<EnsuredKey> {
        if let Some(key) = self.store.channel_key(channel_id)? {
            return Ok(EnsuredKey { key, is_new: false });
        }

        let sperre = self.sperre(channel_id);
        let _guard = sperre.lock().await;

        // Ein paralleler Aufruf kann den Schluessel inzwischen beschafft haben
        if let Some(key) = self.store.channel_key(channel_id)? {
            return Ok(EnsuredKey { key, is_new: false });
        }

        let identity = self.identitaet()?;

        if let Some(key) = self.aus_verteilung(channel_id, self_id, &identity).await {
            let key = self.store.store_channel_key(channel_id, key)?;
            info!(%channel_id, "Kanal-Schluessel aus Verteilung uebernommen");
            return Ok(EnsuredKey { key, is_new: false });
        }

        let key = self
            .store
            .store_channel_key(channel_id, engine::generate_channel_key())?;
        info!(%channel_id, "Neuer Kanal-Schluessel erzeugt");

        if let Err(e) = self
            .distribute_channel_key(channel_id, &key, members, self_id)
            .await
        {
            warn!(%channel_id, fehler = %e, "Verteilung des neuen Kanal-Schluessels fehlgeschlagen");
        }

        Ok(EnsuredKey { key, is_new: true })
    }

    /// Wickelt `key` fuer jedes Mitglied ein und ersetzt die eigene
    /// Verteilungsrunde fuer `channel_id` beim Relay
    ///
    /// Der eigene Benutzer ist immer Empfaenger, damit weitere Geraete oder
    /// ein geleerter lokaler Speicher den Schluessel wiederfinden. Mitglieder,
    /// deren Schluessel nicht aufloesbar ist, werden ausgelassen. Gibt die
    /// Anzahl der Empfaenger zurueck.
    pub async fn distribute_channel_key(
        &self,
        channel_id: ChannelId,
        key: &ChannelKey,
        members: &[UserId],
        self_id: UserId,
    ) -> CryptoResult<usize> {
        let identity = self.identitaet()?;

        let mut empfaenger: Vec<UserId> = Vec::with_capacity(members.len() + 1);
        for user_id in std::iter::once(&self_id).chain(members) {
            if !empfaenger.contains(user_id) {
                empfaenger.push(*user_id);
            }
        }

        let mut entries = Vec::with_capacity(empfaenger.len());
        for user_id in empfaenger {
            match self
                .fuer_empfaenger_einwickeln(key, user_id, self_id, &identity)
                .await
            {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    warn!(%channel_id, empfaenger = %user_id, fehler = %e, "Empfaenger wird ausgelassen")
                }
            }
        }

        let anzahl = entries.len();
        let distribution_id = Uuid::new_v4();
        self.directory
            .submit_distribution(channel_id, self_id, distribution_id, entries)
            .await?;

        info!(%channel_id, %distribution_id, empfaenger = anzahl, "Kanal-Schluessel verteilt");
        Ok(anzahl)
    }

    // -----------------------------------------------------------------------
    // Interne Hilfsfunktionen
    // -----------------------------------------------------------------------

    fn sperre(&self, channel_id: ChannelId) -> Arc<Mutex<()>> {
        Arc::clone(
            self.sperren
                .entry(channel_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }

    fn identitaet(&self) -> CryptoResult<Arc<IdentityMaterial>> {
        self.store.identity()?.ok_or(CryptoError::KeineIdentitaet)
    }

    /// Versucht die Eintraege der Reihe nach; der erste, der sich
    /// auswickeln laesst, gewinnt
    async fn aus_verteilung(
        &self,
        channel_id: ChannelId,
        self_id: UserId,
        identity: &IdentityMaterial,
    ) -> Option<ChannelKey> {
        let records = match self.directory.fetch_distributions(channel_id, self_id).await {
            Ok(records) => records,
            Err(e) => {
                warn!(%channel_id, fehler = %e, "Verteilungen nicht abrufbar, erzeuge lokal");
                return None;
            }
        };

        for record in &records {
            match self.record_auswickeln(record, self_id, identity).await {
                Ok(key) => return Some(key),
                Err(e) => debug!(
                    %channel_id,
                    verteiler = %record.distributor_user_id,
                    fehler = %e,
                    "Verteilungs-Eintrag nicht verwendbar"
                ),
            }
        }

        if !records.is_empty() {
            warn!(%channel_id, anzahl = records.len(), "Kein Verteilungs-Eintrag liess sich auswickeln");
        }
        None
    }

    async fn record_auswickeln(
        &self,
        record: &DistributionRecord,
        self_id: UserId,
        identity: &IdentityMaterial,
    ) -> CryptoResult<ChannelKey> {
        let verteiler = self
            .identitaets_schluessel(record.distributor_user_id, self_id, identity)
            .await?;
        let wrapped = engine::blob_from_base64(&record.wrapped_key)?;
        engine::unwrap_channel_key(&wrapped, &identity.identity.private_key, &verteiler)
    }

    async fn fuer_empfaenger_einwickeln(
        &self,
        key: &ChannelKey,
        empfaenger: UserId,
        self_id: UserId,
        identity: &IdentityMaterial,
    ) -> CryptoResult<WrappedKeyEntry> {
        let public = self
            .identitaets_schluessel(empfaenger, self_id, identity)
            .await?;
        let wrapped = engine::wrap_channel_key(key, &identity.identity.private_key, &public)?;
        Ok(WrappedKeyEntry {
            recipient_user_id: empfaenger,
            wrapped_key: engine::blob_to_base64(&wrapped),
        })
    }

    /// Identitaets-Schluessel eines Benutzers: eigener, gecachter oder
    /// frisch geladener (und dann gecachter)
    async fn identitaets_schluessel(
        &self,
        user_id: UserId,
        self_id: UserId,
        identity: &IdentityMaterial,
    ) -> CryptoResult<PublicKey> {
        if user_id == self_id {
            return Ok(identity.identity.public_key);
        }
        if let Some(key) = self.store.peer_identity_key(user_id)? {
            return Ok(key);
        }

        let bundle = self.directory.fetch_key_bundle(user_id).await?;
        let key = PublicKey::from_base64(&bundle.identity_public_key)?;
        self.store.store_peer_identity_key(user_id, key)?;
        debug!(%user_id, "Identitaets-Schluessel zwischengespeichert");
        Ok(key)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::testing::MemoryDirectory;
    use crate::identity::generate_identity;
    use crate::keystore::MemoryKeyStore;
    use parlor_protocol::keys::PublishBundleRequest;
    use std::sync::atomic::Ordering;

    struct Mitglied {
        id: UserId,
        broker: Arc<ChannelKeyBroker>,
    }

    async fn mitglied(directory: &Arc<MemoryDirectory>) -> Mitglied {
        let id = UserId::new();
        let erzeugt = generate_identity(2).unwrap();
        let store = Arc::new(MemoryKeyStore::new());
        store.store_identity(erzeugt.private).unwrap();
        directory
            .publish_key_bundle(
                id,
                PublishBundleRequest {
                    display_name: None,
                    bundle: erzeugt.public,
                },
            )
            .await
            .unwrap();
        let broker = ChannelKeyBroker::neu(store, Arc::clone(directory) as Arc<dyn KeyDirectory>);
        Mitglied {
            id,
            broker: Arc::new(broker),
        }
    }

    #[tokio::test]
    async fn zweites_mitglied_uebernimmt_verteilten_schluessel() {
        let directory = Arc::new(MemoryDirectory::default());
        let a = mitglied(&directory).await;
        let b = mitglied(&directory).await;
        let kanal = ChannelId::new();
        let members = [a.id, b.id];

        let von_a = a.broker.ensure_channel_key(kanal, &members, a.id).await.unwrap();
        assert!(von_a.is_new);

        let von_b = b.broker.ensure_channel_key(kanal, &members, b.id).await.unwrap();
        assert!(!von_b.is_new);
        assert_eq!(*von_a.key, *von_b.key);

        let blob1 = engine::encrypt(b"hi", &von_a.key).unwrap();
        let blob2 = engine::encrypt(b"hi", &von_a.key).unwrap();
        assert_ne!(blob1, blob2);
        assert_eq!(engine::decrypt(&blob1, &von_b.key).unwrap(), b"hi");
        assert_eq!(engine::decrypt(&blob2, &von_b.key).unwrap(), b"hi");
    }

    #[tokio::test]
    async fn lokaler_schluessel_hat_vorrang() {
        let directory = Arc::new(MemoryDirectory::default());
        let a = mitglied(&directory).await;
        let kanal = ChannelId::new();

        let erster = a.broker.ensure_channel_key(kanal, &[a.id], a.id).await.unwrap();
        let zweiter = a.broker.ensure_channel_key(kanal, &[a.id], a.id).await.unwrap();
        assert!(erster.is_new);
        assert!(!zweiter.is_new);
        assert_eq!(*erster.key, *zweiter.key);
        assert_eq!(directory.submits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn verteilung_enthaelt_sich_selbst_einmal() {
        let directory = Arc::new(MemoryDirectory::default());
        let a = mitglied(&directory).await;
        let b = mitglied(&directory).await;
        let kanal = ChannelId::new();

        a.broker
            .ensure_channel_key(kanal, &[a.id, b.id, a.id], a.id)
            .await
            .unwrap();

        let mut empfaenger: Vec<UserId> =
            directory.records().iter().map(|r| r.recipient_user_id).collect();
        empfaenger.sort();
        let mut erwartet = vec![a.id, b.id];
        erwartet.sort();
        assert_eq!(empfaenger, erwartet);
    }

    #[tokio::test]
    async fn unerreichbares_mitglied_wird_ausgelassen() {
        let directory = Arc::new(MemoryDirectory::default());
        let a = mitglied(&directory).await;
        let b = mitglied(&directory).await;
        let unbekannt = UserId::new();
        let kanal = ChannelId::new();

        let ergebnis = a.broker.ensure_channel_key(kanal, &[a.id, b.id, unbekannt], a.id).await;
        assert!(ergebnis.unwrap().is_new);

        let records = directory.records();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.recipient_user_id != unbekannt));
    }

    #[tokio::test]
    async fn fetch_fehler_fuehrt_zu_lokaler_erzeugung() {
        let directory = Arc::new(MemoryDirectory::default());
        let a = mitglied(&directory).await;
        let b = mitglied(&directory).await;
        let kanal = ChannelId::new();
        let members = [a.id, b.id];

        let von_a = a.broker.ensure_channel_key(kanal, &members, a.id).await.unwrap();

        directory.fetch_fehlschlagen.store(true, Ordering::SeqCst);
        let von_b = b.broker.ensure_channel_key(kanal, &members, b.id).await.unwrap();

        // Bekannte Luecke: B erzeugt einen eigenen Schluessel (Fork)
        assert!(von_b.is_new);
        assert_ne!(*von_a.key, *von_b.key);
        assert_eq!(directory.submits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn parallele_aufrufe_erzeugen_nur_einen_schluessel() {
        let directory = Arc::new(MemoryDirectory::default());
        let a = mitglied(&directory).await;
        let kanal = ChannelId::new();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let broker = Arc::clone(&a.broker);
            let id = a.id;
            handles.push(tokio::spawn(async move {
                broker.ensure_channel_key(kanal, &[id], id).await.unwrap()
            }));
        }

        let mut ergebnisse = Vec::new();
        for handle in handles {
            ergebnisse.push(handle.await.unwrap());
        }

        assert_eq!(ergebnisse.iter().filter(|e| e.is_new).count(), 1);
        assert!(ergebnisse.iter().all(|e| *e.key == *ergebnisse[0].key));
        assert_eq!(directory.submits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn zweite_runde_ersetzt_erste() {
        let directory = Arc::new(MemoryDirectory::default());
        let a = mitglied(&directory).await;
        let b = mitglied(&directory).await;
        let c = mitglied(&directory).await;
        let kanal = ChannelId::new();
        let key = engine::generate_channel_key();

        a.broker
            .distribute_channel_key(kanal, &key, &[b.id, c.id], a.id)
            .await
            .unwrap();
        a.broker
            .distribute_channel_key(kanal, &key, &[b.id], a.id)
            .await
            .unwrap();

        let records = directory.records();
        assert!(records.iter().all(|r| r.recipient_user_id != c.id));
        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn ohne_identitaet_ist_fehler() {
        let directory = Arc::new(MemoryDirectory::default());
        let broker = ChannelKeyBroker::neu(
            Arc::new(MemoryKeyStore::new()),
            directory as Arc<dyn KeyDirectory>,
        );
        let id = UserId::new();
        let ergebnis = broker.ensure_channel_key(ChannelId::new(), &[id], id).await;
        assert!(matches!(ergebnis, Err(CryptoError::KeineIdentitaet)));
    }
}
