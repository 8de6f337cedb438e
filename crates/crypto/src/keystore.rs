//! Lokaler Schluessel-Speicher
//!
//! Haelt alles, was ein Geraet an Schluessel-Material besitzt:
//! - die eigene Identitaet inkl. Prekeys
//! - die Kanal-Schluessel (pro Kanal genau einer, nie rotiert)
//! - zwischengespeicherte Identitaets-Schluessel anderer Benutzer (TOFU)
//!
//! [`MemoryKeyStore`] ist fluechtig, [`FileKeyStore`] schreibt jede Aenderung
//! sofort als JSON-Datei (atomar via Temp-Datei + Rename).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use parlor_core::{ChannelId, UserId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{CryptoError, CryptoResult};
use crate::identity::IdentityMaterial;
use crate::types::{ChannelKey, PublicKey};

/// Speicher fuer lokales Schluessel-Material
///
/// Alle Operationen sind synchron und kurz; Implementierungen muessen
/// zwischen Tasks geteilt werden koennen.
pub trait KeyStore: Send + Sync {
    /// Die eigene Identitaet, falls schon erzeugt
    fn identity(&self) -> CryptoResult<Option<Arc<IdentityMaterial>>>;

    /// Speichert eine neue Identitaet; sie gilt als noch nicht veroeffentlicht
    fn store_identity(&self, identity: IdentityMaterial) -> CryptoResult<Arc<IdentityMaterial>>;

    /// Ob das Buendel der gespeicherten Identitaet beim Verzeichnis angekommen ist
    fn identity_published(&self) -> CryptoResult<bool>;

    fn mark_identity_published(&self) -> CryptoResult<()>;

    fn channel_key(&self, channel_id: ChannelId) -> CryptoResult<Option<Arc<ChannelKey>>>;

    fn store_channel_key(
        &self,
        channel_id: ChannelId,
        key: ChannelKey,
    ) -> CryptoResult<Arc<ChannelKey>>;

    /// Zwischengespeicherter Identitaets-Schluessel eines anderen Benutzers
    fn peer_identity_key(&self, user_id: UserId) -> CryptoResult<Option<PublicKey>>;

    fn store_peer_identity_key(&self, user_id: UserId, key: PublicKey) -> CryptoResult<()>;
}

// ---------------------------------------------------------------------------
// Gemeinsamer Inhalt
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone)]
struct Inhalt {
    identity: Option<Arc<IdentityMaterial>>,
    identity_published: bool,
    channel_keys: HashMap<ChannelId, Arc<ChannelKey>>,
    peers: HashMap<UserId, PublicKey>,
}

/// Dateiformat des [`FileKeyStore`]
#[derive(Debug, Default, Serialize, Deserialize)]
struct Datei {
    identity: Option<IdentityMaterial>,
    #[serde(default)]
    identity_published: bool,
    #[serde(default)]
    channel_keys: HashMap<ChannelId, ChannelKey>,
    #[serde(default)]
    peers: HashMap<UserId, PublicKey>,
}

impl From<Datei> for Inhalt {
    fn from(datei: Datei) -> Self {
        Self {
            identity: datei.identity.map(Arc::new),
            identity_published: datei.identity_published,
            channel_keys: datei
                .channel_keys
                .into_iter()
                .map(|(id, key)| (id, Arc::new(key)))
                .collect(),
            peers: datei.peers,
        }
    }
}

impl Inhalt {
    fn als_datei(&self) -> Datei {
        Datei {
            identity: self.identity.as_deref().cloned(),
            identity_published: self.identity_published,
            channel_keys: self
                .channel_keys
                .iter()
                .map(|(id, key)| (*id, ChannelKey::clone(key)))
                .collect(),
            peers: self.peers.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryKeyStore
// ---------------------------------------------------------------------------

/// Fluechtiger Schluessel-Speicher (Tests, kurzlebige Clients)
#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    inhalt: RwLock<Inhalt>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyStore for MemoryKeyStore {
    fn identity(&self) -> CryptoResult<Option<Arc<IdentityMaterial>>> {
        Ok(self.inhalt.read().identity.clone())
    }

    fn store_identity(&self, identity: IdentityMaterial) -> CryptoResult<Arc<IdentityMaterial>> {
        let identity = Arc::new(identity);
        let mut inhalt = self.inhalt.write();
        inhalt.identity = Some(Arc::clone(&identity));
        inhalt.identity_published = false;
        Ok(identity)
    }

    fn identity_published(&self) -> CryptoResult<bool> {
        Ok(self.inhalt.read().identity_published)
    }

    fn mark_identity_published(&self) -> CryptoResult<()> {
        let mut inhalt = self.inhalt.write();
        if inhalt.identity.is_none() {
            return Err(CryptoError::KeineIdentitaet);
        }
        inhalt.identity_published = true;
        Ok(())
    }

    fn channel_key(&self, channel_id: ChannelId) -> CryptoResult<Option<Arc<ChannelKey>>> {
        Ok(self.inhalt.read().channel_keys.get(&channel_id).cloned())
    }

    fn store_channel_key(
        &self,
        channel_id: ChannelId,
        key: ChannelKey,
    ) -> CryptoResult<Arc<ChannelKey>> {
        let key = Arc::new(key);
        self.inhalt
            .write()
            .channel_keys
            .insert(channel_id, Arc::clone(&key));
        Ok(key)
    }

    fn peer_identity_key(&self, user_id: UserId) -> CryptoResult<Option<PublicKey>> {
        Ok(self.inhalt.read().peers.get(&user_id).copied())
    }

    fn store_peer_identity_key(&self, user_id: UserId, key: PublicKey) -> CryptoResult<()> {
        self.inhalt.write().peers.insert(user_id, key);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FileKeyStore
// ---------------------------------------------------------------------------

/// Schluessel-Speicher in einer JSON-Datei
///
/// Der Inhalt wird beim Oeffnen komplett geladen; jede Aenderung schreibt
/// die ganze Datei neu. Der Schreib-Lock wird dabei gehalten, damit zwei
/// Aenderungen sich nicht gegenseitig ueberschreiben. Der Speicher sieht
/// eine Aenderung erst, wenn die Datei geschrieben ist.
#[derive(Debug)]
pub struct FileKeyStore {
    pfad: PathBuf,
    inhalt: RwLock<Inhalt>,
}

impl FileKeyStore {
    /// Oeffnet (oder erstellt beim ersten Schreiben) den Speicher unter `pfad`
    pub fn oeffnen(pfad: impl AsRef<Path>) -> CryptoResult<Self> {
        let pfad = pfad.as_ref().to_path_buf();
        let inhalt = match std::fs::read_to_string(&pfad) {
            Ok(text) => {
                let datei: Datei = serde_json::from_str(&text)?;
                info!(pfad = %pfad.display(), kanaele = datei.channel_keys.len(), "Schluessel-Speicher geladen");
                Inhalt::from(datei)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(pfad = %pfad.display(), "Kein Schluessel-Speicher vorhanden, starte leer");
                Inhalt::default()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            pfad,
            inhalt: RwLock::new(inhalt),
        })
    }

    pub fn pfad(&self) -> &Path {
        &self.pfad
    }

    /// Wendet `aenderung` auf eine Kopie an, schreibt sie und uebernimmt sie
    /// nur bei Erfolg
    fn aendern<T>(&self, aenderung: impl FnOnce(&mut Inhalt) -> CryptoResult<T>) -> CryptoResult<T> {
        let mut inhalt = self.inhalt.write();
        let mut neu = inhalt.clone();
        let ergebnis = aenderung(&mut neu)?;
        self.schreiben(&neu)?;
        *inhalt = neu;
        Ok(ergebnis)
    }

    fn schreiben(&self, inhalt: &Inhalt) -> CryptoResult<()> {
        let json = serde_json::to_vec_pretty(&inhalt.als_datei())?;
        let tmp = self.pfad.with_extension("tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.pfad).map_err(|e| {
            CryptoError::KeyStore(format!(
                "Umbenennen nach {} fehlgeschlagen: {e}",
                self.pfad.display()
            ))
        })
    }
}

impl KeyStore for FileKeyStore {
    fn identity(&self) -> CryptoResult<Option<Arc<IdentityMaterial>>> {
        Ok(self.inhalt.read().identity.clone())
    }

    fn store_identity(&self, identity: IdentityMaterial) -> CryptoResult<Arc<IdentityMaterial>> {
        let identity = Arc::new(identity);
        self.aendern(|inhalt| {
            inhalt.identity = Some(Arc::clone(&identity));
            inhalt.identity_published = false;
            Ok(())
        })?;
        Ok(identity)
    }

    fn identity_published(&self) -> CryptoResult<bool> {
        Ok(self.inhalt.read().identity_published)
    }

    fn mark_identity_published(&self) -> CryptoResult<()> {
        self.aendern(|inhalt| {
            if inhalt.identity.is_none() {
                return Err(CryptoError::KeineIdentitaet);
            }
            inhalt.identity_published = true;
            Ok(())
        })
    }

    fn channel_key(&self, channel_id: ChannelId) -> CryptoResult<Option<Arc<ChannelKey>>> {
        Ok(self.inhalt.read().channel_keys.get(&channel_id).cloned())
    }

    fn store_channel_key(
        &self,
        channel_id: ChannelId,
        key: ChannelKey,
    ) -> CryptoResult<Arc<ChannelKey>> {
        let key = Arc::new(key);
        self.aendern(|inhalt| {
            inhalt.channel_keys.insert(channel_id, Arc::clone(&key));
            Ok(())
        })?;
        Ok(key)
    }

    fn peer_identity_key(&self, user_id: UserId) -> CryptoResult<Option<PublicKey>> {
        Ok(self.inhalt.read().peers.get(&user_id).copied())
    }

    fn store_peer_identity_key(&self, user_id: UserId, key: PublicKey) -> CryptoResult<()> {
        self.aendern(|inhalt| {
            inhalt.peers.insert(user_id, key);
            Ok(())
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
