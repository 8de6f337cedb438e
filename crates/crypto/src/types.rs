//! Gemeinsame Typen fuer das Kryptografie-Subsystem

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{CryptoError, CryptoResult};

/// Laenge aller Schluessel in Bytes (X25519, Ed25519, AES-256)
pub const KEY_LEN: usize = 32;

/// Laenge der AES-GCM Nonce in Bytes
pub const NONCE_LEN: usize = 12;

/// Laenge des AES-GCM Auth-Tags in Bytes
pub const TAG_LEN: usize = 16;

// ---------------------------------------------------------------------------
// SecretBytes
// ---------------------------------------------------------------------------

/// Sicherer Schluessel-Container (wird beim Drop genullt)
///
/// Serialisiert als Base64-String, damit der Datei-Speicher ihn ablegen kann.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretBytes(Vec<u8>);

impl Drop for SecretBytes {
    fn drop(&mut self) {
        self.0.iter_mut().for_each(|b| *b = 0);
    }
}

impl std::fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretBytes([REDACTED] {} bytes)", self.0.len())
    }
}

impl SecretBytes {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Gibt die Bytes als festes 32-Byte-Array zurueck
    pub fn als_schluessel(&self) -> CryptoResult<[u8; KEY_LEN]> {
        self.0
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::UngueltigeSchluesselLaenge {
                erwartet: KEY_LEN,
                erhalten: self.0.len(),
            })
    }
}

impl Serialize for SecretBytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for SecretBytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD
            .decode(text)
            .map(Self)
            .map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// PublicKey
// ---------------------------------------------------------------------------

/// Oeffentlicher Schluessel (32 Bytes, X25519 oder Ed25519)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey(pub [u8; KEY_LEN]);

impl PublicKey {
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    /// Parst einen Base64-kodierten Schluessel vom Draht
    pub fn from_base64(text: &str) -> CryptoResult<Self> {
        let bytes = STANDARD.decode(text)?;
        let arr: [u8; KEY_LEN] =
            bytes
                .as_slice()
                .try_into()
                .map_err(|_| CryptoError::UngueltigeSchluesselLaenge {
                    erwartet: KEY_LEN,
                    erhalten: bytes.len(),
                })?;
        Ok(Self(arr))
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::from_base64(&text).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// KeyPair
// ---------------------------------------------------------------------------

/// X25519 Schluessel-Paar (oeffentlich + privat)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyPair {
    pub private_key: SecretBytes,
    pub public_key: PublicKey,
}

// ---------------------------------------------------------------------------
// SymmetricKey
// ---------------------------------------------------------------------------

/// 256-Bit AEAD-Schluessel (AES-256-GCM)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymmetricKey(SecretBytes);

/// Der gemeinsame Schluessel eines Kanals. Wird nie unverpackt uebertragen.
pub type ChannelKey = SymmetricKey;

impl SymmetricKey {
    /// Erzeugt einen neuen zufaelligen Schluessel
    pub fn random() -> Self {
        let mut key_bytes = vec![0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key_bytes);
        Self(SecretBytes::new(key_bytes))
    }

    /// Uebernimmt rohe Schluessel-Bytes (muessen genau 32 Bytes sein)
    pub fn from_bytes(bytes: Vec<u8>) -> CryptoResult<Self> {
        if bytes.len() != KEY_LEN {
            return Err(CryptoError::UngueltigeSchluesselLaenge {
                erwartet: KEY_LEN,
                erhalten: bytes.len(),
            });
        }
        Ok(Self(SecretBytes::new(bytes)))
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}
