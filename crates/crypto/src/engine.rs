//! Krypto-Primitive fuer die Kanal-Verschluesselung
//!
//! - Schluessel-Paare: X25519
//! - Wrapping-Key: X25519-DH -> HKDF-SHA256 -> 32 Bytes
//! - AEAD: AES-256-GCM, frische Zufalls-Nonce pro Aufruf
//! - Signaturen: Ed25519
//!
//! ## Blob-Format
//!
//! ```text
//! +-----------+------------------------------+
//! | Nonce(12) | Ciphertext + Auth-Tag(16)    |
//! +-----------+------------------------------+
//! ```
//!
//! Der gleiche Aufbau wird fuer Nachrichten und fuer eingewickelte
//! Kanal-Schluessel verwendet. Auf dem Draht ist er Base64-kodiert.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};

use crate::error::{CryptoError, CryptoResult};
use crate::types::{
    ChannelKey, KeyPair, PublicKey, SecretBytes, SymmetricKey, KEY_LEN, NONCE_LEN, TAG_LEN,
};

/// Fester Salt fuer die Ableitung des Wrapping-Keys
const WRAP_SALT: &[u8] = b"parlor-key-wrap-salt-v1";

/// HKDF-Info fuer die Ableitung des Wrapping-Keys
const WRAP_INFO: &[u8] = b"parlor-channel-key-wrap-v1";

// ---------------------------------------------------------------------------
// Schluessel-Erzeugung
// ---------------------------------------------------------------------------

/// Erzeugt ein neues X25519 Schluessel-Paar aus dem OS-Zufallsgenerator
pub fn generate_key_pair() -> KeyPair {
    let secret = StaticSecret::random_from_rng(OsRng);
    let public = X25519PublicKey::from(&secret);
    KeyPair {
        private_key: SecretBytes::new(secret.to_bytes().to_vec()),
        public_key: PublicKey(public.to_bytes()),
    }
}

/// Erzeugt einen neuen zufaelligen Kanal-Schluessel
pub fn generate_channel_key() -> ChannelKey {
    SymmetricKey::random()
}

/// Erzeugt einen neuen Ed25519 Signier-Schluessel und gibt
/// (privat, oeffentlich) zurueck
pub fn generate_signing_key() -> (SecretBytes, PublicKey) {
    let signing_key = SigningKey::generate(&mut OsRng);
    let public = PublicKey(signing_key.verifying_key().to_bytes());
    (SecretBytes::new(signing_key.to_bytes().to_vec()), public)
}

// ---------------------------------------------------------------------------
// Schluessel-Ableitung
// ---------------------------------------------------------------------------

/// HKDF-basierte Key Derivation (allgemein verwendbar)
pub fn hkdf_derive(ikm: &[u8], salt: &[u8], info: &[u8], len: usize) -> CryptoResult<Vec<u8>> {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut okm = vec![0u8; len];
    hk.expand(info, &mut okm)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(okm)
}

/// Leitet den paarweisen Wrapping-Key zwischen zwei Identitaeten ab
///
/// Symmetrisch: `derive(A.priv, B.pub) == derive(B.priv, A.pub)`.
/// Ein nicht-kontributiver DH-Output (Low-Order-Punkt als Gegenstelle)
/// wird abgelehnt.
pub fn derive_wrapping_key(
    local_private: &SecretBytes,
    remote_public: &PublicKey,
) -> CryptoResult<SymmetricKey> {
    let secret = StaticSecret::from(local_private.als_schluessel()?);
    let remote = X25519PublicKey::from(remote_public.0);
    let shared = secret.diffie_hellman(&remote);

    if !shared.was_contributory() {
        return Err(CryptoError::KeyExchange(
            "Oeffentlicher Schluessel der Gegenstelle ist ungueltig".to_string(),
        ));
    }

    let okm = hkdf_derive(shared.as_bytes(), WRAP_SALT, WRAP_INFO, KEY_LEN)?;
    SymmetricKey::from_bytes(okm)
}

// ---------------------------------------------------------------------------
// AEAD
// ---------------------------------------------------------------------------

/// Verschluesselt mit AES-256-GCM; Ausgabe ist `nonce || ciphertext+tag`
pub fn encrypt(plaintext: &[u8], key: &SymmetricKey) -> CryptoResult<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|_| {
        CryptoError::UngueltigeSchluesselLaenge {
            erwartet: KEY_LEN,
            erhalten: key.as_bytes().len(),
        }
    })?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|e| CryptoError::Verschluesselung(e.to_string()))?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Entschluesselt einen `nonce || ciphertext+tag` Blob
///
/// Schlaegt mit [`CryptoError::Entschluesselung`] fehl, wenn der Blob zu
/// kurz ist oder der Auth-Tag nicht stimmt. Gibt nie Klartext zurueck, der
/// nicht verifiziert wurde.
pub fn decrypt(blob: &[u8], key: &SymmetricKey) -> CryptoResult<Vec<u8>> {
    if blob.len() < NONCE_LEN + TAG_LEN {
        return Err(CryptoError::Entschluesselung(format!(
            "Blob zu kurz: {} Bytes (Minimum: {} Bytes)",
            blob.len(),
            NONCE_LEN + TAG_LEN
        )));
    }

    let cipher = Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|_| {
        CryptoError::UngueltigeSchluesselLaenge {
            erwartet: KEY_LEN,
            erhalten: key.as_bytes().len(),
        }
    })?;

    let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LEN);
    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| CryptoError::Entschluesselung("Auth-Tag ungueltig".to_string()))
}

// ---------------------------------------------------------------------------
// Kanal-Schluessel einwickeln
// ---------------------------------------------------------------------------

/// Wickelt einen Kanal-Schluessel fuer eine Gegenstelle ein
pub fn wrap_channel_key(
    key: &ChannelKey,
    local_private: &SecretBytes,
    remote_public: &PublicKey,
) -> CryptoResult<Vec<u8>> {
    let wrapping_key = derive_wrapping_key(local_private, remote_public)?;
    encrypt(key.as_bytes(), &wrapping_key)
}

/// Wickelt einen Kanal-Schluessel aus, den `remote_public` eingewickelt hat
pub fn unwrap_channel_key(
    wrapped: &[u8],
    local_private: &SecretBytes,
    remote_public: &PublicKey,
) -> CryptoResult<ChannelKey> {
    let wrapping_key = derive_wrapping_key(local_private, remote_public)?;
    let raw = decrypt(wrapped, &wrapping_key)?;
    SymmetricKey::from_bytes(raw)
}

// ---------------------------------------------------------------------------
// Signaturen
// ---------------------------------------------------------------------------

/// Signiert Daten mit einem Ed25519 Signier-Schluessel
pub fn sign(data: &[u8], signing_private: &SecretBytes) -> CryptoResult<Vec<u8>> {
    let signing_key = SigningKey::from_bytes(&signing_private.als_schluessel()?);
    Ok(signing_key.sign(data).to_bytes().to_vec())
}

/// Verifiziert eine Ed25519-Signatur; fehlerhafte Eingaben ergeben `false`
pub fn verify(data: &[u8], signature_bytes: &[u8], verifying_key: &PublicKey) -> bool {
    let Ok(verifying_key) = VerifyingKey::from_bytes(verifying_key.as_bytes()) else {
        return false;
    };
    let Ok(sig_array) = signature_bytes.try_into() else {
        return false;
    };
    let signature = Signature::from_bytes(sig_array);
    verifying_key.verify(data, &signature).is_ok()
}

// ---------------------------------------------------------------------------
// Base64
// ---------------------------------------------------------------------------

pub fn blob_to_base64(blob: &[u8]) -> String {
    STANDARD.encode(blob)
}

pub fn blob_from_base64(text: &str) -> CryptoResult<Vec<u8>> {
    Ok(STANDARD.decode(text)?)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
