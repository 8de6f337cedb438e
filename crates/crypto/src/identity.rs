//! Identitaet und Prekeys eines Geraets
//!
//! Beim Registrieren erzeugt der Client:
//! - ein X25519 Identitaets-Schluessel-Paar (langlebig, nie rotiert)
//! - ein Ed25519 Signier-Schluessel-Paar, das zur Identitaet gehoert
//! - einen signierten Prekey (X25519), signiert mit dem Signier-Schluessel
//! - einen Vorrat an Einmal-Prekeys (Standard: 10)
//!
//! Das private Material bleibt im lokalen [`KeyStore`](crate::KeyStore),
//! das oeffentliche Buendel wird beim Relay veroeffentlicht. Der
//! Signier-Schluessel wird mitveroeffentlicht, damit jeder Empfaenger des
//! Buendels die Prekey-Signatur pruefen kann.

use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use parlor_protocol::keys::{OneTimePreKey, PublicKeyBundle, SignedPreKey};
use serde::{Deserialize, Serialize};

use crate::engine;
use crate::error::CryptoResult;
use crate::types::{KeyPair, PublicKey, SecretBytes};

/// Standard-Groesse des Einmal-Prekey-Vorrats
pub const DEFAULT_ONE_TIME_PREKEYS: u32 = 10;

/// Vollstaendiges privates Schluessel-Material eines Geraets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityMaterial {
    pub identity: KeyPair,
    pub signing_private_key: SecretBytes,
    pub signing_public_key: PublicKey,
    pub signed_pre_key: KeyPair,
    pub signed_pre_key_signature: Vec<u8>,
    /// Einmal-Prekeys nach `keyId`
    pub one_time_pre_keys: BTreeMap<u32, KeyPair>,
}

/// Ergebnis von [`generate_identity`]
#[derive(Debug, Clone)]
pub struct GeneratedIdentity {
    pub private: IdentityMaterial,
    pub public: PublicKeyBundle,
}

/// Erzeugt Identitaet, signierten Prekey und `one_time_count` Einmal-Prekeys
///
/// Die `keyId`s der Einmal-Prekeys laufen von 1 bis `one_time_count`.
pub fn generate_identity(one_time_count: u32) -> CryptoResult<GeneratedIdentity> {
    let identity = engine::generate_key_pair();
    let (signing_private_key, signing_public_key) = engine::generate_signing_key();

    let signed_pre_key = engine::generate_key_pair();
    let signed_pre_key_signature =
        engine::sign(signed_pre_key.public_key.as_bytes(), &signing_private_key)?;

    let one_time_pre_keys = (1..=one_time_count)
        .map(|key_id| (key_id, engine::generate_key_pair()))
        .collect();

    let private = IdentityMaterial {
        identity,
        signing_private_key,
        signing_public_key,
        signed_pre_key,
        signed_pre_key_signature,
        one_time_pre_keys,
    };
    let public = private.public_bundle();

    Ok(GeneratedIdentity { private, public })
}

impl IdentityMaterial {
    /// Baut das veroeffentlichbare Buendel aus dem privaten Material
    pub fn public_bundle(&self) -> PublicKeyBundle {
        PublicKeyBundle {
            identity_public_key: self.identity.public_key.to_base64(),
            identity_signing_key: self.signing_public_key.to_base64(),
            signed_pre_key: SignedPreKey {
                public_key: self.signed_pre_key.public_key.to_base64(),
                signature: STANDARD.encode(&self.signed_pre_key_signature),
            },
            one_time_pre_keys: self
                .one_time_pre_keys
                .iter()
                .map(|(key_id, pair)| OneTimePreKey {
                    key_id: *key_id,
                    public_key: pair.public_key.to_base64(),
                })
                .collect(),
        }
    }
}

/// Prueft die Signatur eines signierten Prekeys gegen den veroeffentlichten
/// Signier-Schluessel
///
/// Ungueltiges Base64 oder falsche Laengen ergeben `false`.
pub fn verify_signed_prekey(identity_signing_key: &str, signed_pre_key: &SignedPreKey) -> bool {
    let Ok(signing_key) = PublicKey::from_base64(identity_signing_key) else {
        return false;
    };
    let Ok(pre_key) = PublicKey::from_base64(&signed_pre_key.public_key) else {
        return false;
    };
    let Ok(signature) = STANDARD.decode(&signed_pre_key.signature) else {
        return false;
    };
    engine::verify(pre_key.as_bytes(), &signature, &signing_key)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
