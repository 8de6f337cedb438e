//! JSON-Typen des Schluessel-Verzeichnisses
//!
//! Das Relay speichert nur oeffentliche Schluessel und eingewickelte
//! Kanal-Schluessel. Alle Schluessel-Bytes sind Base64 (Standard-Alphabet
//! mit Padding).

use chrono::{DateTime, Utc};
use parlor_core::{ChannelId, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Signierter Prekey (oeffentlicher Teil)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedPreKey {
    pub public_key: String,
    /// Ed25519-Signatur ueber die rohen Bytes von `public_key`
    pub signature: String,
}

/// Einmal-Prekey (oeffentlicher Teil)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OneTimePreKey {
    pub key_id: u32,
    pub public_key: String,
}

/// Vollstaendiges, veroeffentlichbares Schluessel-Buendel eines Benutzers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyBundle {
    /// X25519 Identitaets-Schluessel
    pub identity_public_key: String,
    /// Ed25519 Schluessel, mit dem der signierte Prekey geprueft wird
    pub identity_signing_key: String,
    pub signed_pre_key: SignedPreKey,
    pub one_time_pre_keys: Vec<OneTimePreKey>,
}

/// Antwort auf eine Buendel-Abfrage
///
/// Jede Abfrage verbraucht hoechstens einen Einmal-Prekey; ist der Vorrat
/// erschoepft, ist `one_time_pre_key` `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyBundle {
    pub identity_public_key: String,
    pub identity_signing_key: String,
    pub signed_pre_key: SignedPreKey,
    pub one_time_pre_key: Option<OneTimePreKey>,
}

/// Anfrage zum Veroeffentlichen eines Buendels
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishBundleRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub bundle: PublicKeyBundle,
}

/// Ein fuer genau einen Empfaenger eingewickelter Kanal-Schluessel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WrappedKeyEntry {
    pub recipient_user_id: UserId,
    pub wrapped_key: String,
}

/// Eine komplette Verteilungsrunde eines Verteilers fuer einen Kanal
///
/// Ersetzt alle frueheren Eintraege desselben Verteilers fuer diesen Kanal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitDistributionRequest {
    pub distribution_id: Uuid,
    pub entries: Vec<WrappedKeyEntry>,
}

/// Ein gespeicherter Verteilungs-Eintrag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionRecord {
    pub distribution_id: Uuid,
    pub channel_id: ChannelId,
    pub distributor_user_id: UserId,
    pub recipient_user_id: UserId,
    pub wrapped_key: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_bundle_ohne_einmal_prekey_ist_null() {
        let bundle = KeyBundle {
            identity_public_key: "aWQ=".into(),
            identity_signing_key: "c2lnbg==".into(),
            signed_pre_key: SignedPreKey {
                public_key: "c3Br".into(),
                signature: "c2ln".into(),
            },
            one_time_pre_key: None,
        };
        let wert = serde_json::to_value(&bundle).unwrap();
        assert!(wert["oneTimePreKey"].is_null());
        assert_eq!(wert["signedPreKey"]["publicKey"], "c3Br");
    }

    #[test]
    fn verteilung_feldnamen() {
        let anfrage = SubmitDistributionRequest {
            distribution_id: Uuid::nil(),
            entries: vec![WrappedKeyEntry {
                recipient_user_id: UserId(Uuid::nil()),
                wrapped_key: "d3JhcA==".into(),
            }],
        };
        let wert = serde_json::to_value(&anfrage).unwrap();
        assert!(wert.get("distributionId").is_some());
        assert_eq!(wert["entries"][0]["wrappedKey"], "d3JhcA==");
    }
}
