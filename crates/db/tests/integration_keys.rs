//! Integration-Tests fuer Schluessel-Verzeichnis und Verteilungen

use std::collections::HashSet;

use parlor_core::{ChannelId, UserId};
use parlor_db::{DatabaseConfig, DistributionRepository, KeyBundleRepository, SqliteDb};
use parlor_protocol::keys::{OneTimePreKey, PublicKeyBundle, SignedPreKey, WrappedKeyEntry};
use uuid::Uuid;

async fn db() -> SqliteDb {
    SqliteDb::in_memory()
        .await
        .expect("In-Memory DB konnte nicht erstellt werden")
}

fn buendel(prekeys: u32) -> PublicKeyBundle {
    PublicKeyBundle {
        identity_public_key: "aWRlbnRpdHk=".into(),
        identity_signing_key: "c2lnbmluZw==".into(),
        signed_pre_key: SignedPreKey {
            public_key: "c3Br".into(),
            signature: "c2ln".into(),
        },
        one_time_pre_keys: (1..=prekeys)
            .map(|key_id| OneTimePreKey {
                key_id,
                public_key: format!("otpk-{key_id}"),
            })
            .collect(),
    }
}

fn eintrag(empfaenger: UserId, key: &str) -> WrappedKeyEntry {
    WrappedKeyEntry {
        recipient_user_id: empfaenger,
        wrapped_key: key.into(),
    }
}

// ---------------------------------------------------------------------------
// Buendel
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unbekannter_benutzer_hat_kein_buendel() {
    let db = db().await;
    let ergebnis = KeyBundleRepository::fetch_bundle(&db, UserId::new()).await.unwrap();
    assert!(ergebnis.is_none());
}

#[tokio::test]
async fn prekeys_werden_genau_einmal_ausgegeben() {
    let db = db().await;
    let user = UserId::new();
    KeyBundleRepository::publish(&db, user, Some("alice"), &buendel(3))
        .await
        .unwrap();

    let mut gesehen = HashSet::new();
    for _ in 0..3 {
        let b = KeyBundleRepository::fetch_bundle(&db, user)
            .await
            .unwrap()
            .expect("Buendel sollte existieren");
        let otpk = b.one_time_pre_key.expect("Prekey sollte vorhanden sein");
        assert!(gesehen.insert(otpk.key_id), "Prekey {} doppelt", otpk.key_id);
        assert_eq!(b.identity_public_key, "aWRlbnRpdHk=");
    }

    // Vorrat erschoepft: Buendel weiterhin, aber ohne Prekey
    let b = KeyBundleRepository::fetch_bundle(&db, user).await.unwrap().unwrap();
    assert!(b.one_time_pre_key.is_none());
    assert_eq!(b.signed_pre_key.signature, "c2ln");
    assert_eq!(
        KeyBundleRepository::remaining_one_time_prekeys(&db, user).await.unwrap(),
        0
    );
}

#[tokio::test]
async fn neu_veroeffentlichen_ersetzt_vorrat() {
    let db = db().await;
    let user = UserId::new();
    KeyBundleRepository::publish(&db, user, Some("alt"), &buendel(5))
        .await
        .unwrap();
    KeyBundleRepository::consume_one_time_prekey(&db, user).await.unwrap();

    KeyBundleRepository::publish(&db, user, Some("neu"), &buendel(2))
        .await
        .unwrap();
    assert_eq!(
        KeyBundleRepository::remaining_one_time_prekeys(&db, user).await.unwrap(),
        2
    );
    assert_eq!(
        KeyBundleRepository::display_name(&db, user).await.unwrap().as_deref(),
        Some("neu")
    );
}

#[tokio::test]
async fn gleichzeitige_abfragen_teilen_keinen_prekey() {
    let dir = tempfile::tempdir().unwrap();
    let config = DatabaseConfig {
        url: format!("sqlite://{}", dir.path().join("keys.db").display()),
        max_verbindungen: 4,
        sqlite_wal: true,
    };
    let db = SqliteDb::oeffnen(&config).await.unwrap();
    let user = UserId::new();
    KeyBundleRepository::publish(&db, user, None, &buendel(10))
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let db = db.clone();
        tasks.push(tokio::spawn(async move {
            KeyBundleRepository::consume_one_time_prekey(&db, user)
                .await
                .unwrap()
        }));
    }

    let mut ids = Vec::new();
    for task in tasks {
        if let Some(otpk) = task.await.unwrap() {
            ids.push(otpk.key_id);
        }
    }

    let eindeutig: HashSet<u32> = ids.iter().copied().collect();
    assert_eq!(ids.len(), 10);
    assert_eq!(eindeutig.len(), 10);
}

// ---------------------------------------------------------------------------
// Verteilungen
// ---------------------------------------------------------------------------

#[tokio::test]
async fn verteilung_fuer_empfaenger() {
    let db = db().await;
    let kanal = ChannelId::new();
    let (a, b) = (UserId::new(), UserId::new());

    DistributionRepository::replace(
        &db,
        kanal,
        a,
        Uuid::new_v4(),
        &[eintrag(a, "fuer-a"), eintrag(b, "fuer-b")],
    )
    .await
    .unwrap();

    let fuer_b = DistributionRepository::for_recipient(&db, kanal, b).await.unwrap();
    assert_eq!(fuer_b.len(), 1);
    assert_eq!(fuer_b[0].wrapped_key, "fuer-b");
    assert_eq!(fuer_b[0].distributor_user_id, a);

    let anderer_kanal = DistributionRepository::for_recipient(&db, ChannelId::new(), b)
        .await
        .unwrap();
    assert!(anderer_kanal.is_empty());
}

#[tokio::test]
async fn neue_runde_ersetzt_alte_vollstaendig() {
    let db = db().await;
    let kanal = ChannelId::new();
    let (a, b, x) = (UserId::new(), UserId::new(), UserId::new());

    let erste = Uuid::new_v4();
    DistributionRepository::replace(
        &db,
        kanal,
        a,
        erste,
        &[eintrag(a, "a1"), eintrag(b, "b1"), eintrag(x, "x1")],
    )
    .await
    .unwrap();

    let zweite = Uuid::new_v4();
    DistributionRepository::replace(&db, kanal, a, zweite, &[eintrag(a, "a2"), eintrag(b, "b2")])
        .await
        .unwrap();

    // X war nur in der ersten Runde
    assert!(DistributionRepository::for_recipient(&db, kanal, x)
        .await
        .unwrap()
        .is_empty());

    let fuer_b = DistributionRepository::for_recipient(&db, kanal, b).await.unwrap();
    assert_eq!(fuer_b.len(), 1);
    assert_eq!(fuer_b[0].wrapped_key, "b2");
    assert_eq!(fuer_b[0].distribution_id, zweite);
}

#[tokio::test]
async fn runden_verschiedener_verteiler_bleiben_getrennt() {
    let db = db().await;
    let kanal = ChannelId::new();
    let (a, b, c) = (UserId::new(), UserId::new(), UserId::new());

    DistributionRepository::replace(&db, kanal, a, Uuid::new_v4(), &[eintrag(c, "von-a")])
        .await
        .unwrap();
    DistributionRepository::replace(&db, kanal, b, Uuid::new_v4(), &[eintrag(c, "von-b")])
        .await
        .unwrap();

    let fuer_c = DistributionRepository::for_recipient(&db, kanal, c).await.unwrap();
    let mut keys: Vec<&str> = fuer_c.iter().map(|r| r.wrapped_key.as_str()).collect();
    keys.sort_unstable();
    assert_eq!(keys, ["von-a", "von-b"]);
}
