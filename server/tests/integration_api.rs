//! Integrationstests fuer die Schluessel-API (ohne Netzwerk, via oneshot)

use std::collections::HashSet;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use parlor_core::{ChannelId, UserId};
use parlor_crypto::generate_identity;
use parlor_db::SqliteDb;
use parlor_protocol::keys::{
    DistributionRecord, KeyBundle, PublishBundleRequest, SubmitDistributionRequest,
    WrappedKeyEntry,
};
use parlor_server::api::{router, ApiState};
use serde::Serialize;
use tower::ServiceExt;
use uuid::Uuid;

async fn test_router() -> Router {
    let db = Arc::new(SqliteDb::in_memory().await.unwrap());
    router(ApiState::mit_db(db))
}

fn put_json<T: Serialize>(uri: &str, body: &T) -> Request<Body> {
    Request::builder()
        .method("PUT")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn json_body<T: serde::de::DeserializeOwned>(res: axum::response::Response) -> T {
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn veroeffentlichen(app: &Router, user: UserId, prekeys: u32) {
    let erzeugt = generate_identity(prekeys).unwrap();
    let res = app
        .clone()
        .oneshot(put_json(
            &format!("/api/keys/{}/bundle", user.inner()),
            &PublishBundleRequest {
                display_name: Some("alice".into()),
                bundle: erzeugt.public,
            },
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn health_ist_ok() {
    let app = test_router().await;
    let res = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn unbekanntes_buendel_ist_404() {
    let app = test_router().await;
    let res = app
        .oneshot(get(&format!("/api/keys/{}/bundle", Uuid::new_v4())))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: serde_json::Value = json_body(res).await;
    assert_eq!(body["error"]["code"], 404);
}

#[tokio::test]
async fn ungueltige_uuid_ist_400() {
    let app = test_router().await;
    let res = app.oneshot(get("/api/keys/kein-uuid/bundle")).await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn prekeys_werden_ueber_http_verbraucht() {
    let app = test_router().await;
    let user = UserId::new();
    veroeffentlichen(&app, user, 3).await;

    let mut gesehen = HashSet::new();
    for _ in 0..3 {
        let res = app
            .clone()
            .oneshot(get(&format!("/api/keys/{}/bundle", user.inner())))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let bundle: KeyBundle = json_body(res).await;
        let otpk = bundle.one_time_pre_key.expect("Prekey erwartet");
        assert!(gesehen.insert(otpk.key_id), "Prekey doppelt ausgegeben");
    }

    // Vorrat leer: Buendel kommt weiter, aber ohne Prekey
    let res = app
        .clone()
        .oneshot(get(&format!("/api/keys/{}/bundle", user.inner())))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = json_body(res).await;
    assert!(body["oneTimePreKey"].is_null());
    assert!(body["identityPublicKey"].is_string());
}

#[tokio::test]
async fn verteilung_ersetzen_und_abrufen() {
    let app = test_router().await;
    let kanal = ChannelId::new();
    let verteiler = UserId::new();
    let (b, c) = (UserId::new(), UserId::new());

    let runde = |empfaenger: &[UserId]| SubmitDistributionRequest {
        distribution_id: Uuid::new_v4(),
        entries: empfaenger
            .iter()
            .map(|id| WrappedKeyEntry {
                recipient_user_id: *id,
                wrapped_key: "AAAA".into(),
            })
            .collect(),
    };
    let uri = format!(
        "/api/channels/{}/distributions/{}",
        kanal.inner(),
        verteiler.inner()
    );

    let res = app.clone().oneshot(put_json(&uri, &runde(&[b, c]))).await.unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    // Zweite Runde nur noch fuer B
    let zweite = runde(&[b]);
    let res = app.clone().oneshot(put_json(&uri, &zweite)).await.unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let abrufen = |empfaenger: UserId| {
        get(&format!(
            "/api/channels/{}/distributions?recipient={}",
            kanal.inner(),
            empfaenger.inner()
        ))
    };

    let res = app.clone().oneshot(abrufen(b)).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let fuer_b: Vec<DistributionRecord> = json_body(res).await;
    assert_eq!(fuer_b.len(), 1);
    assert_eq!(fuer_b[0].distribution_id, zweite.distribution_id);
    assert_eq!(fuer_b[0].distributor_user_id, verteiler);

    let res = app.clone().oneshot(abrufen(c)).await.unwrap();
    let fuer_c: Vec<DistributionRecord> = json_body(res).await;
    assert!(fuer_c.is_empty());
}

#[tokio::test]
async fn verteilungen_ohne_empfaenger_ist_400() {
    let app = test_router().await;
    let res = app
        .oneshot(get(&format!(
            "/api/channels/{}/distributions",
            Uuid::new_v4()
        )))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}
