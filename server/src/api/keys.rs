//! Handler fuer Buendel und Verteilungen

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use parlor_core::{ChannelId, UserId};
use parlor_protocol::keys::{
    DistributionRecord, KeyBundle, PublishBundleRequest, SubmitDistributionRequest,
};
use serde::Deserialize;

use crate::api::{ApiFehler, ApiResult, ApiState};

/// GET /health
pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// PUT /api/keys/:user_id/bundle
///
/// Ersetzt ein frueheres Buendel samt Prekey-Vorrat.
pub async fn bundle_veroeffentlichen(
    State(state): State<ApiState>,
    Path(user_id): Path<UserId>,
    Json(anfrage): Json<PublishBundleRequest>,
) -> ApiResult<StatusCode> {
    state
        .bundles
        .publish(user_id, anfrage.display_name.as_deref(), &anfrage.bundle)
        .await?;
    tracing::info!(
        %user_id,
        prekeys = anfrage.bundle.one_time_pre_keys.len(),
        "Buendel veroeffentlicht"
    );
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/keys/:user_id/bundle
///
/// Jeder Abruf verbraucht einen Einmal-Prekey; ist der Vorrat leer, ist
/// `oneTimePreKey` null.
pub async fn bundle_abrufen(
    State(state): State<ApiState>,
    Path(user_id): Path<UserId>,
) -> ApiResult<Json<KeyBundle>> {
    let bundle = state
        .bundles
        .fetch_bundle(user_id)
        .await?
        .ok_or_else(|| ApiFehler::NichtGefunden(format!("kein Buendel fuer {user_id}")))?;

    if bundle.one_time_pre_key.is_none() {
        tracing::warn!(%user_id, "Einmal-Prekeys aufgebraucht");
    }
    Ok(Json(bundle))
}

#[derive(Debug, Deserialize)]
pub struct EmpfaengerQuery {
    pub recipient: UserId,
}

/// GET /api/channels/:channel_id/distributions?recipient=
pub async fn verteilungen_abrufen(
    State(state): State<ApiState>,
    Path(channel_id): Path<ChannelId>,
    Query(query): Query<EmpfaengerQuery>,
) -> ApiResult<Json<Vec<DistributionRecord>>> {
    let eintraege = state
        .verteilungen
        .for_recipient(channel_id, query.recipient)
        .await?;
    Ok(Json(eintraege))
}

/// PUT /api/channels/:channel_id/distributions/:distributor_id
///
/// Ersetzt die vorige Runde desselben Verteilers vollstaendig.
pub async fn verteilung_ersetzen(
    State(state): State<ApiState>,
    Path((channel_id, distributor)): Path<(ChannelId, UserId)>,
    Json(anfrage): Json<SubmitDistributionRequest>,
) -> ApiResult<StatusCode> {
    state
        .verteilungen
        .replace(
            channel_id,
            distributor,
            anfrage.distribution_id,
            &anfrage.entries,
        )
        .await?;
    tracing::info!(
        %channel_id,
        %distributor,
        empfaenger = anfrage.entries.len(),
        "Verteilung ersetzt"
    );
    Ok(StatusCode::NO_CONTENT)
}
