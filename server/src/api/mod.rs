//! HTTP-API des Schluessel-Verzeichnisses
//!
//! Veroeffentlicht Identitaets-Buendel, gibt sie (mit genau einem
//! Einmal-Prekey) wieder heraus und speichert die eingewickelten
//! Kanal-Schluessel. Das Relay sieht dabei nur oeffentliche Schluessel und
//! Ciphertext.

pub mod keys;
pub mod routes;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use parlor_db::{DbError, DistributionRepository, KeyBundleRepository};
use serde_json::json;

pub use routes::router;

/// Axum-State der Schluessel-API
#[derive(Clone)]
pub struct ApiState {
    pub bundles: Arc<dyn KeyBundleRepository>,
    pub verteilungen: Arc<dyn DistributionRepository>,
}

impl ApiState {
    pub fn neu(
        bundles: Arc<dyn KeyBundleRepository>,
        verteilungen: Arc<dyn DistributionRepository>,
    ) -> Self {
        Self {
            bundles,
            verteilungen,
        }
    }

    /// State ueber ein Backend, das beide Repositories implementiert
    pub fn mit_db<D>(db: Arc<D>) -> Self
    where
        D: KeyBundleRepository + DistributionRepository + 'static,
    {
        Self::neu(Arc::clone(&db) as Arc<dyn KeyBundleRepository>, db)
    }
}

/// Fehlerantwort der API
#[derive(Debug, thiserror::Error)]
pub enum ApiFehler {
    #[error("{0}")]
    NichtGefunden(String),

    #[error("Speicherfehler: {0}")]
    Speicher(#[from] DbError),
}

impl IntoResponse for ApiFehler {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiFehler::NichtGefunden(_) => StatusCode::NOT_FOUND,
            ApiFehler::Speicher(e) => {
                tracing::error!(fehler = %e, "Schluessel-API: Speicherfehler");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (
            status,
            Json(json!({ "error": { "code": status.as_u16(), "message": self.to_string() } })),
        )
            .into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiFehler>;
