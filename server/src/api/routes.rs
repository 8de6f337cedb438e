//! Route-Definitionen der Schluessel-API (/api/...)

use axum::routing::{get, put};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::{keys, ApiState};

/// Vollstaendiger Router mit State, Tracing und CORS
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(keys::health))
        // Identitaets-Buendel
        .route(
            "/api/keys/:user_id/bundle",
            put(keys::bundle_veroeffentlichen).get(keys::bundle_abrufen),
        )
        // Kanal-Schluessel-Verteilung
        .route(
            "/api/channels/:channel_id/distributions",
            get(keys::verteilungen_abrufen),
        )
        .route(
            "/api/channels/:channel_id/distributions/:distributor_id",
            put(keys::verteilung_ersetzen),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
