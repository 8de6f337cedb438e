//! parlor-server – Bibliotheks-Root
//!
//! Verdrahtet Datenbank, TCP-Relay und Schluessel-API und stellt den
//! Einstiegspunkt fuer Integrationstests bereit.

pub mod api;
pub mod config;
pub mod directory;

use std::sync::Arc;

use anyhow::Result;
use config::ServerConfig;
use parlor_db::SqliteDb;
use parlor_signaling::{SignalingServer, SignalingState};
use tokio::net::TcpListener;
use tokio::sync::watch;

pub use directory::RepositoryDirectory;

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
}

impl Server {
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Startet alle Subsysteme und laeuft bis Ctrl-C
    ///
    /// Reihenfolge:
    /// 1. Datenbank oeffnen (inkl. Migrationen)
    /// 2. Relay- und API-Listener binden
    /// 3. Beide bedienen, bis das Shutdown-Signal kommt
    pub async fn starten(self) -> Result<()> {
        tracing::info!(
            server_name = %self.config.server.name,
            tcp = %self.config.tcp_bind_adresse(),
            api = %self.config.api_bind_adresse(),
            "Server startet"
        );

        let db = Arc::new(SqliteDb::oeffnen(&self.config.datenbank_config()).await?);
        let relay = TcpListener::bind(self.config.tcp_bind_adresse()).await?;
        let api = TcpListener::bind(self.config.api_bind_adresse()).await?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => tracing::info!("Shutdown-Signal empfangen, Server wird beendet"),
                Err(e) => tracing::error!(fehler = %e, "Ctrl-C-Handler nicht installierbar"),
            }
            let _ = shutdown_tx.send(true);
        });

        self.bedienen(db, relay, api, shutdown_rx).await
    }

    /// Bedient Relay und API auf bereits gebundenen Listenern
    ///
    /// Endet, sobald `shutdown_rx` `true` meldet und beide Dienste
    /// heruntergefahren sind.
    pub async fn bedienen(
        self,
        db: Arc<SqliteDb>,
        relay: TcpListener,
        api: TcpListener,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Result<()> {
        let relay_addr = relay.local_addr()?;
        let api_addr = api.local_addr()?;

        let state = SignalingState::mit_db(self.config.signaling_config(), Arc::clone(&db));
        let relay_server = SignalingServer::neu(state, relay_addr);
        let router = api::router(api::ApiState::mit_db(Arc::clone(&db)));

        tracing::info!(adresse = %api_addr, "Schluessel-API gestartet");

        let relay_rx = shutdown_rx.clone();
        tokio::try_join!(
            async move {
                relay_server
                    .bedienen(relay, relay_rx)
                    .await
                    .map_err(anyhow::Error::from)
            },
            async move {
                axum::serve(api, router)
                    .with_graceful_shutdown(shutdown_abwarten(shutdown_rx))
                    .await
                    .map_err(anyhow::Error::from)
            },
        )?;

        db.schliessen().await;
        tracing::info!("Server beendet");
        Ok(())
    }
}

async fn shutdown_abwarten(mut rx: watch::Receiver<bool>) {
    while !*rx.borrow() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}
