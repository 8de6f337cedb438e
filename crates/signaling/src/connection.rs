//! Client-Connection – Verwaltet eine einzelne Verbindung
//!
//! Jede Verbindung bekommt eine `ClientConnection` in einem eigenen
//! tokio-Task.
//!
//! ## Zustaende
//! ```text
//! Unauthentifiziert --auth--> Authentifiziert --join/leave--> Authentifiziert
//!         |                          |
//!         +------- Trennung ---------+--> Geschlossen
//! ```
//!
//! ## Keepalive und Timeout
//! Alle `keepalive_sek` sendet das Relay einen `ping`; der Client antwortet
//! mit `pong`. Hat der Client `verbindungs_timeout_sek` lang nichts gesendet,
//! wird die Verbindung getrennt. Jeder Umschlag zaehlt als Lebenszeichen,
//! auch der `pong` eines reinen Lesers.

use futures_util::{SinkExt, StreamExt};
use parlor_core::ConnectionId;
use parlor_protocol::{ErrorCode, ServerCodec, ServerEnvelope};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::Instant;
use tokio_util::codec::Framed;

use crate::dispatcher::{DispatcherContext, MessageDispatcher};
use crate::server_state::SignalingState;

/// Verarbeitet eine einzelne Verbindung
///
/// Liest Frames via `ServerCodec`, dispatcht an den `MessageDispatcher` und
/// schreibt direkte Antworten sowie verteilte Umschlaege zurueck.
pub struct ClientConnection {
    state: Arc<SignalingState>,
    peer_addr: SocketAddr,
    connection_id: ConnectionId,
}

impl ClientConnection {
    pub fn neu(state: Arc<SignalingState>, peer_addr: SocketAddr) -> Self {
        Self {
            state,
            peer_addr,
            connection_id: ConnectionId::new(),
        }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Verarbeitungsschleife; laeuft bis Trennung, Timeout oder Shutdown
    pub async fn verarbeiten<S>(self, stream: S, mut shutdown_rx: tokio::sync::watch::Receiver<bool>)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let peer_addr = self.peer_addr;
        let connection_id = self.connection_id;
        let timeout_dauer = Duration::from_secs(self.state.config.verbindungs_timeout_sek);
        let keepalive_intervall = Duration::from_secs(self.state.config.keepalive_sek.max(1));

        tracing::info!(peer = %peer_addr, %connection_id, "Neue Verbindung");

        let mut framed = Framed::new(stream, ServerCodec::new());
        let mut sende_rx = self.state.broadcaster.verbindung_registrieren(connection_id);
        let mut ctx = DispatcherContext::neu(connection_id, peer_addr);
        let dispatcher = MessageDispatcher::neu(Arc::clone(&self.state));

        let mut letzter_empfang = Instant::now();
        let mut naechster_ping = Instant::now() + keepalive_intervall;

        loop {
            tokio::select! {
                frame = framed.next() => {
                    let antwort = match frame {
                        Some(Ok(Ok(umschlag))) => {
                            letzter_empfang = Instant::now();
                            tracing::trace!(peer = %peer_addr, typ = umschlag.typ(), "Umschlag empfangen");
                            dispatcher.dispatch(umschlag, &mut ctx).await
                        }
                        Some(Ok(Err(e))) => {
                            letzter_empfang = Instant::now();
                            tracing::debug!(peer = %peer_addr, fehler = %e, "Ungueltiger Umschlag");
                            Some(ServerEnvelope::fehler(ErrorCode::MalformedEnvelope, e.to_string()))
                        }
                        Some(Err(e)) => {
                            tracing::warn!(peer = %peer_addr, fehler = %e, "Frame-Lesefehler");
                            break;
                        }
                        None => {
                            tracing::info!(peer = %peer_addr, "Verbindung vom Client getrennt");
                            break;
                        }
                    };

                    if let Some(antwort) = antwort {
                        if let Err(e) = framed.send(antwort).await {
                            tracing::warn!(peer = %peer_addr, fehler = %e, "Senden fehlgeschlagen");
                            break;
                        }
                    }
                }

                Some(ausgehend) = sende_rx.recv() => {
                    if let Err(e) = framed.send(ausgehend).await {
                        tracing::warn!(peer = %peer_addr, fehler = %e, "Verteil-Senden fehlgeschlagen");
                        break;
                    }
                }

                _ = tokio::time::sleep_until(naechster_ping) => {
                    let ts_ms = SystemTime::now()
                        .duration_since(UNIX_EPOCH)
                        .unwrap_or_default()
                        .as_millis() as u64;
                    if let Err(e) = framed.send(ServerEnvelope::ping(ts_ms)).await {
                        tracing::warn!(peer = %peer_addr, fehler = %e, "Ping-Senden fehlgeschlagen");
                        break;
                    }
                    naechster_ping = Instant::now() + keepalive_intervall;
                }

                _ = tokio::time::sleep_until(letzter_empfang + timeout_dauer) => {
                    tracing::warn!(peer = %peer_addr, "Verbindungs-Timeout");
                    break;
                }

                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!(peer = %peer_addr, "Shutdown-Signal – Verbindung wird getrennt");
                        let abschied = ServerEnvelope::fehler(
                            ErrorCode::ShuttingDown,
                            "Server wird heruntergefahren",
                        );
                        let _ = framed.send(abschied).await;
                        break;
                    }
                }
            }
        }

        self.state.broadcaster.verbindung_entfernen(connection_id);
        tracing::info!(peer = %peer_addr, %connection_id, "Verbindungs-Task beendet");
    }
}
