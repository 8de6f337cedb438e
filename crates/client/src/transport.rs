//! Verbindung zum Relay
//!
//! [`Transport`] ist eine offene Verbindung, [`Connector`] baut neue auf.
//! Der [`ReconnectionManager`](crate::ReconnectionManager) kennt nur diese
//! beiden Traits; `TcpConnector` ist die echte Implementierung mit dem
//! Frame-Codec (u32 BE Laenge + JSON). `ping` beantwortet der Transport
//! selbst, er erreicht den Aufrufer nie.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parlor_protocol::{ClientCodec, ClientEnvelope, ServerEnvelope};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

use crate::error::{ClientError, ClientResult};

#[async_trait]
pub trait Transport: Send {
    async fn send(&mut self, umschlag: ClientEnvelope) -> ClientResult<()>;

    /// Naechster Umschlag vom Relay; `None`, wenn die Verbindung weg ist
    async fn receive(&mut self) -> Option<ServerEnvelope>;
}

#[async_trait]
pub trait Connector: Send + Sync {
    async fn verbinden(&self) -> ClientResult<Box<dyn Transport>>;
}

// ---------------------------------------------------------------------------
// TCP
// ---------------------------------------------------------------------------

pub struct TcpTransport {
    framed: Framed<TcpStream, ClientCodec>,
}

impl TcpTransport {
    pub fn neu(stream: TcpStream) -> Self {
        Self {
            framed: Framed::new(stream, ClientCodec::new()),
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(&mut self, umschlag: ClientEnvelope) -> ClientResult<()> {
        self.framed.send(umschlag).await.map_err(|e| {
            tracing::debug!(fehler = %e, "Senden fehlgeschlagen");
            ClientError::Getrennt
        })
    }

    async fn receive(&mut self) -> Option<ServerEnvelope> {
        loop {
            match self.framed.next().await? {
                Ok(Ok(ServerEnvelope::Ping(ping))) => {
                    // Antwort haelt auch reine Leser beim Relay am Leben
                    if let Err(e) = self.framed.send(ClientEnvelope::Pong(ping)).await {
                        tracing::warn!(fehler = %e, "Pong-Senden fehlgeschlagen");
                        return None;
                    }
                }
                Ok(Ok(umschlag)) => return Some(umschlag),
                Ok(Err(e)) => {
                    // einzelner kaputter Frame, Framing bleibt intakt
                    tracing::warn!(fehler = %e, "Ungueltiger Umschlag vom Relay verworfen");
                }
                Err(e) => {
                    tracing::warn!(fehler = %e, "Frame-Lesefehler");
                    return None;
                }
            }
        }
    }
}

/// Baut TCP-Verbindungen zu einer festen Relay-Adresse auf
#[derive(Debug, Clone)]
pub struct TcpConnector {
    adresse: String,
}

impl TcpConnector {
    pub fn neu(adresse: impl Into<String>) -> Self {
        Self {
            adresse: adresse.into(),
        }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn verbinden(&self) -> ClientResult<Box<dyn Transport>> {
        let stream = TcpStream::connect(&self.adresse).await?;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(fehler = %e, "TCP_NODELAY nicht gesetzt");
        }
        tracing::info!(adresse = %self.adresse, "TCP-Verbindung zum Relay hergestellt");
        Ok(Box::new(TcpTransport::neu(stream)))
    }
}
