//! Message-Dispatcher – Routet Client-Umschlaege an die Handler
//!
//! ## Zustandspruefung
//! - `auth` ist immer erlaubt und bindet (oder bindet neu) die User-ID
//! - `pong` ist immer erlaubt und wird nicht beantwortet
//! - alle anderen Umschlaege erfordern eine gebundene User-ID, sonst
//!   antwortet der Dispatcher mit `AUTHENTICATION_REQUIRED`
//!
//! Handler-Fehler werden zu einem `error`-Umschlag an den Absender; die
//! Verbindung bleibt offen.

use parlor_core::{ConnectionId, UserId};
use parlor_protocol::{ClientEnvelope, ServerEnvelope};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::error::{SignalingError, SignalingResult};
use crate::handlers::{channel_handler, message_handler, reaction_handler};
use crate::server_state::SignalingState;

/// Informationen ueber die aktuelle Verbindung
#[derive(Debug, Clone)]
pub struct DispatcherContext {
    pub connection_id: ConnectionId,
    pub peer_addr: SocketAddr,
    /// Gebundene User-ID (None vor `auth`)
    pub user_id: Option<UserId>,
}

impl DispatcherContext {
    pub fn neu(connection_id: ConnectionId, peer_addr: SocketAddr) -> Self {
        Self {
            connection_id,
            peer_addr,
            user_id: None,
        }
    }

    fn user(&self) -> SignalingResult<UserId> {
        self.user_id.ok_or(SignalingError::NichtAuthentifiziert)
    }
}

/// Zentraler Dispatcher
pub struct MessageDispatcher {
    state: Arc<SignalingState>,
}

impl MessageDispatcher {
    pub fn neu(state: Arc<SignalingState>) -> Self {
        Self { state }
    }

    /// Verarbeitet einen Umschlag und gibt die direkte Antwort zurueck
    ///
    /// `None`, wenn der Absender nichts direkt erhaelt. Verteilte Umschlaege
    /// (`message:new`, `reaction:added`, ..) laufen ueber den Broadcaster.
    pub async fn dispatch(
        &self,
        umschlag: ClientEnvelope,
        ctx: &mut DispatcherContext,
    ) -> Option<ServerEnvelope> {
        let typ = umschlag.typ();
        match self.verarbeiten(umschlag, ctx).await {
            Ok(antwort) => antwort,
            Err(e) => {
                tracing::debug!(
                    peer = %ctx.peer_addr,
                    typ,
                    fehler = %e,
                    "Umschlag abgelehnt"
                );
                Some(ServerEnvelope::fehler(e.code(), e.to_string()))
            }
        }
    }

    async fn verarbeiten(
        &self,
        umschlag: ClientEnvelope,
        ctx: &mut DispatcherContext,
    ) -> SignalingResult<Option<ServerEnvelope>> {
        let state = self.state.as_ref();
        let connection_id = ctx.connection_id;

        match umschlag {
            ClientEnvelope::Auth(payload) => {
                if !state.broadcaster.user_binden(connection_id, payload.user_id) {
                    return Err(SignalingError::intern("Verbindung nicht registriert"));
                }
                if let Some(alt) = ctx.user_id.replace(payload.user_id) {
                    tracing::debug!(%connection_id, %alt, neu = %payload.user_id, "User-ID neu gebunden");
                } else {
                    tracing::debug!(%connection_id, user_id = %payload.user_id, "Verbindung authentifiziert");
                }
                Ok(Some(ServerEnvelope::AuthSuccess))
            }

            // Lebenszeichen; `letzter_empfang` setzt bereits die Verbindung
            ClientEnvelope::Pong(_) => Ok(None),

            ClientEnvelope::ChannelJoin(r) => {
                ctx.user()?;
                channel_handler::handle_join(r.channel_id, connection_id, state).map(Some)
            }

            ClientEnvelope::ChannelLeave(r) => {
                ctx.user()?;
                channel_handler::handle_leave(r.channel_id, connection_id, state);
                Ok(None)
            }

            ClientEnvelope::MessageSend(payload) => {
                let user_id = ctx.user()?;
                message_handler::handle_send(payload, user_id, state).await?;
                Ok(None)
            }

            ClientEnvelope::TypingStart(r) => {
                let user_id = ctx.user()?;
                channel_handler::handle_typing(r.channel_id, true, user_id, connection_id, state);
                Ok(None)
            }

            ClientEnvelope::TypingStop(r) => {
                let user_id = ctx.user()?;
                channel_handler::handle_typing(r.channel_id, false, user_id, connection_id, state);
                Ok(None)
            }

            ClientEnvelope::ReactionAdd(payload) => {
                let user_id = ctx.user()?;
                reaction_handler::handle_add(payload, user_id, state).await?;
                Ok(None)
            }

            ClientEnvelope::ReactionRemove(payload) => {
                let user_id = ctx.user()?;
                reaction_handler::handle_remove(payload, user_id, state).await?;
                Ok(None)
            }
        }
    }
}
