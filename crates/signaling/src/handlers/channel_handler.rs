//! Channel-Handler – Join, Leave, Tipp-Hinweise
//!
//! Abos leben nur im Speicher. Tipp-Hinweise werden nie gespeichert und
//! gehen an alle Abonnenten ausser der ausloesenden Verbindung.

use parlor_core::{ChannelId, ConnectionId, UserId};
use parlor_protocol::envelope::{ChannelRef, TypingUpdatePayload};
use parlor_protocol::ServerEnvelope;

use crate::error::{SignalingError, SignalingResult};
use crate::server_state::SignalingState;

pub fn handle_join(
    channel_id: ChannelId,
    connection_id: ConnectionId,
    state: &SignalingState,
) -> SignalingResult<ServerEnvelope> {
    if !state.broadcaster.kanal_beitreten(connection_id, channel_id) {
        return Err(SignalingError::intern("Verbindung nicht registriert"));
    }
    tracing::debug!(%connection_id, %channel_id, "Kanal abonniert");
    Ok(ServerEnvelope::ChannelJoined(ChannelRef { channel_id }))
}

pub fn handle_leave(channel_id: ChannelId, connection_id: ConnectionId, state: &SignalingState) {
    state.broadcaster.kanal_verlassen(connection_id, channel_id);
    tracing::debug!(%connection_id, %channel_id, "Kanal-Abo beendet");
}

pub fn handle_typing(
    channel_id: ChannelId,
    is_typing: bool,
    user_id: UserId,
    connection_id: ConnectionId,
    state: &SignalingState,
) {
    let umschlag = ServerEnvelope::TypingUpdate(TypingUpdatePayload {
        channel_id,
        user_id,
        is_typing,
    });
    state
        .broadcaster
        .an_kanal_ausser_senden(channel_id, connection_id, umschlag);
}
