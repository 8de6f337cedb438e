//! Reaction-Handler – Reaktionen hinzufuegen und entfernen
//!
//! Verteilt wird an den gespeicherten Kanal der Nachricht. Die `channelId`
//! im Umschlag muss dazu passen, sonst gilt die Nachricht als unbekannt.

use parlor_core::{ChannelId, MessageId, UserId};
use parlor_db::DbError;
use parlor_protocol::envelope::{ReactionAddPayload, ReactionEventPayload, ReactionRemovePayload};
use parlor_protocol::ServerEnvelope;

use crate::error::{SignalingError, SignalingResult};
use crate::server_state::SignalingState;

/// Kanal, in dem die Nachricht gespeichert ist
async fn gespeicherter_kanal(
    message_id: MessageId,
    state: &SignalingState,
) -> SignalingResult<ChannelId> {
    state
        .nachrichten
        .get_by_id(message_id)
        .await
        .map_err(SignalingError::Persistenz)?
        .map(|n| n.channel_id)
        .ok_or_else(|| SignalingError::NichtGefunden(format!("Nachricht {message_id}")))
}

async fn kanal_pruefen(
    message_id: MessageId,
    angegeben: ChannelId,
    state: &SignalingState,
) -> SignalingResult<ChannelId> {
    let kanal = gespeicherter_kanal(message_id, state).await?;
    if kanal != angegeben {
        tracing::debug!(%message_id, %kanal, %angegeben, "Reaktion mit falschem Kanal");
        return Err(SignalingError::NichtGefunden(format!(
            "Nachricht {message_id} in Kanal {angegeben}"
        )));
    }
    Ok(kanal)
}

pub async fn handle_add(
    payload: ReactionAddPayload,
    user_id: UserId,
    state: &SignalingState,
) -> SignalingResult<()> {
    let kanal = kanal_pruefen(payload.message_id, payload.channel_id, state).await?;

    let vorhanden = state
        .reaktionen
        .find(payload.message_id, user_id, &payload.emoji)
        .await
        .map_err(SignalingError::Persistenz)?;
    if vorhanden.is_some() {
        return Err(SignalingError::DoppelteReaktion);
    }

    // Der UNIQUE-Index faengt das Rennen zwischen find() und add() ab
    let reaktion = state
        .reaktionen
        .add(payload.message_id, user_id, &payload.emoji)
        .await
        .map_err(|e| match e {
            DbError::Eindeutigkeit(_) => SignalingError::DoppelteReaktion,
            DbError::NichtGefunden(_) => {
                SignalingError::NichtGefunden(format!("Nachricht {}", payload.message_id))
            }
            andere => SignalingError::Persistenz(andere),
        })?;

    state.broadcaster.an_kanal_senden(
        kanal,
        ServerEnvelope::ReactionAdded(ReactionEventPayload {
            reaction_id: reaktion.id,
            message_id: reaktion.message_id,
            user_id,
            emoji: reaktion.emoji,
        }),
    );
    Ok(())
}

pub async fn handle_remove(
    payload: ReactionRemovePayload,
    user_id: UserId,
    state: &SignalingState,
) -> SignalingResult<()> {
    let kanal = kanal_pruefen(payload.message_id, payload.channel_id, state).await?;

    let entfernt = state
        .reaktionen
        .remove(payload.reaction_id, user_id)
        .await
        .map_err(SignalingError::Persistenz)?
        .ok_or_else(|| SignalingError::NichtGefunden(format!("Reaktion {}", payload.reaction_id)))?;

    // Die Reaktion haengt an einer anderen Nachricht als angegeben
    let kanal = if entfernt.message_id == payload.message_id {
        kanal
    } else {
        gespeicherter_kanal(entfernt.message_id, state).await?
    };

    state.broadcaster.an_kanal_senden(
        kanal,
        ServerEnvelope::ReactionRemoved(ReactionEventPayload {
            reaction_id: entfernt.id,
            message_id: entfernt.message_id,
            user_id,
            emoji: entfernt.emoji,
        }),
    );
    Ok(())
}
