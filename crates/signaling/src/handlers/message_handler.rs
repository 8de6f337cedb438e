//! Message-Handler – verschluesselte Nachrichten speichern und verteilen
//!
//! Der Ciphertext ist fuer das Relay undurchsichtig. Gespeichert wird immer
//! zuerst; erst danach geht `message:new` an alle Abonnenten, die Verbindung
//! des Absenders eingeschlossen.

use parlor_core::UserId;
use parlor_db::models::NeueNachricht;
use parlor_db::DbError;
use parlor_protocol::envelope::{MessageNewPayload, MessageSendPayload};
use parlor_protocol::ServerEnvelope;

use crate::error::{SignalingError, SignalingResult};
use crate::server_state::SignalingState;

pub async fn handle_send(
    payload: MessageSendPayload,
    user_id: UserId,
    state: &SignalingState,
) -> SignalingResult<()> {
    let gespeichert = state
        .nachrichten
        .create(NeueNachricht {
            channel_id: payload.channel_id,
            sender_id: user_id,
            ciphertext: &payload.ciphertext,
            reply_to_id: payload.reply_to_id,
        })
        .await
        .map_err(|e| {
            tracing::warn!(
                %user_id,
                channel_id = %payload.channel_id,
                fehler = %e,
                "Nachricht speichern fehlgeschlagen"
            );
            match e {
                // Antwortziel fehlt oder liegt in einem anderen Kanal
                DbError::NichtGefunden(msg) => SignalingError::NichtGefunden(msg),
                andere => SignalingError::Persistenz(andere),
            }
        })?;

    let message_id = gespeichert.id;
    let channel_id = gespeichert.channel_id;
    let umschlag = ServerEnvelope::MessageNew(MessageNewPayload {
        id: gespeichert.id,
        channel_id: gespeichert.channel_id,
        sender_id: gespeichert.sender_id,
        sender_display_name: gespeichert.sender_display_name,
        ciphertext: gespeichert.ciphertext,
        reply_to_id: gespeichert.reply_to_id,
        created_at: gespeichert.created_at,
    });
    let empfaenger = state.broadcaster.an_kanal_senden(channel_id, umschlag);

    tracing::debug!(
        %user_id,
        %channel_id,
        %message_id,
        empfaenger,
        "Nachricht verteilt"
    );
    Ok(())
}
