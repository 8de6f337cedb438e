//! Umschlaege der Echtzeit-Verbindung
//!
//! Jede Nachricht ist ein JSON-Objekt `{ "type": "...", "payload": { ... } }`.
//! Beide Richtungen sind als getaggte Enums modelliert; ein unbekannter `type`
//! oder ein Payload mit falscher Form scheitert bereits beim Deserialisieren
//! und erreicht die Geschaeftslogik nie.
//!
//! Feldnamen im Payload sind camelCase, IDs sind UUID-Strings, Zeitstempel
//! RFC 3339. Der `ciphertext` ist fuer das Relay undurchsichtig
//! (Base64 von `nonce(12) || AEAD-Ciphertext+Tag`).

use chrono::{DateTime, Utc};
use parlor_core::{ChannelId, MessageId, ReactionId, UserId};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Fehlercodes
// ---------------------------------------------------------------------------

/// Maschinenlesbarer Fehlercode im `error`-Umschlag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    AuthenticationRequired,
    MalformedEnvelope,
    DuplicateReaction,
    NotFound,
    PersistenceFailed,
    InternalError,
    ShuttingDown,
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// Payload fuer `auth`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthPayload {
    pub user_id: UserId,
}

/// Payload, der nur einen Kanal referenziert
/// (`channel:join`, `channel:leave`, `channel:joined`, `typing:*`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelRef {
    pub channel_id: ChannelId,
}

/// Payload fuer `message:send`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSendPayload {
    pub channel_id: ChannelId,
    pub ciphertext: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<MessageId>,
}

/// Payload fuer `message:new`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageNewPayload {
    pub id: MessageId,
    pub channel_id: ChannelId,
    pub sender_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_display_name: Option<String>,
    pub ciphertext: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<MessageId>,
    pub created_at: DateTime<Utc>,
}

/// Payload fuer `typing:update`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingUpdatePayload {
    pub channel_id: ChannelId,
    pub user_id: UserId,
    pub is_typing: bool,
}

/// Payload fuer `reaction:add`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionAddPayload {
    pub message_id: MessageId,
    pub channel_id: ChannelId,
    pub emoji: String,
}

/// Payload fuer `reaction:remove`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionRemovePayload {
    pub reaction_id: ReactionId,
    pub message_id: MessageId,
    pub channel_id: ChannelId,
    pub emoji: String,
}

/// Payload fuer `reaction:added` und `reaction:removed`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionEventPayload {
    pub reaction_id: ReactionId,
    pub message_id: MessageId,
    pub user_id: UserId,
    pub emoji: String,
}

/// Payload fuer `ping` (Relay -> Client) und `pong` (Client -> Relay)
///
/// Der Pong spiegelt den Zeitstempel des Pings zurueck.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeepalivePayload {
    pub timestamp_ms: u64,
}

/// Payload fuer `error`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub code: ErrorCode,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Umschlaege
// ---------------------------------------------------------------------------

/// Client -> Relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ClientEnvelope {
    #[serde(rename = "auth")]
    Auth(AuthPayload),
    #[serde(rename = "channel:join")]
    ChannelJoin(ChannelRef),
    #[serde(rename = "channel:leave")]
    ChannelLeave(ChannelRef),
    #[serde(rename = "message:send")]
    MessageSend(MessageSendPayload),
    #[serde(rename = "typing:start")]
    TypingStart(ChannelRef),
    #[serde(rename = "typing:stop")]
    TypingStop(ChannelRef),
    #[serde(rename = "reaction:add")]
    ReactionAdd(ReactionAddPayload),
    #[serde(rename = "reaction:remove")]
    ReactionRemove(ReactionRemovePayload),
    #[serde(rename = "pong")]
    Pong(KeepalivePayload),
}

impl ClientEnvelope {
    pub fn auth(user_id: UserId) -> Self {
        Self::Auth(AuthPayload { user_id })
    }

    pub fn join(channel_id: ChannelId) -> Self {
        Self::ChannelJoin(ChannelRef { channel_id })
    }

    pub fn leave(channel_id: ChannelId) -> Self {
        Self::ChannelLeave(ChannelRef { channel_id })
    }

    /// Der `type`-String dieses Umschlags (fuer Logs)
    pub fn typ(&self) -> &'static str {
        match self {
            Self::Auth(_) => "auth",
            Self::ChannelJoin(_) => "channel:join",
            Self::ChannelLeave(_) => "channel:leave",
            Self::MessageSend(_) => "message:send",
            Self::TypingStart(_) => "typing:start",
            Self::TypingStop(_) => "typing:stop",
            Self::ReactionAdd(_) => "reaction:add",
            Self::ReactionRemove(_) => "reaction:remove",
            Self::Pong(_) => "pong",
        }
    }
}

/// Relay -> Client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerEnvelope {
    #[serde(rename = "auth:success")]
    AuthSuccess,
    #[serde(rename = "channel:joined")]
    ChannelJoined(ChannelRef),
    #[serde(rename = "message:new")]
    MessageNew(MessageNewPayload),
    #[serde(rename = "typing:update")]
    TypingUpdate(TypingUpdatePayload),
    #[serde(rename = "reaction:added")]
    ReactionAdded(ReactionEventPayload),
    #[serde(rename = "reaction:removed")]
    ReactionRemoved(ReactionEventPayload),
    #[serde(rename = "error")]
    Error(ErrorPayload),
    #[serde(rename = "ping")]
    Ping(KeepalivePayload),
}

impl ServerEnvelope {
    /// Erstellt einen `error`-Umschlag
    pub fn fehler(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error(ErrorPayload {
            code,
            message: message.into(),
        })
    }

    pub fn ping(timestamp_ms: u64) -> Self {
        Self::Ping(KeepalivePayload { timestamp_ms })
    }

    /// Gibt den Fehlercode zurueck, falls es ein `error`-Umschlag ist
    pub fn fehler_code(&self) -> Option<ErrorCode> {
        match self {
            Self::Error(p) => Some(p.code),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
