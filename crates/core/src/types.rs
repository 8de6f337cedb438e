//! Gemeinsame Identifikationstypen fuer Parlor
//!
//! Alle IDs verwenden das Newtype-Pattern um Verwechslungen zwischen
//! verschiedenen ID-Arten zur Compilezeit auszuschliessen. Auf dem Draht
//! werden sie als nackter UUID-String serialisiert.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident, $praefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Erstellt eine neue zufaellige ID
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Gibt die innere UUID zurueck
            pub fn inner(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($praefix, ":{}"), self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            /// Akzeptiert nur die nackte UUID (ohne Praefix)
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

uuid_id!(
    /// Eindeutige Benutzer-ID
    UserId,
    "user"
);

uuid_id!(
    /// Eindeutige Kanal-ID
    ChannelId,
    "channel"
);

uuid_id!(
    /// Eindeutige Nachrichten-ID (vom Relay beim Persistieren vergeben)
    MessageId,
    "message"
);

uuid_id!(
    /// Eindeutige Reaktions-ID
    ReactionId,
    "reaction"
);

uuid_id!(
    /// Server-seitige ID einer einzelnen TCP-Verbindung
    ConnectionId,
    "conn"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_eindeutig() {
        let a = UserId::new();
        let b = UserId::new();
        assert_ne!(a, b, "Zwei neue UserIds muessen verschieden sein");
    }

    #[test]
    fn channel_id_display() {
        let id = ChannelId(Uuid::nil());
        assert_eq!(
            id.to_string(),
            "channel:00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn ids_werden_als_nackte_uuid_serialisiert() {
        let uid = UserId::new();
        let json = serde_json::to_string(&uid).unwrap();
        assert_eq!(json, format!("\"{}\"", uid.inner()));
        let uid2: UserId = serde_json::from_str(&json).unwrap();
        assert_eq!(uid, uid2);
    }

    #[test]
    fn from_str_ohne_praefix() {
        let id = MessageId::new();
        let parsed: MessageId = id.inner().to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("message:abc".parse::<MessageId>().is_err());
    }
}
