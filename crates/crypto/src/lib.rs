//! # parlor-crypto
//!
//! Ende-zu-Ende Verschluesselung fuer Kanal-Nachrichten.
//!
//! ## Module
//! - `engine` - Primitive: X25519, HKDF, AES-256-GCM, Ed25519
//! - `identity` - Identitaet, signierter Prekey und Einmal-Prekeys
//! - `keystore` - Lokaler Schluessel-Speicher (Speicher / Datei)
//! - `directory` - Schnittstelle zum Schluessel-Verzeichnis des Relays
//! - `broker` - Kanal-Schluessel beschaffen, erzeugen und verteilen
//! - `codec` - Klartext <-> verschluesselter Base64-Blob
//! - `types` - Gemeinsame Typen (KeyPair, SymmetricKey, SecretBytes)
//! - `error` - Fehlertypen
//!
//! ## Ablauf
//!
//! ```text
//! Klartext -> ChannelMessageCodec -> ChannelKeyBroker (Schluessel sicherstellen)
//!          -> engine::encrypt -> Base64 -> Relay
//! ```

pub mod broker;
pub mod codec;
pub mod directory;
pub mod engine;
pub mod error;
pub mod identity;
pub mod keystore;
pub mod types;

// Bequeme Re-Exports
pub use broker::{ChannelKeyBroker, EnsuredKey};
pub use codec::{ChannelMessageCodec, UNDECRYPTABLE_PLACEHOLDER};
pub use directory::KeyDirectory;
pub use error::{CryptoError, CryptoResult};
pub use identity::{generate_identity, GeneratedIdentity, IdentityMaterial};
pub use keystore::{FileKeyStore, KeyStore, MemoryKeyStore};
pub use types::{ChannelKey, KeyPair, PublicKey, SecretBytes, SymmetricKey};
