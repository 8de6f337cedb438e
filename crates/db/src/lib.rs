//! parlor-db – Speicher-Anbindung
//!
//! Repository-Traits fuer alles, was das Relay persistiert, und deren
//! SQLite-Implementierung auf [`SqliteDb`]. Gespeichert werden nur
//! Ciphertext, oeffentliche Schluessel und eingewickelte Kanal-Schluessel.

pub mod error;
pub mod models;
pub mod repository;
pub mod sqlite;

pub use error::{DbError, DbResult};
pub use repository::{
    DatabaseConfig, DistributionRepository, KeyBundleRepository, MessageRepository,
    ReactionRepository,
};
pub use sqlite::SqliteDb;
