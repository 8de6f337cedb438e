//! SQLite-Backend-Implementierungen fuer alle Repository-Traits

pub mod distributions;
pub mod key_bundles;
pub mod messages;
pub mod pool;
pub mod reactions;

pub use pool::SqliteDb;

use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use crate::error::{DbError, DbResult};

/// Zeitstempel mit fester Breite, damit TEXT-Vergleiche chronologisch sind
pub(crate) fn zeit_als_text(zeit: DateTime<Utc>) -> String {
    zeit.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(s: &str) -> DbResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DbError::intern(format!("Ungueltige Zeitangabe '{s}': {e}")))
}

pub(crate) fn parse_uuid(spalte: &str, s: &str) -> DbResult<Uuid> {
    Uuid::parse_str(s).map_err(|e| DbError::intern(format!("Ungueltige {spalte} UUID '{s}': {e}")))
}
