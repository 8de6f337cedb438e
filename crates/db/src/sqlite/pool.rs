//! SQLite-Pool fuer Nachrichten und Schluessel-Verzeichnis
//!
//! Datei-Datenbanken laufen im WAL-Modus mit `busy_timeout`, damit parallele
//! Prekey-Abrufe auf mehreren Pool-Verbindungen warten statt mit
//! `SQLITE_BUSY` abzubrechen.

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use tracing::info;

use crate::error::DbResult;
use crate::repository::DatabaseConfig;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Geteilter Zugang zur Datenbank; implementiert alle Repository-Traits
#[derive(Debug, Clone)]
pub struct SqliteDb {
    pub(crate) pool: SqlitePool,
}

impl SqliteDb {
    /// Oeffnet (oder erzeugt) die Datenbank und bringt das Schema auf Stand
    pub async fn oeffnen(config: &DatabaseConfig) -> DbResult<Self> {
        let (journal, synchronous) = if config.sqlite_wal {
            (SqliteJournalMode::Wal, SqliteSynchronous::Normal)
        } else {
            (SqliteJournalMode::Delete, SqliteSynchronous::Full)
        };

        let opts = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .journal_mode(journal)
            .synchronous(synchronous)
            .busy_timeout(BUSY_TIMEOUT)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_verbindungen.max(1))
            .connect_with(opts)
            .await?;

        info!(
            url = %config.url,
            wal = config.sqlite_wal,
            verbindungen = config.max_verbindungen,
            "SQLite-Pool geoeffnet"
        );

        let db = Self { pool };
        db.migrationen_ausfuehren().await?;
        Ok(db)
    }

    /// Fluechtige Datenbank fuer Tests und eingebettete Relays
    ///
    /// Eine einzige, dauerhaft offene Verbindung: jede weitere Verbindung
    /// saehe eine eigene leere Datenbank.
    pub async fn in_memory() -> DbResult<Self> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await?;

        let db = Self { pool };
        db.migrationen_ausfuehren().await?;
        Ok(db)
    }

    pub async fn migrationen_ausfuehren(&self) -> DbResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Datenbank-Migrationen abgeschlossen");
        Ok(())
    }

    /// Schliesst alle Verbindungen; laufende Abfragen werden abgewartet
    pub async fn schliessen(&self) {
        self.pool.close().await;
        info!("SQLite-Pool geschlossen");
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
