//! SQLite-Implementierung des MessageRepository

use async_trait::async_trait;
use chrono::Utc;
use parlor_core::{ChannelId, MessageId, UserId};
use sqlx::Row as _;

use crate::error::{DbError, DbResult};
use crate::models::{NachrichtRecord, NachrichtenFilter, NeueNachricht};
use crate::repository::{KeyBundleRepository, MessageRepository};
use crate::sqlite::pool::SqliteDb;
use crate::sqlite::{parse_timestamp, parse_uuid, zeit_als_text};

const SELECT_NACHRICHT: &str = "SELECT m.id, m.channel_id, m.sender_id, m.ciphertext,
        m.reply_to_id, m.created_at, k.display_name
 FROM messages m
 LEFT JOIN key_bundles k ON k.user_id = m.sender_id";

#[async_trait]
impl MessageRepository for SqliteDb {
    async fn create(&self, data: NeueNachricht<'_>) -> DbResult<NachrichtRecord> {
        if let Some(ziel) = data.reply_to_id {
            self.antwortziel_pruefen(ziel, data.channel_id).await?;
        }

        let id = MessageId::new();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO messages (id, channel_id, sender_id, ciphertext, reply_to_id, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(id.inner().to_string())
        .bind(data.channel_id.inner().to_string())
        .bind(data.sender_id.inner().to_string())
        .bind(data.ciphertext)
        .bind(data.reply_to_id.map(|r| r.inner().to_string()))
        .bind(zeit_als_text(now))
        .execute(&self.pool)
        .await?;

        let sender_display_name = KeyBundleRepository::display_name(self, data.sender_id).await?;

        Ok(NachrichtRecord {
            id,
            channel_id: data.channel_id,
            sender_id: data.sender_id,
            sender_display_name,
            ciphertext: data.ciphertext.to_string(),
            reply_to_id: data.reply_to_id,
            created_at: now,
        })
    }

    async fn get_by_id(&self, id: MessageId) -> DbResult<Option<NachrichtRecord>> {
        let row = sqlx::query(&format!("{SELECT_NACHRICHT} WHERE m.id = ?"))
            .bind(id.inner().to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| row_to_nachricht(&r)).transpose()
    }

    async fn get_history(&self, filter: NachrichtenFilter) -> DbResult<Vec<NachrichtRecord>> {
        let limit = filter.limit.unwrap_or(50);
        let channel_str = filter.channel_id.inner().to_string();

        let rows = if let Some(before) = filter.before {
            sqlx::query(&format!(
                "{SELECT_NACHRICHT}
                 WHERE m.channel_id = ? AND m.created_at < ?
                 ORDER BY m.created_at DESC, m.rowid DESC
                 LIMIT ?"
            ))
            .bind(&channel_str)
            .bind(zeit_als_text(before))
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query(&format!(
                "{SELECT_NACHRICHT}
                 WHERE m.channel_id = ?
                 ORDER BY m.created_at DESC, m.rowid DESC
                 LIMIT ?"
            ))
            .bind(&channel_str)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
        };

        // Chronologisch sortieren (aelteste zuerst)
        let mut records: Vec<NachrichtRecord> =
            rows.iter().map(row_to_nachricht).collect::<DbResult<_>>()?;
        records.reverse();
        Ok(records)
    }
}

impl SqliteDb {
    /// Antworten duerfen nur auf Nachrichten desselben Kanals verweisen
    async fn antwortziel_pruefen(&self, ziel: MessageId, channel_id: ChannelId) -> DbResult<()> {
        let kanal: Option<String> = sqlx::query_scalar("SELECT channel_id FROM messages WHERE id = ?")
            .bind(ziel.inner().to_string())
            .fetch_optional(&self.pool)
            .await?;

        match kanal {
            Some(k) if k == channel_id.inner().to_string() => Ok(()),
            Some(_) => Err(DbError::nicht_gefunden(format!(
                "Antwortziel {ziel} liegt nicht in Kanal {channel_id}"
            ))),
            None => Err(DbError::nicht_gefunden(format!("Antwortziel {ziel}"))),
        }
    }
}

fn row_to_nachricht(row: &sqlx::sqlite::SqliteRow) -> DbResult<NachrichtRecord> {
    let id: String = row.try_get("id")?;
    let channel_id: String = row.try_get("channel_id")?;
    let sender_id: String = row.try_get("sender_id")?;
    let reply_to_id: Option<String> = row.try_get("reply_to_id")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(NachrichtRecord {
        id: MessageId(parse_uuid("Nachrichten", &id)?),
        channel_id: ChannelId(parse_uuid("channel_id", &channel_id)?),
        sender_id: UserId(parse_uuid("sender_id", &sender_id)?),
        sender_display_name: row.try_get("display_name")?,
        ciphertext: row.try_get("ciphertext")?,
        reply_to_id: reply_to_id
            .as_deref()
            .map(|s| parse_uuid("reply_to_id", s).map(MessageId))
            .transpose()?,
        created_at: parse_timestamp(&created_at)?,
    })
}
