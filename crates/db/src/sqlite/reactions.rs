//! SQLite-Implementierung des ReactionRepository

use async_trait::async_trait;
use chrono::Utc;
use parlor_core::{MessageId, ReactionId, UserId};
use sqlx::Row as _;

use crate::error::DbResult;
use crate::models::ReaktionRecord;
use crate::repository::ReactionRepository;
use crate::sqlite::pool::SqliteDb;
use crate::sqlite::{parse_timestamp, parse_uuid, zeit_als_text};

#[async_trait]
impl ReactionRepository for SqliteDb {
    async fn find(
        &self,
        message_id: MessageId,
        user_id: UserId,
        emoji: &str,
    ) -> DbResult<Option<ReaktionRecord>> {
        let row = sqlx::query(
            "SELECT id, message_id, user_id, emoji, created_at FROM reactions
             WHERE message_id = ? AND user_id = ? AND emoji = ?",
        )
        .bind(message_id.inner().to_string())
        .bind(user_id.inner().to_string())
        .bind(emoji)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| row_to_reaktion(&r)).transpose()
    }

    async fn add(
        &self,
        message_id: MessageId,
        user_id: UserId,
        emoji: &str,
    ) -> DbResult<ReaktionRecord> {
        let id = ReactionId::new();
        let now = Utc::now();

        // UNIQUE(message_id, user_id, emoji) schliesst das Rennen zwischen
        // find() und add()
        sqlx::query(
            "INSERT INTO reactions (id, message_id, user_id, emoji, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id.inner().to_string())
        .bind(message_id.inner().to_string())
        .bind(user_id.inner().to_string())
        .bind(emoji)
        .bind(zeit_als_text(now))
        .execute(&self.pool)
        .await?;

        Ok(ReaktionRecord {
            id,
            message_id,
            user_id,
            emoji: emoji.to_string(),
            created_at: now,
        })
    }

    async fn remove(&self, id: ReactionId, user_id: UserId) -> DbResult<Option<ReaktionRecord>> {
        let row = sqlx::query(
            "DELETE FROM reactions WHERE id = ? AND user_id = ?
             RETURNING id, message_id, user_id, emoji, created_at",
        )
        .bind(id.inner().to_string())
        .bind(user_id.inner().to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| row_to_reaktion(&r)).transpose()
    }

    async fn for_message(&self, message_id: MessageId) -> DbResult<Vec<ReaktionRecord>> {
        let rows = sqlx::query(
            "SELECT id, message_id, user_id, emoji, created_at FROM reactions
             WHERE message_id = ? ORDER BY created_at",
        )
        .bind(message_id.inner().to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_reaktion).collect()
    }
}

fn row_to_reaktion(row: &sqlx::sqlite::SqliteRow) -> DbResult<ReaktionRecord> {
    let id: String = row.try_get("id")?;
    let message_id: String = row.try_get("message_id")?;
    let user_id: String = row.try_get("user_id")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(ReaktionRecord {
        id: ReactionId(parse_uuid("Reaktions", &id)?),
        message_id: MessageId(parse_uuid("message_id", &message_id)?),
        user_id: UserId(parse_uuid("user_id", &user_id)?),
        emoji: row.try_get("emoji")?,
        created_at: parse_timestamp(&created_at)?,
    })
}
