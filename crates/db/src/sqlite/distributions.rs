//! SQLite-Implementierung des DistributionRepository

use async_trait::async_trait;
use chrono::Utc;
use parlor_core::{ChannelId, UserId};
use parlor_protocol::keys::{DistributionRecord, WrappedKeyEntry};
use sqlx::Row as _;
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;
use crate::repository::DistributionRepository;
use crate::sqlite::pool::SqliteDb;
use crate::sqlite::{parse_timestamp, parse_uuid, zeit_als_text};

#[async_trait]
impl DistributionRepository for SqliteDb {
    async fn replace(
        &self,
        channel_id: ChannelId,
        distributor: UserId,
        distribution_id: Uuid,
        entries: &[WrappedKeyEntry],
    ) -> DbResult<()> {
        let channel_str = channel_id.inner().to_string();
        let distributor_str = distributor.inner().to_string();
        let distribution_str = distribution_id.to_string();
        let now_str = zeit_als_text(Utc::now());

        let mut tx = self.pool.begin().await?;

        let entfernt = sqlx::query(
            "DELETE FROM channel_key_distributions
             WHERE channel_id = ? AND distributor_user_id = ?",
        )
        .bind(&channel_str)
        .bind(&distributor_str)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        for entry in entries {
            // INSERT OR REPLACE: doppelte Empfaenger in einer Runde -> letzter gewinnt
            sqlx::query(
                "INSERT OR REPLACE INTO channel_key_distributions
                 (channel_id, distributor_user_id, recipient_user_id, distribution_id,
                  wrapped_key, created_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&channel_str)
            .bind(&distributor_str)
            .bind(entry.recipient_user_id.inner().to_string())
            .bind(&distribution_str)
            .bind(&entry.wrapped_key)
            .bind(&now_str)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(
            %channel_id,
            verteiler = %distributor,
            %distribution_id,
            entfernt,
            neu = entries.len(),
            "Verteilungsrunde ersetzt"
        );
        Ok(())
    }

    async fn for_recipient(
        &self,
        channel_id: ChannelId,
        recipient: UserId,
    ) -> DbResult<Vec<DistributionRecord>> {
        let rows = sqlx::query(
            "SELECT distribution_id, channel_id, distributor_user_id, recipient_user_id,
                    wrapped_key, created_at
             FROM channel_key_distributions
             WHERE channel_id = ? AND recipient_user_id = ?
             ORDER BY created_at",
        )
        .bind(channel_id.inner().to_string())
        .bind(recipient.inner().to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_verteilung).collect()
    }
}

fn row_to_verteilung(row: &sqlx::sqlite::SqliteRow) -> DbResult<DistributionRecord> {
    let distribution_id: String = row.try_get("distribution_id")?;
    let channel_id: String = row.try_get("channel_id")?;
    let distributor: String = row.try_get("distributor_user_id")?;
    let recipient: String = row.try_get("recipient_user_id")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(DistributionRecord {
        distribution_id: parse_uuid("distribution_id", &distribution_id)?,
        channel_id: ChannelId(parse_uuid("channel_id", &channel_id)?),
        distributor_user_id: UserId(parse_uuid("distributor_user_id", &distributor)?),
        recipient_user_id: UserId(parse_uuid("recipient_user_id", &recipient)?),
        wrapped_key: row.try_get("wrapped_key")?,
        created_at: parse_timestamp(&created_at)?,
    })
}
