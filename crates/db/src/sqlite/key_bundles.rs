//! SQLite-Implementierung des KeyBundleRepository
//!
//! Ein Einmal-Prekey wird mit einem einzigen `DELETE .. RETURNING`
//! verbraucht. Zwei gleichzeitige Abfragen koennen deshalb nie denselben
//! Prekey erhalten.

use async_trait::async_trait;
use chrono::Utc;
use parlor_core::UserId;
use parlor_protocol::keys::{KeyBundle, OneTimePreKey, PublicKeyBundle, SignedPreKey};
use sqlx::Row as _;
use tracing::debug;

use crate::error::DbResult;
use crate::repository::KeyBundleRepository;
use crate::sqlite::pool::SqliteDb;
use crate::sqlite::zeit_als_text;

#[async_trait]
impl KeyBundleRepository for SqliteDb {
    async fn publish(
        &self,
        user_id: UserId,
        display_name: Option<&str>,
        bundle: &PublicKeyBundle,
    ) -> DbResult<()> {
        let user_str = user_id.inner().to_string();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO key_bundles
             (user_id, display_name, identity_public_key, identity_signing_key,
              signed_pre_key, signed_pre_key_signature, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET
                display_name = excluded.display_name,
                identity_public_key = excluded.identity_public_key,
                identity_signing_key = excluded.identity_signing_key,
                signed_pre_key = excluded.signed_pre_key,
                signed_pre_key_signature = excluded.signed_pre_key_signature,
                updated_at = excluded.updated_at",
        )
        .bind(&user_str)
        .bind(display_name)
        .bind(&bundle.identity_public_key)
        .bind(&bundle.identity_signing_key)
        .bind(&bundle.signed_pre_key.public_key)
        .bind(&bundle.signed_pre_key.signature)
        .bind(zeit_als_text(Utc::now()))
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM one_time_prekeys WHERE user_id = ?")
            .bind(&user_str)
            .execute(&mut *tx)
            .await?;

        for otpk in &bundle.one_time_pre_keys {
            sqlx::query("INSERT INTO one_time_prekeys (user_id, key_id, public_key) VALUES (?, ?, ?)")
                .bind(&user_str)
                .bind(i64::from(otpk.key_id))
                .bind(&otpk.public_key)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        debug!(%user_id, prekeys = bundle.one_time_pre_keys.len(), "Schluessel-Buendel gespeichert");
        Ok(())
    }

    async fn fetch_bundle(&self, user_id: UserId) -> DbResult<Option<KeyBundle>> {
        let row = sqlx::query(
            "SELECT identity_public_key, identity_signing_key, signed_pre_key,
                    signed_pre_key_signature
             FROM key_bundles WHERE user_id = ?",
        )
        .bind(user_id.inner().to_string())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let one_time_pre_key = self.consume_one_time_prekey(user_id).await?;

        Ok(Some(KeyBundle {
            identity_public_key: row.try_get("identity_public_key")?,
            identity_signing_key: row.try_get("identity_signing_key")?,
            signed_pre_key: SignedPreKey {
                public_key: row.try_get("signed_pre_key")?,
                signature: row.try_get("signed_pre_key_signature")?,
            },
            one_time_pre_key,
        }))
    }

    async fn consume_one_time_prekey(&self, user_id: UserId) -> DbResult<Option<OneTimePreKey>> {
        let row = sqlx::query(
            "DELETE FROM one_time_prekeys
             WHERE rowid = (
                SELECT rowid FROM one_time_prekeys
                WHERE user_id = ?
                ORDER BY key_id
                LIMIT 1
             )
             RETURNING key_id, public_key",
        )
        .bind(user_id.inner().to_string())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            debug!(%user_id, "Einmal-Prekeys erschoepft");
            return Ok(None);
        };

        let key_id: i64 = row.try_get("key_id")?;
        Ok(Some(OneTimePreKey {
            key_id: u32::try_from(key_id).unwrap_or_default(),
            public_key: row.try_get("public_key")?,
        }))
    }

    async fn remaining_one_time_prekeys(&self, user_id: UserId) -> DbResult<i64> {
        let anzahl: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM one_time_prekeys WHERE user_id = ?")
                .bind(user_id.inner().to_string())
                .fetch_one(&self.pool)
                .await?;
        Ok(anzahl)
    }

    async fn display_name(&self, user_id: UserId) -> DbResult<Option<String>> {
        let name = sqlx::query_scalar::<_, Option<String>>(
            "SELECT display_name FROM key_bundles WHERE user_id = ?",
        )
        .bind(user_id.inner().to_string())
        .fetch_optional(&self.pool)
        .await?
        .flatten();
        Ok(name)
    }
}
