use async_trait::async_trait;
use lesson_core::model::IdentityId;

use super::SqliteRepository;
use super::mapping::{identity_to_text, map_profile_row, u64_to_i64, write_error};
use crate::repository::{ProfileRecord, ProfileRepository, ProfileUpdate, StorageError};

#[async_trait]
impl ProfileRepository for SqliteRepository {
    async fn get_profile(
        &self,
        identity: IdentityId,
    ) -> Result<Option<ProfileRecord>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, xp, streak, streak_last_updated
            FROM profiles
            WHERE id = ?1
            ",
        )
        .bind(identity_to_text(identity))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        row.as_ref().map(map_profile_row).transpose()
    }

    async fn upsert_profile(
        &self,
        identity: IdentityId,
        update: &ProfileUpdate,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO profiles (id, xp, streak, streak_last_updated)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                xp = excluded.xp,
                streak = excluded.streak,
                streak_last_updated = excluded.streak_last_updated
            ",
        )
        .bind(identity_to_text(identity))
        .bind(u64_to_i64("xp", update.score)?)
        .bind(i64::from(update.streak))
        .bind(update.last_updated)
        .execute(&self.pool)
        .await
        .map_err(write_error)?;

        Ok(())
    }
}
