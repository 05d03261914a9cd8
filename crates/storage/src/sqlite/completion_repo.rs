use std::collections::BTreeSet;

use async_trait::async_trait;
use lesson_core::model::{IdentityId, LessonId};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{identity_to_text, lesson_id_from_i64, ser, u64_to_i64, write_error};
use crate::repository::{CompletionRecord, CompletionRepository, StorageError};

#[async_trait]
impl CompletionRepository for SqliteRepository {
    async fn insert_completion(&self, record: &CompletionRecord) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO completed_lessons (user_id, lesson_id, score, completed_at)
            VALUES (?1, ?2, ?3, ?4)
            ",
        )
        .bind(identity_to_text(record.identity_id))
        .bind(u64_to_i64("lesson_id", record.lesson_id.value())?)
        .bind(i64::from(record.points))
        .bind(record.completed_at)
        .execute(&self.pool)
        .await
        .map_err(write_error)?;

        Ok(())
    }

    async fn list_completions(
        &self,
        identity: IdentityId,
    ) -> Result<BTreeSet<LessonId>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT lesson_id
            FROM completed_lessons
            WHERE user_id = ?1
            ORDER BY lesson_id ASC
            ",
        )
        .bind(identity_to_text(identity))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut ids = BTreeSet::new();
        for row in rows {
            ids.insert(lesson_id_from_i64(row.try_get::<i64, _>("lesson_id").map_err(ser)?)?);
        }
        Ok(ids)
    }
}
