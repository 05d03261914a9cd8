use lesson_core::model::{IdentityId, LessonId};
use sqlx::Row;

use crate::repository::{ProfileRecord, StorageError};

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

/// Unique-constraint violations become `Conflict`; everything else is a connection error.
pub(crate) fn write_error(e: sqlx::Error) -> StorageError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => StorageError::Conflict,
        _ => StorageError::Connection(e.to_string()),
    }
}

pub(crate) fn identity_to_text(id: IdentityId) -> String {
    id.to_string()
}

pub(crate) fn identity_from_text(raw: &str) -> Result<IdentityId, StorageError> {
    raw.parse().map_err(ser)
}

pub(crate) fn u64_to_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

pub(crate) fn lesson_id_from_i64(v: i64) -> Result<LessonId, StorageError> {
    u64::try_from(v)
        .map(LessonId::new)
        .map_err(|_| StorageError::Serialization("lesson_id sign overflow".into()))
}

pub(crate) fn map_profile_row(row: &sqlx::sqlite::SqliteRow) -> Result<ProfileRecord, StorageError> {
    let id: String = row.try_get("id").map_err(ser)?;
    let xp: i64 = row.try_get("xp").map_err(ser)?;
    let streak: i64 = row.try_get("streak").map_err(ser)?;

    Ok(ProfileRecord {
        identity_id: identity_from_text(&id)?,
        score: u64::try_from(xp)
            .map_err(|_| StorageError::Serialization(format!("invalid xp: {xp}")))?,
        streak: u32::try_from(streak)
            .map_err(|_| StorageError::Serialization(format!("invalid streak: {streak}")))?,
        last_updated: row.try_get("streak_last_updated").map_err(ser)?,
    })
}
