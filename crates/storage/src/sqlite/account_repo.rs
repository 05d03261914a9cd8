use async_trait::async_trait;
use lesson_core::model::Identity;
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{identity_from_text, identity_to_text, ser, write_error};
use crate::repository::{AccountRecord, AccountRepository, StorageError};

#[async_trait]
impl AccountRepository for SqliteRepository {
    async fn get_account(&self, login: &str) -> Result<Option<AccountRecord>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT login, user_id, email, display_name, password_hash
            FROM accounts
            WHERE login = ?1
            ",
        )
        .bind(login)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let user_id: String = row.try_get("user_id").map_err(ser)?;
        let email: String = row.try_get("email").map_err(ser)?;
        let display_name: String = row.try_get("display_name").map_err(ser)?;
        Ok(Some(AccountRecord {
            login: row.try_get("login").map_err(ser)?,
            identity: Identity::new(identity_from_text(&user_id)?, display_name, email),
            password_hash: row.try_get("password_hash").map_err(ser)?,
        }))
    }

    async fn insert_account(&self, account: &AccountRecord) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO accounts (login, user_id, email, display_name, password_hash)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ",
        )
        .bind(&account.login)
        .bind(identity_to_text(account.identity.id))
        .bind(&account.identity.email)
        .bind(&account.identity.display_name)
        .bind(&account.password_hash)
        .execute(&self.pool)
        .await
        .map_err(write_error)?;

        Ok(())
    }
}
