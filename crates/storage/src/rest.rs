//! Record store backed by a PostgREST-style HTTP API (for example a hosted
//! Supabase project exposing `profiles` and `completed_lessons`).

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lesson_core::model::{IdentityId, LessonId};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::repository::{
    CompletionRecord, CompletionRepository, ProfileRecord, ProfileRepository, ProfileUpdate,
    Storage, StorageError,
};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RestInitError {
    #[error("invalid record store url: {0}")]
    InvalidUrl(String),
    #[error(transparent)]
    Client(#[from] reqwest::Error),
}

#[derive(Clone, Debug)]
pub struct RestConfig {
    pub base_url: String,
    pub api_key: String,
    /// Bearer token for row-level security; falls back to `api_key`.
    pub access_token: Option<String>,
    pub timeout: Duration,
}

impl RestConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            access_token: None,
            timeout: Duration::from_secs(10),
        }
    }

    #[must_use]
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }
}

#[derive(Clone)]
pub struct PostgrestRepository {
    client: Client,
    base: Url,
    config: RestConfig,
}

impl PostgrestRepository {
    /// Build a client for the given project.
    ///
    /// # Errors
    ///
    /// Returns `RestInitError::InvalidUrl` if `base_url` cannot be parsed and
    /// `RestInitError::Client` if the HTTP client cannot be built.
    pub fn new(config: RestConfig) -> Result<Self, RestInitError> {
        let base = table_base(&config.base_url)?;
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            base,
            config,
        })
    }

    fn table_url(&self, table: &str) -> Result<Url, StorageError> {
        self.base
            .join(table)
            .map_err(|e| StorageError::Serialization(e.to_string()))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let token = self
            .config
            .access_token
            .as_deref()
            .unwrap_or(&self.config.api_key);
        request
            .header("apikey", &self.config.api_key)
            .bearer_auth(token)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, StorageError> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(status_error(status, message))
    }
}

/// `https://x.supabase.co` -> `https://x.supabase.co/rest/v1/`
fn table_base(raw: &str) -> Result<Url, RestInitError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(RestInitError::InvalidUrl(raw.to_string()));
    }
    let with_path = if trimmed.ends_with("/rest/v1") {
        format!("{trimmed}/")
    } else {
        format!("{trimmed}/rest/v1/")
    };
    Url::parse(&with_path).map_err(|e| RestInitError::InvalidUrl(format!("{raw}: {e}")))
}

fn status_error(status: StatusCode, message: String) -> StorageError {
    match status {
        StatusCode::CONFLICT => StorageError::Conflict,
        StatusCode::NOT_FOUND => StorageError::NotFound,
        other => StorageError::Rejected {
            status: other.as_u16(),
            message,
        },
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ProfileRow {
    id: IdentityId,
    #[serde(default)]
    xp: Option<u64>,
    #[serde(default)]
    streak: Option<u32>,
    #[serde(default)]
    streak_last_updated: Option<DateTime<Utc>>,
}

impl ProfileRow {
    fn into_record(self) -> ProfileRecord {
        // Hosted rows created by the sign-up trigger may leave counters null.
        ProfileRecord {
            identity_id: self.id,
            score: self.xp.unwrap_or(0),
            streak: self.streak.unwrap_or(0),
            last_updated: self.streak_last_updated,
        }
    }
}

#[derive(Debug, Serialize)]
struct CompletionRow {
    user_id: IdentityId,
    lesson_id: LessonId,
    score: u32,
    completed_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct CompletionIdRow {
    lesson_id: LessonId,
}

#[async_trait]
impl ProfileRepository for PostgrestRepository {
    async fn get_profile(
        &self,
        identity: IdentityId,
    ) -> Result<Option<ProfileRecord>, StorageError> {
        let url = self.table_url("profiles")?;
        let request = self.client.get(url).query(&[
            ("id", format!("eq.{identity}")),
            ("select", "id,xp,streak,streak_last_updated".to_string()),
        ]);
        let rows: Vec<ProfileRow> = self
            .send(request)
            .await?
            .json()
            .await
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        Ok(rows.into_iter().next().map(ProfileRow::into_record))
    }

    async fn upsert_profile(
        &self,
        identity: IdentityId,
        update: &ProfileUpdate,
    ) -> Result<(), StorageError> {
        let url = self.table_url("profiles")?;
        let body = ProfileRow {
            id: identity,
            xp: Some(update.score),
            streak: Some(update.streak),
            streak_last_updated: Some(update.last_updated),
        };
        let request = self
            .client
            .post(url)
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&[body]);
        self.send(request).await?;
        Ok(())
    }
}

#[async_trait]
impl CompletionRepository for PostgrestRepository {
    async fn insert_completion(&self, record: &CompletionRecord) -> Result<(), StorageError> {
        let url = self.table_url("completed_lessons")?;
        let body = CompletionRow {
            user_id: record.identity_id,
            lesson_id: record.lesson_id,
            score: record.points,
            completed_at: record.completed_at,
        };
        let request = self
            .client
            .post(url)
            .header("Prefer", "return=minimal")
            .json(&body);
        self.send(request).await?;
        Ok(())
    }

    async fn list_completions(
        &self,
        identity: IdentityId,
    ) -> Result<BTreeSet<LessonId>, StorageError> {
        let url = self.table_url("completed_lessons")?;
        let request = self.client.get(url).query(&[
            ("user_id", format!("eq.{identity}")),
            ("select", "lesson_id".to_string()),
        ]);
        let rows: Vec<CompletionIdRow> = self
            .send(request)
            .await?
            .json()
            .await
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        Ok(rows.into_iter().map(|r| r.lesson_id).collect())
    }
}

impl Storage {
    /// Build a `Storage` backed by a PostgREST-compatible HTTP API.
    ///
    /// Hosted projects manage sign-in themselves, so local accounts stay in
    /// process memory.
    ///
    /// # Errors
    ///
    /// Returns `RestInitError` if the configuration is unusable.
    pub fn rest(config: RestConfig) -> Result<Self, RestInitError> {
        Ok(Self::from_repository(PostgrestRepository::new(config)?))
    }
}
