use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lesson_core::ProgressLedger;
use lesson_core::model::{Identity, IdentityId, LessonId};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by record store adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("remote store rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
}

/// Persisted progress for one identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileRecord {
    pub identity_id: IdentityId,
    pub score: u64,
    pub streak: u32,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Values written to a profile after a completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub score: u64,
    pub streak: u32,
    pub last_updated: DateTime<Utc>,
}

impl ProfileUpdate {
    #[must_use]
    pub fn from_ledger(ledger: &ProgressLedger, now: DateTime<Utc>) -> Self {
        Self {
            score: ledger.score(),
            streak: ledger.streak(),
            last_updated: now,
        }
    }
}

/// One finished lesson for one identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRecord {
    pub identity_id: IdentityId,
    pub lesson_id: LessonId,
    pub points: u32,
    pub completed_at: DateTime<Utc>,
}

/// A locally managed sign-in account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRecord {
    /// Normalized (trimmed, lowercased) email used for lookups.
    pub login: String,
    pub identity: Identity,
    pub password_hash: String,
}

/// Accounts for the in-process auth provider.
#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be queried.
    async fn get_account(&self, login: &str) -> Result<Option<AccountRecord>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the login is taken, or other storage errors.
    async fn insert_account(&self, account: &AccountRecord) -> Result<(), StorageError>;
}

/// Profile half of the record store contract.
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    /// Fetch the profile for an identity.
    ///
    /// Returns `Ok(None)` when no profile has been created yet.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be queried.
    async fn get_profile(&self, identity: IdentityId)
    -> Result<Option<ProfileRecord>, StorageError>;

    /// Create or overwrite score, streak and timestamp for an identity.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the write fails.
    async fn upsert_profile(
        &self,
        identity: IdentityId,
        update: &ProfileUpdate,
    ) -> Result<(), StorageError>;
}

/// Completion half of the record store contract.
#[async_trait]
pub trait CompletionRepository: Send + Sync {
    /// Record a completed lesson.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the identity already completed the lesson,
    /// or other storage errors.
    async fn insert_completion(&self, record: &CompletionRecord) -> Result<(), StorageError>;

    /// Ids of every lesson the identity has completed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be queried.
    async fn list_completions(
        &self,
        identity: IdentityId,
    ) -> Result<BTreeSet<LessonId>, StorageError>;
}

/// Simple in-memory record store for tests and offline use.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    profiles: Arc<Mutex<HashMap<IdentityId, ProfileRecord>>>,
    completions: Arc<Mutex<Vec<CompletionRecord>>>,
    accounts: Arc<Mutex<HashMap<String, AccountRecord>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every completion row for an identity, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn completion_records(
        &self,
        identity: IdentityId,
    ) -> Result<Vec<CompletionRecord>, StorageError> {
        let guard = self
            .completions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard
            .iter()
            .filter(|r| r.identity_id == identity)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ProfileRepository for InMemoryRepository {
    async fn get_profile(
        &self,
        identity: IdentityId,
    ) -> Result<Option<ProfileRecord>, StorageError> {
        let guard = self
            .profiles
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(&identity).cloned())
    }

    async fn upsert_profile(
        &self,
        identity: IdentityId,
        update: &ProfileUpdate,
    ) -> Result<(), StorageError> {
        let mut guard = self
            .profiles
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(
            identity,
            ProfileRecord {
                identity_id: identity,
                score: update.score,
                streak: update.streak,
                last_updated: Some(update.last_updated),
            },
        );
        Ok(())
    }
}

#[async_trait]
impl CompletionRepository for InMemoryRepository {
    async fn insert_completion(&self, record: &CompletionRecord) -> Result<(), StorageError> {
        let mut guard = self
            .completions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        if guard
            .iter()
            .any(|r| r.identity_id == record.identity_id && r.lesson_id == record.lesson_id)
        {
            return Err(StorageError::Conflict);
        }
        guard.push(record.clone());
        Ok(())
    }

    async fn list_completions(
        &self,
        identity: IdentityId,
    ) -> Result<BTreeSet<LessonId>, StorageError> {
        let guard = self
            .completions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard
            .iter()
            .filter(|r| r.identity_id == identity)
            .map(|r| r.lesson_id)
            .collect())
    }
}

#[async_trait]
impl AccountRepository for InMemoryRepository {
    async fn get_account(&self, login: &str) -> Result<Option<AccountRecord>, StorageError> {
        let guard = self
            .accounts
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(login).cloned())
    }

    async fn insert_account(&self, account: &AccountRecord) -> Result<(), StorageError> {
        let mut guard = self
            .accounts
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        if guard.contains_key(&account.login) {
            return Err(StorageError::Conflict);
        }
        guard.insert(account.login.clone(), account.clone());
        Ok(())
    }
}

/// Aggregates the record store halves behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub profiles: Arc<dyn ProfileRepository>,
    pub completions: Arc<dyn CompletionRepository>,
    pub accounts: Arc<dyn AccountRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        Self::from_repository(repo.clone()).with_accounts(Arc::new(repo))
    }

    /// Use one repository value for profiles and completions.
    ///
    /// Accounts start out in process memory; see [`Storage::with_accounts`].
    #[must_use]
    pub fn from_repository<R>(repo: R) -> Self
    where
        R: ProfileRepository + CompletionRepository + Clone + 'static,
    {
        let profiles: Arc<dyn ProfileRepository> = Arc::new(repo.clone());
        let completions: Arc<dyn CompletionRepository> = Arc::new(repo);
        Self {
            profiles,
            completions,
            accounts: Arc::new(InMemoryRepository::new()),
        }
    }

    #[must_use]
    pub fn with_accounts(mut self, accounts: Arc<dyn AccountRepository>) -> Self {
        self.accounts = accounts;
        self
    }
}
