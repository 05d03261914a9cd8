//! Keeps the progress ledger in step with the identity lifecycle and the record store.

use std::collections::BTreeSet;
use std::sync::Arc;

use lesson_core::model::{Identity, IdentityId, LessonCompleted, LessonId};
use lesson_core::{Clock, ProgressLedger};
use storage::repository::{
    CompletionRecord, CompletionRepository, ProfileRecord, ProfileRepository, ProfileUpdate,
    Storage, StorageError,
};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::auth::AuthProvider;

/// How a newly established identity's ledger was initialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hydration {
    /// Profile and completions were loaded from the record store.
    Restored,
    /// No profile exists yet; the ledger starts at zero.
    MissingProfile,
    /// The store could not be read; the ledger starts at zero.
    LoadFailed,
}

/// Result of the two background writes issued for one completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistOutcome {
    pub completion_recorded: bool,
    pub profile_updated: bool,
}

impl PersistOutcome {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.completion_recorded && self.profile_updated
    }
}

/// Handles to the fire-and-forget writes for one completion.
///
/// Dropping the handle does not cancel the writes.
#[derive(Debug)]
pub struct PersistHandle {
    completion: JoinHandle<Result<(), StorageError>>,
    profile: JoinHandle<Result<(), StorageError>>,
}

impl PersistHandle {
    /// Wait for both writes. Failures were already logged by the tasks.
    pub async fn join(self) -> PersistOutcome {
        PersistOutcome {
            completion_recorded: joined(self.completion.await),
            profile_updated: joined(self.profile.await),
        }
    }
}

fn joined(result: Result<Result<(), StorageError>, tokio::task::JoinError>) -> bool {
    match result {
        Ok(Ok(())) => true,
        Ok(Err(_)) => false,
        Err(err) => {
            tracing::error!(error = %err, "progress write task did not finish");
            false
        }
    }
}

/// Orders profile snapshots for one identity.
///
/// Each snapshot gets a sequence number when it is taken. The write task holds the
/// lock across its upsert and skips a snapshot older than one already stored, so
/// the last value to land is always the newest.
#[derive(Clone, Default)]
struct ProfileWrites {
    stored: Arc<Mutex<u64>>,
    taken: u64,
}

impl ProfileWrites {
    fn next(&mut self) -> (u64, Arc<Mutex<u64>>) {
        self.taken += 1;
        (self.taken, Arc::clone(&self.stored))
    }
}

/// Sole writer of the progress ledger.
///
/// Every mutator takes `&mut self`, so hydration and completion handling run to
/// completion one at a time and never interleave.
pub struct SessionSynchronizer {
    auth: Arc<dyn AuthProvider>,
    profiles: Arc<dyn ProfileRepository>,
    completions: Arc<dyn CompletionRepository>,
    clock: Clock,
    identity: Option<Identity>,
    ledger: ProgressLedger,
    profile_writes: ProfileWrites,
}

impl SessionSynchronizer {
    #[must_use]
    pub fn new(auth: Arc<dyn AuthProvider>, storage: &Storage, clock: Clock) -> Self {
        Self {
            auth,
            profiles: Arc::clone(&storage.profiles),
            completions: Arc::clone(&storage.completions),
            clock,
            identity: None,
            ledger: ProgressLedger::new(),
            profile_writes: ProfileWrites::default(),
        }
    }

    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    #[must_use]
    pub fn ledger(&self) -> &ProgressLedger {
        &self.ledger
    }

    /// Bind the session to `identity` and restore its progress.
    ///
    /// A new identity gets a fresh ledger; values from a previous identity are
    /// never carried over. The identity already bound (a token refresh) keeps its
    /// ledger and only merges in what the store knows, so unsaved completions
    /// survive. Missing or unreadable progress is logged and the session
    /// continues with whatever the ledger holds.
    pub async fn identity_established(&mut self, identity: Identity) -> Hydration {
        let id = identity.id;
        let refresh = self.identity.as_ref().is_some_and(|current| current.id == id);
        self.identity = Some(identity);
        if !refresh {
            self.ledger = ProgressLedger::new();
            self.profile_writes = ProfileWrites::default();
        }

        match self.load(id).await {
            Ok(Some((profile, completed))) => {
                let completed_ids = completed.iter().copied();
                if refresh {
                    self.ledger
                        .merge(profile.score, profile.streak, completed_ids);
                } else {
                    self.ledger
                        .hydrate(profile.score, profile.streak, completed_ids);
                }
                tracing::info!(
                    identity = %id,
                    score = profile.score,
                    streak = profile.streak,
                    completed = completed.len(),
                    "restored progress"
                );
                Hydration::Restored
            }
            Ok(None) => {
                tracing::warn!(identity = %id, "no profile found for user");
                Hydration::MissingProfile
            }
            Err(err) => {
                tracing::warn!(identity = %id, error = %err, "failed to load user progress");
                Hydration::LoadFailed
            }
        }
    }

    async fn load(
        &self,
        id: IdentityId,
    ) -> Result<Option<(ProfileRecord, BTreeSet<LessonId>)>, StorageError> {
        let Some(profile) = self.profiles.get_profile(id).await? else {
            return Ok(None);
        };
        let completed = self.completions.list_completions(id).await?;
        Ok(Some((profile, completed)))
    }

    /// Drop the identity and clear local progress. Never touches the store.
    pub fn identity_cleared(&mut self) {
        if let Some(identity) = self.identity.take() {
            tracing::info!(identity = %identity.id, "session cleared");
        }
        self.ledger.reset();
    }

    /// Clear local progress and end the session with the auth collaborator.
    ///
    /// Writes already in flight for the old identity are left to finish.
    pub async fn sign_out(&mut self) {
        self.identity_cleared();
        self.auth.sign_out().await;
    }

    /// Dispatch an auth notification.
    ///
    /// Returns the hydration result when an identity was established.
    pub async fn handle_identity_change(&mut self, change: Option<Identity>) -> Option<Hydration> {
        match change {
            Some(identity) => Some(self.identity_established(identity).await),
            None => {
                self.identity_cleared();
                None
            }
        }
    }

    /// Apply a completion locally, then persist it in the background.
    ///
    /// Returns `None` when nothing was persisted: the lesson was already in the
    /// ledger, or no identity is bound. Remote failures are logged by the write
    /// tasks and never roll the ledger back.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn record_completion(&mut self, event: LessonCompleted) -> Option<PersistHandle> {
        let Some(identity) = self.identity.as_ref().map(|i| i.id) else {
            tracing::warn!(lesson = %event.lesson_id, "completion ignored without a signed-in user");
            return None;
        };

        if !self.ledger.apply(&event) {
            tracing::debug!(lesson = %event.lesson_id, "lesson already completed; nothing to persist");
            return None;
        }

        let now = self.clock.now();
        tracing::info!(
            identity = %identity,
            lesson = %event.lesson_id,
            points = event.points,
            score = self.ledger.score(),
            streak = self.ledger.streak(),
            "lesson completed"
        );

        let record = CompletionRecord {
            identity_id: identity,
            lesson_id: event.lesson_id,
            points: event.points,
            completed_at: now,
        };
        let update = ProfileUpdate::from_ledger(&self.ledger, now);

        let completions = Arc::clone(&self.completions);
        let completion = tokio::spawn(async move {
            let result = completions.insert_completion(&record).await;
            match &result {
                Ok(()) => {}
                Err(StorageError::Conflict) => tracing::warn!(
                    identity = %record.identity_id,
                    lesson = %record.lesson_id,
                    "completion was already recorded"
                ),
                Err(err) => tracing::error!(
                    identity = %record.identity_id,
                    lesson = %record.lesson_id,
                    error = %err,
                    "error recording completed lesson"
                ),
            }
            result
        });

        let profiles = Arc::clone(&self.profiles);
        let (seq, stored) = self.profile_writes.next();
        let profile = tokio::spawn(async move {
            let mut stored = stored.lock().await;
            if seq < *stored {
                tracing::debug!(identity = %identity, seq, "newer progress already saved");
                return Ok(());
            }
            let result = profiles.upsert_profile(identity, &update).await;
            match &result {
                Ok(()) => *stored = seq,
                Err(err) => {
                    tracing::error!(identity = %identity, error = %err, "error updating progress");
                }
            }
            result
        });

        Some(PersistHandle {
            completion,
            profile,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::LocalAuthProvider;
    use async_trait::async_trait;
    use lesson_core::time::{fixed_clock, fixed_now};
    use storage::repository::InMemoryRepository;

    /// Record store whose every call fails.
    #[derive(Clone)]
    struct Unreachable;

    #[async_trait]
    impl ProfileRepository for Unreachable {
        async fn get_profile(&self, _: IdentityId) -> Result<Option<ProfileRecord>, StorageError> {
            Err(StorageError::Connection("offline".into()))
        }

        async fn upsert_profile(&self, _: IdentityId, _: &ProfileUpdate) -> Result<(), StorageError> {
            Err(StorageError::Connection("offline".into()))
        }
    }

    #[async_trait]
    impl CompletionRepository for Unreachable {
        async fn insert_completion(&self, _: &CompletionRecord) -> Result<(), StorageError> {
            Err(StorageError::Connection("offline".into()))
        }

        async fn list_completions(&self, _: IdentityId) -> Result<BTreeSet<LessonId>, StorageError> {
            Err(StorageError::Connection("offline".into()))
        }
    }

    /// Reads come from `inner`; every write fails.
    #[derive(Clone, Default)]
    struct WritesFail {
        inner: InMemoryRepository,
    }

    #[async_trait]
    impl ProfileRepository for WritesFail {
        async fn get_profile(&self, id: IdentityId) -> Result<Option<ProfileRecord>, StorageError> {
            self.inner.get_profile(id).await
        }

        async fn upsert_profile(&self, _: IdentityId, _: &ProfileUpdate) -> Result<(), StorageError> {
            Err(StorageError::Connection("write refused".into()))
        }
    }

    #[async_trait]
    impl CompletionRepository for WritesFail {
        async fn insert_completion(&self, _: &CompletionRecord) -> Result<(), StorageError> {
            Err(StorageError::Connection("write refused".into()))
        }

        async fn list_completions(&self, id: IdentityId) -> Result<BTreeSet<LessonId>, StorageError> {
            self.inner.list_completions(id).await
        }
    }

    /// In-memory store whose first profile upsert stalls.
    #[derive(Clone, Default)]
    struct SlowFirstUpsert {
        inner: InMemoryRepository,
        upserts: Arc<std::sync::atomic::AtomicUsize>,
    }

    #[async_trait]
    impl ProfileRepository for SlowFirstUpsert {
        async fn get_profile(&self, id: IdentityId) -> Result<Option<ProfileRecord>, StorageError> {
            self.inner.get_profile(id).await
        }

        async fn upsert_profile(
            &self,
            id: IdentityId,
            update: &ProfileUpdate,
        ) -> Result<(), StorageError> {
            let call = self
                .upserts
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if call == 0 {
                tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            }
            self.inner.upsert_profile(id, update).await
        }
    }

    #[async_trait]
    impl CompletionRepository for SlowFirstUpsert {
        async fn insert_completion(&self, record: &CompletionRecord) -> Result<(), StorageError> {
            self.inner.insert_completion(record).await
        }

        async fn list_completions(&self, id: IdentityId) -> Result<BTreeSet<LessonId>, StorageError> {
            self.inner.list_completions(id).await
        }
    }

    fn identity(name: &str) -> Identity {
        Identity::new(IdentityId::random(), name, format!("{name}@example.com"))
    }

    fn done(id: u64) -> LessonCompleted {
        LessonCompleted {
            lesson_id: LessonId::new(id),
            points: 100,
        }
    }

    fn synchronizer(storage: &Storage) -> SessionSynchronizer {
        SessionSynchronizer::new(Arc::new(LocalAuthProvider::new(4)), storage, fixed_clock())
    }

    #[tokio::test]
    async fn restores_profile_and_completions() {
        let repo = InMemoryRepository::new();
        let who = identity("ana");
        repo.upsert_profile(
            who.id,
            &ProfileUpdate {
                score: 200,
                streak: 2,
                last_updated: fixed_now(),
            },
        )
        .await
        .unwrap();
        for lesson in [1, 3] {
            repo.insert_completion(&CompletionRecord {
                identity_id: who.id,
                lesson_id: LessonId::new(lesson),
                points: 100,
                completed_at: fixed_now(),
            })
            .await
            .unwrap();
        }

        let mut sync = synchronizer(&Storage::from_repository(repo));
        assert_eq!(sync.identity_established(who).await, Hydration::Restored);
        assert_eq!(sync.ledger().score(), 200);
        assert_eq!(sync.ledger().streak(), 2);
        assert!(sync.ledger().is_completed(LessonId::new(3)));
    }

    #[tokio::test]
    async fn missing_profile_leaves_defaults() {
        let mut sync = synchronizer(&Storage::in_memory());
        let hydration = sync.identity_established(identity("new")).await;
        assert_eq!(hydration, Hydration::MissingProfile);
        assert_eq!(sync.ledger(), &ProgressLedger::default());
        assert!(sync.identity().is_some());
    }

    #[tokio::test]
    async fn unreadable_store_is_not_fatal() {
        let mut sync = synchronizer(&Storage::from_repository(Unreachable));
        let hydration = sync.identity_established(identity("offline")).await;
        assert_eq!(hydration, Hydration::LoadFailed);
        assert_eq!(sync.ledger().score(), 0);
    }

    #[tokio::test]
    async fn completion_is_persisted_once() {
        let repo = InMemoryRepository::new();
        let who = identity("bo");
        let mut sync = synchronizer(&Storage::from_repository(repo.clone()));
        sync.identity_established(who.clone()).await;

        let outcome = sync.record_completion(done(1)).unwrap().join().await;
        assert!(outcome.is_complete());
        assert!(sync.record_completion(done(1)).is_none());

        assert_eq!(repo.completion_records(who.id).unwrap().len(), 1);
        let profile = repo.get_profile(who.id).await.unwrap().unwrap();
        assert_eq!(profile.score, 100);
        assert_eq!(profile.streak, 1);
        assert_eq!(profile.last_updated, Some(fixed_now()));
    }

    #[tokio::test]
    async fn failed_writes_keep_local_progress() {
        let mut sync = synchronizer(&Storage::from_repository(Unreachable));
        sync.identity_established(identity("cy")).await;

        let outcome = sync.record_completion(done(2)).unwrap().join().await;
        assert!(!outcome.completion_recorded);
        assert!(!outcome.profile_updated);
        assert_eq!(sync.ledger().score(), 100);
        assert!(sync.ledger().is_completed(LessonId::new(2)));
    }

    #[tokio::test]
    async fn completion_without_identity_is_dropped() {
        let mut sync = synchronizer(&Storage::in_memory());
        assert!(sync.record_completion(done(1)).is_none());
        assert_eq!(sync.ledger().score(), 0);
    }

    #[tokio::test]
    async fn switching_identity_builds_a_fresh_ledger() {
        let repo = InMemoryRepository::new();
        let mut sync = synchronizer(&Storage::from_repository(repo.clone()));

        let first = identity("first");
        sync.identity_established(first.clone()).await;
        let pending = sync.record_completion(done(1)).unwrap();

        let second = identity("second");
        let hydration = sync.handle_identity_change(Some(second)).await;
        assert_eq!(hydration, Some(Hydration::MissingProfile));
        assert_eq!(sync.ledger(), &ProgressLedger::default());

        // The earlier write still lands on the first identity's records.
        assert!(pending.join().await.is_complete());
        assert_eq!(repo.get_profile(first.id).await.unwrap().unwrap().score, 100);
        assert_eq!(sync.ledger().score(), 0);
    }

    #[tokio::test]
    async fn sign_out_clears_ledger_and_session() {
        let auth = Arc::new(LocalAuthProvider::new(4));
        auth.sign_up("dee@example.com", "secret1", "Dee").await.unwrap();
        let storage = Storage::in_memory();
        let mut sync = SessionSynchronizer::new(auth.clone(), &storage, fixed_clock());

        let who = auth.current_session().await.unwrap();
        sync.identity_established(who).await;
        sync.record_completion(done(3)).unwrap().join().await;

        sync.sign_out().await;
        assert!(sync.identity().is_none());
        assert_eq!(sync.ledger(), &ProgressLedger::default());
        assert!(auth.current_session().await.is_none());
    }

    #[tokio::test]
    async fn refresh_for_same_identity_keeps_unsaved_progress() {
        let repo = WritesFail::default();
        let who = identity("eli");
        repo.inner
            .upsert_profile(
                who.id,
                &ProfileUpdate {
                    score: 100,
                    streak: 1,
                    last_updated: fixed_now(),
                },
            )
            .await
            .unwrap();

        let mut sync = synchronizer(&Storage::from_repository(repo));
        assert_eq!(sync.identity_established(who.clone()).await, Hydration::Restored);

        let outcome = sync.record_completion(done(3)).unwrap().join().await;
        assert!(!outcome.profile_updated);
        assert_eq!(sync.ledger().score(), 200);

        let hydration = sync.handle_identity_change(Some(who)).await;
        assert_eq!(hydration, Some(Hydration::Restored));
        assert_eq!(sync.ledger().score(), 200);
        assert_eq!(sync.ledger().streak(), 2);
        assert!(sync.ledger().is_completed(LessonId::new(3)));
        assert!(sync.record_completion(done(3)).is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn profile_snapshots_land_in_completion_order() {
        let repo = SlowFirstUpsert::default();
        let who = identity("fin");
        let mut sync = synchronizer(&Storage::from_repository(repo.clone()));
        sync.identity_established(who.clone()).await;

        let first = sync.record_completion(done(2)).unwrap();
        let second = sync.record_completion(done(3)).unwrap();
        assert!(first.join().await.is_complete());
        assert!(second.join().await.is_complete());

        let profile = repo.inner.get_profile(who.id).await.unwrap().unwrap();
        assert_eq!(profile.score, 200);
        assert_eq!(profile.streak, 2);
    }
}
