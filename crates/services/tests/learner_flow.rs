use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use lesson_core::model::{IdentityId, LessonId};
use lesson_core::time::{fixed_clock, fixed_now};
use lesson_core::{Catalog, ProgressLedger, QuizState};
use services::{
    AdvanceOutcome, AppConfig, AppServices, AuthError, AuthProvider, Clock, Hydration,
    LearnerError, LearnerSession, LocalAuthProvider, StoreBackend,
};
use storage::repository::{
    CompletionRecord, CompletionRepository, InMemoryRepository, ProfileRecord, ProfileRepository,
    ProfileUpdate, Storage, StorageError,
};

const COST: u32 = 4;

fn session_over(storage: &Storage, auth: Arc<dyn AuthProvider>) -> LearnerSession {
    LearnerSession::new(Arc::new(Catalog::builtin()), auth, storage, fixed_clock())
}

fn fresh_auth() -> Arc<dyn AuthProvider> {
    Arc::new(LocalAuthProvider::new(COST))
}

/// Writes always fail; reads behave like an empty store.
#[derive(Clone, Default)]
struct ReadOnlyStore;

#[async_trait]
impl ProfileRepository for ReadOnlyStore {
    async fn get_profile(&self, _: IdentityId) -> Result<Option<ProfileRecord>, StorageError> {
        Ok(None)
    }

    async fn upsert_profile(&self, _: IdentityId, _: &ProfileUpdate) -> Result<(), StorageError> {
        Err(StorageError::Rejected {
            status: 403,
            message: "row-level security".into(),
        })
    }
}

#[async_trait]
impl CompletionRepository for ReadOnlyStore {
    async fn insert_completion(&self, _: &CompletionRecord) -> Result<(), StorageError> {
        Err(StorageError::Connection("connection reset".into()))
    }

    async fn list_completions(&self, _: IdentityId) -> Result<BTreeSet<LessonId>, StorageError> {
        Ok(BTreeSet::new())
    }
}

#[tokio::test]
async fn two_question_lesson_awards_points_once() {
    let repo = InMemoryRepository::new();
    let storage = Storage::from_repository(repo.clone());
    let mut learner = session_over(&storage, fresh_auth());
    learner
        .sign_up("ada@example.com", "secret1", "Ada")
        .await
        .unwrap();
    let who = learner.identity().unwrap().id;

    let lesson = LessonId::new(1);
    let state = learner.open_lesson(lesson).unwrap();
    assert_eq!(
        state,
        QuizState::Answering {
            lesson_id: lesson,
            question: 0
        }
    );
    assert!(learner.quiz().shows_story());

    // Correct answer on the first question.
    assert!(learner.select_answer(2).unwrap().is_correct());
    assert!(matches!(
        learner.advance().unwrap(),
        AdvanceOutcome::Next { question: 1 }
    ));
    assert!(!learner.quiz().shows_story());

    // Wrong answer on the second still completes the lesson.
    let outcome = learner.select_answer(0).unwrap();
    assert!(!outcome.is_correct());
    assert_eq!(outcome.correct, 1);

    let AdvanceOutcome::Completed { event, persist } = learner.advance().unwrap() else {
        panic!("last question should complete the lesson");
    };
    assert_eq!(event.lesson_id, lesson);
    assert_eq!(event.points, 100);
    assert!(learner.quiz_state().is_idle());
    assert_eq!(learner.ledger().score(), 100);
    assert_eq!(learner.ledger().streak(), 1);
    assert!(learner.ledger().is_completed(lesson));

    assert!(persist.unwrap().join().await.is_complete());
    assert_eq!(repo.completion_records(who).unwrap().len(), 1);
    let profile = repo.get_profile(who).await.unwrap().unwrap();
    assert_eq!((profile.score, profile.streak), (100, 1));

    // Reopening is refused and the ledger does not move.
    let err = learner.open_lesson(lesson).unwrap_err();
    assert!(matches!(err, LearnerError::Quiz(_)));
    assert_eq!(learner.ledger().score(), 100);
}

#[tokio::test]
async fn sign_out_mid_lesson_discards_attempt_and_progress() {
    let auth = fresh_auth();
    let storage = Storage::in_memory();
    let mut learner = session_over(&storage, Arc::clone(&auth));
    learner
        .sign_up("bea@example.com", "secret1", "Bea")
        .await
        .unwrap();

    learner.open_lesson(LessonId::new(2)).unwrap();
    learner.select_answer(2).unwrap();
    learner.advance().unwrap();
    learner.open_lesson(LessonId::new(1)).unwrap();
    learner.select_answer(2).unwrap();
    learner.advance().unwrap();
    assert!(matches!(
        learner.quiz_state(),
        QuizState::Answering { question: 1, .. }
    ));

    learner.sign_out().await;
    assert!(learner.quiz_state().is_idle());
    assert_eq!(learner.ledger(), &ProgressLedger::default());
    assert!(learner.identity().is_none());
    assert!(auth.current_session().await.is_none());

    let err = learner.open_lesson(LessonId::new(1)).unwrap_err();
    assert!(matches!(err, LearnerError::SignedOut));
}

#[tokio::test]
async fn progress_is_restored_on_next_sign_in() {
    let auth = fresh_auth();
    let storage = Storage::in_memory();
    let mut learner = session_over(&storage, Arc::clone(&auth));
    learner
        .sign_up("cal@example.com", "secret1", "Cal")
        .await
        .unwrap();

    for (lesson, answer) in [(2, 2), (3, 1)] {
        learner.open_lesson(LessonId::new(lesson)).unwrap();
        learner.select_answer(answer).unwrap();
        if let AdvanceOutcome::Completed {
            persist: Some(handle),
            ..
        } = learner.advance().unwrap()
        {
            assert!(handle.join().await.is_complete());
        }
    }
    learner.sign_out().await;

    let hydration = learner
        .sign_in("cal@example.com", "secret1")
        .await
        .unwrap();
    assert_eq!(hydration, Some(Hydration::Restored));
    assert_eq!(learner.ledger().score(), 200);
    assert_eq!(learner.ledger().streak(), 2);
    let completed: Vec<_> = learner
        .lesson_cards()
        .into_iter()
        .filter(|c| c.completed)
        .map(|c| c.id.value())
        .collect();
    assert_eq!(completed, vec![2, 3]);
}

#[tokio::test]
async fn failed_writes_never_roll_back_local_progress() {
    let storage = Storage::from_repository(ReadOnlyStore);
    let mut learner = session_over(&storage, fresh_auth());
    let hydration = learner
        .sign_up("dot@example.com", "secret1", "Dot")
        .await
        .unwrap();
    assert_eq!(hydration, Some(Hydration::MissingProfile));
    assert_eq!(learner.ledger().score(), 0);

    learner.open_lesson(LessonId::new(3)).unwrap();
    learner.select_answer(0).unwrap();
    let AdvanceOutcome::Completed { persist, .. } = learner.advance().unwrap() else {
        panic!("single-question lesson should complete");
    };
    let outcome = persist.unwrap().join().await;
    assert!(!outcome.completion_recorded);
    assert!(!outcome.profile_updated);

    assert_eq!(learner.ledger().score(), 100);
    assert_eq!(learner.ledger().streak(), 1);
    assert!(learner.ledger().is_completed(LessonId::new(3)));
}

#[tokio::test]
async fn blank_credentials_leave_state_untouched() {
    let mut learner = session_over(&Storage::in_memory(), fresh_auth());
    let err = learner.sign_in("", "secret1").await.unwrap_err();
    assert!(matches!(err, LearnerError::Auth(AuthError::MissingFields)));
    assert_eq!(err.to_string(), "Please fill in all fields");

    let err = learner
        .sign_up("eve@example.com", "secret1", " ")
        .await
        .unwrap_err();
    assert!(matches!(err, LearnerError::Auth(AuthError::MissingFields)));
    assert!(learner.identity().is_none());
    assert_eq!(learner.ledger(), &ProgressLedger::default());
}

#[tokio::test]
async fn second_session_restores_existing_sign_in() {
    let auth = fresh_auth();
    let storage = Storage::in_memory();
    let mut first = session_over(&storage, Arc::clone(&auth));
    first
        .sign_up("fay@example.com", "secret1", "Fay")
        .await
        .unwrap();
    first.open_lesson(LessonId::new(2)).unwrap();
    first.select_answer(2).unwrap();
    if let AdvanceOutcome::Completed {
        persist: Some(handle),
        ..
    } = first.advance().unwrap()
    {
        handle.join().await;
    }

    let mut second = session_over(&storage, auth);
    assert_eq!(second.restore_session().await, Some(Hydration::Restored));
    assert_eq!(second.ledger().score(), 100);
    assert!(second.ledger().is_completed(LessonId::new(2)));
}

#[tokio::test]
async fn app_services_run_against_shared_sqlite() {
    // A file database so the two background writes can overlap under WAL.
    let path = std::env::temp_dir().join(format!("secured-{}.sqlite3", IdentityId::random()));
    let config = AppConfig {
        store: StoreBackend::Sqlite {
            url: format!("sqlite://{}?mode=rwc", path.display()),
        },
        catalog_path: None,
        bcrypt_cost: COST,
        log_filter: String::new(),
    };
    let services = AppServices::build(&config, Clock::fixed(fixed_now()))
        .await
        .expect("build services");
    assert_eq!(services.catalog().len(), 3);

    let mut learner = services.learner_session();
    learner
        .sign_up("gus@example.com", "secret1", "Gus")
        .await
        .unwrap();
    let who = learner.identity().unwrap().id;

    learner.open_lesson(LessonId::new(3)).unwrap();
    learner.select_answer(1).unwrap();
    let AdvanceOutcome::Completed { persist, .. } = learner.advance().unwrap() else {
        panic!("single-question lesson should complete");
    };
    assert!(persist.unwrap().join().await.is_complete());

    let storage = services.storage();
    let profile = storage.profiles.get_profile(who).await.unwrap().unwrap();
    assert_eq!(profile.score, 100);
    assert_eq!(profile.last_updated, Some(fixed_now()));
    let ids = storage.completions.list_completions(who).await.unwrap();
    assert!(ids.contains(&LessonId::new(3)));

    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn progress_survives_rebuilding_services_over_the_same_database() {
    let path = std::env::temp_dir().join(format!("secured-{}.sqlite3", IdentityId::random()));
    let config = AppConfig {
        store: StoreBackend::Sqlite {
            url: format!("sqlite://{}?mode=rwc", path.display()),
        },
        catalog_path: None,
        bcrypt_cost: COST,
        log_filter: String::new(),
    };

    let services = AppServices::build(&config, Clock::fixed(fixed_now()))
        .await
        .expect("build services");
    let mut learner = services.learner_session();
    learner
        .sign_up("hal@example.com", "secret1", "Hal")
        .await
        .unwrap();
    let who = learner.identity().unwrap().id;
    learner.open_lesson(LessonId::new(3)).unwrap();
    learner.select_answer(1).unwrap();
    let AdvanceOutcome::Completed { persist, .. } = learner.advance().unwrap() else {
        panic!("single-question lesson should complete");
    };
    assert!(persist.unwrap().join().await.is_complete());
    drop(learner);
    drop(services);

    let services = AppServices::build(&config, Clock::fixed(fixed_now()))
        .await
        .expect("rebuild services");
    let mut learner = services.learner_session();
    let hydration = learner
        .sign_in("hal@example.com", "secret1")
        .await
        .unwrap();
    assert_eq!(hydration, Some(Hydration::Restored));
    assert_eq!(learner.identity().unwrap().id, who);
    assert_eq!(learner.ledger().score(), 100);
    assert!(learner.ledger().is_completed(LessonId::new(3)));

    let err = learner
        .sign_up("hal@example.com", "other12", "Hal")
        .await
        .unwrap_err();
    assert!(matches!(err, LearnerError::Auth(AuthError::AlreadyRegistered)));

    let _ = std::fs::remove_file(&path);
}
