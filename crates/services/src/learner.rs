use std::sync::Arc;

use lesson_core::model::{Identity, LessonCompleted, LessonId, Question};
use lesson_core::{
    Advance, AnswerOutcome, Catalog, Clock, ProgressLedger, QuestionProgress, QuizMachine,
    QuizState,
};
use storage::repository::Storage;
use tokio::sync::{broadcast, watch};

use crate::auth::{AuthProvider, validate_sign_in, validate_sign_up};
use crate::error::LearnerError;
use crate::sync::{Hydration, PersistHandle, SessionSynchronizer};

const EVENT_CAPACITY: usize = 64;

/// Notifications for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LearnerEvent {
    StateChanged(QuizState),
    LedgerChanged(ProgressLedger),
    LessonCompleted(LessonCompleted),
}

/// One row of the lesson list. Completed lessons cannot be reopened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LessonCard {
    pub id: LessonId,
    pub title: String,
    pub description: String,
    pub points: u32,
    pub completed: bool,
}

/// Result of `LearnerSession::advance`.
#[derive(Debug)]
pub enum AdvanceOutcome {
    Next {
        question: usize,
    },
    Completed {
        event: LessonCompleted,
        /// Background writes for the completion; `None` when nothing was persisted.
        persist: Option<PersistHandle>,
    },
}

/// Single writer path for one learner: catalog, quiz machine and progress sync.
pub struct LearnerSession {
    catalog: Arc<Catalog>,
    quiz: QuizMachine,
    sync: SessionSynchronizer,
    auth: Arc<dyn AuthProvider>,
    identity_rx: watch::Receiver<Option<Identity>>,
    events: broadcast::Sender<LearnerEvent>,
}

impl LearnerSession {
    #[must_use]
    pub fn new(
        catalog: Arc<Catalog>,
        auth: Arc<dyn AuthProvider>,
        storage: &Storage,
        clock: Clock,
    ) -> Self {
        let identity_rx = auth.subscribe();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            catalog,
            quiz: QuizMachine::new(),
            sync: SessionSynchronizer::new(Arc::clone(&auth), storage, clock),
            auth,
            identity_rx,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LearnerEvent> {
        self.events.subscribe()
    }

    /// Pick up a session that already existed when this learner session was built.
    pub async fn restore_session(&mut self) -> Option<Hydration> {
        let current = self.identity_rx.borrow_and_update().clone();
        self.apply_identity(current).await
    }

    /// Consume a pending auth notification, if any.
    pub async fn sync_identity(&mut self) -> Option<Hydration> {
        if !self.identity_rx.has_changed().unwrap_or(false) {
            return None;
        }
        let current = self.identity_rx.borrow_and_update().clone();
        self.apply_identity(current).await
    }

    /// React to an identity notification.
    ///
    /// A different identity, or none, discards the open attempt. The same identity
    /// (a token refresh) keeps the attempt and the ledger, merging in stored progress.
    pub async fn handle_identity_change(&mut self, change: Option<Identity>) -> Option<Hydration> {
        self.apply_identity(change).await
    }

    async fn apply_identity(&mut self, change: Option<Identity>) -> Option<Hydration> {
        let same = match (self.sync.identity(), change.as_ref()) {
            (Some(current), Some(next)) => current.id == next.id,
            (None, None) => return None,
            _ => false,
        };
        if !same {
            self.exit_lesson();
        }

        let hydration = self.sync.handle_identity_change(change).await;
        self.emit(LearnerEvent::LedgerChanged(self.sync.ledger().clone()));
        hydration
    }

    /// # Errors
    ///
    /// Returns `LearnerError::Auth` for blank fields or a provider rejection; the
    /// ledger is untouched in that case.
    pub async fn sign_in(
        &mut self,
        email: &str,
        password: &str,
    ) -> Result<Option<Hydration>, LearnerError> {
        validate_sign_in(email, password)?;
        self.auth.sign_in(email, password).await?;
        Ok(self.sync_identity().await)
    }

    /// # Errors
    ///
    /// Returns `LearnerError::Auth` for blank fields or a provider rejection.
    pub async fn sign_up(
        &mut self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<Option<Hydration>, LearnerError> {
        validate_sign_up(email, password, display_name)?;
        self.auth.sign_up(email, password, display_name).await?;
        Ok(self.sync_identity().await)
    }

    /// Discard any attempt, clear progress and end the auth session.
    pub async fn sign_out(&mut self) {
        self.exit_lesson();
        self.sync.sign_out().await;
        // The provider's own notification has been handled here.
        self.identity_rx.borrow_and_update();
        self.emit(LearnerEvent::LedgerChanged(self.sync.ledger().clone()));
    }

    /// # Errors
    ///
    /// Returns `LearnerError::SignedOut` without an identity,
    /// `LearnerError::UnknownLesson` for an id missing from the catalog, and
    /// `LearnerError::Quiz` when the lesson is completed or another attempt is open.
    pub fn open_lesson(&mut self, id: LessonId) -> Result<QuizState, LearnerError> {
        if self.sync.identity().is_none() {
            return Err(LearnerError::SignedOut);
        }
        let lesson = self.catalog.get(id).ok_or(LearnerError::UnknownLesson(id))?;
        let state = self.quiz.open(lesson, self.sync.ledger())?;
        tracing::debug!(lesson = %id, "lesson opened");
        self.emit(LearnerEvent::StateChanged(state));
        Ok(state)
    }

    /// # Errors
    ///
    /// Returns `LearnerError::Quiz` when idle or for an out-of-range option.
    pub fn select_answer(&mut self, option: usize) -> Result<AnswerOutcome, LearnerError> {
        let before = self.quiz.state();
        let outcome = self.quiz.select_answer(option)?;
        let after = self.quiz.state();
        if before != after {
            tracing::debug!(
                selected = outcome.selected,
                correct = outcome.is_correct(),
                "answer selected"
            );
            self.emit(LearnerEvent::StateChanged(after));
        }
        Ok(outcome)
    }

    /// # Errors
    ///
    /// Returns `LearnerError::Quiz` when idle or before the current question is answered.
    pub fn advance(&mut self) -> Result<AdvanceOutcome, LearnerError> {
        match self.quiz.advance()? {
            Advance::Next { question } => {
                tracing::debug!(question, "advanced to next question");
                self.emit(LearnerEvent::StateChanged(self.quiz.state()));
                Ok(AdvanceOutcome::Next { question })
            }
            Advance::Completed(event) => {
                let persist = self.sync.record_completion(event);
                self.emit(LearnerEvent::LessonCompleted(event));
                self.emit(LearnerEvent::LedgerChanged(self.sync.ledger().clone()));
                self.emit(LearnerEvent::StateChanged(QuizState::Idle));
                Ok(AdvanceOutcome::Completed { event, persist })
            }
        }
    }

    /// Leave the open lesson without completing it. Returns `true` if one was open.
    pub fn exit_lesson(&mut self) -> bool {
        let exited = self.quiz.exit();
        if exited {
            tracing::debug!("lesson exited");
            self.emit(LearnerEvent::StateChanged(QuizState::Idle));
        }
        exited
    }

    #[must_use]
    pub fn lesson_cards(&self) -> Vec<LessonCard> {
        let ledger = self.sync.ledger();
        self.catalog
            .iter()
            .map(|lesson| LessonCard {
                id: lesson.id(),
                title: lesson.title().to_string(),
                description: lesson.description().to_string(),
                points: lesson.points(),
                completed: ledger.is_completed(lesson.id()),
            })
            .collect()
    }

    #[must_use]
    pub fn quiz(&self) -> &QuizMachine {
        &self.quiz
    }

    #[must_use]
    pub fn quiz_state(&self) -> QuizState {
        self.quiz.state()
    }

    #[must_use]
    pub fn current_question(&self) -> Option<&Question> {
        self.quiz.current_question()
    }

    #[must_use]
    pub fn progress(&self) -> Option<QuestionProgress> {
        self.quiz.progress()
    }

    #[must_use]
    pub fn ledger(&self) -> &ProgressLedger {
        self.sync.ledger()
    }

    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        self.sync.identity()
    }

    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    fn emit(&self, event: LearnerEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
