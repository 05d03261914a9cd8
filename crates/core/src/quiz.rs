//! State machine for a single lesson attempt.
//!
//! ```text
//! Idle ──open──▶ Answering(0) ──select──▶ Explained(0) ──advance──▶ Answering(1) …
//!                                          Explained(last) ──advance──▶ Idle + LessonCompleted
//! ```
//!
//! `exit` returns to `Idle` from anywhere without emitting a completion.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::ledger::ProgressLedger;
use crate::model::{Lesson, LessonCompleted, LessonId, Question};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuizError {
    #[error("lesson {0} is already completed")]
    AlreadyCompleted(LessonId),

    #[error("lesson {0} is still in progress")]
    AttemptInProgress(LessonId),

    #[error("no lesson is open")]
    NoActiveAttempt,

    #[error("option {index} does not exist; the question has {len} options")]
    OptionOutOfRange { index: usize, len: usize },

    #[error("select an answer before moving on")]
    NotAnswered,
}

//
// ─── PUBLIC VIEWS ──────────────────────────────────────────────────────────────
//

/// The binding answer for a question, with enough data to derive pass/fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AnswerOutcome {
    pub selected: usize,
    pub correct: usize,
}

impl AnswerOutcome {
    #[must_use]
    pub fn is_correct(&self) -> bool {
        self.selected == self.correct
    }
}

/// Externally visible machine state.
///
/// `Answering` at question 0 is the story step: the lesson narrative is shown
/// above the first question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum QuizState {
    Idle,
    Answering {
        lesson_id: LessonId,
        question: usize,
    },
    Explained {
        lesson_id: LessonId,
        question: usize,
        outcome: AnswerOutcome,
    },
}

impl QuizState {
    #[must_use]
    pub fn is_idle(&self) -> bool {
        matches!(self, QuizState::Idle)
    }

    #[must_use]
    pub fn lesson_id(&self) -> Option<LessonId> {
        match self {
            QuizState::Idle => None,
            QuizState::Answering { lesson_id, .. } | QuizState::Explained { lesson_id, .. } => {
                Some(*lesson_id)
            }
        }
    }

    #[must_use]
    pub fn question_index(&self) -> Option<usize> {
        match self {
            QuizState::Idle => None,
            QuizState::Answering { question, .. } | QuizState::Explained { question, .. } => {
                Some(*question)
            }
        }
    }
}

/// "Question n of m", 1-based for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuestionProgress {
    pub number: usize,
    pub total: usize,
}

/// Result of a successful `advance`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// Moved on to the question at this index.
    Next { question: usize },
    /// The final question was passed; the attempt is gone.
    Completed(LessonCompleted),
}

//
// ─── MACHINE ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Answering,
    Explained(AnswerOutcome),
}

#[derive(Debug, Clone)]
struct Attempt {
    lesson: Arc<Lesson>,
    question: usize,
    step: Step,
}

impl Attempt {
    fn question(&self) -> &Question {
        // `question` is kept below `question_count()` by `advance`.
        &self.lesson.questions()[self.question]
    }
}

/// Drives one lesson attempt at a time.
#[derive(Debug, Clone, Default)]
pub struct QuizMachine {
    attempt: Option<Attempt>,
}

impl QuizMachine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start an attempt at `lesson`.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::AlreadyCompleted` if the ledger already contains the lesson,
    /// and `QuizError::AttemptInProgress` while another attempt is open. No attempt
    /// state is created on error.
    pub fn open(
        &mut self,
        lesson: Arc<Lesson>,
        ledger: &ProgressLedger,
    ) -> Result<QuizState, QuizError> {
        if ledger.is_completed(lesson.id()) {
            return Err(QuizError::AlreadyCompleted(lesson.id()));
        }
        if let Some(active) = &self.attempt {
            return Err(QuizError::AttemptInProgress(active.lesson.id()));
        }

        self.attempt = Some(Attempt {
            lesson,
            question: 0,
            step: Step::Answering,
        });
        Ok(self.state())
    }

    /// Choose an option for the current question and reveal the explanation.
    ///
    /// Once the explanation is showing the first answer is binding: selecting again
    /// returns the original outcome and changes nothing.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::NoActiveAttempt` when idle and
    /// `QuizError::OptionOutOfRange` for an index past the question's options.
    pub fn select_answer(&mut self, option: usize) -> Result<AnswerOutcome, QuizError> {
        let attempt = self.attempt.as_mut().ok_or(QuizError::NoActiveAttempt)?;

        if let Step::Explained(outcome) = attempt.step {
            return Ok(outcome);
        }

        let question = attempt.question();
        let len = question.options().len();
        if option >= len {
            return Err(QuizError::OptionOutOfRange { index: option, len });
        }

        let outcome = AnswerOutcome {
            selected: option,
            correct: question.correct_index(),
        };
        attempt.step = Step::Explained(outcome);
        Ok(outcome)
    }

    /// Move past the explained question.
    ///
    /// On the last question this ends the attempt and yields the completion event;
    /// because the attempt is consumed the event cannot be produced twice.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::NoActiveAttempt` when idle and `QuizError::NotAnswered`
    /// if the current question has no answer yet.
    pub fn advance(&mut self) -> Result<Advance, QuizError> {
        let attempt = self.attempt.as_mut().ok_or(QuizError::NoActiveAttempt)?;
        if attempt.step == Step::Answering {
            return Err(QuizError::NotAnswered);
        }

        let next = attempt.question + 1;
        if next < attempt.lesson.question_count() {
            attempt.question = next;
            attempt.step = Step::Answering;
            return Ok(Advance::Next { question: next });
        }

        let lesson = Arc::clone(&attempt.lesson);
        self.attempt = None;
        Ok(Advance::Completed(LessonCompleted {
            lesson_id: lesson.id(),
            points: lesson.points(),
        }))
    }

    /// Discard the attempt without completing it.
    ///
    /// Returns `true` if an attempt was open.
    pub fn exit(&mut self) -> bool {
        self.attempt.take().is_some()
    }

    #[must_use]
    pub fn state(&self) -> QuizState {
        match &self.attempt {
            None => QuizState::Idle,
            Some(a) => match a.step {
                Step::Answering => QuizState::Answering {
                    lesson_id: a.lesson.id(),
                    question: a.question,
                },
                Step::Explained(outcome) => QuizState::Explained {
                    lesson_id: a.lesson.id(),
                    question: a.question,
                    outcome,
                },
            },
        }
    }

    #[must_use]
    pub fn lesson(&self) -> Option<&Arc<Lesson>> {
        self.attempt.as_ref().map(|a| &a.lesson)
    }

    #[must_use]
    pub fn current_question(&self) -> Option<&Question> {
        self.attempt.as_ref().map(Attempt::question)
    }

    /// True while the lesson narrative should be visible (first question).
    #[must_use]
    pub fn shows_story(&self) -> bool {
        self.attempt.as_ref().is_some_and(|a| a.question == 0)
    }

    #[must_use]
    pub fn progress(&self) -> Option<QuestionProgress> {
        self.attempt.as_ref().map(|a| QuestionProgress {
            number: a.question + 1,
            total: a.lesson.question_count(),
        })
    }

    /// True when the next `advance` would complete the lesson.
    #[must_use]
    pub fn is_last_question(&self) -> bool {
        self.attempt
            .as_ref()
            .is_some_and(|a| a.question + 1 == a.lesson.question_count())
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
