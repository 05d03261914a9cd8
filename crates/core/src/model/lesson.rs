use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{LessonId, QuestionId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum LessonError {
    #[error("lesson title cannot be empty")]
    EmptyTitle,

    #[error("lesson {lesson} must award a positive number of points")]
    ZeroPoints { lesson: LessonId },

    #[error("lesson {lesson} has no questions")]
    NoQuestions { lesson: LessonId },

    #[error("question {question} appears more than once in lesson {lesson}")]
    DuplicateQuestion {
        lesson: LessonId,
        question: QuestionId,
    },

    #[error("question {question} has an empty prompt")]
    EmptyPrompt { question: QuestionId },

    #[error("question {question} needs at least two options, got {len}")]
    TooFewOptions { question: QuestionId, len: usize },

    #[error("question {question} marks option {index} correct but has {len} options")]
    CorrectIndexOutOfRange {
        question: QuestionId,
        index: usize,
        len: usize,
    },
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// Unvalidated question content, as authored or deserialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionDraft {
    pub id: QuestionId,
    pub prompt: String,
    pub options: Vec<String>,
    pub correct: usize,
    pub explanation: String,
}

impl QuestionDraft {
    /// Validates option count and correct-index bounds.
    ///
    /// # Errors
    ///
    /// Returns `LessonError` if the prompt is blank, fewer than two options are
    /// given, or `correct` does not index an option.
    pub fn validate(self) -> Result<Question, LessonError> {
        if self.prompt.trim().is_empty() {
            return Err(LessonError::EmptyPrompt { question: self.id });
        }
        if self.options.len() < 2 {
            return Err(LessonError::TooFewOptions {
                question: self.id,
                len: self.options.len(),
            });
        }
        if self.correct >= self.options.len() {
            return Err(LessonError::CorrectIndexOutOfRange {
                question: self.id,
                index: self.correct,
                len: self.options.len(),
            });
        }

        Ok(Question {
            id: self.id,
            prompt: self.prompt,
            options: self.options,
            correct: self.correct,
            explanation: self.explanation,
        })
    }
}

/// A single multiple-choice question. Immutable once validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Question {
    id: QuestionId,
    prompt: String,
    options: Vec<String>,
    correct: usize,
    explanation: String,
}

impl Question {
    #[must_use]
    pub fn id(&self) -> QuestionId {
        self.id
    }

    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    #[must_use]
    pub fn options(&self) -> &[String] {
        &self.options
    }

    /// Index of the correct option; always a valid index into `options()`.
    #[must_use]
    pub fn correct_index(&self) -> usize {
        self.correct
    }

    #[must_use]
    pub fn explanation(&self) -> &str {
        &self.explanation
    }
}

//
// ─── LESSON ────────────────────────────────────────────────────────────────────
//

/// Unvalidated lesson content, as authored or deserialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonDraft {
    pub id: LessonId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub story: String,
    pub points: u32,
    pub questions: Vec<QuestionDraft>,
}

impl LessonDraft {
    /// Validates the lesson and all of its questions.
    ///
    /// # Errors
    ///
    /// Returns the first `LessonError` found.
    pub fn validate(self) -> Result<Lesson, LessonError> {
        if self.title.trim().is_empty() {
            return Err(LessonError::EmptyTitle);
        }
        if self.points == 0 {
            return Err(LessonError::ZeroPoints { lesson: self.id });
        }
        if self.questions.is_empty() {
            return Err(LessonError::NoQuestions { lesson: self.id });
        }

        let mut questions: Vec<Question> = Vec::with_capacity(self.questions.len());
        for draft in self.questions {
            if questions.iter().any(|q| q.id == draft.id) {
                return Err(LessonError::DuplicateQuestion {
                    lesson: self.id,
                    question: draft.id,
                });
            }
            questions.push(draft.validate()?);
        }

        Ok(Lesson {
            id: self.id,
            title: self.title,
            description: self.description,
            story: self.story,
            points: self.points,
            questions,
        })
    }
}

/// A scenario lesson: a narrative followed by an ordered question sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Lesson {
    id: LessonId,
    title: String,
    description: String,
    story: String,
    points: u32,
    questions: Vec<Question>,
}

impl Lesson {
    #[must_use]
    pub fn id(&self) -> LessonId {
        self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Narrative shown alongside the first question.
    #[must_use]
    pub fn story(&self) -> &str {
        &self.story
    }

    /// Points awarded once, on first completion.
    #[must_use]
    pub fn points(&self) -> u32 {
        self.points
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn question(&self, index: usize) -> Option<&Question> {
        self.questions.get(index)
    }

    /// Never zero for a validated lesson.
    #[must_use]
    pub fn question_count(&self) -> usize {
        self.questions.len()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
