//! Static, read-only collection of lessons supplied at startup.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use crate::model::{Lesson, LessonDraft, LessonError, LessonId};

mod builtin;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CatalogError {
    #[error("lesson {0} is defined more than once")]
    DuplicateLesson(LessonId),

    #[error(transparent)]
    Lesson(#[from] LessonError),

    #[error("failed to read catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse catalog: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Ordered, immutable lesson bank.
///
/// Lessons are shared as `Arc<Lesson>` so an active attempt can hold its lesson
/// without borrowing the catalog.
#[derive(Debug, Clone)]
pub struct Catalog {
    lessons: Vec<Arc<Lesson>>,
}

impl Catalog {
    /// Build a catalog from validated lessons, preserving their order.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::DuplicateLesson` if two lessons share an id.
    pub fn new(lessons: Vec<Lesson>) -> Result<Self, CatalogError> {
        let mut seen = HashSet::with_capacity(lessons.len());
        for lesson in &lessons {
            if !seen.insert(lesson.id()) {
                return Err(CatalogError::DuplicateLesson(lesson.id()));
            }
        }
        Ok(Self {
            lessons: lessons.into_iter().map(Arc::new).collect(),
        })
    }

    /// Validate drafts and build a catalog from them.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError` for the first invalid lesson or duplicate id.
    pub fn from_drafts(drafts: Vec<LessonDraft>) -> Result<Self, CatalogError> {
        let lessons = drafts
            .into_iter()
            .map(LessonDraft::validate)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(lessons)
    }

    /// Parse a JSON array of lesson drafts.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Parse` for malformed JSON and validation errors otherwise.
    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        let drafts: Vec<LessonDraft> = serde_json::from_str(json)?;
        Self::from_drafts(drafts)
    }

    /// Read and parse a JSON catalog file.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Io` if the file cannot be read, otherwise as `from_json_str`.
    pub fn from_json_path(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// The scenario lessons shipped with the application.
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            lessons: builtin::lessons().into_iter().map(Arc::new).collect(),
        }
    }

    #[must_use]
    pub fn get(&self, id: LessonId) -> Option<Arc<Lesson>> {
        self.lessons.iter().find(|l| l.id() == id).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Lesson>> {
        self.lessons.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lessons.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lessons.is_empty()
    }
}
