use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::model::{LessonCompleted, LessonId};

/// In-memory progress for the active identity.
///
/// Score never decreases and the completed set only grows between `reset` calls.
/// A clone of the ledger doubles as the snapshot handed to the presentation layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressLedger {
    score: u64,
    streak: u32,
    completed: BTreeSet<LessonId>,
}

impl ProgressLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite-initialize from externally loaded values.
    pub fn hydrate(
        &mut self,
        score: u64,
        streak: u32,
        completed: impl IntoIterator<Item = LessonId>,
    ) {
        self.score = score;
        self.streak = streak;
        self.completed = completed.into_iter().collect();
    }

    /// Record a completion unless the lesson is already in the completed set.
    ///
    /// Returns `true` if the ledger changed. Duplicate events (for example from a
    /// retried remote call) leave score, streak and the completed set untouched.
    pub fn apply(&mut self, event: &LessonCompleted) -> bool {
        if !self.completed.insert(event.lesson_id) {
            return false;
        }
        self.score = self.score.saturating_add(u64::from(event.points));
        self.streak = self.streak.saturating_add(1);
        true
    }

    /// Fold stored values into the current ledger without losing local progress.
    ///
    /// Keeps the larger score and streak and the union of completed lessons, so a
    /// refresh for the same identity never undoes a completion whose write is
    /// still pending or has failed.
    pub fn merge(
        &mut self,
        score: u64,
        streak: u32,
        completed: impl IntoIterator<Item = LessonId>,
    ) {
        self.score = self.score.max(score);
        self.streak = self.streak.max(streak);
        self.completed.extend(completed);
    }

    /// Back to zero/empty. Local only.
    pub fn reset(&mut self) {
        self.score = 0;
        self.streak = 0;
        self.completed.clear();
    }

    #[must_use]
    pub fn score(&self) -> u64 {
        self.score
    }

    #[must_use]
    pub fn streak(&self) -> u32 {
        self.streak
    }

    #[must_use]
    pub fn completed(&self) -> &BTreeSet<LessonId> {
        &self.completed
    }

    #[must_use]
    pub fn is_completed(&self, id: LessonId) -> bool {
        self.completed.contains(&id)
    }
}
