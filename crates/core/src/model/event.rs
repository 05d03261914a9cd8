use serde::{Deserialize, Serialize};

use crate::model::ids::LessonId;

/// Emitted once when a lesson's question sequence has been fully traversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonCompleted {
    pub lesson_id: LessonId,
    pub points: u32,
}
