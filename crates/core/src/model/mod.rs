mod event;
mod identity;
mod ids;
mod lesson;

pub use event::LessonCompleted;
pub use identity::Identity;
pub use ids::{IdentityId, LessonId, ParseIdError, QuestionId};
pub use lesson::{Lesson, LessonDraft, LessonError, Question, QuestionDraft};
