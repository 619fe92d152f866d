mod course;
mod ids;
mod progress;

pub use ids::{CourseId, IdError, LearnerId, LessonId, ModuleId};

pub use course::{Course, CourseError, CourseModule, Lesson, LessonKind};
pub use progress::{
    completion_percent, CourseProgress, LessonProgress, ProgressError, ProgressPatch,
    ProgressStatus, TimeSpentUpdate,
};
