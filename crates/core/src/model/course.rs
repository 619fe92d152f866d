use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{CourseId, LessonId, ModuleId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CourseError {
    #[error("course title cannot be empty")]
    EmptyTitle,

    #[error("module title cannot be empty")]
    EmptyModuleTitle,

    #[error("lesson title cannot be empty")]
    EmptyLessonTitle,

    #[error("lesson {0} appears more than once in the course")]
    DuplicateLesson(LessonId),

    #[error("unknown lesson kind: {0}")]
    UnknownLessonKind(String),
}

//
// ─── LESSON ────────────────────────────────────────────────────────────────────
//

/// Content type of a lesson.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LessonKind {
    Video,
    Text,
    Quiz,
    File,
}

impl LessonKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            LessonKind::Video => "video",
            LessonKind::Text => "text",
            LessonKind::Quiz => "quiz",
            LessonKind::File => "file",
        }
    }

    /// Only video lessons carry a meaningful playback position.
    #[must_use]
    pub fn tracks_position(self) -> bool {
        matches!(self, LessonKind::Video)
    }
}

impl fmt::Display for LessonKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LessonKind {
    type Err = CourseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "video" => Ok(Self::Video),
            "text" => Ok(Self::Text),
            "quiz" => Ok(Self::Quiz),
            "file" => Ok(Self::File),
            other => Err(CourseError::UnknownLessonKind(other.to_owned())),
        }
    }
}

/// Atomic content unit within a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Lesson {
    id: LessonId,
    title: String,
    kind: LessonKind,
    duration_seconds: Option<u32>,
}

impl Lesson {
    /// Creates a lesson.
    ///
    /// # Errors
    ///
    /// Returns `CourseError::EmptyLessonTitle` if the title is blank.
    pub fn new(
        id: LessonId,
        title: impl Into<String>,
        kind: LessonKind,
        duration_seconds: Option<u32>,
    ) -> Result<Self, CourseError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(CourseError::EmptyLessonTitle);
        }
        Ok(Self {
            id,
            title,
            kind,
            duration_seconds,
        })
    }

    #[must_use]
    pub fn id(&self) -> &LessonId {
        &self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn kind(&self) -> LessonKind {
        self.kind
    }

    #[must_use]
    pub fn duration_seconds(&self) -> Option<u32> {
        self.duration_seconds
    }
}

//
// ─── MODULE ────────────────────────────────────────────────────────────────────
//

/// Ordered group of lessons.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CourseModule {
    id: ModuleId,
    title: String,
    lessons: Vec<Lesson>,
}

impl CourseModule {
    /// # Errors
    ///
    /// Returns `CourseError::EmptyModuleTitle` if the title is blank.
    pub fn new(
        id: ModuleId,
        title: impl Into<String>,
        lessons: Vec<Lesson>,
    ) -> Result<Self, CourseError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(CourseError::EmptyModuleTitle);
        }
        Ok(Self { id, title, lessons })
    }

    #[must_use]
    pub fn id(&self) -> &ModuleId {
        &self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn lessons(&self) -> &[Lesson] {
        &self.lessons
    }
}

//
// ─── COURSE ────────────────────────────────────────────────────────────────────
//

/// A course as returned by the catalog: modules in order, lessons in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Course {
    id: CourseId,
    title: String,
    modules: Vec<CourseModule>,
}

impl Course {
    /// Creates a course.
    ///
    /// # Errors
    ///
    /// Returns `CourseError::EmptyTitle` for a blank title and
    /// `CourseError::DuplicateLesson` if a lesson id is reused across modules.
    pub fn new(
        id: CourseId,
        title: impl Into<String>,
        modules: Vec<CourseModule>,
    ) -> Result<Self, CourseError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(CourseError::EmptyTitle);
        }

        let mut seen = HashSet::new();
        for lesson in modules.iter().flat_map(|m| m.lessons.iter()) {
            if !seen.insert(lesson.id()) {
                return Err(CourseError::DuplicateLesson(lesson.id().clone()));
            }
        }

        Ok(Self { id, title, modules })
    }

    #[must_use]
    pub fn id(&self) -> &CourseId {
        &self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn modules(&self) -> &[CourseModule] {
        &self.modules
    }

    /// Lessons in module order, then lesson order.
    pub fn lessons(&self) -> impl Iterator<Item = &Lesson> {
        self.modules.iter().flat_map(|m| m.lessons.iter())
    }

    #[must_use]
    pub fn lesson_ids(&self) -> Vec<LessonId> {
        self.lessons().map(|l| l.id().clone()).collect()
    }

    #[must_use]
    pub fn lesson_count(&self) -> usize {
        self.modules.iter().map(|m| m.lessons.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lesson(id: &str, kind: LessonKind) -> Lesson {
        Lesson::new(LessonId::new(id).unwrap(), format!("Lesson {id}"), kind, None).unwrap()
    }

    #[test]
    fn lesson_ids_follow_module_order() {
        let course = Course::new(
            CourseId::new("c1").unwrap(),
            "Pottery",
            vec![
                CourseModule::new(
                    ModuleId::new("m1").unwrap(),
                    "Basics",
                    vec![lesson("l1", LessonKind::Video), lesson("l2", LessonKind::Text)],
                )
                .unwrap(),
                CourseModule::new(
                    ModuleId::new("m2").unwrap(),
                    "Glazing",
                    vec![lesson("l3", LessonKind::Quiz)],
                )
                .unwrap(),
            ],
        )
        .unwrap();

        let ids: Vec<_> = course.lesson_ids().into_iter().map(String::from).collect();
        assert_eq!(ids, vec!["l1", "l2", "l3"]);
        assert_eq!(course.lesson_count(), 3);
    }

    #[test]
    fn duplicate_lessons_are_rejected() {
        let module = |id: &str| {
            CourseModule::new(
                ModuleId::new(id).unwrap(),
                "Module",
                vec![lesson("same", LessonKind::File)],
            )
            .unwrap()
        };
        let err = Course::new(
            CourseId::new("c1").unwrap(),
            "Course",
            vec![module("m1"), module("m2")],
        )
        .unwrap_err();
        assert!(matches!(err, CourseError::DuplicateLesson(_)));
    }

    #[test]
    fn blank_titles_are_rejected() {
        assert_eq!(
            Course::new(CourseId::new("c").unwrap(), " ", vec![]),
            Err(CourseError::EmptyTitle)
        );
        assert_eq!(
            Lesson::new(LessonId::new("l").unwrap(), "", LessonKind::Text, None),
            Err(CourseError::EmptyLessonTitle)
        );
    }

    #[test]
    fn lesson_kind_parses_storage_names() {
        for kind in [
            LessonKind::Video,
            LessonKind::Text,
            LessonKind::Quiz,
            LessonKind::File,
        ] {
            assert_eq!(kind.as_str().parse::<LessonKind>().unwrap(), kind);
        }
        assert!("podcast".parse::<LessonKind>().is_err());
        assert!(LessonKind::Video.tracks_position());
        assert!(!LessonKind::Quiz.tracks_position());
    }
}
