use async_trait::async_trait;
use chrono::{DateTime, Utc};
use learn_core::model::{Course, CourseId, LearnerId, LessonId, LessonProgress, ProgressPatch};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StorageError {
    /// True when the backing store could not be reached and the same call may
    /// succeed later.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StorageError::Connection(_))
    }
}

/// Read-only view of course structure needed for progress aggregation,
/// plus the writes used by seeding and administration.
#[async_trait]
pub trait CourseCatalog: Send + Sync {
    /// Lesson ids of a course in module/lesson order.
    ///
    /// An unknown course yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the catalog cannot be read.
    async fn list_lesson_ids(&self, course_id: &CourseId) -> Result<Vec<LessonId>, StorageError>;

    /// Fetch a full course with its modules and lessons.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the catalog cannot be read.
    async fn get_course(&self, course_id: &CourseId) -> Result<Option<Course>, StorageError>;

    /// Insert or replace a course and its module/lesson tree.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the course cannot be stored.
    async fn upsert_course(&self, course: &Course) -> Result<(), StorageError>;
}

/// Durable per-(learner, lesson) progress store.
///
/// Every write is an upsert keyed on the pair, and a single upsert is atomic
/// for its row: a `TimeSpentUpdate::Add` is applied as an increment against
/// the stored value, never as a client-computed overwrite.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Fetch the record for a pair. Absence is `Ok(None)`, not an error.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be read.
    async fn get_progress(
        &self,
        learner_id: &LearnerId,
        lesson_id: &LessonId,
    ) -> Result<Option<LessonProgress>, StorageError>;

    /// Merge `patch` into the record for the pair, creating it with zero
    /// defaults when absent, and return the stored result.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be written.
    async fn upsert_progress(
        &self,
        learner_id: &LearnerId,
        lesson_id: &LessonId,
        patch: &ProgressPatch,
        now: DateTime<Utc>,
    ) -> Result<LessonProgress, StorageError>;

    /// Records for the given lessons. Lessons without a record are omitted.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be read.
    async fn list_progress_for_lessons(
        &self,
        learner_id: &LearnerId,
        lesson_ids: &[LessonId],
    ) -> Result<Vec<LessonProgress>, StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    courses: Arc<Mutex<HashMap<CourseId, Course>>>,
    progress: Arc<Mutex<HashMap<(LearnerId, LessonId), LessonProgress>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CourseCatalog for InMemoryRepository {
    async fn list_lesson_ids(&self, course_id: &CourseId) -> Result<Vec<LessonId>, StorageError> {
        let guard = self
            .courses
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(course_id).map(Course::lesson_ids).unwrap_or_default())
    }

    async fn get_course(&self, course_id: &CourseId) -> Result<Option<Course>, StorageError> {
        let guard = self
            .courses
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(course_id).cloned())
    }

    async fn upsert_course(&self, course: &Course) -> Result<(), StorageError> {
        let mut guard = self
            .courses
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(course.id().clone(), course.clone());
        Ok(())
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn get_progress(
        &self,
        learner_id: &LearnerId,
        lesson_id: &LessonId,
    ) -> Result<Option<LessonProgress>, StorageError> {
        let guard = self
            .progress
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard
            .get(&(learner_id.clone(), lesson_id.clone()))
            .cloned())
    }

    async fn upsert_progress(
        &self,
        learner_id: &LearnerId,
        lesson_id: &LessonId,
        patch: &ProgressPatch,
        now: DateTime<Utc>,
    ) -> Result<LessonProgress, StorageError> {
        let mut guard = self
            .progress
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let record = guard
            .entry((learner_id.clone(), lesson_id.clone()))
            .or_insert_with(|| LessonProgress::new(learner_id.clone(), lesson_id.clone(), now));
        record.apply(patch, now);
        Ok(record.clone())
    }

    async fn list_progress_for_lessons(
        &self,
        learner_id: &LearnerId,
        lesson_ids: &[LessonId],
    ) -> Result<Vec<LessonProgress>, StorageError> {
        let guard = self
            .progress
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let mut found = Vec::with_capacity(lesson_ids.len());
        for lesson_id in lesson_ids {
            if let Some(record) = guard.get(&(learner_id.clone(), lesson_id.clone())) {
                found.push(record.clone());
            }
        }
        Ok(found)
    }
}

/// Aggregates catalog and progress repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub catalog: Arc<dyn CourseCatalog>,
    pub progress: Arc<dyn ProgressRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let catalog: Arc<dyn CourseCatalog> = Arc::new(repo.clone());
        let progress: Arc<dyn ProgressRepository> = Arc::new(repo);
        Self { catalog, progress }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use learn_core::model::{CourseModule, Lesson, LessonKind, ModuleId};
    use learn_core::time::fixed_now;

    fn learner() -> LearnerId {
        LearnerId::new("learner-1").unwrap()
    }

    fn lesson(id: &str) -> LessonId {
        LessonId::new(id).unwrap()
    }

    #[tokio::test]
    async fn upsert_creates_then_merges() {
        let repo = InMemoryRepository::new();
        let l1 = lesson("l1");

        assert!(repo.get_progress(&learner(), &l1).await.unwrap().is_none());

        let created = repo
            .upsert_progress(&learner(), &l1, &ProgressPatch::touch(), fixed_now())
            .await
            .unwrap();
        assert_eq!(created.time_spent(), 0);
        assert_eq!(created.last_position(), 0);
        assert!(!created.is_completed());

        repo.upsert_progress(&learner(), &l1, &ProgressPatch::position(42), fixed_now())
            .await
            .unwrap();
        let later = fixed_now() + Duration::seconds(10);
        let merged = repo
            .upsert_progress(&learner(), &l1, &ProgressPatch::add_time(7), later)
            .await
            .unwrap();
        assert_eq!(merged.last_position(), 42);
        assert_eq!(merged.time_spent(), 7);
        assert_eq!(merged.created_at(), fixed_now());
        assert_eq!(merged.updated_at(), later);
    }

    #[tokio::test]
    async fn list_omits_lessons_without_records() {
        let repo = InMemoryRepository::new();
        repo.upsert_progress(&learner(), &lesson("l2"), &ProgressPatch::touch(), fixed_now())
            .await
            .unwrap();
        let other = LearnerId::new("learner-2").unwrap();
        repo.upsert_progress(&other, &lesson("l1"), &ProgressPatch::touch(), fixed_now())
            .await
            .unwrap();

        let found = repo
            .list_progress_for_lessons(&learner(), &[lesson("l1"), lesson("l2")])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].lesson_id(), &lesson("l2"));
    }

    #[tokio::test]
    async fn catalog_lists_lessons_in_order() {
        let repo = InMemoryRepository::new();
        let course_id = CourseId::new("c1").unwrap();
        let course = Course::new(
            course_id.clone(),
            "Knitting",
            vec![
                CourseModule::new(
                    ModuleId::new("m1").unwrap(),
                    "Stitches",
                    vec![
                        Lesson::new(lesson("b"), "Purl", LessonKind::Video, Some(300)).unwrap(),
                        Lesson::new(lesson("a"), "Knit", LessonKind::Text, None).unwrap(),
                    ],
                )
                .unwrap(),
            ],
        )
        .unwrap();
        repo.upsert_course(&course).await.unwrap();

        let ids = repo.list_lesson_ids(&course_id).await.unwrap();
        assert_eq!(ids, vec![lesson("b"), lesson("a")]);

        let missing = CourseId::new("nope").unwrap();
        assert!(repo.list_lesson_ids(&missing).await.unwrap().is_empty());
        assert!(repo.get_course(&missing).await.unwrap().is_none());
    }
}
