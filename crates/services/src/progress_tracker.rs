use std::sync::Arc;

use learn_core::model::{
    CourseId, CourseProgress, LearnerId, LessonId, LessonProgress, ProgressPatch, ProgressStatus,
};
use storage::repository::{CourseCatalog, ProgressRepository, StorageError};

use crate::error::TrackerError;
use crate::Clock;

fn seconds_arg(name: &str, value: i64) -> Result<u32, TrackerError> {
    u32::try_from(value).map_err(|_| {
        TrackerError::InvalidArgument(format!(
            "{name} must be between 0 and {}, got {value}",
            u32::MAX
        ))
    })
}

fn log_failure(op: &'static str, learner: &LearnerId, err: &TrackerError) {
    tracing::warn!(
        op,
        learner = %learner,
        error = %err,
        retryable = err.is_retryable(),
        "progress operation failed"
    );
}

fn newly_completed(before: Option<&LessonProgress>, after: &LessonProgress) -> bool {
    after.is_completed() && ProgressStatus::of(before) != ProgressStatus::Completed
}

/// Records a learner's interaction with lesson content and derives course progress.
///
/// Holds no per-learner state: every call is a round trip to the progress
/// store, and every write is keyed on the ids passed to that call.
#[derive(Clone)]
pub struct ProgressTracker {
    clock: Clock,
    progress: Arc<dyn ProgressRepository>,
    catalog: Arc<dyn CourseCatalog>,
}

impl ProgressTracker {
    #[must_use]
    pub fn new(
        clock: Clock,
        progress: Arc<dyn ProgressRepository>,
        catalog: Arc<dyn CourseCatalog>,
    ) -> Self {
        Self {
            clock,
            progress,
            catalog,
        }
    }

    #[must_use]
    pub fn clock(&self) -> Clock {
        self.clock
    }

    /// Ensure a progress record exists and return it.
    ///
    /// Existing position, time and completion are left untouched; callers use
    /// the returned `last_position` to resume playback.
    ///
    /// # Errors
    ///
    /// Returns `TrackerError::PersistenceUnavailable` if the store is unreachable.
    pub async fn open_lesson(
        &self,
        learner_id: &LearnerId,
        lesson_id: &LessonId,
    ) -> Result<LessonProgress, TrackerError> {
        tracing::debug!(learner = %learner_id, lesson = %lesson_id, "open lesson");
        self.write(learner_id, lesson_id, &ProgressPatch::touch(), "open_lesson")
            .await
    }

    /// Overwrite the saved playback position.
    ///
    /// Safe to call at any frequency; throttling is the caller's policy.
    ///
    /// # Errors
    ///
    /// Returns `TrackerError::InvalidArgument` for a negative or oversized
    /// position (nothing is written), or a storage error.
    pub async fn checkpoint_position(
        &self,
        learner_id: &LearnerId,
        lesson_id: &LessonId,
        position_seconds: i64,
    ) -> Result<LessonProgress, TrackerError> {
        let position = seconds_arg("position_seconds", position_seconds)?;
        tracing::debug!(learner = %learner_id, lesson = %lesson_id, position, "checkpoint position");
        self.write(
            learner_id,
            lesson_id,
            &ProgressPatch::position(position),
            "checkpoint_position",
        )
        .await
    }

    /// Add seconds to the lesson's cumulative time.
    ///
    /// Call once per viewing session with the time elapsed since the lesson
    /// was opened (or since the previous accrual).
    ///
    /// # Errors
    ///
    /// Returns `TrackerError::InvalidArgument` for a negative or oversized
    /// amount (nothing is written), or a storage error.
    pub async fn accrue_time(
        &self,
        learner_id: &LearnerId,
        lesson_id: &LessonId,
        additional_seconds: i64,
    ) -> Result<LessonProgress, TrackerError> {
        let seconds = seconds_arg("additional_seconds", additional_seconds)?;
        tracing::debug!(learner = %learner_id, lesson = %lesson_id, seconds, "accrue time");
        self.write(
            learner_id,
            lesson_id,
            &ProgressPatch::add_time(seconds),
            "accrue_time",
        )
        .await
    }

    /// Mark the lesson completed.
    ///
    /// Repeat calls keep the first `completed_at`.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the record cannot be read or written.
    pub async fn mark_complete(
        &self,
        learner_id: &LearnerId,
        lesson_id: &LessonId,
    ) -> Result<LessonProgress, TrackerError> {
        let before = self.get_progress(learner_id, lesson_id).await?;
        let now = self.clock.now();
        let record = self
            .write(
                learner_id,
                lesson_id,
                &ProgressPatch::complete(now),
                "mark_complete",
            )
            .await?;
        if newly_completed(before.as_ref(), &record) {
            tracing::info!(learner = %learner_id, lesson = %lesson_id, "lesson completed");
        } else {
            tracing::debug!(learner = %learner_id, lesson = %lesson_id, "lesson already completed");
        }
        Ok(record)
    }

    /// Fetch the record for a pair; `Ok(None)` when the learner never opened it.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the store cannot be read.
    pub async fn get_progress(
        &self,
        learner_id: &LearnerId,
        lesson_id: &LessonId,
    ) -> Result<Option<LessonProgress>, TrackerError> {
        self.progress
            .get_progress(learner_id, lesson_id)
            .await
            .map_err(|e| {
                let err = TrackerError::from(e);
                log_failure("get_progress", learner_id, &err);
                err
            })
    }

    /// # Errors
    ///
    /// Returns a storage error if the store cannot be read.
    pub async fn lesson_status(
        &self,
        learner_id: &LearnerId,
        lesson_id: &LessonId,
    ) -> Result<ProgressStatus, TrackerError> {
        let record = self.get_progress(learner_id, lesson_id).await?;
        Ok(ProgressStatus::of(record.as_ref()))
    }

    /// Percentage of the course's current lessons the learner has completed.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the catalog or progress store cannot be read.
    pub async fn course_progress_percent(
        &self,
        learner_id: &LearnerId,
        course_id: &CourseId,
    ) -> Result<u8, TrackerError> {
        Ok(self.course_progress(learner_id, course_id).await?.percent)
    }

    /// Completion, time spent and resume point for a course.
    ///
    /// Records for lessons no longer in the course are ignored; lessons never
    /// opened count as not completed. An empty or unknown course is 0%.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the catalog or progress store cannot be read.
    pub async fn course_progress(
        &self,
        learner_id: &LearnerId,
        course_id: &CourseId,
    ) -> Result<CourseProgress, TrackerError> {
        match self.load_course_progress(learner_id, course_id).await {
            Ok(summary) => {
                tracing::debug!(
                    learner = %learner_id,
                    course = %course_id,
                    percent = summary.percent,
                    "course progress"
                );
                Ok(summary)
            }
            Err(e) => {
                let err = TrackerError::from(e);
                log_failure("course_progress", learner_id, &err);
                Err(err)
            }
        }
    }

    async fn load_course_progress(
        &self,
        learner_id: &LearnerId,
        course_id: &CourseId,
    ) -> Result<CourseProgress, StorageError> {
        let lesson_ids = self.catalog.list_lesson_ids(course_id).await?;
        if lesson_ids.is_empty() {
            return Ok(CourseProgress::summarize(&[], &[]));
        }
        let records = self
            .progress
            .list_progress_for_lessons(learner_id, &lesson_ids)
            .await?;
        Ok(CourseProgress::summarize(&lesson_ids, &records))
    }

    async fn write(
        &self,
        learner_id: &LearnerId,
        lesson_id: &LessonId,
        patch: &ProgressPatch,
        op: &'static str,
    ) -> Result<LessonProgress, TrackerError> {
        self.progress
            .upsert_progress(learner_id, lesson_id, patch, self.clock.now())
            .await
            .map_err(|e| {
                let err = TrackerError::from(e);
                log_failure(op, learner_id, &err);
                err
            })
    }
}
