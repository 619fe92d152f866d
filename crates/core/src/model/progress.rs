use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::model::ids::{LearnerId, LessonId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("completed flag and completion timestamp disagree")]
    InconsistentCompletion,

    #[error("updated_at precedes created_at")]
    InvalidTimestamps,
}

//
// ─── STATUS ────────────────────────────────────────────────────────────────────
//

/// Where a learner stands on a single lesson.
///
/// `NotStarted` has no persisted record; `Completed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    NotStarted,
    InProgress,
    Completed,
}

impl ProgressStatus {
    #[must_use]
    pub fn of(record: Option<&LessonProgress>) -> Self {
        match record {
            None => Self::NotStarted,
            Some(r) if r.is_completed() => Self::Completed,
            Some(_) => Self::InProgress,
        }
    }
}

//
// ─── PATCH ─────────────────────────────────────────────────────────────────────
//

/// How a patch changes `time_spent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeSpentUpdate {
    /// Add seconds to the stored total.
    Add(u32),
    /// Replace the stored total. Administrative corrections only.
    Set(u32),
}

/// Partial update merged into a progress record by an upsert.
///
/// Omitted fields keep their stored value (or the zero default when the
/// record is being created).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressPatch {
    pub last_position: Option<u32>,
    pub time_spent: Option<TimeSpentUpdate>,
    pub complete_at: Option<DateTime<Utc>>,
}

impl ProgressPatch {
    /// Patch that only ensures the record exists.
    #[must_use]
    pub fn touch() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn position(seconds: u32) -> Self {
        Self {
            last_position: Some(seconds),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn add_time(seconds: u32) -> Self {
        Self {
            time_spent: Some(TimeSpentUpdate::Add(seconds)),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn complete(at: DateTime<Utc>) -> Self {
        Self {
            complete_at: Some(at),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_touch(&self) -> bool {
        self == &Self::default()
    }
}

//
// ─── RECORD ────────────────────────────────────────────────────────────────────
//

/// Progress of one learner on one lesson.
///
/// `completed_at` is set if and only if `completed` is true, and once set it
/// never changes. `time_spent` only grows under `TimeSpentUpdate::Add`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LessonProgress {
    learner_id: LearnerId,
    lesson_id: LessonId,
    completed: bool,
    completed_at: Option<DateTime<Utc>>,
    last_position: u32,
    time_spent: u32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl LessonProgress {
    /// Fresh record: not completed, zero position and time.
    #[must_use]
    pub fn new(learner_id: LearnerId, lesson_id: LessonId, now: DateTime<Utc>) -> Self {
        Self {
            learner_id,
            lesson_id,
            completed: false,
            completed_at: None,
            last_position: 0,
            time_spent: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Rebuild a record from storage, checking the completion invariant.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::InconsistentCompletion` when `completed` and
    /// `completed_at` disagree, and `ProgressError::InvalidTimestamps` when
    /// `updated_at` is earlier than `created_at`.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        learner_id: LearnerId,
        lesson_id: LessonId,
        completed: bool,
        completed_at: Option<DateTime<Utc>>,
        last_position: u32,
        time_spent: u32,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<Self, ProgressError> {
        if completed != completed_at.is_some() {
            return Err(ProgressError::InconsistentCompletion);
        }
        if updated_at < created_at {
            return Err(ProgressError::InvalidTimestamps);
        }
        Ok(Self {
            learner_id,
            lesson_id,
            completed,
            completed_at,
            last_position,
            time_spent,
            created_at,
            updated_at,
        })
    }

    /// Merge a patch into this record.
    ///
    /// A completion timestamp already present is kept; the patch's
    /// `complete_at` only applies on the false→true transition.
    pub fn apply(&mut self, patch: &ProgressPatch, now: DateTime<Utc>) {
        if let Some(position) = patch.last_position {
            self.last_position = position;
        }
        match patch.time_spent {
            Some(TimeSpentUpdate::Add(secs)) => {
                self.time_spent = self.time_spent.saturating_add(secs);
            }
            Some(TimeSpentUpdate::Set(secs)) => self.time_spent = secs,
            None => {}
        }
        if !self.completed {
            if let Some(at) = patch.complete_at {
                self.completed = true;
                self.completed_at = Some(at);
            }
        }
        if now > self.updated_at {
            self.updated_at = now;
        }
    }

    #[must_use]
    pub fn learner_id(&self) -> &LearnerId {
        &self.learner_id
    }

    #[must_use]
    pub fn lesson_id(&self) -> &LessonId {
        &self.lesson_id
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    #[must_use]
    pub fn last_position(&self) -> u32 {
        self.last_position
    }

    #[must_use]
    pub fn time_spent(&self) -> u32 {
        self.time_spent
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    #[must_use]
    pub fn status(&self) -> ProgressStatus {
        ProgressStatus::of(Some(self))
    }
}

//
// ─── COURSE AGGREGATE ──────────────────────────────────────────────────────────
//

/// `round(100 * completed / total)` with halves rounded up; 0 for an empty course.
#[must_use]
pub fn completion_percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let completed = completed.min(total) as u128;
    let total = total as u128;
    let percent = (completed * 200 + total) / (total * 2);
    u8::try_from(percent).unwrap_or(100)
}

/// Learner's standing on a whole course, derived from catalog order and records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CourseProgress {
    pub total_lessons: usize,
    pub completed_lessons: usize,
    pub percent: u8,
    /// Sum of `time_spent` across the course's current lessons.
    pub time_spent: u64,
    /// First lesson in catalog order that is not completed.
    pub resume_lesson: Option<LessonId>,
}

impl CourseProgress {
    /// Join catalog lessons with the learner's records.
    ///
    /// Records for lessons outside `lesson_ids` are ignored, lessons without a
    /// record count as not started, and repeated catalog ids count once.
    #[must_use]
    pub fn summarize(lesson_ids: &[LessonId], records: &[LessonProgress]) -> Self {
        let by_lesson: HashMap<&LessonId, &LessonProgress> =
            records.iter().map(|r| (r.lesson_id(), r)).collect();

        let mut seen = HashSet::with_capacity(lesson_ids.len());
        let mut total_lessons = 0;
        let mut completed_lessons = 0;
        let mut time_spent = 0_u64;
        let mut resume_lesson = None;

        for lesson_id in lesson_ids {
            if !seen.insert(lesson_id) {
                continue;
            }
            total_lessons += 1;
            let record = by_lesson.get(lesson_id);
            if let Some(record) = record {
                time_spent += u64::from(record.time_spent());
            }
            if record.is_some_and(|r| r.is_completed()) {
                completed_lessons += 1;
            } else if resume_lesson.is_none() {
                resume_lesson = Some(lesson_id.clone());
            }
        }

        Self {
            total_lessons,
            completed_lessons,
            percent: completion_percent(completed_lessons, total_lessons),
            time_spent,
            resume_lesson,
        }
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.total_lessons > 0 && self.completed_lessons == self.total_lessons
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;
    use chrono::Duration;

    fn ids() -> (LearnerId, LessonId) {
        (
            LearnerId::new("learner").unwrap(),
            LessonId::new("lesson").unwrap(),
        )
    }

    fn lesson(id: &str) -> LessonId {
        LessonId::new(id).unwrap()
    }

    fn record(lesson_id: &str, completed: bool, time_spent: u32) -> LessonProgress {
        let mut r = LessonProgress::new(
            LearnerId::new("learner").unwrap(),
            lesson(lesson_id),
            fixed_now(),
        );
        r.apply(
            &ProgressPatch {
                time_spent: Some(TimeSpentUpdate::Set(time_spent)),
                complete_at: completed.then(fixed_now),
                ..ProgressPatch::default()
            },
            fixed_now(),
        );
        r
    }

    #[test]
    fn percent_rounds_half_up() {
        assert_eq!(completion_percent(0, 0), 0);
        assert_eq!(completion_percent(1, 4), 25);
        assert_eq!(completion_percent(3, 4), 75);
        assert_eq!(completion_percent(2, 3), 67);
        assert_eq!(completion_percent(1, 3), 33);
        assert_eq!(completion_percent(1, 8), 13);
        assert_eq!(completion_percent(4, 4), 100);
        assert_eq!(completion_percent(9, 4), 100);
    }

    #[test]
    fn apply_keeps_first_completion_timestamp() {
        let (learner, lesson) = ids();
        let first = fixed_now();
        let later = first + Duration::minutes(5);
        let mut r = LessonProgress::new(learner, lesson, first);

        r.apply(&ProgressPatch::complete(first), first);
        r.apply(&ProgressPatch::complete(later), later);

        assert!(r.is_completed());
        assert_eq!(r.completed_at(), Some(first));
        assert_eq!(r.updated_at(), later);
    }

    #[test]
    fn apply_accumulates_time_and_overwrites_position() {
        let (learner, lesson) = ids();
        let mut r = LessonProgress::new(learner, lesson, fixed_now());

        r.apply(&ProgressPatch::add_time(30), fixed_now());
        r.apply(&ProgressPatch::add_time(15), fixed_now());
        r.apply(&ProgressPatch::position(120), fixed_now());
        r.apply(&ProgressPatch::position(40), fixed_now());

        assert_eq!(r.time_spent(), 45);
        assert_eq!(r.last_position(), 40);
        assert_eq!(r.status(), ProgressStatus::InProgress);
    }

    #[test]
    fn touch_patch_changes_nothing() {
        let (learner, lesson) = ids();
        let mut r = LessonProgress::new(learner, lesson, fixed_now());
        r.apply(&ProgressPatch::position(42), fixed_now());
        let before = r.clone();

        r.apply(&ProgressPatch::touch(), fixed_now());
        assert_eq!(r, before);
        assert!(ProgressPatch::touch().is_touch());
    }

    #[test]
    fn from_persisted_rejects_inconsistent_completion() {
        let (learner, lesson) = ids();
        let err = LessonProgress::from_persisted(
            learner,
            lesson,
            true,
            None,
            0,
            0,
            fixed_now(),
            fixed_now(),
        )
        .unwrap_err();
        assert_eq!(err, ProgressError::InconsistentCompletion);
    }

    #[test]
    fn status_follows_record() {
        assert_eq!(ProgressStatus::of(None), ProgressStatus::NotStarted);
        assert_eq!(record("a", false, 0).status(), ProgressStatus::InProgress);
        assert_eq!(record("a", true, 0).status(), ProgressStatus::Completed);
    }

    #[test]
    fn summarize_ignores_orphans_and_missing_records() {
        let catalog = vec![lesson("l1"), lesson("l2"), lesson("l3"), lesson("l4")];
        let records = vec![
            record("l2", true, 60),
            record("l3", false, 10),
            record("retired", true, 500),
        ];

        let summary = CourseProgress::summarize(&catalog, &records);
        assert_eq!(summary.total_lessons, 4);
        assert_eq!(summary.completed_lessons, 1);
        assert_eq!(summary.percent, 25);
        assert_eq!(summary.time_spent, 70);
        assert_eq!(summary.resume_lesson, Some(lesson("l1")));
        assert!(!summary.is_finished());
    }

    #[test]
    fn summarize_counts_repeated_catalog_ids_once() {
        let catalog = vec![lesson("l1"), lesson("l1"), lesson("l2")];
        let records = vec![record("l1", true, 0)];

        let summary = CourseProgress::summarize(&catalog, &records);
        assert_eq!(summary.total_lessons, 2);
        assert_eq!(summary.percent, 50);
        assert_eq!(summary.resume_lesson, Some(lesson("l2")));
    }

    #[test]
    fn summarize_empty_course() {
        let summary = CourseProgress::summarize(&[], &[record("x", true, 5)]);
        assert_eq!(summary.percent, 0);
        assert_eq!(summary.resume_lesson, None);
        assert!(!summary.is_finished());
    }
}
