use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use learn_core::model::{LearnerId, LessonId, LessonProgress};
use learn_core::time::elapsed_seconds;

use crate::error::TrackerError;
use crate::progress_tracker::ProgressTracker;
use crate::Clock;

/// Playback seconds between position checkpoints.
pub const DEFAULT_CHECKPOINT_INTERVAL_SECS: u32 = 10;

/// One learner viewing one lesson, from open until they navigate away.
///
/// Ids are captured when the session starts, so a late write from this
/// session can only ever touch its own lesson.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewingSession {
    learner_id: LearnerId,
    lesson_id: LessonId,
    opened_at: DateTime<Utc>,
    accrued_until: DateTime<Utc>,
    resume_position: u32,
    last_checkpoint: Option<u32>,
    completed: bool,
}

impl ViewingSession {
    #[must_use]
    pub fn learner_id(&self) -> &LearnerId {
        &self.learner_id
    }

    #[must_use]
    pub fn lesson_id(&self) -> &LessonId {
        &self.lesson_id
    }

    #[must_use]
    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    /// Position to seek to when playback starts.
    #[must_use]
    pub fn resume_position(&self) -> u32 {
        self.resume_position
    }

    #[must_use]
    pub fn last_checkpoint(&self) -> Option<u32> {
        self.last_checkpoint
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    fn should_checkpoint(&self, position: u32, interval: u32) -> bool {
        match self.last_checkpoint {
            None => true,
            Some(last) if position < last => true,
            Some(last) => position - last >= interval,
        }
    }
}

/// Caller-side playback policy on top of `ProgressTracker`.
///
/// Throttles position checkpoints, completes on playback end, and accrues
/// viewing time exactly once per elapsed span.
#[derive(Clone)]
pub struct LessonPlayer {
    tracker: Arc<ProgressTracker>,
    clock: Clock,
    checkpoint_interval: u32,
}

impl LessonPlayer {
    #[must_use]
    pub fn new(tracker: Arc<ProgressTracker>) -> Self {
        let clock = tracker.clock();
        Self {
            tracker,
            clock,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL_SECS,
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Zero checkpoints on every position update.
    #[must_use]
    pub fn with_checkpoint_interval(mut self, seconds: u32) -> Self {
        self.checkpoint_interval = seconds;
        self
    }

    /// Open the lesson and start timing the session.
    ///
    /// # Errors
    ///
    /// Returns `TrackerError` if the lesson cannot be opened.
    pub async fn start(
        &self,
        learner_id: &LearnerId,
        lesson_id: &LessonId,
    ) -> Result<ViewingSession, TrackerError> {
        let record = self.tracker.open_lesson(learner_id, lesson_id).await?;
        let now = self.clock.now();
        Ok(ViewingSession {
            learner_id: learner_id.clone(),
            lesson_id: lesson_id.clone(),
            opened_at: now,
            accrued_until: now,
            resume_position: record.last_position(),
            last_checkpoint: Some(record.last_position()),
            completed: record.is_completed(),
        })
    }

    /// Report the current playback position.
    ///
    /// Returns `true` when the position was written. A backward seek is always
    /// written; forward progress only once it moves a full interval past the
    /// last checkpoint.
    ///
    /// # Errors
    ///
    /// Returns `TrackerError` if the checkpoint cannot be written.
    pub async fn time_update(
        &self,
        session: &mut ViewingSession,
        position_seconds: u32,
    ) -> Result<bool, TrackerError> {
        if !session.should_checkpoint(position_seconds, self.checkpoint_interval) {
            return Ok(false);
        }
        self.tracker
            .checkpoint_position(
                &session.learner_id,
                &session.lesson_id,
                i64::from(position_seconds),
            )
            .await?;
        session.last_checkpoint = Some(position_seconds);
        Ok(true)
    }

    /// Playback reached the end, or the learner pressed "Mark Complete".
    ///
    /// # Errors
    ///
    /// Returns `TrackerError` if completion cannot be written.
    pub async fn ended(&self, session: &mut ViewingSession) -> Result<LessonProgress, TrackerError> {
        let record = self
            .tracker
            .mark_complete(&session.learner_id, &session.lesson_id)
            .await?;
        session.completed = true;
        Ok(record)
    }

    /// Accrue the time elapsed since the last successful accrual.
    ///
    /// The span is only consumed once the write succeeds, so a failed call can
    /// be retried without double counting.
    ///
    /// # Errors
    ///
    /// Returns `TrackerError` if the accrual cannot be written.
    pub async fn flush_time(
        &self,
        session: &mut ViewingSession,
    ) -> Result<LessonProgress, TrackerError> {
        let now = self.clock.now();
        let seconds = elapsed_seconds(session.accrued_until, now);
        let record = self
            .tracker
            .accrue_time(&session.learner_id, &session.lesson_id, i64::from(seconds))
            .await?;
        // Only whole seconds are written; the remainder carries into the next flush.
        session.accrued_until += Duration::seconds(i64::from(seconds));
        Ok(record)
    }

    /// The learner navigated away: accrue the remaining time and end the session.
    ///
    /// # Errors
    ///
    /// Returns `TrackerError` if the final accrual cannot be written; call
    /// `flush_time` first when the caller needs to retry on failure.
    pub async fn leave(&self, mut session: ViewingSession) -> Result<LessonProgress, TrackerError> {
        let record = self.flush_time(&mut session).await?;
        tracing::debug!(
            learner = %session.learner_id,
            lesson = %session.lesson_id,
            time_spent = record.time_spent(),
            "left lesson"
        );
        Ok(record)
    }
}
