use learn_core::model::{LearnerId, LessonId, LessonProgress, TimeSpentUpdate};
use sqlx::Row;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

// SQLITE_BUSY and SQLITE_LOCKED, compared on the primary result code.
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

/// True for result codes (primary or extended) that mean another connection
/// holds the lock and the same statement may succeed later.
pub(crate) fn is_busy_or_locked(code: &str) -> bool {
    code.parse::<i32>()
        .is_ok_and(|c| matches!(c & 0xff, SQLITE_BUSY | SQLITE_LOCKED))
}

/// Classify a driver error. Transport, pool and busy/locked database errors
/// become retryable connection errors; constraint violations are conflicts;
/// other database errors (missing table, corrupt or read-only file) are
/// permanent; the rest are decoding problems.
pub(crate) fn db_err(e: sqlx::Error) -> StorageError {
    match e {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => StorageError::Connection(e.to_string()),
        sqlx::Error::Database(ref db)
            if db.is_unique_violation()
                || db.is_check_violation()
                || db.is_foreign_key_violation() =>
        {
            StorageError::Conflict
        }
        sqlx::Error::Database(ref db) if db.code().is_some_and(|c| is_busy_or_locked(&c)) => {
            StorageError::Connection(e.to_string())
        }
        sqlx::Error::Database(_) => StorageError::Database(e.to_string()),
        other => StorageError::Serialization(other.to_string()),
    }
}

pub(crate) fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

/// Values written on first insert for a patch's `time_spent`.
pub(crate) fn time_spent_parts(update: Option<TimeSpentUpdate>) -> (&'static str, i64) {
    match update {
        None => ("keep", 0),
        Some(TimeSpentUpdate::Add(secs)) => ("add", i64::from(secs)),
        Some(TimeSpentUpdate::Set(secs)) => ("set", i64::from(secs)),
    }
}

pub(crate) fn map_progress_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<LessonProgress, StorageError> {
    let learner_id =
        LearnerId::new(row.try_get::<String, _>("learner_id").map_err(ser)?).map_err(ser)?;
    let lesson_id =
        LessonId::new(row.try_get::<String, _>("lesson_id").map_err(ser)?).map_err(ser)?;

    LessonProgress::from_persisted(
        learner_id,
        lesson_id,
        row.try_get::<bool, _>("completed").map_err(ser)?,
        row.try_get("completed_at").map_err(ser)?,
        u32_from_i64(
            "last_position",
            row.try_get::<i64, _>("last_position").map_err(ser)?,
        )?,
        u32_from_i64("time_spent", row.try_get::<i64, _>("time_spent").map_err(ser)?)?,
        row.try_get("created_at").map_err(ser)?,
        row.try_get("updated_at").map_err(ser)?,
    )
    .map_err(ser)
}
