use chrono::{DateTime, Utc};
use learn_core::model::{LearnerId, LessonId, LessonProgress, ProgressPatch};

use super::SqliteRepository;
use super::mapping::{db_err, map_progress_row, time_spent_parts};
use crate::repository::{ProgressRepository, StorageError};

const PROGRESS_COLUMNS: &str = "learner_id, lesson_id, completed, completed_at, last_position, \
                                time_spent, created_at, updated_at";

// Keeps each IN (...) list well under SQLite's bound-parameter limit.
const LESSON_CHUNK: usize = 500;

#[async_trait::async_trait]
impl ProgressRepository for SqliteRepository {
    async fn get_progress(
        &self,
        learner_id: &LearnerId,
        lesson_id: &LessonId,
    ) -> Result<Option<LessonProgress>, StorageError> {
        let sql = format!(
            "SELECT {PROGRESS_COLUMNS} FROM lesson_progress WHERE learner_id = ?1 AND lesson_id = ?2"
        );
        let row = sqlx::query(&sql)
            .bind(learner_id.as_str())
            .bind(lesson_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.as_ref().map(map_progress_row).transpose()
    }

    async fn upsert_progress(
        &self,
        learner_id: &LearnerId,
        lesson_id: &LessonId,
        patch: &ProgressPatch,
        now: DateTime<Utc>,
    ) -> Result<LessonProgress, StorageError> {
        let (time_mode, time_value) = time_spent_parts(patch.time_spent);
        let sql = format!(
            r"
            INSERT INTO lesson_progress (
                learner_id, lesson_id, completed, completed_at,
                last_position, time_spent, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
            ON CONFLICT(learner_id, lesson_id) DO UPDATE SET
                last_position = CASE WHEN ?8 THEN excluded.last_position
                                     ELSE lesson_progress.last_position END,
                time_spent = CASE ?9
                    WHEN 'add' THEN MIN(lesson_progress.time_spent + excluded.time_spent, 4294967295)
                    WHEN 'set' THEN excluded.time_spent
                    ELSE lesson_progress.time_spent END,
                -- the first completion timestamp wins
                completed = MAX(lesson_progress.completed, excluded.completed),
                completed_at = COALESCE(lesson_progress.completed_at, excluded.completed_at),
                updated_at = MAX(lesson_progress.updated_at, excluded.updated_at)
            RETURNING {PROGRESS_COLUMNS}
            "
        );

        let row = sqlx::query(&sql)
            .bind(learner_id.as_str())
            .bind(lesson_id.as_str())
            .bind(patch.complete_at.is_some())
            .bind(patch.complete_at)
            .bind(i64::from(patch.last_position.unwrap_or(0)))
            .bind(time_value)
            .bind(now)
            .bind(patch.last_position.is_some())
            .bind(time_mode)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;

        map_progress_row(&row)
    }

    async fn list_progress_for_lessons(
        &self,
        learner_id: &LearnerId,
        lesson_ids: &[LessonId],
    ) -> Result<Vec<LessonProgress>, StorageError> {
        let mut out = Vec::with_capacity(lesson_ids.len());

        for chunk in lesson_ids.chunks(LESSON_CHUNK) {
            let mut sql = format!(
                "SELECT {PROGRESS_COLUMNS} FROM lesson_progress WHERE learner_id = ?1 AND lesson_id IN ("
            );
            for i in 0..chunk.len() {
                if i > 0 {
                    sql.push_str(", ");
                }
                sql.push('?');
                sql.push_str(&(i + 2).to_string());
            }
            sql.push(')');

            let mut q = sqlx::query(&sql).bind(learner_id.as_str());
            for id in chunk {
                q = q.bind(id.as_str());
            }

            let rows = q.fetch_all(&self.pool).await.map_err(db_err)?;
            for row in rows {
                out.push(map_progress_row(&row)?);
            }
        }

        Ok(out)
    }
}
