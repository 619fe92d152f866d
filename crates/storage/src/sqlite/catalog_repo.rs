use learn_core::model::{Course, CourseId, CourseModule, Lesson, LessonId, LessonKind, ModuleId};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{db_err, ser, u32_from_i64};
use crate::repository::{CourseCatalog, StorageError};

fn position_i64(index: usize) -> Result<i64, StorageError> {
    i64::try_from(index).map_err(|_| StorageError::Serialization("position overflow".into()))
}

#[async_trait::async_trait]
impl CourseCatalog for SqliteRepository {
    async fn list_lesson_ids(&self, course_id: &CourseId) -> Result<Vec<LessonId>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT l.id
            FROM lessons l
            JOIN course_modules m ON m.id = l.module_id
            WHERE m.course_id = ?1
            ORDER BY m.position ASC, l.position ASC
            ",
        )
        .bind(course_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            ids.push(LessonId::new(row.try_get::<String, _>("id").map_err(ser)?).map_err(ser)?);
        }
        Ok(ids)
    }

    async fn get_course(&self, course_id: &CourseId) -> Result<Option<Course>, StorageError> {
        let Some(course_row) = sqlx::query("SELECT id, title FROM courses WHERE id = ?1")
            .bind(course_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
        else {
            return Ok(None);
        };

        let module_rows = sqlx::query(
            r"
            SELECT id, title FROM course_modules
            WHERE course_id = ?1
            ORDER BY position ASC
            ",
        )
        .bind(course_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let lesson_rows = sqlx::query(
            r"
            SELECT l.id, l.module_id, l.title, l.kind, l.duration_seconds
            FROM lessons l
            JOIN course_modules m ON m.id = l.module_id
            WHERE m.course_id = ?1
            ORDER BY m.position ASC, l.position ASC
            ",
        )
        .bind(course_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut modules = Vec::with_capacity(module_rows.len());
        for module_row in &module_rows {
            let module_id: String = module_row.try_get("id").map_err(ser)?;
            let mut lessons = Vec::new();
            for lesson_row in lesson_rows.iter().filter(|r| {
                r.try_get::<String, _>("module_id")
                    .is_ok_and(|m| m == module_id)
            }) {
                let kind: String = lesson_row.try_get("kind").map_err(ser)?;
                let duration = lesson_row
                    .try_get::<Option<i64>, _>("duration_seconds")
                    .map_err(ser)?
                    .map(|d| u32_from_i64("duration_seconds", d))
                    .transpose()?;
                lessons.push(
                    Lesson::new(
                        LessonId::new(lesson_row.try_get::<String, _>("id").map_err(ser)?)
                            .map_err(ser)?,
                        lesson_row.try_get::<String, _>("title").map_err(ser)?,
                        kind.parse::<LessonKind>().map_err(ser)?,
                        duration,
                    )
                    .map_err(ser)?,
                );
            }
            modules.push(
                CourseModule::new(
                    ModuleId::new(module_id).map_err(ser)?,
                    module_row.try_get::<String, _>("title").map_err(ser)?,
                    lessons,
                )
                .map_err(ser)?,
            );
        }

        Course::new(
            CourseId::new(course_row.try_get::<String, _>("id").map_err(ser)?).map_err(ser)?,
            course_row.try_get::<String, _>("title").map_err(ser)?,
            modules,
        )
        .map(Some)
        .map_err(ser)
    }

    async fn upsert_course(&self, course: &Course) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query(
            r"
            INSERT INTO courses (id, title) VALUES (?1, ?2)
            ON CONFLICT(id) DO UPDATE SET title = excluded.title
            ",
        )
        .bind(course.id().as_str())
        .bind(course.title())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        // Rebuild the tree; lessons go with their modules via ON DELETE CASCADE.
        sqlx::query("DELETE FROM course_modules WHERE course_id = ?1")
            .bind(course.id().as_str())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        for (module_pos, module) in course.modules().iter().enumerate() {
            sqlx::query(
                r"
                INSERT INTO course_modules (id, course_id, title, position)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(id) DO UPDATE SET
                    course_id = excluded.course_id,
                    title = excluded.title,
                    position = excluded.position
                ",
            )
            .bind(module.id().as_str())
            .bind(course.id().as_str())
            .bind(module.title())
            .bind(position_i64(module_pos)?)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

            for (lesson_pos, lesson) in module.lessons().iter().enumerate() {
                sqlx::query(
                    r"
                    INSERT INTO lessons (id, module_id, title, kind, position, duration_seconds)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    ON CONFLICT(id) DO UPDATE SET
                        module_id = excluded.module_id,
                        title = excluded.title,
                        kind = excluded.kind,
                        position = excluded.position,
                        duration_seconds = excluded.duration_seconds
                    ",
                )
                .bind(lesson.id().as_str())
                .bind(module.id().as_str())
                .bind(lesson.title())
                .bind(lesson.kind().as_str())
                .bind(position_i64(lesson_pos)?)
                .bind(lesson.duration_seconds().map(i64::from))
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
            }
        }

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }
}
