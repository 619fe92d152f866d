use chrono::Duration;
use learn_core::model::{
    Course, CourseId, CourseModule, LearnerId, Lesson, LessonId, LessonKind, ModuleId,
    ProgressPatch, TimeSpentUpdate,
};
use learn_core::time::fixed_now;
use storage::repository::{CourseCatalog, ProgressRepository, StorageError};
use storage::sqlite::SqliteRepository;

async fn connect(name: &str) -> SqliteRepository {
    let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
    let repo = SqliteRepository::connect(&url).await.expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

fn learner() -> LearnerId {
    LearnerId::new("learner-1").unwrap()
}

fn lesson(id: &str) -> LessonId {
    LessonId::new(id).unwrap()
}

fn sample_course(id: &str) -> Course {
    Course::new(
        CourseId::new(id).unwrap(),
        "Watercolor",
        vec![
            CourseModule::new(
                ModuleId::new(format!("{id}-m1")).unwrap(),
                "Washes",
                vec![
                    Lesson::new(
                        lesson(&format!("{id}-l1")),
                        "Flat wash",
                        LessonKind::Video,
                        Some(600),
                    )
                    .unwrap(),
                    Lesson::new(lesson(&format!("{id}-l2")), "Notes", LessonKind::Text, None)
                        .unwrap(),
                ],
            )
            .unwrap(),
            CourseModule::new(
                ModuleId::new(format!("{id}-m2")).unwrap(),
                "Review",
                vec![
                    Lesson::new(lesson(&format!("{id}-l3")), "Quiz", LessonKind::Quiz, None)
                        .unwrap(),
                ],
            )
            .unwrap(),
        ],
    )
    .unwrap()
}

#[tokio::test]
async fn sqlite_upsert_preserves_fields_and_first_completion() {
    let repo = connect("memdb_progress_upsert").await;
    let l1 = lesson("l1");
    let t0 = fixed_now();

    let opened = repo
        .upsert_progress(&learner(), &l1, &ProgressPatch::touch(), t0)
        .await
        .unwrap();
    assert_eq!(opened.last_position(), 0);
    assert_eq!(opened.time_spent(), 0);
    assert!(!opened.is_completed());

    repo.upsert_progress(&learner(), &l1, &ProgressPatch::position(42), t0)
        .await
        .unwrap();
    repo.upsert_progress(&learner(), &l1, &ProgressPatch::add_time(30), t0)
        .await
        .unwrap();
    repo.upsert_progress(&learner(), &l1, &ProgressPatch::add_time(15), t0)
        .await
        .unwrap();

    let reopened = repo
        .upsert_progress(&learner(), &l1, &ProgressPatch::touch(), t0 + Duration::seconds(5))
        .await
        .unwrap();
    assert_eq!(reopened.last_position(), 42);
    assert_eq!(reopened.time_spent(), 45);

    let first = t0 + Duration::minutes(1);
    let second = t0 + Duration::minutes(2);
    repo.upsert_progress(&learner(), &l1, &ProgressPatch::complete(first), first)
        .await
        .unwrap();
    let again = repo
        .upsert_progress(&learner(), &l1, &ProgressPatch::complete(second), second)
        .await
        .unwrap();
    assert!(again.is_completed());
    assert_eq!(again.completed_at(), Some(first));
    assert_eq!(again.updated_at(), second);
    assert_eq!(again.created_at(), t0);

    let fetched = repo.get_progress(&learner(), &l1).await.unwrap().unwrap();
    assert_eq!(fetched, again);
}

#[tokio::test]
async fn sqlite_checkpoint_after_completion_only_moves_position() {
    let repo = connect("memdb_progress_checkpoint_after_complete").await;
    let l1 = lesson("l1");
    let t0 = fixed_now();

    repo.upsert_progress(&learner(), &l1, &ProgressPatch::add_time(30), t0)
        .await
        .unwrap();
    let done = repo
        .upsert_progress(&learner(), &l1, &ProgressPatch::complete(t0), t0)
        .await
        .unwrap();

    let later = t0 + Duration::minutes(5);
    let moved = repo
        .upsert_progress(&learner(), &l1, &ProgressPatch::position(300), later)
        .await
        .unwrap();
    assert_eq!(moved.last_position(), 300);
    assert!(moved.is_completed());
    assert_eq!(moved.completed_at(), done.completed_at());
    assert_eq!(moved.time_spent(), 30);
    assert_eq!(moved.created_at(), t0);
    assert_eq!(moved.updated_at(), later);
}

#[tokio::test]
async fn sqlite_missing_schema_is_not_retryable() {
    let url = "sqlite:file:memdb_unmigrated?mode=memory&cache=shared";
    let repo = SqliteRepository::connect(url).await.expect("connect");

    let err = repo.get_progress(&learner(), &lesson("l1")).await.unwrap_err();
    assert!(matches!(err, StorageError::Database(_)), "{err:?}");
    assert!(!err.is_unavailable());
}

#[tokio::test]
async fn sqlite_set_time_overwrites_and_missing_is_none() {
    let repo = connect("memdb_progress_set").await;
    let l1 = lesson("l1");

    assert!(repo.get_progress(&learner(), &l1).await.unwrap().is_none());

    repo.upsert_progress(&learner(), &l1, &ProgressPatch::add_time(90), fixed_now())
        .await
        .unwrap();
    let corrected = repo
        .upsert_progress(
            &learner(),
            &l1,
            &ProgressPatch {
                time_spent: Some(TimeSpentUpdate::Set(12)),
                ..ProgressPatch::default()
            },
            fixed_now(),
        )
        .await
        .unwrap();
    assert_eq!(corrected.time_spent(), 12);
}

#[tokio::test]
async fn sqlite_concurrent_accruals_are_not_lost() {
    let repo = connect("memdb_progress_concurrent").await;
    let l1 = lesson("l1");
    repo.upsert_progress(&learner(), &l1, &ProgressPatch::touch(), fixed_now())
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let repo = repo.clone();
        let l1 = l1.clone();
        handles.push(tokio::spawn(async move {
            repo.upsert_progress(&learner(), &l1, &ProgressPatch::add_time(10), fixed_now())
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let record = repo.get_progress(&learner(), &l1).await.unwrap().unwrap();
    assert_eq!(record.time_spent(), 80);
}

#[tokio::test]
async fn sqlite_lists_only_requested_lessons_for_learner() {
    let repo = connect("memdb_progress_list").await;
    let other = LearnerId::new("learner-2").unwrap();

    for id in ["a", "b", "c"] {
        repo.upsert_progress(&learner(), &lesson(id), &ProgressPatch::touch(), fixed_now())
            .await
            .unwrap();
    }
    repo.upsert_progress(&other, &lesson("a"), &ProgressPatch::touch(), fixed_now())
        .await
        .unwrap();

    let mut found = repo
        .list_progress_for_lessons(&learner(), &[lesson("a"), lesson("c"), lesson("z")])
        .await
        .unwrap();
    found.sort_by(|x, y| x.lesson_id().cmp(y.lesson_id()));
    let ids: Vec<_> = found.iter().map(|r| r.lesson_id().as_str().to_owned()).collect();
    assert_eq!(ids, vec!["a", "c"]);

    assert!(
        repo.list_progress_for_lessons(&learner(), &[])
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn sqlite_catalog_round_trips_course_order() {
    let repo = connect("memdb_catalog").await;
    let course = sample_course("c1");
    repo.upsert_course(&course).await.unwrap();

    let ids = repo.list_lesson_ids(course.id()).await.unwrap();
    assert_eq!(ids, course.lesson_ids());

    let fetched = repo.get_course(course.id()).await.unwrap().unwrap();
    assert_eq!(fetched, course);

    let missing = CourseId::new("missing").unwrap();
    assert!(repo.list_lesson_ids(&missing).await.unwrap().is_empty());
    assert!(repo.get_course(&missing).await.unwrap().is_none());
}

#[tokio::test]
async fn sqlite_catalog_upsert_drops_removed_lessons() {
    let repo = connect("memdb_catalog_shrink").await;
    let course = sample_course("c2");
    repo.upsert_course(&course).await.unwrap();

    let trimmed = Course::new(
        course.id().clone(),
        "Watercolor",
        vec![course.modules()[0].clone()],
    )
    .unwrap();
    repo.upsert_course(&trimmed).await.unwrap();

    let ids = repo.list_lesson_ids(course.id()).await.unwrap();
    assert_eq!(ids, vec![lesson("c2-l1"), lesson("c2-l2")]);
}
