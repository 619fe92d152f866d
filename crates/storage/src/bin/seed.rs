use std::fmt;

use chrono::{DateTime, Utc};
use learn_core::model::{
    Course, CourseId, CourseModule, LearnerId, Lesson, LessonId, LessonKind, ModuleId,
    ProgressPatch,
};
use storage::repository::Storage;

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    course_id: String,
    course_title: String,
    modules: u32,
    lessons_per_module: u32,
    learner_id: Option<String>,
    completed: u32,
    now: Option<DateTime<Utc>>,
}

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidCount { flag: &'static str, raw: String },
    InvalidDbUrl { raw: String },
    InvalidNow { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidCount { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidNow { raw } => {
                write!(f, "invalid --now value (expected RFC3339): {raw}")
            }
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn parse_count(value: String, flag: &'static str) -> Result<u32, ArgsError> {
    value
        .parse::<u32>()
        .map_err(|_| ArgsError::InvalidCount { flag, raw: value })
}

impl Args {
    fn parse() -> Result<Self, ArgsError> {
        let mut db_url =
            std::env::var("LEARN_DB_URL").unwrap_or_else(|_| "sqlite:dev.sqlite3".into());
        let mut course_id =
            std::env::var("LEARN_COURSE_ID").unwrap_or_else(|_| "demo-course".into());
        let mut course_title =
            std::env::var("LEARN_COURSE_TITLE").unwrap_or_else(|_| "Sourdough Basics".into());
        let mut modules = 2;
        let mut lessons_per_module = 3;
        let mut learner_id = std::env::var("LEARN_LEARNER_ID").ok();
        let mut completed = 0;
        let mut now: Option<DateTime<Utc>> = None;

        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = value;
                }
                "--course-id" => course_id = require_value(&mut args, "--course-id")?,
                "--course-title" => course_title = require_value(&mut args, "--course-title")?,
                "--modules" => {
                    modules = parse_count(require_value(&mut args, "--modules")?, "--modules")?;
                }
                "--lessons" => {
                    lessons_per_module =
                        parse_count(require_value(&mut args, "--lessons")?, "--lessons")?;
                }
                "--learner" => learner_id = Some(require_value(&mut args, "--learner")?),
                "--completed" => {
                    completed =
                        parse_count(require_value(&mut args, "--completed")?, "--completed")?;
                }
                "--now" => {
                    let value = require_value(&mut args, "--now")?;
                    let parsed = DateTime::parse_from_rfc3339(&value)
                        .map_err(|_| ArgsError::InvalidNow { raw: value.clone() })?
                        .with_timezone(&Utc);
                    now = Some(parsed);
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            course_id,
            course_title,
            modules,
            lessons_per_module,
            learner_id,
            completed,
            now,
        })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p storage --bin seed -- [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>         SQLite URL (default: sqlite:dev.sqlite3)");
    eprintln!("  --course-id <id>          Course id to upsert (default: demo-course)");
    eprintln!("  --course-title <title>    Course title (default: Sourdough Basics)");
    eprintln!("  --modules <n>             Number of modules (default: 2)");
    eprintln!("  --lessons <n>             Lessons per module (default: 3)");
    eprintln!("  --learner <id>            Learner to seed progress for");
    eprintln!("  --completed <n>           Lessons to mark completed for --learner (default: 0)");
    eprintln!("  --now <rfc3339>           Fixed current time for deterministic seeding");
    eprintln!("  -h, --help                Show this help");
    eprintln!();
    eprintln!("Environment (same as flags):");
    eprintln!("  LEARN_DB_URL, LEARN_COURSE_ID, LEARN_COURSE_TITLE, LEARN_LEARNER_ID");
}

const KINDS: [LessonKind; 4] = [
    LessonKind::Video,
    LessonKind::Text,
    LessonKind::Quiz,
    LessonKind::File,
];

fn build_course(args: &Args) -> Result<Course, Box<dyn std::error::Error>> {
    let mut modules = Vec::new();
    for m in 0..args.modules {
        let mut lessons = Vec::new();
        for l in 0..args.lessons_per_module {
            let kind = KINDS[(l as usize) % KINDS.len()];
            let duration = kind.tracks_position().then_some(300 + 60 * l);
            lessons.push(Lesson::new(
                LessonId::new(format!("{}-m{}-l{}", args.course_id, m + 1, l + 1))?,
                format!("Lesson {}.{}", m + 1, l + 1),
                kind,
                duration,
            )?);
        }
        modules.push(CourseModule::new(
            ModuleId::new(format!("{}-m{}", args.course_id, m + 1))?,
            format!("Module {}", m + 1),
            lessons,
        )?);
    }
    Ok(Course::new(
        CourseId::new(args.course_id.clone())?,
        args.course_title.clone(),
        modules,
    )?)
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse().map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let storage = Storage::sqlite(&args.db_url).await?;
    let now = args.now.unwrap_or_else(Utc::now);

    let course = build_course(&args)?;
    storage.catalog.upsert_course(&course).await?;

    let mut seeded_progress = 0;
    if let Some(raw) = &args.learner_id {
        let learner = LearnerId::new(raw.as_str())?;
        for lesson_id in course.lesson_ids().iter().take(args.completed as usize) {
            storage
                .progress
                .upsert_progress(&learner, lesson_id, &ProgressPatch::complete(now), now)
                .await?;
            seeded_progress += 1;
        }
    }

    println!(
        "Seeded course {} with {} lessons ({} completed for learner) into {}",
        course.id(),
        course.lesson_count(),
        seeded_progress,
        args.db_url
    );

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
