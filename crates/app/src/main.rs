use std::fmt;
use std::time::Duration;

use learn_core::model::{CourseId, LearnerId, LessonId, ProgressStatus};
use services::{AppServices, Clock};
use storage::sqlite::SqliteConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingFlag { flag: &'static str },
    MissingCommand,
    UnknownArg(String),
    UnknownCommand(String),
    InvalidDbUrl { raw: String },
    InvalidNumber { flag: &'static str, raw: String },
    InvalidId { flag: &'static str, reason: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingFlag { flag } => write!(f, "{flag} is required"),
            ArgsError::MissingCommand => write!(f, "a command is required"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::UnknownCommand(cmd) => write!(f, "unknown command: {cmd}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidNumber { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::InvalidId { flag, reason } => write!(f, "invalid {flag}: {reason}"),
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

fn parse_number<T: std::str::FromStr>(value: String, flag: &'static str) -> Result<T, ArgsError> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| ArgsError::InvalidNumber { flag, raw: value })
}

fn parse_id<T, E>(value: Option<String>, flag: &'static str) -> Result<T, ArgsError>
where
    T: TryFrom<String, Error = E>,
    E: fmt::Display,
{
    let raw = value.ok_or(ArgsError::MissingFlag { flag })?;
    T::try_from(raw).map_err(|e| ArgsError::InvalidId {
        flag,
        reason: e.to_string(),
    })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- <command> [--db <sqlite_url>] --learner <id> [options]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  open       --lesson <id>                      Open a lesson, print its record");
    eprintln!("  checkpoint --lesson <id> --position <secs>    Save the playback position");
    eprintln!("  accrue     --lesson <id> --seconds <secs>     Add time spent on a lesson");
    eprintln!("  complete   --lesson <id>                      Mark a lesson complete");
    eprintln!("  status     --lesson <id>                      Print a lesson's status and record");
    eprintln!("  progress   --course <id>                      Print course completion");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db sqlite:dev.sqlite3");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  LEARN_DB_URL, LEARN_LEARNER_ID, LEARN_DB_MAX_CONNECTIONS,");
    eprintln!("  LEARN_DB_ACQUIRE_TIMEOUT_SECS, RUST_LOG");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Open,
    Checkpoint,
    Accrue,
    Complete,
    Status,
    Progress,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "open" => Some(Self::Open),
            "checkpoint" => Some(Self::Checkpoint),
            "accrue" => Some(Self::Accrue),
            "complete" => Some(Self::Complete),
            "status" => Some(Self::Status),
            "progress" => Some(Self::Progress),
            _ => None,
        }
    }
}

#[derive(Debug)]
enum Action {
    Open(LessonId),
    Checkpoint(LessonId, i64),
    Accrue(LessonId, i64),
    Complete(LessonId),
    Status(LessonId),
    Progress(CourseId),
}

#[derive(Debug)]
struct Args {
    db_url: String,
    config: SqliteConfig,
    learner: LearnerId,
    action: Action,
}

impl Args {
    fn parse(
        cmd: Command,
        args: &mut impl Iterator<Item = String>,
    ) -> Result<Self, ArgsError> {
        let mut db_url = std::env::var("LEARN_DB_URL")
            .ok()
            .map_or_else(|| "sqlite://dev.sqlite3".into(), normalize_sqlite_url);
        let mut learner = std::env::var("LEARN_LEARNER_ID").ok();
        let mut config = SqliteConfig::default();
        if let Ok(raw) = std::env::var("LEARN_DB_MAX_CONNECTIONS") {
            config.max_connections = parse_number(raw, "LEARN_DB_MAX_CONNECTIONS")?;
        }
        if let Ok(raw) = std::env::var("LEARN_DB_ACQUIRE_TIMEOUT_SECS") {
            config.acquire_timeout =
                Duration::from_secs(parse_number(raw, "LEARN_DB_ACQUIRE_TIMEOUT_SECS")?);
        }

        let mut lesson = None;
        let mut course = None;
        let mut position: Option<i64> = None;
        let mut seconds: Option<i64> = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--learner" => learner = Some(require_value(args, "--learner")?),
                "--lesson" => lesson = Some(require_value(args, "--lesson")?),
                "--course" => course = Some(require_value(args, "--course")?),
                "--position" => {
                    position = Some(parse_number(require_value(args, "--position")?, "--position")?);
                }
                "--seconds" => {
                    seconds = Some(parse_number(require_value(args, "--seconds")?, "--seconds")?);
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        let learner: LearnerId = parse_id(learner, "--learner")?;
        let action = match cmd {
            Command::Open => Action::Open(parse_id(lesson, "--lesson")?),
            Command::Checkpoint => Action::Checkpoint(
                parse_id(lesson, "--lesson")?,
                position.ok_or(ArgsError::MissingFlag { flag: "--position" })?,
            ),
            Command::Accrue => Action::Accrue(
                parse_id(lesson, "--lesson")?,
                seconds.ok_or(ArgsError::MissingFlag { flag: "--seconds" })?,
            ),
            Command::Complete => Action::Complete(parse_id(lesson, "--lesson")?),
            Command::Status => Action::Status(parse_id(lesson, "--lesson")?),
            Command::Progress => Action::Progress(parse_id(course, "--course")?),
        };

        Ok(Self {
            db_url,
            config,
            learner,
            action,
        })
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

fn init_tracing() {
    // stdout carries the JSON result, so logs go to stderr.
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv = std::env::args().skip(1);

    let cmd = match argv.next() {
        None => {
            print_usage();
            return Err(ArgsError::MissingCommand.into());
        }
        Some(first) if first == "--help" || first == "-h" => {
            print_usage();
            return Ok(());
        }
        Some(first) => Command::from_arg(&first).ok_or_else(|| {
            print_usage();
            ArgsError::UnknownCommand(first)
        })?,
    };

    let parsed = Args::parse(cmd, &mut argv).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    prepare_sqlite_file(&parsed.db_url)?;
    let app = AppServices::new_sqlite(&parsed.db_url, parsed.config, Clock::default_clock()).await?;
    let tracker = app.tracker();
    let learner = &parsed.learner;

    let output = match &parsed.action {
        Action::Open(lesson) => serde_json::to_value(tracker.open_lesson(learner, lesson).await?)?,
        Action::Checkpoint(lesson, position) => serde_json::to_value(
            tracker
                .checkpoint_position(learner, lesson, *position)
                .await?,
        )?,
        Action::Accrue(lesson, seconds) => {
            serde_json::to_value(tracker.accrue_time(learner, lesson, *seconds).await?)?
        }
        Action::Complete(lesson) => {
            serde_json::to_value(tracker.mark_complete(learner, lesson).await?)?
        }
        Action::Status(lesson) => {
            let record = tracker.get_progress(learner, lesson).await?;
            serde_json::json!({
                "status": ProgressStatus::of(record.as_ref()),
                "record": record,
            })
        }
        Action::Progress(course) => {
            serde_json::to_value(tracker.course_progress(learner, course).await?)?
        }
    };

    tracing::info!(command = ?cmd, learner = %learner, "done");
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        // Binary glue: print once and exit.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
