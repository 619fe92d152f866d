#![forbid(unsafe_code)]

pub mod app_services;
pub mod error;
pub mod player;
pub mod progress_tracker;

pub use learn_core::Clock;

pub use app_services::AppServices;
pub use error::{AppServicesError, TrackerError};
pub use player::{DEFAULT_CHECKPOINT_INTERVAL_SECS, LessonPlayer, ViewingSession};
pub use progress_tracker::ProgressTracker;
