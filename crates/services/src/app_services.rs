use std::sync::Arc;

use storage::repository::{CourseCatalog, Storage};
use storage::sqlite::SqliteConfig;

use crate::error::AppServicesError;
use crate::player::LessonPlayer;
use crate::progress_tracker::ProgressTracker;
use crate::Clock;

/// Assembles the progress tracker and lesson player over one storage backend.
#[derive(Clone)]
pub struct AppServices {
    catalog: Arc<dyn CourseCatalog>,
    tracker: Arc<ProgressTracker>,
    player: LessonPlayer,
}

impl AppServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if the database cannot be opened or migrated.
    pub async fn new_sqlite(
        db_url: &str,
        config: SqliteConfig,
        clock: Clock,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite_with(db_url, config).await?;
        Ok(Self::from_storage(storage, clock))
    }

    /// Build services over process-local storage.
    #[must_use]
    pub fn in_memory(clock: Clock) -> Self {
        Self::from_storage(Storage::in_memory(), clock)
    }

    #[must_use]
    pub fn from_storage(storage: Storage, clock: Clock) -> Self {
        let tracker = Arc::new(ProgressTracker::new(
            clock,
            Arc::clone(&storage.progress),
            Arc::clone(&storage.catalog),
        ));
        let player = LessonPlayer::new(Arc::clone(&tracker));
        Self {
            catalog: storage.catalog,
            tracker,
            player,
        }
    }

    #[must_use]
    pub fn tracker(&self) -> Arc<ProgressTracker> {
        Arc::clone(&self.tracker)
    }

    #[must_use]
    pub fn player(&self) -> LessonPlayer {
        self.player.clone()
    }

    #[must_use]
    pub fn catalog(&self) -> Arc<dyn CourseCatalog> {
        Arc::clone(&self.catalog)
    }
}
