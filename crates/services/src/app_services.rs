use std::sync::Arc;

use quiz_core::model::ProgressRecord;
use quiz_core::stats::{self, StatsView};
use storage::repository::Storage;
use tracing::warn;

use crate::Clock;
use crate::error::{AppServicesError, ProgressStoreError};
use crate::migration::{LegacyMigrator, MigrationReport};
use crate::mode_transition::ModeTransitionManager;
use crate::progress_store::ProgressStore;
use crate::tracker::SessionProgressTracker;

/// Assembles the progress services over one storage backend.
///
/// Construction runs the legacy migration before any tracker is handed out.
#[derive(Clone)]
pub struct AppServices {
    clock: Clock,
    store: ProgressStore,
    tracker: Arc<SessionProgressTracker>,
    transitions: Arc<ModeTransitionManager>,
    migration: Option<MigrationReport>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails or the
    /// canonical record cannot be read.
    pub async fn new_sqlite(db_url: &str, clock: Clock) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Self::from_storage(&storage, clock).await
    }

    /// Build services over an existing storage backend.
    ///
    /// A failed migration is logged and startup continues; it is retried on
    /// the next start.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError::Store` if the canonical record cannot be read.
    pub async fn from_storage(storage: &Storage, clock: Clock) -> Result<Self, AppServicesError> {
        let store = ProgressStore::new(Arc::clone(&storage.kv));

        let migration = match LegacyMigrator::new(clock, store.clone()).run().await {
            Ok(report) => Some(report),
            Err(err) => {
                warn!(error = %err, "legacy migration failed, continuing with stored record");
                None
            }
        };
        store.load().await?;

        let tracker = Arc::new(SessionProgressTracker::new(clock, store.clone()));
        let transitions = Arc::new(ModeTransitionManager::new(clock, store.clone()));

        Ok(Self {
            clock,
            store,
            tracker,
            transitions,
            migration,
        })
    }

    #[must_use]
    pub fn store(&self) -> &ProgressStore {
        &self.store
    }

    #[must_use]
    pub fn tracker(&self) -> Arc<SessionProgressTracker> {
        Arc::clone(&self.tracker)
    }

    #[must_use]
    pub fn transitions(&self) -> Arc<ModeTransitionManager> {
        Arc::clone(&self.transitions)
    }

    /// Report of the startup migration, if it ran to a result.
    #[must_use]
    pub fn migration(&self) -> Option<&MigrationReport> {
        self.migration.as_ref()
    }

    /// Current record.
    ///
    /// # Errors
    ///
    /// Returns `ProgressStoreError` if the record cannot be read.
    pub async fn record(&self) -> Result<ProgressRecord, ProgressStoreError> {
        self.store.load().await
    }

    /// Statistics for display, with stale today counters treated as zero.
    ///
    /// # Errors
    ///
    /// Returns `ProgressStoreError` if the record cannot be read.
    pub async fn stats(&self) -> Result<StatsView, ProgressStoreError> {
        let record = self.store.load().await?;
        Ok(stats::derive_as_of(&record, self.clock.today()))
    }
}
