use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use quiz_core::legacy::{LegacyKey, LegacySource, MergedScope};

use crate::Clock;
use crate::error::MigrationError;
use crate::progress_store::ProgressStore;

/// Persisted once migration has run to completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationMarker {
    pub completed: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationState {
    NotStarted,
    Scanning,
    Merging,
    /// Terminal: the marker is written and the migration never runs again.
    Archived,
}

/// What a migration run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub state: MigrationState,
    /// The marker was already present; nothing was scanned.
    pub already_completed: bool,
    pub migrated_keys: Vec<&'static str>,
    /// Present but unparseable; left in place.
    pub skipped_keys: Vec<&'static str>,
    pub dropped_categories: Vec<String>,
    pub merged: Vec<MergedScope>,
    pub identity_applied: bool,
}

impl MigrationReport {
    fn new() -> Self {
        Self {
            state: MigrationState::NotStarted,
            already_completed: false,
            migrated_keys: Vec::new(),
            skipped_keys: Vec::new(),
            dropped_categories: Vec::new(),
            merged: Vec::new(),
            identity_applied: false,
        }
    }

    fn advance(&mut self, next: MigrationState) {
        debug!(from = ?self.state, to = ?next, "migration state");
        self.state = next;
    }
}

/// Folds legacy progress blobs into the canonical record at startup.
#[derive(Clone)]
pub struct LegacyMigrator {
    clock: Clock,
    store: ProgressStore,
}

impl LegacyMigrator {
    #[must_use]
    pub fn new(clock: Clock, store: ProgressStore) -> Self {
        Self { clock, store }
    }

    /// Scan, merge, and archive every known legacy source.
    ///
    /// Malformed sources are skipped. The canonical record is saved before
    /// any source is archived, and the marker is written last, so an
    /// interrupted run is retried on the next start; the max-merge makes a
    /// repeated merge harmless.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError` if the storage cannot be read, the merged
    /// record is invalid, or it cannot be saved. Nothing is archived in that case.
    pub async fn run(&self) -> Result<MigrationReport, MigrationError> {
        let mut report = MigrationReport::new();

        if let Some(marker) = self.store.migration_marker().await? {
            if marker.completed {
                report.already_completed = true;
                report.advance(MigrationState::Archived);
                return Ok(report);
            }
        }

        report.advance(MigrationState::Scanning);
        let mut sources: Vec<(LegacyKey, LegacySource)> = Vec::new();
        for key in LegacyKey::ALL {
            let Some(raw) = self.store.read_legacy(key).await? else {
                continue;
            };
            match key.parse(&raw) {
                Ok(source) => sources.push((key, source)),
                Err(err) => {
                    warn!(error = %err, "skipping malformed legacy source");
                    report.skipped_keys.push(key.storage_key());
                }
            }
        }

        if !sources.is_empty() {
            report.advance(MigrationState::Merging);
            let mut record = self.store.load().await?;
            for (key, source) in &sources {
                let outcome = source.merge_into(&mut record);
                report.migrated_keys.push(key.storage_key());
                report.merged.extend(outcome.merged);
                report.dropped_categories.extend(outcome.dropped_categories);
                report.identity_applied |= outcome.identity_applied;
            }
            record.validate()?;
            self.store.save(&record).await?;

            let mut archived_all = true;
            for (key, _) in &sources {
                if let Err(err) = self.store.archive_legacy(*key).await {
                    warn!(key = key.storage_key(), error = %err, "failed to archive legacy source");
                    archived_all = false;
                }
            }
            if !archived_all {
                // Leave the marker unwritten so the next start retries the archive.
                return Ok(report);
            }
        }

        let marker = MigrationMarker {
            completed: true,
            timestamp: self.clock.now(),
        };
        if let Err(err) = self.store.write_migration_marker(&marker).await {
            warn!(error = %err, "failed to write migration marker");
        }
        report.advance(MigrationState::Archived);
        info!(
            migrated = report.migrated_keys.len(),
            skipped = report.skipped_keys.len(),
            dropped = report.dropped_categories.len(),
            "legacy migration complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use quiz_core::model::{Category, ProgressRecord, Scope, ScopeProgress};
    use quiz_core::time::fixed_clock;
    use std::sync::Arc;
    use storage::repository::{InMemoryStore, KeyValueStore, StorageError};

    use crate::progress_store::{MIGRATION_MARKER_KEY, PROGRESS_KEY};

    fn migrator_over(kv: Arc<dyn KeyValueStore>) -> (LegacyMigrator, ProgressStore) {
        let store = ProgressStore::new(kv);
        (LegacyMigrator::new(fixed_clock(), store.clone()), store)
    }

    async fn seed_legacy(kv: &InMemoryStore) {
        kv.set(
            "categoryStats",
            r#"{"categories":{"category_1":{"solved":10,"correct":6},"category_8":{"solved":1,"correct":1}}}"#,
        )
        .await
        .unwrap();
        kv.set(
            "userStatistics",
            r#"{"total_questions_attempted":30,"total_correct_answers":20,"daily_progress":{}}"#,
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn empty_storage_goes_straight_to_archived() {
        let kv = InMemoryStore::new();
        let (migrator, _) = migrator_over(Arc::new(kv.clone()));

        let report = migrator.run().await.unwrap();

        assert_eq!(report.state, MigrationState::Archived);
        assert!(report.migrated_keys.is_empty());
        assert!(kv.get(MIGRATION_MARKER_KEY).await.unwrap().is_some());
        assert!(migrator.run().await.unwrap().already_completed);
    }

    #[tokio::test]
    async fn merges_archives_and_marks_completion() {
        let kv = InMemoryStore::new();
        seed_legacy(&kv).await;
        let (migrator, store) = migrator_over(Arc::new(kv.clone()));

        let report = migrator.run().await.unwrap();

        assert_eq!(report.state, MigrationState::Archived);
        assert_eq!(report.migrated_keys, vec!["categoryStats", "userStatistics"]);
        assert_eq!(report.dropped_categories, vec!["category_8".to_string()]);
        let life = report
            .merged
            .iter()
            .find(|m| m.scope == Scope::Category(Category::Life))
            .unwrap();
        assert_eq!(life.accuracy, 60);

        let record = store.load().await.unwrap();
        assert_eq!(record.basic_learning().total_attempted(), 30);
        assert_eq!(
            record.category(Category::Life).unwrap().progress().total_correct(),
            6
        );
        assert_eq!(kv.get("categoryStats").await.unwrap(), None);
        assert!(kv.get("categoryStats.archived").await.unwrap().is_some());
        assert!(kv.get("userStatistics.archived").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn second_run_is_a_no_op() {
        let kv = InMemoryStore::new();
        seed_legacy(&kv).await;
        let (migrator, store) = migrator_over(Arc::new(kv.clone()));

        migrator.run().await.unwrap();
        let once = store.load().await.unwrap();

        // Even without the marker, archived sources are not found again.
        kv.remove(MIGRATION_MARKER_KEY).await.unwrap();
        let report = migrator.run().await.unwrap();

        assert!(report.migrated_keys.is_empty());
        assert_eq!(store.load().await.unwrap(), once);
    }

    #[tokio::test]
    async fn merge_never_lowers_canonical_progress() {
        let kv = InMemoryStore::new();
        let (migrator, store) = migrator_over(Arc::new(kv.clone()));
        let mut record = ProgressRecord::fresh();
        *record.scope_mut(Scope::Category(Category::Life)) =
            ScopeProgress::from_persisted(40, 80, 70, 0, 0, None);
        store.save(&record).await.unwrap();
        seed_legacy(&kv).await;

        migrator.run().await.unwrap();

        let life = store.load().await.unwrap();
        let life = life.category(Category::Life).unwrap().progress();
        assert_eq!(life.total_attempted(), 80);
        assert_eq!(life.total_correct(), 70);
        assert_eq!(life.last_question(), 40);
    }

    #[tokio::test]
    async fn malformed_sources_are_skipped_without_blocking_others() {
        let kv = InMemoryStore::new();
        kv.set("categoryStats", "{oops").await.unwrap();
        kv.set(
            "learning_progress",
            r#"{"basic_learning":{"last_question":9,"total_attempted":9,"total_correct":9}}"#,
        )
        .await
        .unwrap();
        let (migrator, store) = migrator_over(Arc::new(kv.clone()));

        let report = migrator.run().await.unwrap();

        assert_eq!(report.state, MigrationState::Archived);
        assert_eq!(report.skipped_keys, vec!["categoryStats"]);
        assert_eq!(report.migrated_keys, vec!["learning_progress"]);
        assert_eq!(store.load().await.unwrap().basic_learning().last_question(), 9);
        assert_eq!(kv.get("categoryStats").await.unwrap().as_deref(), Some("{oops"));
    }

    #[tokio::test]
    async fn failed_save_archives_nothing() {
        let kv = InMemoryStore::new();
        seed_legacy(&kv).await;
        let (migrator, _) = migrator_over(Arc::new(kv.clone()));
        let used: usize = {
            let mut total = 0;
            for key in kv.keys().await.unwrap() {
                total += key.len() + kv.get(&key).await.unwrap().unwrap_or_default().len();
            }
            total
        };
        kv.set_quota(Some(used));

        let err = migrator.run().await.unwrap_err();

        assert!(matches!(err, MigrationError::Store(_)));
        assert!(kv.get("categoryStats").await.unwrap().is_some());
        assert!(kv.get("userStatistics").await.unwrap().is_some());
        assert_eq!(kv.get(MIGRATION_MARKER_KEY).await.unwrap(), None);
        assert_eq!(kv.get(PROGRESS_KEY).await.unwrap(), None);
    }

    /// Delegates to an in-memory store but refuses every rename.
    #[derive(Clone)]
    struct NoRenameStore(InMemoryStore);

    #[async_trait]
    impl KeyValueStore for NoRenameStore {
        async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            self.0.get(key).await
        }

        async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
            self.0.set(key, value).await
        }

        async fn remove(&self, key: &str) -> Result<(), StorageError> {
            self.0.remove(key).await
        }

        async fn rename(&self, _from: &str, _to: &str) -> Result<(), StorageError> {
            Err(StorageError::Conflict)
        }

        async fn keys(&self) -> Result<Vec<String>, StorageError> {
            self.0.keys().await
        }
    }

    #[tokio::test]
    async fn failed_archive_leaves_migration_retryable() {
        let kv = InMemoryStore::new();
        seed_legacy(&kv).await;
        let (migrator, store) = migrator_over(Arc::new(NoRenameStore(kv.clone())));

        let report = migrator.run().await.unwrap();
        assert_eq!(report.state, MigrationState::Merging);
        assert_eq!(kv.get(MIGRATION_MARKER_KEY).await.unwrap(), None);
        let first = store.load().await.unwrap();

        // Retrying merges the same sources again without double counting.
        migrator.run().await.unwrap();
        assert_eq!(store.load().await.unwrap(), first);
    }
}
