use quiz_core::model::{ProgressRecord, Registration, UserInfo};
use tracing::{info, warn};

use crate::Clock;
use crate::error::ModeTransitionError;
use crate::progress_store::ProgressStore;

/// Moves a learner from the demo identity to a registered one.
#[derive(Clone)]
pub struct ModeTransitionManager {
    clock: Clock,
    store: ProgressStore,
}

impl ModeTransitionManager {
    #[must_use]
    pub fn new(clock: Clock, store: ProgressStore) -> Self {
        Self { clock, store }
    }

    /// Replace the canonical record with a fresh one owned by the registered user.
    ///
    /// Learning progress is discarded, not merged. Category ceilings come from
    /// the fixed system constants.
    ///
    /// The identity is written only inside `progressData`. The standalone
    /// `userInfo` key is a legacy source that the migrator reads and archives.
    ///
    /// # Errors
    ///
    /// Returns `ModeTransitionError::NotCommitted` if the current record could
    /// not be loaded or the fresh record could not be persisted. Storage still
    /// holds the previous record; the caller should retry the whole transition
    /// and re-check with `ProgressStore::load`.
    pub async fn promote_to_registered(
        &self,
        registration: &Registration,
    ) -> Result<ProgressRecord, ModeTransitionError> {
        // Loading first sets a corrupt record aside instead of writing over it.
        self.store
            .load()
            .await
            .map_err(ModeTransitionError::NotCommitted)?;

        let user_info = UserInfo::registered(registration, self.clock.today());
        let record = ProgressRecord::fresh_for(user_info);

        if let Err(err) = self.store.save(&record).await {
            warn!(error = %err, "registration not committed");
            return Err(ModeTransitionError::NotCommitted(err));
        }

        info!(display_name = registration.display_name(), "registered user, progress reset");
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use quiz_core::model::{Category, Scope};
    use std::sync::Arc;
    use storage::repository::{InMemoryStore, KeyValueStore};

    use crate::tracker::SessionProgressTracker;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 2, d).unwrap()
    }

    #[tokio::test]
    async fn registration_resets_progress_durably() {
        let kv = InMemoryStore::new();
        let store = ProgressStore::new(Arc::new(kv.clone()));
        let clock = Clock::fixed_on(day(10));
        let tracker = SessionProgressTracker::new(clock, store.clone());
        tracker
            .record_answer(Scope::BasicLearning, 1, true)
            .await
            .unwrap();
        tracker
            .record_answer(Scope::Category(Category::Life), 4, false)
            .await
            .unwrap();

        let manager = ModeTransitionManager::new(clock, store.clone());
        let registration = Registration::new("Aiko", Some(day(28))).unwrap();
        let promoted = manager.promote_to_registered(&registration).await.unwrap();

        assert_eq!(promoted.basic_learning().total_attempted(), 0);
        assert!(promoted.user_info().is_registered());
        assert!(!promoted.user_info().is_demo_mode());
        assert_eq!(promoted.user_info().registration_date(), Some(day(10)));
        assert_eq!(promoted.user_info().exam_date(), Some(day(28)));
        assert_eq!(
            promoted.category(Category::Life).unwrap().max_questions(),
            250
        );

        assert_eq!(store.load().await.unwrap(), promoted);
    }

    #[tokio::test]
    async fn failed_registration_keeps_the_guest_record() {
        let kv = InMemoryStore::new();
        let store = ProgressStore::new(Arc::new(kv.clone()));
        let clock = Clock::fixed_on(day(10));
        let tracker = SessionProgressTracker::new(clock, store.clone());
        tracker
            .record_answer(Scope::BasicLearning, 1, true)
            .await
            .unwrap();
        let before = store.load().await.unwrap();
        kv.set_quota(Some(8));

        let manager = ModeTransitionManager::new(clock, store.clone());
        let registration = Registration::new("Aiko", None).unwrap();
        let err = manager.promote_to_registered(&registration).await.unwrap_err();

        assert!(matches!(err, ModeTransitionError::NotCommitted(_)));
        kv.set_quota(None);
        let after = store.load().await.unwrap();
        assert_eq!(after, before);
        assert!(!after.user_info().is_registered());
    }

    #[tokio::test]
    async fn registration_sets_a_corrupt_record_aside_first() {
        let kv = InMemoryStore::new();
        kv.set("progressData", "not json").await.unwrap();
        let store = ProgressStore::new(Arc::new(kv.clone()));

        let manager = ModeTransitionManager::new(Clock::fixed_on(day(10)), store.clone());
        let registration = Registration::new("Aiko", None).unwrap();
        let promoted = manager.promote_to_registered(&registration).await.unwrap();

        assert!(promoted.user_info().is_registered());
        assert_eq!(
            kv.get("progressData.corrupt").await.unwrap().as_deref(),
            Some("not json")
        );
        assert_eq!(store.load().await.unwrap(), promoted);
    }
}
