use std::sync::Arc;

use quiz_core::legacy::LegacyKey;
use quiz_core::model::{ProgressRecord, ProgressRecordError};
use storage::repository::{KeyValueStore, StorageError};
use tracing::{debug, info, warn};

use crate::error::ProgressStoreError;
use crate::migration::MigrationMarker;

/// Key of the canonical progress record.
pub const PROGRESS_KEY: &str = "progressData";
/// Key of the migration-completion marker.
pub const MIGRATION_MARKER_KEY: &str = "migrationStatus";
/// Suffix appended to a legacy key when it is archived.
pub const ARCHIVE_SUFFIX: &str = ".archived";
/// Suffix appended to the canonical key when a corrupt record is set aside.
pub const CORRUPT_SUFFIX: &str = ".corrupt";
/// Earlier copies kept under one suffix before setting aside gives up.
const MAX_ASIDE_COPIES: u32 = 100;

/// The only component that touches persisted progress state.
///
/// Other services go through its typed contract; none of them know the key
/// layout.
#[derive(Clone)]
pub struct ProgressStore {
    kv: Arc<dyn KeyValueStore>,
}

impl ProgressStore {
    #[must_use]
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// Load the canonical record.
    ///
    /// First run seeds and persists a fresh record. A stored record that does
    /// not parse or validate is set aside under `progressData.corrupt` and
    /// replaced by a fresh one.
    ///
    /// # Errors
    ///
    /// Returns `ProgressStoreError::Storage` if the backend cannot be read, or
    /// if a rejected record cannot be set aside. The rejected record then
    /// stays where it is and nothing is reseeded over it.
    pub async fn load(&self) -> Result<ProgressRecord, ProgressStoreError> {
        let Some(raw) = self.kv.get(PROGRESS_KEY).await? else {
            debug!("no progress record stored, seeding defaults");
            return Ok(self.seed().await);
        };

        match Self::decode(&raw) {
            Ok(record) => Ok(record),
            Err(reason) => {
                warn!(%reason, "stored progress record rejected");
                let kept_as = self.move_aside(PROGRESS_KEY, CORRUPT_SUFFIX).await.map_err(|err| {
                    warn!(error = %err, "could not set corrupt record aside");
                    ProgressStoreError::Storage(err)
                })?;
                info!(kept_as = %kept_as, "corrupt progress record set aside");
                Ok(self.seed().await)
            }
        }
    }

    /// Validate and persist `record` as the canonical record.
    ///
    /// The record is written as one value, so readers see either the old or
    /// the new record. On error the stored record is unchanged.
    ///
    /// # Errors
    ///
    /// Returns `ProgressStoreError::Invalid` if the record breaks an invariant,
    /// `ProgressStoreError::Encode` if it cannot be serialized, or
    /// `ProgressStoreError::Storage` if the write is rejected (for example when
    /// the quota is exceeded).
    pub async fn save(&self, record: &ProgressRecord) -> Result<(), ProgressStoreError> {
        Self::validate(record)?;
        let raw = serde_json::to_string(record).map_err(ProgressStoreError::Encode)?;
        if let Err(err) = self.kv.set(PROGRESS_KEY, &raw).await {
            warn!(error = %err, "failed to persist progress record");
            return Err(err.into());
        }
        Ok(())
    }

    /// Structural and numeric check applied before a record becomes canonical.
    ///
    /// # Errors
    ///
    /// Returns the first broken invariant.
    pub fn validate(record: &ProgressRecord) -> Result<(), ProgressRecordError> {
        record.validate()
    }

    /// Parse and validate a raw stored value.
    fn decode(raw: &str) -> Result<ProgressRecord, String> {
        let record: ProgressRecord = serde_json::from_str(raw).map_err(|e| e.to_string())?;
        Self::validate(&record).map_err(|e| e.to_string())?;
        Ok(record)
    }

    async fn seed(&self) -> ProgressRecord {
        let record = ProgressRecord::fresh();
        match self.save(&record).await {
            Ok(()) => info!("seeded fresh progress record"),
            Err(err) => warn!(error = %err, "could not persist seeded progress record"),
        }
        record
    }

    //
    // ─── LEGACY AND MIGRATION STATE ────────────────────────────────────────────
    //

    /// Raw value of a legacy source, if present.
    ///
    /// # Errors
    ///
    /// Returns `ProgressStoreError::Storage` if the backend cannot be read.
    pub async fn read_legacy(&self, key: LegacyKey) -> Result<Option<String>, ProgressStoreError> {
        Ok(self.kv.get(key.storage_key()).await?)
    }

    /// Rename a legacy source out of the scanned location.
    ///
    /// Archiving a source that is already gone is not an error.
    ///
    /// # Errors
    ///
    /// Returns `ProgressStoreError::Storage` if the rename fails.
    pub async fn archive_legacy(&self, key: LegacyKey) -> Result<(), ProgressStoreError> {
        match self.move_aside(key.storage_key(), ARCHIVE_SUFFIX).await {
            Ok(_) | Err(StorageError::NotFound) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Rename `from` to `{from}{suffix}`, or to `{from}{suffix}.N` when earlier
    /// copies already hold that name. Returns the key the value now lives under.
    async fn move_aside(&self, from: &str, suffix: &str) -> Result<String, StorageError> {
        let base = format!("{from}{suffix}");
        let mut target = base.clone();
        for attempt in 2..=MAX_ASIDE_COPIES + 1 {
            match self.kv.rename(from, &target).await {
                Ok(()) => return Ok(target),
                Err(StorageError::Conflict) => target = format!("{base}.{attempt}"),
                Err(err) => return Err(err),
            }
        }
        Err(StorageError::Conflict)
    }

    /// The persisted migration marker; an unreadable marker counts as absent.
    ///
    /// # Errors
    ///
    /// Returns `ProgressStoreError::Storage` if the backend cannot be read.
    pub async fn migration_marker(&self) -> Result<Option<MigrationMarker>, ProgressStoreError> {
        let Some(raw) = self.kv.get(MIGRATION_MARKER_KEY).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(marker) => Ok(Some(marker)),
            Err(err) => {
                warn!(error = %err, "ignoring unreadable migration marker");
                Ok(None)
            }
        }
    }

    /// Persist the migration marker.
    ///
    /// # Errors
    ///
    /// Returns `ProgressStoreError::Encode` or `ProgressStoreError::Storage` on failure.
    pub async fn write_migration_marker(
        &self,
        marker: &MigrationMarker,
    ) -> Result<(), ProgressStoreError> {
        let raw = serde_json::to_string(marker).map_err(ProgressStoreError::Encode)?;
        self.kv.set(MIGRATION_MARKER_KEY, &raw).await?;
        Ok(())
    }
}
