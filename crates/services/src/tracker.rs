use quiz_core::model::{ProgressRecord, Scope};
use tracing::{debug, warn};

use crate::Clock;
use crate::error::{ProgressStoreError, TrackerError};
use crate::progress_store::ProgressStore;

/// Result of recording one answered question.
#[derive(Debug)]
pub struct AnswerOutcome {
    /// The updated record, returned even when it could not be persisted.
    pub record: ProgressRecord,
    /// True when the answer started a new study day for the scope.
    pub rolled_over: bool,
    /// Why the update was not persisted. The next `load` will not reflect it.
    pub persist_error: Option<ProgressStoreError>,
}

impl AnswerOutcome {
    #[must_use]
    pub fn is_persisted(&self) -> bool {
        self.persist_error.is_none()
    }
}

/// Applies answered questions to the canonical record.
///
/// Every operation reloads the record first; no copy is cached between calls.
#[derive(Clone)]
pub struct SessionProgressTracker {
    clock: Clock,
    store: ProgressStore,
}

impl SessionProgressTracker {
    #[must_use]
    pub fn new(clock: Clock, store: ProgressStore) -> Self {
        Self { clock, store }
    }

    /// Record the outcome of one question for `scope`.
    ///
    /// The scope pointer moves to `question_id` even when that is behind the
    /// current pointer. A failed write still returns the updated record, with
    /// the failure in `AnswerOutcome::persist_error`.
    ///
    /// # Errors
    ///
    /// Returns `TrackerError::Scope` if `question_id` is outside the scope, or
    /// `TrackerError::Store` if the current record cannot be read. Neither
    /// changes stored state.
    pub async fn record_answer(
        &self,
        scope: Scope,
        question_id: u32,
        is_correct: bool,
    ) -> Result<AnswerOutcome, TrackerError> {
        let mut record = self.store.load().await?;
        scope.check_question(question_id)?;

        let today = self.clock.today();
        let rolled_over = record
            .scope_mut(scope)
            .apply_answer(question_id, is_correct, today);
        if rolled_over {
            debug!(%scope, %today, "today counters rolled over");
        }

        let persist_error = match self.store.save(&record).await {
            Ok(()) => None,
            Err(err) => {
                warn!(%scope, question_id, error = %err, "answer not persisted");
                Some(err)
            }
        };

        Ok(AnswerOutcome {
            record,
            rolled_over,
            persist_error,
        })
    }

    /// Next question to offer for `scope`, wrapping to 1 after the last one.
    ///
    /// # Errors
    ///
    /// Returns `TrackerError::Store` if the record cannot be read.
    pub async fn next_question(&self, scope: Scope) -> Result<u32, TrackerError> {
        let record = self.store.load().await?;
        let next = record
            .scope(scope)
            .map_or(1, |progress| progress.next_question(scope.ceiling()));
        Ok(next)
    }

    /// Zero the counters and pointer of one scope.
    ///
    /// # Errors
    ///
    /// Returns `TrackerError::Store` if the record cannot be read or the reset
    /// cannot be persisted; stored state is unchanged in that case.
    pub async fn reset_scope(&self, scope: Scope) -> Result<ProgressRecord, TrackerError> {
        let mut record = self.store.load().await?;
        record.scope_mut(scope).reset();
        self.store.save(&record).await?;
        debug!(%scope, "scope reset");
        Ok(record)
    }
}
