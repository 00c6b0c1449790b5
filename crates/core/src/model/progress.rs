use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::model::category::{BASIC_LEARNING_CEILING, Category};
use crate::model::scope::Scope;
use crate::model::user::UserInfo;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

/// A record breaks one of the structural or numeric invariants.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProgressRecordError {
    #[error("{scope}: total correct ({correct}) exceeds total attempted ({attempted})")]
    CorrectExceedsAttempted {
        scope: Scope,
        correct: u32,
        attempted: u32,
    },

    #[error("{scope}: today correct ({correct}) exceeds today attempted ({attempted})")]
    TodayCorrectExceedsAttempted {
        scope: Scope,
        correct: u32,
        attempted: u32,
    },

    #[error("{scope}: last question {last_question} is above the ceiling {ceiling}")]
    LastQuestionOutOfRange {
        scope: Scope,
        last_question: u32,
        ceiling: u32,
    },

    #[error("{category}: max questions must be {expected}, found {found}")]
    CeilingMismatch {
        category: Category,
        expected: u32,
        found: u32,
    },

    #[error("missing category {0}")]
    MissingCategory(Category),

    #[error("a registered user cannot be in demo mode")]
    RegisteredInDemoMode,
}

//
// ─── SCOPE PROGRESS ────────────────────────────────────────────────────────────
//

/// Counters for one scope.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeProgress {
    last_question: u32,
    total_attempted: u32,
    total_correct: u32,
    today_attempted: u32,
    today_correct: u32,
    #[serde(default)]
    last_study_date: Option<NaiveDate>,
}

impl ScopeProgress {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rehydrate counters without checking them; pair with [`ScopeProgress::check`].
    #[must_use]
    pub fn from_persisted(
        last_question: u32,
        total_attempted: u32,
        total_correct: u32,
        today_attempted: u32,
        today_correct: u32,
        last_study_date: Option<NaiveDate>,
    ) -> Self {
        Self {
            last_question,
            total_attempted,
            total_correct,
            today_attempted,
            today_correct,
            last_study_date,
        }
    }

    #[must_use]
    pub fn last_question(&self) -> u32 {
        self.last_question
    }

    #[must_use]
    pub fn total_attempted(&self) -> u32 {
        self.total_attempted
    }

    #[must_use]
    pub fn total_correct(&self) -> u32 {
        self.total_correct
    }

    #[must_use]
    pub fn today_attempted(&self) -> u32 {
        self.today_attempted
    }

    #[must_use]
    pub fn today_correct(&self) -> u32 {
        self.today_correct
    }

    #[must_use]
    pub fn last_study_date(&self) -> Option<NaiveDate> {
        self.last_study_date
    }

    /// Today counters as of `today`; stale counters from an earlier day read as zero.
    #[must_use]
    pub fn today_as_of(&self, today: NaiveDate) -> (u32, u32) {
        if self.last_study_date == Some(today) {
            (self.today_attempted, self.today_correct)
        } else {
            (0, 0)
        }
    }

    /// Check the numeric invariants against the scope ceiling.
    ///
    /// # Errors
    ///
    /// Returns the first `ProgressRecordError` found.
    pub fn check(&self, scope: Scope, ceiling: u32) -> Result<(), ProgressRecordError> {
        if self.total_correct > self.total_attempted {
            return Err(ProgressRecordError::CorrectExceedsAttempted {
                scope,
                correct: self.total_correct,
                attempted: self.total_attempted,
            });
        }
        if self.today_correct > self.today_attempted {
            return Err(ProgressRecordError::TodayCorrectExceedsAttempted {
                scope,
                correct: self.today_correct,
                attempted: self.today_attempted,
            });
        }
        if self.last_question > ceiling {
            return Err(ProgressRecordError::LastQuestionOutOfRange {
                scope,
                last_question: self.last_question,
                ceiling,
            });
        }
        Ok(())
    }

    /// Apply one answered question.
    ///
    /// The pointer is last-write-wins: answering an earlier question moves it back.
    /// Returns `true` when the today counters rolled over to a new date.
    pub fn apply_answer(&mut self, question_id: u32, is_correct: bool, today: NaiveDate) -> bool {
        self.last_question = question_id;
        self.total_attempted = self.total_attempted.saturating_add(1);
        if is_correct {
            self.total_correct = self.total_correct.saturating_add(1);
        }

        let rolled_over = self.last_study_date != Some(today);
        if rolled_over {
            self.today_attempted = 0;
            self.today_correct = 0;
        }
        self.last_study_date = Some(today);

        self.today_attempted = self.today_attempted.saturating_add(1);
        if is_correct {
            self.today_correct = self.today_correct.saturating_add(1);
        }
        rolled_over
    }

    /// Next recommended question; wraps to 1 once the scope is exhausted.
    #[must_use]
    pub fn next_question(&self, ceiling: u32) -> u32 {
        let next = self.last_question.saturating_add(1);
        if next > ceiling { 1 } else { next }
    }

    /// Merge totals from another source, never lowering either counter.
    ///
    /// `correct` is clamped to `attempted` first so the merged pair stays ordered.
    pub fn merge_totals_max(&mut self, attempted: u32, correct: u32) {
        let correct = correct.min(attempted);
        self.total_attempted = self.total_attempted.max(attempted);
        self.total_correct = self.total_correct.max(correct);
    }

    /// Move the pointer forward to `last_question` (clamped to `ceiling`), never back.
    pub fn merge_last_question_max(&mut self, last_question: u32, ceiling: u32) {
        self.last_question = self.last_question.max(last_question.min(ceiling));
    }

    /// Merge one day of counters.
    ///
    /// Older days are ignored, the current day is max-merged, a newer day replaces
    /// the today counters and moves `last_study_date`.
    pub fn merge_day(&mut self, date: NaiveDate, attempted: u32, correct: u32) {
        let correct = correct.min(attempted);
        match self.last_study_date {
            Some(current) if current > date => {}
            Some(current) if current == date => {
                self.today_attempted = self.today_attempted.max(attempted);
                self.today_correct = self.today_correct.max(correct);
            }
            _ => {
                self.today_attempted = attempted;
                self.today_correct = correct;
                self.last_study_date = Some(date);
            }
        }
    }

    /// Zero every counter and the pointer.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

//
// ─── CATEGORY PROGRESS ─────────────────────────────────────────────────────────
//

/// Counters for one category plus its fixed ceiling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryProgress {
    #[serde(flatten)]
    progress: ScopeProgress,
    max_questions: u32,
}

impl CategoryProgress {
    #[must_use]
    pub fn new(category: Category) -> Self {
        Self {
            progress: ScopeProgress::new(),
            max_questions: category.ceiling(),
        }
    }

    #[must_use]
    pub fn progress(&self) -> &ScopeProgress {
        &self.progress
    }

    #[must_use]
    pub fn max_questions(&self) -> u32 {
        self.max_questions
    }
}

//
// ─── PROGRESS RECORD ───────────────────────────────────────────────────────────
//

/// The canonical progress record every component converges on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    basic_learning: ScopeProgress,
    categories: BTreeMap<Category, CategoryProgress>,
    user_info: UserInfo,
}

impl ProgressRecord {
    /// Zeroed counters, fixed ceilings, and the guest identity.
    #[must_use]
    pub fn fresh() -> Self {
        Self::fresh_for(UserInfo::guest())
    }

    /// Zeroed counters and fixed ceilings for the given identity.
    #[must_use]
    pub fn fresh_for(user_info: UserInfo) -> Self {
        let categories = Category::ALL
            .into_iter()
            .map(|category| (category, CategoryProgress::new(category)))
            .collect();
        Self {
            basic_learning: ScopeProgress::new(),
            categories,
            user_info,
        }
    }

    #[must_use]
    pub fn basic_learning(&self) -> &ScopeProgress {
        &self.basic_learning
    }

    #[must_use]
    pub fn category(&self, category: Category) -> Option<&CategoryProgress> {
        self.categories.get(&category)
    }

    /// Categories in fixed order.
    pub fn categories(&self) -> impl Iterator<Item = (Category, &CategoryProgress)> {
        self.categories.iter().map(|(category, progress)| (*category, progress))
    }

    #[must_use]
    pub fn user_info(&self) -> &UserInfo {
        &self.user_info
    }

    pub fn set_user_info(&mut self, user_info: UserInfo) {
        self.user_info = user_info;
    }

    #[must_use]
    pub fn scope(&self, scope: Scope) -> Option<&ScopeProgress> {
        match scope {
            Scope::BasicLearning => Some(&self.basic_learning),
            Scope::Category(category) => self.categories.get(&category).map(|c| &c.progress),
        }
    }

    /// Mutable counters for a scope, inserting a zeroed category if it is missing.
    pub fn scope_mut(&mut self, scope: Scope) -> &mut ScopeProgress {
        match scope {
            Scope::BasicLearning => &mut self.basic_learning,
            Scope::Category(category) => {
                &mut self
                    .categories
                    .entry(category)
                    .or_insert_with(|| CategoryProgress::new(category))
                    .progress
            }
        }
    }

    /// Every scope with its counters, basic learning first.
    pub fn scopes(&self) -> impl Iterator<Item = (Scope, &ScopeProgress)> {
        std::iter::once((Scope::BasicLearning, &self.basic_learning)).chain(
            self.categories
                .iter()
                .map(|(category, progress)| (Scope::Category(*category), &progress.progress)),
        )
    }

    /// Check every invariant of the record.
    ///
    /// Unknown category names never reach this point: they fail deserialization.
    ///
    /// # Errors
    ///
    /// Returns the first `ProgressRecordError` found.
    pub fn validate(&self) -> Result<(), ProgressRecordError> {
        self.basic_learning
            .check(Scope::BasicLearning, BASIC_LEARNING_CEILING)?;

        for category in Category::ALL {
            let entry = self
                .categories
                .get(&category)
                .ok_or(ProgressRecordError::MissingCategory(category))?;
            if entry.max_questions != category.ceiling() {
                return Err(ProgressRecordError::CeilingMismatch {
                    category,
                    expected: category.ceiling(),
                    found: entry.max_questions,
                });
            }
            entry.progress.check(Scope::Category(category), category.ceiling())?;
        }

        if self.user_info.is_registered() && self.user_info.is_demo_mode() {
            return Err(ProgressRecordError::RegisteredInDemoMode);
        }
        Ok(())
    }
}

impl Default for ProgressRecord {
    fn default() -> Self {
        Self::fresh()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
    }

    #[test]
    fn fresh_record_is_valid_with_fixed_ceilings() {
        let record = ProgressRecord::fresh();
        assert!(record.validate().is_ok());
        for category in Category::ALL {
            let entry = record.category(category).unwrap();
            assert_eq!(entry.max_questions(), category.ceiling());
            assert_eq!(entry.progress().total_attempted(), 0);
        }
        assert!(record.user_info().is_demo_mode());
    }

    #[test]
    fn apply_answer_rolls_over_on_a_new_date() {
        let mut progress = ScopeProgress::from_persisted(7, 10, 6, 5, 3, Some(day(1)));

        let rolled = progress.apply_answer(3, false, day(2));

        assert!(rolled);
        assert_eq!(progress.last_question(), 3);
        assert_eq!(progress.total_attempted(), 11);
        assert_eq!(progress.total_correct(), 6);
        assert_eq!(progress.today_attempted(), 1);
        assert_eq!(progress.today_correct(), 0);
        assert_eq!(progress.last_study_date(), Some(day(2)));
    }

    #[test]
    fn apply_answer_same_day_accumulates() {
        let mut progress = ScopeProgress::from_persisted(1, 1, 1, 1, 1, Some(day(1)));
        assert!(!progress.apply_answer(2, true, day(1)));
        assert_eq!(progress.today_attempted(), 2);
        assert_eq!(progress.today_correct(), 2);
    }

    #[test]
    fn next_question_wraps_after_ceiling() {
        let progress = ScopeProgress::from_persisted(5, 5, 5, 0, 0, None);
        assert_eq!(progress.next_question(5), 1);
        assert_eq!(ScopeProgress::new().next_question(5), 1);
        let mid = ScopeProgress::from_persisted(2, 2, 1, 0, 0, None);
        assert_eq!(mid.next_question(5), 3);
    }

    #[test]
    fn merge_totals_never_regresses() {
        let mut progress = ScopeProgress::from_persisted(0, 40, 30, 0, 0, None);
        progress.merge_totals_max(25, 20);
        assert_eq!(progress.total_attempted(), 40);
        assert_eq!(progress.total_correct(), 30);

        progress.merge_totals_max(60, 70);
        assert_eq!(progress.total_attempted(), 60);
        assert_eq!(progress.total_correct(), 60);
    }

    #[test]
    fn merge_day_respects_date_order() {
        let mut progress = ScopeProgress::from_persisted(0, 10, 5, 4, 2, Some(day(5)));
        progress.merge_day(day(4), 9, 9);
        assert_eq!(progress.today_attempted(), 4);

        progress.merge_day(day(5), 6, 1);
        assert_eq!((progress.today_attempted(), progress.today_correct()), (6, 2));

        progress.merge_day(day(6), 3, 1);
        assert_eq!((progress.today_attempted(), progress.today_correct()), (3, 1));
        assert_eq!(progress.last_study_date(), Some(day(6)));
    }

    #[test]
    fn validate_rejects_broken_counters() {
        let mut record = ProgressRecord::fresh();
        *record.scope_mut(Scope::Category(Category::Life)) =
            ScopeProgress::from_persisted(0, 2, 3, 0, 0, None);
        assert!(matches!(
            record.validate(),
            Err(ProgressRecordError::CorrectExceedsAttempted { .. })
        ));

        let mut record = ProgressRecord::fresh();
        *record.scope_mut(Scope::BasicLearning) =
            ScopeProgress::from_persisted(790, 0, 0, 0, 0, None);
        assert!(matches!(
            record.validate(),
            Err(ProgressRecordError::LastQuestionOutOfRange { ceiling: 789, .. })
        ));

        let mut record = ProgressRecord::fresh();
        *record.scope_mut(Scope::Category(Category::Property)) =
            ScopeProgress::from_persisted(3, 5, 4, 1, 2, Some(day(3)));
        assert!(matches!(
            record.validate(),
            Err(ProgressRecordError::TodayCorrectExceedsAttempted {
                correct: 2,
                attempted: 1,
                ..
            })
        ));
    }

    #[test]
    fn validate_requires_every_category() {
        let mut json = serde_json::to_value(ProgressRecord::fresh()).unwrap();
        json["categories"]
            .as_object_mut()
            .unwrap()
            .remove("healthInsurance");
        let record: ProgressRecord = serde_json::from_value(json).unwrap();

        assert_eq!(
            record.validate(),
            Err(ProgressRecordError::MissingCategory(Category::Health))
        );
    }

    #[test]
    fn validate_rejects_registered_demo_identity() {
        let mut json = serde_json::to_value(ProgressRecord::fresh()).unwrap();
        json["userInfo"]["isRegistered"] = serde_json::json!(true);
        json["userInfo"]["isDemoMode"] = serde_json::json!(true);
        let record: ProgressRecord = serde_json::from_value(json).unwrap();

        assert_eq!(
            record.validate(),
            Err(ProgressRecordError::RegisteredInDemoMode)
        );
    }

    #[test]
    fn persisted_layout_is_camel_case() {
        let json = serde_json::to_value(ProgressRecord::fresh()).unwrap();
        assert!(json["basicLearning"]["lastQuestion"].is_number());
        assert_eq!(json["categories"]["lifeInsurance"]["maxQuestions"], 250);
        assert_eq!(json["userInfo"]["isDemoMode"], true);
    }

    #[test]
    fn foreign_category_names_fail_to_parse() {
        let mut json = serde_json::to_value(ProgressRecord::fresh()).unwrap();
        json["categories"]["motorInsurance"] = json["categories"]["lifeInsurance"].clone();
        assert!(serde_json::from_value::<ProgressRecord>(json).is_err());
    }

    #[test]
    fn ceiling_mismatch_is_rejected() {
        let mut json = serde_json::to_value(ProgressRecord::fresh()).unwrap();
        json["categories"]["healthInsurance"]["maxQuestions"] = serde_json::json!(10);
        let record: ProgressRecord = serde_json::from_value(json).unwrap();
        assert!(matches!(
            record.validate(),
            Err(ProgressRecordError::CeilingMismatch {
                category: Category::Health,
                ..
            })
        ));
    }
}
