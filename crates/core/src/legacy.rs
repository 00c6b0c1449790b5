//! Persisted shapes that pre-date the canonical progress record.
//!
//! Each known shape has its own key and parser. [`LegacySource::merge_into`]
//! folds a parsed source into a canonical record without ever lowering a
//! counter.

use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::model::{Category, ProgressRecord, Scope, UserInfo};
use crate::stats;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LegacyParseError {
    #[error("legacy source {key} is malformed: {source}")]
    Malformed {
        key: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Legacy names mapped onto canonical categories. Anything not listed is dropped.
pub const LEGACY_CATEGORY_NAMES: &[(&str, Category)] = &[
    ("category_1", Category::Life),
    ("cat1", Category::Life),
    ("life", Category::Life),
    ("category_2", Category::Property),
    ("cat2", Category::Property),
    ("property", Category::Property),
    ("category_3", Category::Casualty),
    ("cat3", Category::Casualty),
    ("casualty", Category::Casualty),
    ("category_4", Category::Health),
    ("cat4", Category::Health),
    ("health", Category::Health),
];

#[must_use]
pub fn map_legacy_category(name: &str) -> Option<Category> {
    LEGACY_CATEGORY_NAMES
        .iter()
        .find(|(legacy, _)| *legacy == name)
        .map(|(_, category)| *category)
}

//
// ─── KEYS ──────────────────────────────────────────────────────────────────────
//

/// Storage locations scanned for legacy data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LegacyKey {
    CategoryStats,
    FlatStats,
    SnakeCaseProgress,
    UserIdentity,
}

impl LegacyKey {
    pub const ALL: [LegacyKey; 4] = [
        LegacyKey::SnakeCaseProgress,
        LegacyKey::CategoryStats,
        LegacyKey::FlatStats,
        LegacyKey::UserIdentity,
    ];

    #[must_use]
    pub fn storage_key(self) -> &'static str {
        match self {
            LegacyKey::CategoryStats => "categoryStats",
            LegacyKey::FlatStats => "userStatistics",
            LegacyKey::SnakeCaseProgress => "learning_progress",
            LegacyKey::UserIdentity => "userInfo",
        }
    }

    /// Parse the raw stored value with this key's parser.
    ///
    /// # Errors
    ///
    /// Returns `LegacyParseError::Malformed` if the value does not match the shape.
    pub fn parse(self, raw: &str) -> Result<LegacySource, LegacyParseError> {
        let key = self.storage_key();
        let malformed = |source| LegacyParseError::Malformed { key, source };
        let source = match self {
            LegacyKey::CategoryStats => {
                LegacySource::CategoryStats(serde_json::from_str(raw).map_err(malformed)?)
            }
            LegacyKey::FlatStats => {
                LegacySource::FlatStats(serde_json::from_str(raw).map_err(malformed)?)
            }
            LegacyKey::SnakeCaseProgress => {
                LegacySource::SnakeCaseProgress(serde_json::from_str(raw).map_err(malformed)?)
            }
            LegacyKey::UserIdentity => {
                LegacySource::UserIdentity(serde_json::from_str(raw).map_err(malformed)?)
            }
        };
        Ok(source)
    }
}

//
// ─── SHAPES ────────────────────────────────────────────────────────────────────
//

/// `{ categories: { <legacyName>: { solved, correct } } }`
///
/// Any persisted `accuracy` field is ignored; accuracy is recomputed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LegacyCategoryStats {
    pub categories: BTreeMap<String, LegacyCategoryTotals>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct LegacyCategoryTotals {
    pub solved: u32,
    pub correct: u32,
}

/// `{ total_questions_attempted, total_correct_answers, daily_progress }`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LegacyFlatStats {
    pub total_questions_attempted: u32,
    pub total_correct_answers: u32,
    #[serde(default)]
    pub daily_progress: BTreeMap<String, LegacyDailyEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct LegacyDailyEntry {
    pub attempted: u32,
    pub correct: u32,
}

impl LegacyFlatStats {
    /// Most recent day with a parseable date.
    #[must_use]
    pub fn latest_day(&self) -> Option<(NaiveDate, LegacyDailyEntry)> {
        self.daily_progress
            .iter()
            .filter_map(|(date, entry)| parse_date(date).map(|date| (date, *entry)))
            .max_by_key(|(date, _)| *date)
    }
}

/// The older record layout with `snake_case` field names.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LegacySnakeProgress {
    #[serde(default)]
    pub basic_learning: Option<LegacySnakeScope>,
    #[serde(default)]
    pub categories: BTreeMap<String, LegacySnakeScope>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct LegacySnakeScope {
    #[serde(default)]
    pub last_question: u32,
    pub total_attempted: u32,
    pub total_correct: u32,
}

/// `{ name, examDate, isRegistered, isDemoMode, registrationDate }`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyUserIdentity {
    pub name: String,
    #[serde(default)]
    pub exam_date: Option<String>,
    #[serde(default)]
    pub is_registered: bool,
    #[serde(default)]
    pub is_demo_mode: bool,
    #[serde(default)]
    pub registration_date: Option<String>,
}

/// One parsed legacy source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegacySource {
    CategoryStats(LegacyCategoryStats),
    FlatStats(LegacyFlatStats),
    SnakeCaseProgress(LegacySnakeProgress),
    UserIdentity(LegacyUserIdentity),
}

//
// ─── MERGE ─────────────────────────────────────────────────────────────────────
//

/// Totals a legacy source contributed to one scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergedScope {
    pub scope: Scope,
    pub attempted: u32,
    pub correct: u32,
    /// Recomputed from `correct / attempted`.
    pub accuracy: u32,
}

/// What a single merge changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub merged: Vec<MergedScope>,
    pub dropped_categories: Vec<String>,
    pub identity_applied: bool,
}

impl MergeOutcome {
    fn push_scope(&mut self, scope: Scope, attempted: u32, correct: u32) {
        let correct = correct.min(attempted);
        self.merged.push(MergedScope {
            scope,
            attempted,
            correct,
            accuracy: stats::accuracy(correct, attempted),
        });
    }
}

impl LegacySource {
    /// Fold this source into `record` using max-merge for every counter.
    pub fn merge_into(&self, record: &mut ProgressRecord) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();
        match self {
            LegacySource::CategoryStats(stats) => {
                for (name, totals) in &stats.categories {
                    let Some(category) = map_legacy_category(name) else {
                        outcome.dropped_categories.push(name.clone());
                        continue;
                    };
                    let scope = Scope::Category(category);
                    record
                        .scope_mut(scope)
                        .merge_totals_max(totals.solved, totals.correct);
                    outcome.push_scope(scope, totals.solved, totals.correct);
                }
            }
            LegacySource::FlatStats(flat) => {
                let scope = Scope::BasicLearning;
                let progress = record.scope_mut(scope);
                progress.merge_totals_max(flat.total_questions_attempted, flat.total_correct_answers);
                if let Some((date, entry)) = flat.latest_day() {
                    progress.merge_day(date, entry.attempted, entry.correct);
                }
                outcome.push_scope(
                    scope,
                    flat.total_questions_attempted,
                    flat.total_correct_answers,
                );
            }
            LegacySource::SnakeCaseProgress(snake) => {
                if let Some(basic) = snake.basic_learning {
                    merge_snake_scope(record, Scope::BasicLearning, basic, &mut outcome);
                }
                for (name, scope_totals) in &snake.categories {
                    match map_legacy_category(name).or_else(|| name.parse().ok()) {
                        Some(category) => merge_snake_scope(
                            record,
                            Scope::Category(category),
                            *scope_totals,
                            &mut outcome,
                        ),
                        None => outcome.dropped_categories.push(name.clone()),
                    }
                }
            }
            LegacySource::UserIdentity(identity) => {
                if record.user_info().is_default_guest() {
                    record.set_user_info(UserInfo::from_persisted(
                        &identity.name,
                        identity.registration_date.as_deref().and_then(parse_date),
                        identity.exam_date.as_deref().and_then(parse_date),
                        identity.is_registered,
                        identity.is_demo_mode,
                    ));
                    outcome.identity_applied = true;
                }
            }
        }
        outcome
    }
}

fn merge_snake_scope(
    record: &mut ProgressRecord,
    scope: Scope,
    totals: LegacySnakeScope,
    outcome: &mut MergeOutcome,
) {
    let progress = record.scope_mut(scope);
    progress.merge_totals_max(totals.total_attempted, totals.total_correct);
    progress.merge_last_question_max(totals.last_question, scope.ceiling());
    outcome.push_scope(scope, totals.total_attempted, totals.total_correct);
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    // Older builds stored full ISO timestamps; the date prefix is enough.
    let date_part = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
    }

    #[test]
    fn lookup_table_is_explicit() {
        assert_eq!(map_legacy_category("cat3"), Some(Category::Casualty));
        assert_eq!(map_legacy_category("category_4"), Some(Category::Health));
        assert_eq!(map_legacy_category("category_5"), None);
        assert_eq!(map_legacy_category("lifeInsurance"), None);
    }

    #[test]
    fn category_stats_merge_recomputes_accuracy_and_drops_unknown_names() {
        let raw = r#"{"categories":{
            "category_1":{"solved":10,"correct":7,"accuracy":99},
            "category_9":{"solved":3,"correct":3}
        }}"#;
        let source = LegacyKey::CategoryStats.parse(raw).unwrap();
        let mut record = ProgressRecord::fresh();

        let outcome = source.merge_into(&mut record);

        let life = record.scope(Scope::Category(Category::Life)).unwrap();
        assert_eq!(life.total_attempted(), 10);
        assert_eq!(life.total_correct(), 7);
        assert_eq!(outcome.merged[0].accuracy, 70);
        assert_eq!(outcome.dropped_categories, vec!["category_9".to_string()]);
        assert!(record.validate().is_ok());
    }

    #[test]
    fn category_merge_keeps_the_larger_canonical_value() {
        let mut record = ProgressRecord::fresh();
        *record.scope_mut(Scope::Category(Category::Property)) =
            crate::model::ScopeProgress::from_persisted(12, 50, 40, 0, 0, None);

        let source = LegacyKey::CategoryStats
            .parse(r#"{"categories":{"cat2":{"solved":20,"correct":19}}}"#)
            .unwrap();
        source.merge_into(&mut record);

        let property = record.scope(Scope::Category(Category::Property)).unwrap();
        assert_eq!(property.total_attempted(), 50);
        assert_eq!(property.total_correct(), 40);
        assert_eq!(property.last_question(), 12);
    }

    #[test]
    fn flat_stats_fill_basic_learning_and_latest_day() {
        let raw = r#"{
            "total_questions_attempted": 30,
            "total_correct_answers": 21,
            "daily_progress": {
                "2025-01-03": {"attempted": 4, "correct": 2},
                "2025-01-05": {"attempted": 6, "correct": 5},
                "not-a-date": {"attempted": 99, "correct": 99}
            }
        }"#;
        let source = LegacyKey::FlatStats.parse(raw).unwrap();
        let mut record = ProgressRecord::fresh();

        source.merge_into(&mut record);

        let basic = record.basic_learning();
        assert_eq!(basic.total_attempted(), 30);
        assert_eq!(basic.total_correct(), 21);
        assert_eq!(basic.today_attempted(), 6);
        assert_eq!(basic.today_correct(), 5);
        assert_eq!(basic.last_study_date(), Some(day(5)));
    }

    #[test]
    fn snake_case_progress_maps_legacy_and_canonical_names() {
        let raw = r#"{
            "basic_learning": {"last_question": 900, "total_attempted": 12, "total_correct": 8},
            "categories": {
                "cat4": {"last_question": 3, "total_attempted": 3, "total_correct": 1},
                "propertyInsurance": {"total_attempted": 2, "total_correct": 2},
                "motor": {"total_attempted": 2, "total_correct": 2}
            }
        }"#;
        let source = LegacyKey::SnakeCaseProgress.parse(raw).unwrap();
        let mut record = ProgressRecord::fresh();

        let outcome = source.merge_into(&mut record);

        assert_eq!(record.basic_learning().last_question(), 789);
        assert_eq!(record.basic_learning().total_attempted(), 12);
        let health = record.scope(Scope::Category(Category::Health)).unwrap();
        assert_eq!(health.last_question(), 3);
        let property = record.scope(Scope::Category(Category::Property)).unwrap();
        assert_eq!(property.total_correct(), 2);
        assert_eq!(outcome.dropped_categories, vec!["motor".to_string()]);
        assert!(record.validate().is_ok());
    }

    #[test]
    fn identity_only_replaces_the_default_guest() {
        let raw = r#"{"name":"Aiko","examDate":"2025-06-15","isRegistered":true,
                      "isDemoMode":false,"registrationDate":"2025-01-02T09:30:00.000Z"}"#;
        let source = LegacyKey::UserIdentity.parse(raw).unwrap();

        let mut record = ProgressRecord::fresh();
        assert!(source.merge_into(&mut record).identity_applied);
        assert_eq!(record.user_info().display_name(), "Aiko");
        assert_eq!(record.user_info().registration_date(), Some(day(2)));
        assert!(record.user_info().is_registered());

        let before = record.clone();
        let other = LegacyKey::UserIdentity
            .parse(r#"{"name":"Someone else","isRegistered":false,"isDemoMode":true}"#)
            .unwrap();
        assert!(!other.merge_into(&mut record).identity_applied);
        assert_eq!(record, before);
    }

    #[test]
    fn malformed_sources_report_their_key() {
        let err = LegacyKey::FlatStats.parse("{not json").unwrap_err();
        assert!(err.to_string().contains("userStatistics"));
        assert!(LegacyKey::CategoryStats
            .parse(r#"{"categories":{"cat1":{"solved":-1,"correct":0}}}"#)
            .is_err());
    }
}
