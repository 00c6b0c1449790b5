//! Display-ready aggregates derived from a progress record.
//!
//! Everything here is pure: no storage access and no clock reads.

use chrono::NaiveDate;

use crate::model::{BASIC_LEARNING_CEILING, Category, ProgressRecord, ScopeProgress};

/// Overall accuracy (in percent) needed to pass the exam.
pub const PASS_MARK: u32 = 70;

/// Attempts required before an exam outlook is reported.
pub const MIN_ATTEMPTS_FOR_OUTLOOK: u32 = 20;

/// Counters and derived percentages for one scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScopeStats {
    pub attempted: u32,
    pub correct: u32,
    pub accuracy: u32,
    /// `None` where there is no pointer to measure (the today aggregate).
    pub progress_percent: Option<u32>,
}

impl ScopeStats {
    fn new(attempted: u32, correct: u32, progress_percent: Option<u32>) -> Self {
        Self {
            attempted,
            correct,
            accuracy: accuracy(correct, attempted),
            progress_percent,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryStats {
    pub category: Category,
    pub total: ScopeStats,
    pub today: ScopeStats,
}

/// Predicted exam result, reported once enough questions were attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExamOutlook {
    pub predicted_score: Option<u32>,
    pub pass_probability: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsView {
    pub overall: ScopeStats,
    pub today: ScopeStats,
    pub basic: ScopeStats,
    pub basic_today: ScopeStats,
    pub categories: Vec<CategoryStats>,
    pub outlook: ExamOutlook,
    /// Attempted category with the lowest accuracy.
    pub weakest_category: Option<Category>,
}

impl StatsView {
    #[must_use]
    pub fn category(&self, category: Category) -> Option<&CategoryStats> {
        self.categories.iter().find(|stats| stats.category == category)
    }
}

/// `round(100 * correct / attempted)`, or 0 when nothing was attempted.
#[must_use]
pub fn accuracy(correct: u32, attempted: u32) -> u32 {
    percent(correct.min(attempted), attempted)
}

/// `round(100 * part / whole)`, or 0 when `whole` is 0. Halves round up.
#[must_use]
pub fn percent(part: u32, whole: u32) -> u32 {
    if whole == 0 {
        return 0;
    }
    let part = u64::from(part);
    let whole = u64::from(whole);
    let rounded = (200 * part + whole) / (2 * whole);
    u32::try_from(rounded).unwrap_or(u32::MAX)
}

/// Derive statistics from the counters exactly as stored.
///
/// Today counters are taken at face value, so a record last written on an
/// earlier day reports that day's counts. Use [`derive_as_of`] for display.
#[must_use]
pub fn derive(record: &ProgressRecord) -> StatsView {
    derive_with(record, |progress| {
        (progress.today_attempted(), progress.today_correct())
    })
}

/// Derive statistics, treating today counters from an earlier date as zero.
#[must_use]
pub fn derive_as_of(record: &ProgressRecord, today: NaiveDate) -> StatsView {
    derive_with(record, |progress| progress.today_as_of(today))
}

fn derive_with<F>(record: &ProgressRecord, today_of: F) -> StatsView
where
    F: Fn(&ScopeProgress) -> (u32, u32),
{
    let basic_progress = record.basic_learning();
    let basic = ScopeStats::new(
        basic_progress.total_attempted(),
        basic_progress.total_correct(),
        Some(percent(basic_progress.last_question(), BASIC_LEARNING_CEILING)),
    );
    let (basic_today_attempted, basic_today_correct) = today_of(basic_progress);
    let basic_today = ScopeStats::new(basic_today_attempted, basic_today_correct, None);

    let mut categories = Vec::with_capacity(Category::ALL.len());
    for (category, entry) in record.categories() {
        let progress = entry.progress();
        let (today_attempted, today_correct) = today_of(progress);
        categories.push(CategoryStats {
            category,
            total: ScopeStats::new(
                progress.total_attempted(),
                progress.total_correct(),
                Some(percent(progress.last_question(), entry.max_questions())),
            ),
            today: ScopeStats::new(today_attempted, today_correct, None),
        });
    }

    let mut overall_attempted = basic.attempted;
    let mut overall_correct = basic.correct;
    let mut overall_pointer = basic_progress.last_question();
    let mut overall_ceiling = BASIC_LEARNING_CEILING;
    let mut today_attempted = basic_today.attempted;
    let mut today_correct = basic_today.correct;
    for (stats, (_, entry)) in categories.iter().zip(record.categories()) {
        overall_attempted = overall_attempted.saturating_add(stats.total.attempted);
        overall_correct = overall_correct.saturating_add(stats.total.correct);
        overall_pointer = overall_pointer.saturating_add(entry.progress().last_question());
        overall_ceiling = overall_ceiling.saturating_add(entry.max_questions());
        today_attempted = today_attempted.saturating_add(stats.today.attempted);
        today_correct = today_correct.saturating_add(stats.today.correct);
    }

    let overall = ScopeStats::new(
        overall_attempted,
        overall_correct,
        Some(percent(overall_pointer, overall_ceiling)),
    );
    let today = ScopeStats::new(today_attempted, today_correct, None);

    StatsView {
        overall,
        today,
        basic,
        basic_today,
        outlook: outlook(&overall),
        weakest_category: weakest(&categories),
        categories,
    }
}

fn outlook(overall: &ScopeStats) -> ExamOutlook {
    if overall.attempted < MIN_ATTEMPTS_FOR_OUTLOOK {
        return ExamOutlook::default();
    }
    let score = overall.accuracy;
    let margin = i64::from(score) - i64::from(PASS_MARK);
    let probability = (50 + 5 * margin).clamp(0, 100);
    ExamOutlook {
        predicted_score: Some(score),
        pass_probability: u32::try_from(probability).ok(),
    }
}

fn weakest(categories: &[CategoryStats]) -> Option<Category> {
    let mut weakest: Option<&CategoryStats> = None;
    for stats in categories.iter().filter(|stats| stats.total.attempted > 0) {
        match weakest {
            Some(current) if current.total.accuracy <= stats.total.accuracy => {}
            _ => weakest = Some(stats),
        }
    }
    weakest.map(|stats| stats.category)
}
