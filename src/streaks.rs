//! Consecutive-day streak computation
//!
//! The core is a pure function over a set of qualifying calendar days; the
//! store-backed calculator layers the named streak definitions (no-alcohol,
//! step and activity thresholds, protein, reading) and a per-category
//! report on top of it.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

use crate::error::EngineError;
use crate::model::LogCategory;
use crate::store::{LogFilter, Store};

/// Trailing window for all streak queries, in calendar days
pub const STREAK_WINDOW_DAYS: i64 = 90;

/// Daily step count that keeps a steps streak alive
pub const STEPS_STREAK_THRESHOLD: i64 = 7_000;

/// Active calories that keep an activity streak alive
pub const ACTIVITY_STREAK_THRESHOLD: i64 = 400;

/// Current and longest consecutive-day runs for one qualifying-date set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StreakSummary {
    pub current: u32,
    pub longest: u32,
}

/// One named streak, in the shape the dashboard consumes
#[derive(Debug, Clone, Serialize)]
pub struct StreakInfo {
    pub name: String,
    pub key: String,
    #[serde(rename = "currentStreak")]
    pub current_streak: u32,
    #[serde(rename = "longestStreak")]
    pub longest_streak: u32,
    #[serde(rename = "total90d")]
    pub total_90d: usize,
    /// Qualifying days, most recent first
    pub dates: Vec<NaiveDate>,
}

/// Current streak and totals for one log category
#[derive(Debug, Clone, Serialize)]
pub struct CategoryStreak {
    pub current_streak_days: u32,
    pub total_entries_90d: usize,
}

/// Compute current and longest streaks from an unordered set of days.
///
/// The current streak is anchored to `today`: if the most recent qualifying
/// day is neither `today` nor yesterday it is zero, otherwise the run is
/// walked backward one day at a time until the first gap. The longest
/// streak scans the ascending dates for maximal consecutive runs.
pub fn calculate(dates: &[NaiveDate], today: NaiveDate) -> StreakSummary {
    let Some(most_recent) = dates.iter().copied().max() else {
        return StreakSummary {
            current: 0,
            longest: 0,
        };
    };

    let day_set: HashSet<NaiveDate> = dates.iter().copied().collect();
    let yesterday = today - Duration::days(1);

    let mut current = 0;
    if most_recent == today || most_recent == yesterday {
        let mut check = most_recent;
        while day_set.contains(&check) {
            current += 1;
            check = check - Duration::days(1);
        }
    }

    let mut ascending: Vec<NaiveDate> = day_set.into_iter().collect();
    ascending.sort();

    let mut longest = 1;
    let mut run = 1;
    for pair in ascending.windows(2) {
        if pair[1] - pair[0] == Duration::days(1) {
            run += 1;
        } else {
            longest = longest.max(run);
            run = 1;
        }
    }
    longest = longest.max(run);

    StreakSummary { current, longest }
}

/// Store-backed streak reports over the trailing 90-day window.
pub struct StreakCalculator<'a> {
    store: &'a Store,
}

impl<'a> StreakCalculator<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Named streak report, capturing the reference instant at entry.
    pub fn report(&self) -> Result<Vec<StreakInfo>, EngineError> {
        self.report_at(Utc::now())
    }

    /// Named streak report relative to `now`.
    pub fn report_at(&self, now: DateTime<Utc>) -> Result<Vec<StreakInfo>, EngineError> {
        let today = now.date_naive();
        let defs: [(&str, &str, Vec<NaiveDate>); 5] = [
            ("No Alcohol", "alcohol", self.no_alcohol_dates(now)?),
            ("Steps (7k+)", "steps", self.steps_dates(now)?),
            ("Activity (400+ cal)", "activity", self.activity_dates(now)?),
            ("Protein Goal", "protein", self.protein_dates(now)?),
            ("Reading", "reading", self.reading_dates(now)?),
        ];

        Ok(defs
            .into_iter()
            .map(|(name, key, dates)| {
                let summary = calculate(&dates, today);
                StreakInfo {
                    name: name.to_string(),
                    key: key.to_string(),
                    current_streak: summary.current,
                    longest_streak: summary.longest,
                    total_90d: dates.len(),
                    dates,
                }
            })
            .collect())
    }

    /// Per-category current streaks over the window, keyed by category name.
    pub fn category_report_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<BTreeMap<String, CategoryStreak>, EngineError> {
        let today = now.date_naive();
        let entries = self
            .store
            .query_log_entries(&LogFilter::since(window_start(now)))?;

        let mut days_by_category: BTreeMap<String, HashSet<NaiveDate>> = BTreeMap::new();
        for entry in &entries {
            days_by_category
                .entry(entry.category.as_str().to_string())
                .or_default()
                .insert(entry.day());
        }

        Ok(days_by_category
            .into_iter()
            .map(|(category, days)| {
                let dates: Vec<NaiveDate> = days.into_iter().collect();
                let summary = calculate(&dates, today);
                (
                    category,
                    CategoryStreak {
                        current_streak_days: summary.current,
                        total_entries_90d: dates.len(),
                    },
                )
            })
            .collect())
    }

    /// Days in the window with no alcohol logged. A log with subcategory
    /// `none` records an explicitly alcohol-free day and does not break the
    /// streak.
    fn no_alcohol_dates(&self, now: DateTime<Utc>) -> Result<Vec<NaiveDate>, EngineError> {
        let entries = self.store.query_log_entries(&LogFilter::category_since(
            LogCategory::Alcohol,
            window_start(now),
        ))?;
        let drinking_days: HashSet<NaiveDate> = entries
            .iter()
            .filter(|e| e.subcategory.as_deref() != Some("none"))
            .map(|e| e.day())
            .collect();

        let today = now.date_naive();
        let mut dates: Vec<NaiveDate> = (0..STREAK_WINDOW_DAYS)
            .map(|offset| today - Duration::days(offset))
            .filter(|day| !drinking_days.contains(day))
            .collect();
        dates.sort_by(|a, b| b.cmp(a));
        Ok(dates)
    }

    fn steps_dates(&self, now: DateTime<Utc>) -> Result<Vec<NaiveDate>, EngineError> {
        self.summary_dates(now, |steps, _| steps >= STEPS_STREAK_THRESHOLD)
    }

    fn activity_dates(&self, now: DateTime<Utc>) -> Result<Vec<NaiveDate>, EngineError> {
        self.summary_dates(now, |_, calories| calories >= ACTIVITY_STREAK_THRESHOLD)
    }

    fn summary_dates(
        &self,
        now: DateTime<Utc>,
        qualifies: fn(i64, i64) -> bool,
    ) -> Result<Vec<NaiveDate>, EngineError> {
        let today = now.date_naive();
        let summaries = self
            .store
            .query_daily_summaries(today - Duration::days(STREAK_WINDOW_DAYS - 1), today)?;
        let mut dates: Vec<NaiveDate> = summaries
            .iter()
            .filter(|s| {
                qualifies(
                    s.steps.unwrap_or(i64::MIN),
                    s.active_calories.unwrap_or(i64::MIN),
                )
            })
            .map(|s| s.date)
            .collect();
        dates.sort_by(|a, b| b.cmp(a));
        Ok(dates)
    }

    fn protein_dates(&self, now: DateTime<Utc>) -> Result<Vec<NaiveDate>, EngineError> {
        let entries = self.store.query_log_entries(&LogFilter::category_since(
            LogCategory::Nutrition,
            window_start(now),
        ))?;
        let days: HashSet<NaiveDate> = entries
            .iter()
            .filter(|e| e.subcategory.as_deref() == Some("protein"))
            .map(|e| e.day())
            .collect();
        Ok(descending(days))
    }

    fn reading_dates(&self, now: DateTime<Utc>) -> Result<Vec<NaiveDate>, EngineError> {
        let entries = self.store.query_log_entries(&LogFilter::category_since(
            LogCategory::Reading,
            window_start(now),
        ))?;
        let days: HashSet<NaiveDate> = entries.iter().map(|e| e.day()).collect();
        Ok(descending(days))
    }
}

fn window_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::days(STREAK_WINDOW_DAYS)
}

fn descending(days: HashSet<NaiveDate>) -> Vec<NaiveDate> {
    let mut dates: Vec<NaiveDate> = days.into_iter().collect();
    dates.sort_by(|a, b| b.cmp(a));
    dates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewLogEntry;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_empty_input_yields_zeroes() {
        let summary = calculate(&[], day(2024, 1, 10));
        assert_eq!(summary, StreakSummary { current: 0, longest: 0 });
    }

    #[test]
    fn test_current_streak_requires_today_or_yesterday() {
        let today = day(2024, 1, 10);
        let dates = vec![day(2024, 1, 5), day(2024, 1, 6), day(2024, 1, 7), day(2024, 1, 8)];

        // most recent date is 2 days back, so the current streak is dead
        let summary = calculate(&dates, today);
        assert_eq!(summary.current, 0);
        assert_eq!(summary.longest, 4);
    }

    #[test]
    fn test_current_streak_anchored_at_yesterday() {
        let today = day(2024, 1, 10);
        let dates = vec![day(2024, 1, 7), day(2024, 1, 8), day(2024, 1, 9)];
        let summary = calculate(&dates, today);
        assert_eq!(summary.current, 3);
    }

    #[test]
    fn test_current_streak_anchored_at_today() {
        let today = day(2024, 1, 10);
        let dates = vec![day(2024, 1, 9), day(2024, 1, 10)];
        let summary = calculate(&dates, today);
        assert_eq!(summary.current, 2);
    }

    #[test]
    fn test_longest_streak_spans_gap() {
        // 1st through 5th, gap on the 6th, then the 7th
        let dates = vec![
            day(2024, 1, 1),
            day(2024, 1, 2),
            day(2024, 1, 3),
            day(2024, 1, 4),
            day(2024, 1, 5),
            day(2024, 1, 7),
        ];
        let summary = calculate(&dates, day(2024, 3, 1));
        assert_eq!(summary.longest, 5);
        assert_eq!(summary.current, 0);
    }

    #[test]
    fn test_duplicate_days_collapse() {
        let dates = vec![day(2024, 1, 1), day(2024, 1, 1), day(2024, 1, 2)];
        let summary = calculate(&dates, day(2024, 1, 2));
        assert_eq!(summary.current, 2);
        assert_eq!(summary.longest, 2);
    }

    fn fixture_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap()
    }

    fn log_on(store: &Store, category: LogCategory, date: NaiveDate) {
        log_on_sub(store, category, None, date);
    }

    fn log_on_sub(
        store: &Store,
        category: LogCategory,
        subcategory: Option<&str>,
        date: NaiveDate,
    ) {
        let at = crate::store::day_start(date) + Duration::hours(9);
        store
            .append_log_entry(&NewLogEntry {
                subcategory: subcategory.map(str::to_string),
                ..NewLogEntry::new(category, at)
            })
            .unwrap();
    }

    #[test]
    fn test_no_alcohol_streak_is_complement_of_drinking_days() {
        let store = Store::open_memory().unwrap();
        let today = fixture_now().date_naive();

        // drank two days ago; "none" yesterday is explicitly alcohol-free
        log_on(&store, LogCategory::Alcohol, today - Duration::days(2));
        log_on_sub(
            &store,
            LogCategory::Alcohol,
            Some("none"),
            today - Duration::days(1),
        );

        let calc = StreakCalculator::new(&store);
        let report = calc.report_at(fixture_now()).unwrap();
        let no_alcohol = report.iter().find(|s| s.key == "alcohol").unwrap();

        assert_eq!(no_alcohol.name, "No Alcohol");
        // today and yesterday qualify; the day before does not
        assert_eq!(no_alcohol.current_streak, 2);
        assert_eq!(no_alcohol.total_90d, 89);
        assert_eq!(no_alcohol.dates[0], today);
    }

    #[test]
    fn test_steps_streak_uses_threshold() {
        let store = Store::open_memory().unwrap();
        let today = fixture_now().date_naive();

        for (offset, steps) in [(0, 8_000), (1, 7_000), (2, 6_500)] {
            let mut summary = crate::model::DailySummary::new(today - Duration::days(offset));
            summary.steps = Some(steps);
            store.upsert_daily_summary(&summary, fixture_now()).unwrap();
        }

        let calc = StreakCalculator::new(&store);
        let report = calc.report_at(fixture_now()).unwrap();
        let steps = report.iter().find(|s| s.key == "steps").unwrap();

        assert_eq!(steps.current_streak, 2);
        assert_eq!(steps.longest_streak, 2);
        assert_eq!(steps.total_90d, 2);
    }

    #[test]
    fn test_category_report() {
        let store = Store::open_memory().unwrap();
        let today = fixture_now().date_naive();

        log_on(&store, LogCategory::Exercise, today);
        log_on(&store, LogCategory::Exercise, today - Duration::days(1));
        log_on(&store, LogCategory::Exercise, today - Duration::days(1));
        log_on(&store, LogCategory::Stress, today - Duration::days(5));

        let calc = StreakCalculator::new(&store);
        let report = calc.category_report_at(fixture_now()).unwrap();

        assert_eq!(report["exercise"].current_streak_days, 2);
        assert_eq!(report["exercise"].total_entries_90d, 2);
        assert_eq!(report["stress"].current_streak_days, 0);
        assert_eq!(report["stress"].total_entries_90d, 1);
    }
}
