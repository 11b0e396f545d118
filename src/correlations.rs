//! Lagged behavior/outcome correlation analysis
//!
//! Joins behavior logs to the following day's wearable summary and reports
//! the split between "after the behavior" days and baseline days, plus the
//! sleep-lever breakdown (what was logged the day before good vs bad
//! sleep). Everything here is correlation over a trailing window; no
//! significance testing, no causal claims.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::error::EngineError;
use crate::model::{DailySummary, LogCategory};
use crate::store::{LogFilter, Store};

/// Default trailing window for correlation queries, in days
pub const DEFAULT_WINDOW_DAYS: i64 = 30;

/// Sleep score threshold used when the window holds no scored nights
pub const DEFAULT_SLEEP_THRESHOLD: i64 = 75;

/// Mean outcome metrics over one partition of summary days.
///
/// A metric absent from every row in the partition stays `None` ("no
/// data"), never zero. `days` is the partition size.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeMeans {
    pub days: usize,
    pub sleep_score: Option<f64>,
    pub readiness_score: Option<f64>,
    pub hrv_average: Option<f64>,
    pub resting_hr: Option<f64>,
    pub total_sleep_minutes: Option<f64>,
    pub deep_sleep_minutes: Option<f64>,
}

impl OutcomeMeans {
    fn from_rows(rows: &[&DailySummary]) -> Self {
        Self {
            days: rows.len(),
            sleep_score: mean_of(rows, |s| s.sleep_score.map(|v| v as f64)),
            readiness_score: mean_of(rows, |s| s.readiness_score.map(|v| v as f64)),
            hrv_average: mean_of(rows, |s| s.hrv_average),
            resting_hr: mean_of(rows, |s| s.resting_hr),
            total_sleep_minutes: mean_of(rows, |s| s.total_sleep_minutes.map(|v| v as f64)),
            deep_sleep_minutes: mean_of(rows, |s| s.deep_sleep_minutes.map(|v| v as f64)),
        }
    }
}

/// One behavior log joined to the next day's summary.
///
/// Detail rows are per raw log: two logs on the same day produce two rows
/// even though they map to the same outcome day. The baseline membership
/// test collapses them; the listing deliberately does not.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorOutcomeRow {
    pub logged_at: DateTime<Utc>,
    pub behavior_day: NaiveDate,
    pub subcategory: Option<String>,
    pub value: Option<f64>,
    pub notes: Option<String>,
    pub outcome_day: NaiveDate,
    /// Next-day summary, when one exists
    pub outcome: Option<DailySummary>,
}

/// Behavior→outcome split for one category over a trailing window
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrelationReport {
    pub category: LogCategory,
    pub window_days: i64,
    pub detail: Vec<BehaviorOutcomeRow>,
    /// Outcomes on days following the behavior
    pub after: OutcomeMeans,
    /// Outcomes on every other day in the window
    pub baseline: OutcomeMeans,
    /// Raw behavior log rows in the window (same-day duplicates included)
    pub sample_size: usize,
}

/// Count and mean value for one (category, subcategory) pairing
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeverGroup {
    pub category: LogCategory,
    pub subcategory: Option<String>,
    pub count: usize,
    pub avg_value: Option<f64>,
}

/// What was logged the day before good sleep vs bad sleep
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SleepLeversReport {
    pub window_days: i64,
    /// Median sleep score of the window (floor-middle of the descending
    /// sort), or the default when no night is scored
    pub threshold: i64,
    pub total_nights: usize,
    /// All summaries in the window, best sleep first
    pub sleep_data: Vec<DailySummary>,
    pub before_good_sleep: Vec<LeverGroup>,
    pub before_bad_sleep: Vec<LeverGroup>,
}

/// Per-week log entry aggregate for one category
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryWeekTrend {
    pub week: String,
    pub category: LogCategory,
    pub entries: usize,
    pub avg_value: Option<f64>,
}

/// Per-week wearable summary averages
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryWeekTrend {
    pub week: String,
    pub avg_sleep_score: Option<f64>,
    pub avg_readiness_score: Option<f64>,
    pub avg_hrv: Option<f64>,
    pub avg_steps: Option<f64>,
}

/// Week-by-week view of logs and summaries
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyTrendsReport {
    pub window_days: i64,
    pub log_trends: Vec<CategoryWeekTrend>,
    pub summary_trends: Vec<SummaryWeekTrend>,
}

/// Store-backed correlation analyzer.
pub struct CorrelationAnalyzer<'a> {
    store: &'a Store,
}

impl<'a> CorrelationAnalyzer<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Lagged split for `category`, capturing the reference instant at entry.
    pub fn lagged_outcomes(
        &self,
        category: LogCategory,
        days: i64,
    ) -> Result<CorrelationReport, EngineError> {
        self.lagged_outcomes_at(category, days, Utc::now())
    }

    /// Lagged split for `category` over the `days`-day window ending at `now`.
    ///
    /// Mapping is `log day + 1`; the membership set collapses same-day
    /// duplicates, the detail listing and `sample_size` do not. Every
    /// summary in the window lands in exactly one of `after`/`baseline`.
    pub fn lagged_outcomes_at(
        &self,
        category: LogCategory,
        days: i64,
        now: DateTime<Utc>,
    ) -> Result<CorrelationReport, EngineError> {
        let today = now.date_naive();
        let window_start_day = today - Duration::days(days);

        let mut logs = self.store.query_log_entries(&LogFilter::category_since(
            category.clone(),
            now - Duration::days(days),
        ))?;
        logs.reverse(); // oldest first, as the detail listing reads

        // fetch one extra day so behavior logged today still joins its outcome
        let summaries = self
            .store
            .query_daily_summaries(window_start_day, today + Duration::days(1))?;
        let by_date: HashMap<NaiveDate, &DailySummary> =
            summaries.iter().map(|s| (s.date, s)).collect();

        let mapped_days: HashSet<NaiveDate> = logs
            .iter()
            .map(|e| e.day() + Duration::days(1))
            .filter(|d| *d >= window_start_day && *d <= today)
            .collect();

        let detail: Vec<BehaviorOutcomeRow> = logs
            .iter()
            .map(|e| {
                let outcome_day = e.day() + Duration::days(1);
                BehaviorOutcomeRow {
                    logged_at: e.logged_at,
                    behavior_day: e.day(),
                    subcategory: e.subcategory.clone(),
                    value: e.value,
                    notes: e.notes.clone(),
                    outcome_day,
                    outcome: by_date.get(&outcome_day).map(|s| (*s).clone()),
                }
            })
            .collect();

        let mut after_rows = Vec::new();
        let mut baseline_rows = Vec::new();
        for summary in summaries.iter().filter(|s| s.date <= today) {
            if mapped_days.contains(&summary.date) {
                after_rows.push(summary);
            } else {
                baseline_rows.push(summary);
            }
        }

        Ok(CorrelationReport {
            category,
            window_days: days,
            after: OutcomeMeans::from_rows(&after_rows),
            baseline: OutcomeMeans::from_rows(&baseline_rows),
            sample_size: detail.len(),
            detail,
        })
    }

    /// Stress logs vs next-day sleep outcomes.
    pub fn stress_vs_sleep(&self, days: i64) -> Result<CorrelationReport, EngineError> {
        self.lagged_outcomes_at(LogCategory::Stress, days, Utc::now())
    }

    /// Alcohol logs vs next-day HRV and recovery outcomes.
    pub fn alcohol_vs_hrv(&self, days: i64) -> Result<CorrelationReport, EngineError> {
        self.lagged_outcomes_at(LogCategory::Alcohol, days, Utc::now())
    }

    /// Exercise logs vs next-day readiness outcomes.
    pub fn exercise_vs_readiness(&self, days: i64) -> Result<CorrelationReport, EngineError> {
        self.lagged_outcomes_at(LogCategory::Exercise, days, Utc::now())
    }

    /// Sleep-lever breakdown, capturing the reference instant at entry.
    pub fn sleep_levers(&self, days: i64) -> Result<SleepLeversReport, EngineError> {
        self.sleep_levers_at(days, Utc::now())
    }

    /// What was logged the day before good sleep vs bad sleep.
    ///
    /// The threshold is the sleep score at the floor-middle index of the
    /// descending sort; nights without a score sort last and never join
    /// either partition.
    pub fn sleep_levers_at(
        &self,
        days: i64,
        now: DateTime<Utc>,
    ) -> Result<SleepLeversReport, EngineError> {
        let today = now.date_naive();
        let window_start_day = today - Duration::days(days);

        let mut nights = self.store.query_daily_summaries(window_start_day, today)?;
        nights.sort_by(|a, b| match (a.sleep_score, b.sleep_score) {
            (Some(x), Some(y)) => y.cmp(&x),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.date.cmp(&b.date),
        });

        let threshold = if nights.is_empty() {
            DEFAULT_SLEEP_THRESHOLD
        } else {
            nights[nights.len() / 2]
                .sleep_score
                .unwrap_or(DEFAULT_SLEEP_THRESHOLD)
        };

        let scored: HashMap<NaiveDate, i64> = nights
            .iter()
            .filter_map(|s| s.sleep_score.map(|score| (s.date, score)))
            .collect();

        let logs = self
            .store
            .query_log_entries(&LogFilter::since(now - Duration::days(days)))?;

        let mut good: LeverAggregate = BTreeMap::new();
        let mut bad: LeverAggregate = BTreeMap::new();
        for entry in &logs {
            let night_after = entry.day() + Duration::days(1);
            let Some(&score) = scored.get(&night_after) else {
                continue;
            };
            let bucket = if score >= threshold { &mut good } else { &mut bad };
            let slot = bucket
                .entry((entry.category.as_str().to_string(), entry.subcategory.clone()))
                .or_default();
            slot.0 += 1;
            if let Some(value) = entry.value {
                slot.1.push(value);
            }
        }

        Ok(SleepLeversReport {
            window_days: days,
            threshold,
            total_nights: nights.len(),
            sleep_data: nights,
            before_good_sleep: lever_groups(good),
            before_bad_sleep: lever_groups(bad),
        })
    }

    /// Weekly trends, capturing the reference instant at entry.
    pub fn weekly_trends(&self, days: i64) -> Result<WeeklyTrendsReport, EngineError> {
        self.weekly_trends_at(days, Utc::now())
    }

    /// ISO-week aggregates of log entries and summaries over the window.
    pub fn weekly_trends_at(
        &self,
        days: i64,
        now: DateTime<Utc>,
    ) -> Result<WeeklyTrendsReport, EngineError> {
        let today = now.date_naive();

        let logs = self
            .store
            .query_log_entries(&LogFilter::since(now - Duration::days(days)))?;
        let mut log_weeks: BTreeMap<(String, String), (usize, Vec<f64>)> = BTreeMap::new();
        for entry in &logs {
            let slot = log_weeks
                .entry((week_key(entry.day()), entry.category.as_str().to_string()))
                .or_default();
            slot.0 += 1;
            if let Some(value) = entry.value {
                slot.1.push(value);
            }
        }
        let log_trends = log_weeks
            .into_iter()
            .map(|((week, category), (entries, values))| CategoryWeekTrend {
                week,
                category: LogCategory::from(category.as_str()),
                entries,
                avg_value: mean(&values),
            })
            .collect();

        let summaries = self
            .store
            .query_daily_summaries(today - Duration::days(days), today)?;
        let mut summary_weeks: BTreeMap<String, Vec<&DailySummary>> = BTreeMap::new();
        for summary in &summaries {
            summary_weeks
                .entry(week_key(summary.date))
                .or_default()
                .push(summary);
        }
        let summary_trends = summary_weeks
            .into_iter()
            .map(|(week, rows)| SummaryWeekTrend {
                week,
                avg_sleep_score: mean_of(&rows, |s| s.sleep_score.map(|v| v as f64)),
                avg_readiness_score: mean_of(&rows, |s| s.readiness_score.map(|v| v as f64)),
                avg_hrv: mean_of(&rows, |s| s.hrv_average),
                avg_steps: mean_of(&rows, |s| s.steps.map(|v| v as f64)),
            })
            .collect();

        Ok(WeeklyTrendsReport {
            window_days: days,
            log_trends,
            summary_trends,
        })
    }
}

type LeverAggregate = BTreeMap<(String, Option<String>), (usize, Vec<f64>)>;

fn lever_groups(aggregate: LeverAggregate) -> Vec<LeverGroup> {
    let mut groups: Vec<LeverGroup> = aggregate
        .into_iter()
        .map(|((category, subcategory), (count, values))| LeverGroup {
            category: LogCategory::from(category.as_str()),
            subcategory,
            count,
            avg_value: mean(&values),
        })
        .collect();
    // BTreeMap iteration is already key-ordered, so ties stay deterministic
    groups.sort_by(|a, b| b.count.cmp(&a.count));
    groups
}

fn week_key(date: NaiveDate) -> String {
    let week = date.iso_week();
    format!("{}-W{:02}", week.year(), week.week())
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

fn mean_of<F>(rows: &[&DailySummary], metric: F) -> Option<f64>
where
    F: Fn(&DailySummary) -> Option<f64>,
{
    let values: Vec<f64> = rows.iter().filter_map(|s| metric(s)).collect();
    mean(&values)
}
