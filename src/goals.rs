//! Goal progress evaluation
//!
//! Each goal type has its own evaluator over the goal's target string and a
//! trailing window of store data, producing a normalized 0-100 percentage.
//! Evaluators are selected through a lookup table so adding a goal type is
//! a pure addition. Unknown types evaluate to zero progress, never an
//! error; unparsable targets fall back to documented defaults.

use chrono::{DateTime, Duration, Timelike, Utc};
use serde::Serialize;
use std::collections::HashSet;

use crate::error::EngineError;
use crate::model::{Goal, GoalType, LogCategory};
use crate::store::{LogFilter, Store};

/// Trailing window for frequency and average style goals, in days
pub const GOAL_WINDOW_DAYS: i64 = 7;

/// Fallback weekly training sessions when the target is unparsable
pub const DEFAULT_TRAINING_FREQUENCY: i64 = 4;

/// Fallback daily step target when the target is unparsable
pub const DEFAULT_DAILY_STEPS: i64 = 10_000;

/// Fallback weekly drink limit when the target is unparsable
pub const DEFAULT_ALCOHOL_LIMIT: i64 = 3;

/// A bedtime counts as on target within this many minutes of it
pub const BEDTIME_TOLERANCE_MINUTES: i64 = 30;

/// Normalized progress toward one goal
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GoalProgress {
    pub current: f64,
    pub target: f64,
    pub unit: String,
    /// Always within 0-100
    pub pct: u8,
}

impl GoalProgress {
    fn zero(unit: &str) -> Self {
        Self {
            current: 0.0,
            target: 0.0,
            unit: unit.to_string(),
            pct: 0,
        }
    }
}

/// An active goal joined with its evaluated progress
#[derive(Debug, Clone, Serialize)]
pub struct GoalWithProgress {
    #[serde(flatten)]
    pub goal: Goal,
    pub progress: GoalProgress,
}

type EvalFn = fn(&Store, &Goal, DateTime<Utc>) -> Result<GoalProgress, EngineError>;

/// Lookup table from goal type to evaluator. `None` means the type has no
/// progress semantics and reports zero progress.
fn evaluator_for(goal_type: &GoalType) -> Option<EvalFn> {
    match goal_type {
        GoalType::TrainingFrequency => Some(training_frequency),
        GoalType::DailySteps => Some(daily_steps),
        GoalType::SleepWindow | GoalType::Bedtime => Some(bedtime),
        GoalType::WeightTarget => Some(weight_target),
        GoalType::AlcoholLimit => Some(alcohol_limit),
        _ => None,
    }
}

/// Store-backed goal progress evaluator.
pub struct GoalProgressEvaluator<'a> {
    store: &'a Store,
}

impl<'a> GoalProgressEvaluator<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Evaluate one goal, capturing the reference instant at entry.
    pub fn progress(&self, goal: &Goal) -> Result<GoalProgress, EngineError> {
        self.progress_at(goal, Utc::now())
    }

    /// Evaluate one goal relative to `now`.
    pub fn progress_at(
        &self,
        goal: &Goal,
        now: DateTime<Utc>,
    ) -> Result<GoalProgress, EngineError> {
        match evaluator_for(&goal.goal_type) {
            Some(eval) => eval(self.store, goal, now),
            None => Ok(GoalProgress::zero("")),
        }
    }

    /// All active goals for `owner_id`, each with evaluated progress, using
    /// one reference instant for the whole batch.
    pub fn goals_with_progress(
        &self,
        owner_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<GoalWithProgress>, EngineError> {
        self.store
            .list_active_goals(owner_id)?
            .into_iter()
            .map(|goal| {
                let progress = self.progress_at(&goal, now)?;
                Ok(GoalWithProgress { goal, progress })
            })
            .collect()
    }
}

/// Distinct exercise days in the trailing week vs the weekly target.
fn training_frequency(
    store: &Store,
    goal: &Goal,
    now: DateTime<Utc>,
) -> Result<GoalProgress, EngineError> {
    let target = first_integer(&goal.target_value).unwrap_or(DEFAULT_TRAINING_FREQUENCY);
    let entries = store.query_log_entries(&LogFilter::category_since(
        LogCategory::Exercise,
        now - Duration::days(GOAL_WINDOW_DAYS),
    ))?;
    let days: HashSet<_> = entries.iter().map(|e| e.day()).collect();

    let current = days.len() as f64;
    Ok(GoalProgress {
        current,
        target: target as f64,
        unit: "sessions/week".to_string(),
        pct: ratio_pct(current, target as f64),
    })
}

/// Mean daily steps over the trailing week vs the step target.
fn daily_steps(store: &Store, goal: &Goal, now: DateTime<Utc>) -> Result<GoalProgress, EngineError> {
    let target = first_integer(&goal.target_value).unwrap_or(DEFAULT_DAILY_STEPS);
    let today = now.date_naive();
    let summaries =
        store.query_daily_summaries(today - Duration::days(GOAL_WINDOW_DAYS - 1), today)?;

    let steps: Vec<f64> = summaries
        .iter()
        .filter_map(|s| s.steps.map(|v| v as f64))
        .collect();
    let current = if steps.is_empty() {
        0.0
    } else {
        steps.iter().sum::<f64>() / steps.len() as f64
    };

    Ok(GoalProgress {
        current,
        target: target as f64,
        unit: "steps".to_string(),
        pct: ratio_pct(current, target as f64),
    })
}

/// Nights with a bedtime within tolerance of the target time, over the
/// nights that recorded a bedtime at all.
fn bedtime(store: &Store, goal: &Goal, now: DateTime<Utc>) -> Result<GoalProgress, EngineError> {
    let Some((hour, minute)) = first_hhmm(&goal.target_value) else {
        return Ok(GoalProgress::zero("time"));
    };
    let target_minutes = clock_minutes(hour, minute);

    let today = now.date_naive();
    let summaries =
        store.query_daily_summaries(today - Duration::days(GOAL_WINDOW_DAYS - 1), today)?;

    let bedtimes: Vec<i64> = summaries
        .iter()
        .filter_map(|s| s.bedtime_start.as_deref())
        .filter_map(bedtime_minutes)
        .collect();
    let on_target = bedtimes
        .iter()
        .filter(|&&m| (m - target_minutes).abs() <= BEDTIME_TOLERANCE_MINUTES)
        .count();

    let nights = bedtimes.len().max(1);
    Ok(GoalProgress {
        current: on_target as f64,
        target: bedtimes.len() as f64,
        unit: "time".to_string(),
        pct: ratio_pct(on_target as f64, nights as f64),
    })
}

/// Progress from the first ever logged weight toward the target weight.
fn weight_target(
    store: &Store,
    goal: &Goal,
    _now: DateTime<Utc>,
) -> Result<GoalProgress, EngineError> {
    let latest = store.latest_entry_with_value(&LogCategory::Weight)?;
    let first = store.first_entry_with_value(&LogCategory::Weight)?;
    let target = first_number(&goal.target_value);

    let unit = latest
        .as_ref()
        .and_then(|e| e.unit.clone())
        .unwrap_or_default();
    let current = latest.as_ref().and_then(|e| e.value).unwrap_or(0.0);

    let pct = match (
        first.as_ref().and_then(|e| e.value),
        latest.as_ref().and_then(|e| e.value),
        target,
    ) {
        (Some(start), Some(now_value), Some(goal_value)) if start != goal_value => {
            let raw = ((start - now_value) / (start - goal_value)) * 100.0;
            raw.round().clamp(0.0, 100.0) as u8
        }
        _ => 0,
    };

    Ok(GoalProgress {
        current,
        target: target.unwrap_or(0.0),
        unit,
        pct,
    })
}

/// Drinks logged in the trailing week against the weekly limit. Staying
/// within the limit is full marks; the penalty curve hits zero once
/// consumption doubles it.
fn alcohol_limit(
    store: &Store,
    goal: &Goal,
    now: DateTime<Utc>,
) -> Result<GoalProgress, EngineError> {
    let target = first_integer(&goal.target_value).unwrap_or(DEFAULT_ALCOHOL_LIMIT);
    let entries = store.query_log_entries(&LogFilter::category_since(
        LogCategory::Alcohol,
        now - Duration::days(GOAL_WINDOW_DAYS),
    ))?;
    let current = entries.len() as i64;

    let pct = if target <= 0 {
        0
    } else if current <= target {
        100
    } else {
        let raw = ((2 * target - current) as f64 / target as f64) * 100.0;
        raw.round().clamp(0.0, 100.0) as u8
    };

    Ok(GoalProgress {
        current: current as f64,
        target: target as f64,
        unit: "drinks/week".to_string(),
        pct,
    })
}

/// round(current / target * 100), clamped to 0-100
fn ratio_pct(current: f64, target: f64) -> u8 {
    if target <= 0.0 {
        return 0;
    }
    ((current / target) * 100.0).round().clamp(0.0, 100.0) as u8
}

/// First run of digits in `s`, as an integer
fn first_integer(s: &str) -> Option<i64> {
    let digits: String = s
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// First number in `s`, allowing a decimal point
fn first_number(s: &str) -> Option<f64> {
    let number: String = s
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    number.parse().ok()
}

/// First `HH:MM` time of day in `s`
fn first_hhmm(s: &str) -> Option<(u32, u32)> {
    let bytes = s.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if b != b':' || i == 0 || i + 2 > bytes.len() - 1 {
            continue;
        }
        let hour_start = if i >= 2 && bytes[i - 2].is_ascii_digit() {
            i - 2
        } else {
            i - 1
        };
        if !bytes[i - 1].is_ascii_digit()
            || !bytes[i + 1].is_ascii_digit()
            || !bytes[i + 2].is_ascii_digit()
        {
            continue;
        }
        let hour: u32 = s[hour_start..i].parse().ok()?;
        let minute: u32 = s[i + 1..i + 3].parse().ok()?;
        if hour < 24 && minute < 60 {
            return Some((hour, minute));
        }
    }
    None
}

/// Minutes from midnight for a time of day, rolling bedtimes before noon
/// past midnight so 00:30 compares correctly against a 23:00 target
fn clock_minutes(hour: u32, minute: u32) -> i64 {
    let mut minutes = (hour * 60 + minute) as i64;
    if hour < 12 {
        minutes += 24 * 60;
    }
    minutes
}

/// Local-clock minutes from midnight of an RFC 3339 bedtime, with the same
/// past-midnight rollover as the target
fn bedtime_minutes(raw: &str) -> Option<i64> {
    let bedtime = DateTime::parse_from_rfc3339(raw).ok()?;
    Some(clock_minutes(bedtime.hour(), bedtime.minute()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DailySummary, NewLogEntry};
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn fixture_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 15, 0, 0).unwrap()
    }

    fn goal_of(goal_type: GoalType, target: &str) -> Goal {
        Goal {
            id: 1,
            owner_id: "user-1".to_string(),
            goal_type,
            target_value: target.to_string(),
            active: true,
            created_at: fixture_now(),
            updated_at: fixture_now(),
        }
    }

    fn log_value(
        store: &Store,
        category: LogCategory,
        value: Option<f64>,
        unit: Option<&str>,
        at: DateTime<Utc>,
    ) {
        store
            .append_log_entry(&NewLogEntry {
                value,
                unit: unit.map(str::to_string),
                ..NewLogEntry::new(category, at)
            })
            .unwrap();
    }

    #[test]
    fn test_training_frequency_counts_distinct_days() {
        let store = Store::open_memory().unwrap();
        // two sessions on the same day count once
        log_value(&store, LogCategory::Exercise, Some(30.0), None, fixture_now());
        log_value(
            &store,
            LogCategory::Exercise,
            Some(20.0),
            None,
            fixture_now() - Duration::hours(3),
        );
        log_value(
            &store,
            LogCategory::Exercise,
            Some(45.0),
            None,
            fixture_now() - Duration::days(2),
        );

        let evaluator = GoalProgressEvaluator::new(&store);
        let progress = evaluator
            .progress_at(&goal_of(GoalType::TrainingFrequency, "4x/week"), fixture_now())
            .unwrap();

        assert_eq!(progress.current, 2.0);
        assert_eq!(progress.target, 4.0);
        assert_eq!(progress.pct, 50);
    }

    #[test]
    fn test_training_frequency_falls_back_to_default_target() {
        let store = Store::open_memory().unwrap();
        let evaluator = GoalProgressEvaluator::new(&store);
        let progress = evaluator
            .progress_at(
                &goal_of(GoalType::TrainingFrequency, "most days"),
                fixture_now(),
            )
            .unwrap();
        assert_eq!(progress.target, DEFAULT_TRAINING_FREQUENCY as f64);
        assert_eq!(progress.pct, 0);
    }

    #[test]
    fn test_daily_steps_average() {
        let store = Store::open_memory().unwrap();
        let today = fixture_now().date_naive();

        // 8500 average over two recorded days; a null-step day is excluded
        for (offset, steps) in [(0, Some(9_000)), (1, Some(8_000)), (2, None)] {
            let mut summary = DailySummary::new(today - Duration::days(offset));
            summary.steps = steps;
            store.upsert_daily_summary(&summary, fixture_now()).unwrap();
        }

        let evaluator = GoalProgressEvaluator::new(&store);
        let progress = evaluator
            .progress_at(&goal_of(GoalType::DailySteps, "10000"), fixture_now())
            .unwrap();

        assert_eq!(progress.current, 8_500.0);
        assert_eq!(progress.target, 10_000.0);
        assert_eq!(progress.pct, 85);
    }

    #[test]
    fn test_daily_steps_caps_at_100() {
        let store = Store::open_memory().unwrap();
        let today = fixture_now().date_naive();
        let mut summary = DailySummary::new(today);
        summary.steps = Some(15_000);
        store.upsert_daily_summary(&summary, fixture_now()).unwrap();

        let evaluator = GoalProgressEvaluator::new(&store);
        let progress = evaluator
            .progress_at(&goal_of(GoalType::DailySteps, "10000"), fixture_now())
            .unwrap();
        assert_eq!(progress.pct, 100);
    }

    #[test]
    fn test_bedtime_rollover_past_midnight() {
        let store = Store::open_memory().unwrap();
        let today = fixture_now().date_naive();

        // 00:30 is 90 minutes past a 23:00 target: off target. 23:20 is on.
        let bedtimes = [
            (1, "2024-03-09T00:30:00+00:00"),
            (2, "2024-03-08T23:20:00+00:00"),
        ];
        for (offset, bedtime) in bedtimes {
            let mut summary = DailySummary::new(today - Duration::days(offset));
            summary.bedtime_start = Some(bedtime.to_string());
            store.upsert_daily_summary(&summary, fixture_now()).unwrap();
        }

        let evaluator = GoalProgressEvaluator::new(&store);
        let progress = evaluator
            .progress_at(&goal_of(GoalType::Bedtime, "23:00"), fixture_now())
            .unwrap();

        assert_eq!(progress.current, 1.0);
        assert_eq!(progress.target, 2.0);
        assert_eq!(progress.pct, 50);
        assert_eq!(progress.unit, "time");
    }

    #[test]
    fn test_sleep_window_parses_range_start() {
        let store = Store::open_memory().unwrap();
        let today = fixture_now().date_naive();
        let mut summary = DailySummary::new(today - Duration::days(1));
        summary.bedtime_start = Some("2024-03-09T22:45:00+00:00".to_string());
        store.upsert_daily_summary(&summary, fixture_now()).unwrap();

        let evaluator = GoalProgressEvaluator::new(&store);
        let progress = evaluator
            .progress_at(
                &goal_of(GoalType::SleepWindow, "22:30-06:30"),
                fixture_now(),
            )
            .unwrap();

        // 22:45 is within 30 minutes of the 22:30 window start
        assert_eq!(progress.current, 1.0);
        assert_eq!(progress.pct, 100);
    }

    #[test]
    fn test_bedtime_unparsable_target() {
        let store = Store::open_memory().unwrap();
        let evaluator = GoalProgressEvaluator::new(&store);
        let progress = evaluator
            .progress_at(&goal_of(GoalType::Bedtime, "earlyish"), fixture_now())
            .unwrap();
        assert_eq!(
            progress,
            GoalProgress {
                current: 0.0,
                target: 0.0,
                unit: "time".to_string(),
                pct: 0
            }
        );
    }

    #[test]
    fn test_weight_target_progress() {
        let store = Store::open_memory().unwrap();
        // started at 200, now 185, target 175 -> 60%
        log_value(
            &store,
            LogCategory::Weight,
            Some(200.0),
            Some("lbs"),
            fixture_now() - Duration::days(60),
        );
        log_value(
            &store,
            LogCategory::Weight,
            Some(185.0),
            Some("lbs"),
            fixture_now() - Duration::days(1),
        );

        let evaluator = GoalProgressEvaluator::new(&store);
        let progress = evaluator
            .progress_at(&goal_of(GoalType::WeightTarget, "175"), fixture_now())
            .unwrap();

        assert_eq!(progress.current, 185.0);
        assert_eq!(progress.target, 175.0);
        assert_eq!(progress.unit, "lbs");
        assert_eq!(progress.pct, 60);
    }

    #[test]
    fn test_weight_target_zero_range() {
        let store = Store::open_memory().unwrap();
        log_value(
            &store,
            LogCategory::Weight,
            Some(175.0),
            None,
            fixture_now() - Duration::days(1),
        );

        let evaluator = GoalProgressEvaluator::new(&store);
        let progress = evaluator
            .progress_at(&goal_of(GoalType::WeightTarget, "175"), fixture_now())
            .unwrap();

        // first == target: no meaningful range, but current is still reported
        assert_eq!(progress.pct, 0);
        assert_eq!(progress.current, 175.0);
    }

    #[test]
    fn test_alcohol_limit_penalty_curve() {
        let evaluator_pct = |count: usize| {
            let store = Store::open_memory().unwrap();
            for i in 0..count {
                log_value(
                    &store,
                    LogCategory::Alcohol,
                    Some(1.0),
                    None,
                    fixture_now() - Duration::hours(i as i64),
                );
            }
            let evaluator = GoalProgressEvaluator::new(&store);
            evaluator
                .progress_at(&goal_of(GoalType::AlcoholLimit, "3"), fixture_now())
                .unwrap()
                .pct
        };

        assert_eq!(evaluator_pct(2), 100);
        assert_eq!(evaluator_pct(3), 100);
        assert_eq!(evaluator_pct(4), 67);
        assert_eq!(evaluator_pct(6), 0);
        assert_eq!(evaluator_pct(9), 0);
    }

    #[test]
    fn test_unknown_goal_type_reports_zero() {
        let store = Store::open_memory().unwrap();
        let evaluator = GoalProgressEvaluator::new(&store);
        let progress = evaluator
            .progress_at(&goal_of(GoalType::Hydration, "2 liters"), fixture_now())
            .unwrap();
        assert_eq!(progress, GoalProgress::zero(""));
    }

    #[test]
    fn test_goals_with_progress_joins_active_goals() {
        let store = Store::open_memory().unwrap();
        store
            .set_goal("user-1", &GoalType::DailySteps, "10000", fixture_now())
            .unwrap();
        store
            .set_goal("user-1", &GoalType::AlcoholLimit, "3", fixture_now())
            .unwrap();

        let evaluator = GoalProgressEvaluator::new(&store);
        let goals = evaluator
            .goals_with_progress("user-1", fixture_now())
            .unwrap();

        assert_eq!(goals.len(), 2);
        // no drinks logged: within limit is full marks
        let alcohol = goals
            .iter()
            .find(|g| g.goal.goal_type == GoalType::AlcoholLimit)
            .unwrap();
        assert_eq!(alcohol.progress.pct, 100);
    }

    #[test]
    fn test_parse_helpers() {
        assert_eq!(first_integer("4x/week"), Some(4));
        assert_eq!(first_integer("10000"), Some(10_000));
        assert_eq!(first_integer("no digits"), None);
        assert_eq!(first_number("175.5 lbs"), Some(175.5));
        assert_eq!(first_hhmm("22:30-06:30"), Some((22, 30)));
        assert_eq!(first_hhmm("bed by 9:45"), Some((9, 45)));
        assert_eq!(first_hhmm("25:00"), None);
        assert_eq!(first_hhmm("whenever"), None);
    }
}
