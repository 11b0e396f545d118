//! Core data model for the wellness engine
//!
//! This module defines the records the engine reads and writes through the
//! store: behavior log entries, daily wearable summaries, goals, and the
//! nudge ledger.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Behavior category for a log entry.
///
/// The closed set matches what the ingestion layer emits; `Other` preserves
/// custom categories without losing them on a round trip.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogCategory {
    Exercise,
    Stress,
    Alcohol,
    Sleep,
    Mood,
    Nutrition,
    Hydration,
    Medication,
    Symptom,
    Reading,
    Mindfulness,
    Recovery,
    Weight,
    /// For custom categories, use Other with a name
    #[serde(untagged)]
    Other(String),
}

impl LogCategory {
    pub fn as_str(&self) -> &str {
        match self {
            LogCategory::Exercise => "exercise",
            LogCategory::Stress => "stress",
            LogCategory::Alcohol => "alcohol",
            LogCategory::Sleep => "sleep",
            LogCategory::Mood => "mood",
            LogCategory::Nutrition => "nutrition",
            LogCategory::Hydration => "hydration",
            LogCategory::Medication => "medication",
            LogCategory::Symptom => "symptom",
            LogCategory::Reading => "reading",
            LogCategory::Mindfulness => "mindfulness",
            LogCategory::Recovery => "recovery",
            LogCategory::Weight => "weight",
            LogCategory::Other(name) => name.as_str(),
        }
    }
}

impl From<&str> for LogCategory {
    fn from(s: &str) -> Self {
        match s {
            "exercise" => LogCategory::Exercise,
            "stress" => LogCategory::Stress,
            "alcohol" => LogCategory::Alcohol,
            "sleep" => LogCategory::Sleep,
            "mood" => LogCategory::Mood,
            "nutrition" => LogCategory::Nutrition,
            "hydration" => LogCategory::Hydration,
            "medication" => LogCategory::Medication,
            "symptom" => LogCategory::Symptom,
            "reading" => LogCategory::Reading,
            "mindfulness" => LogCategory::Mindfulness,
            "recovery" => LogCategory::Recovery,
            "weight" => LogCategory::Weight,
            other => LogCategory::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for LogCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured behavior log entry.
///
/// Entries are append-only: created once by the ingestion layer, read many
/// times by the analyzers, removed only by an explicit admin delete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: i64,
    pub category: LogCategory,
    pub subcategory: Option<String>,
    /// Numeric value when applicable (minutes, drinks, rating, kg)
    pub value: Option<f64>,
    pub unit: Option<String>,
    pub notes: Option<String>,
    pub logged_at: DateTime<Utc>,
}

impl LogEntry {
    /// Calendar day the entry was logged on (UTC)
    pub fn day(&self) -> NaiveDate {
        self.logged_at.date_naive()
    }
}

/// Fields for a new log entry, before the store assigns an id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLogEntry {
    pub category: LogCategory,
    pub subcategory: Option<String>,
    pub value: Option<f64>,
    pub unit: Option<String>,
    pub notes: Option<String>,
    pub logged_at: DateTime<Utc>,
}

impl NewLogEntry {
    /// Create a minimal entry for `category` at `logged_at`
    pub fn new(category: LogCategory, logged_at: DateTime<Utc>) -> Self {
        Self {
            category,
            subcategory: None,
            value: None,
            unit: None,
            notes: None,
            logged_at,
        }
    }
}

/// One day of derived wearable metrics.
///
/// Exactly one row exists per calendar date; the sync collaborator refreshes
/// it with last-write-wins upserts. Bedtimes keep the RFC 3339 string the
/// device reported, including its local UTC offset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub sleep_score: Option<i64>,
    pub readiness_score: Option<i64>,
    pub activity_score: Option<i64>,
    pub hrv_average: Option<f64>,
    pub resting_hr: Option<f64>,
    pub total_sleep_minutes: Option<i64>,
    pub deep_sleep_minutes: Option<i64>,
    pub rem_sleep_minutes: Option<i64>,
    pub steps: Option<i64>,
    pub active_calories: Option<i64>,
    pub bedtime_start: Option<String>,
    pub bedtime_end: Option<String>,
}

impl DailySummary {
    /// Create an empty summary for `date`
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            ..Default::default()
        }
    }
}

/// Goal type for progress evaluation.
///
/// A closed set keyed off the target the user phrased; unknown types are
/// preserved as `Other` and evaluate to zero progress rather than an error.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalType {
    SleepWindow,
    TrainingFrequency,
    DailySteps,
    WeightTarget,
    Hydration,
    Bedtime,
    WakeTime,
    AlcoholLimit,
    StressManagement,
    #[serde(untagged)]
    Other(String),
}

impl GoalType {
    pub fn as_str(&self) -> &str {
        match self {
            GoalType::SleepWindow => "sleep_window",
            GoalType::TrainingFrequency => "training_frequency",
            GoalType::DailySteps => "daily_steps",
            GoalType::WeightTarget => "weight_target",
            GoalType::Hydration => "hydration",
            GoalType::Bedtime => "bedtime",
            GoalType::WakeTime => "wake_time",
            GoalType::AlcoholLimit => "alcohol_limit",
            GoalType::StressManagement => "stress_management",
            GoalType::Other(name) => name.as_str(),
        }
    }
}

impl From<&str> for GoalType {
    fn from(s: &str) -> Self {
        match s {
            "sleep_window" => GoalType::SleepWindow,
            "training_frequency" => GoalType::TrainingFrequency,
            "daily_steps" => GoalType::DailySteps,
            "weight_target" => GoalType::WeightTarget,
            "hydration" => GoalType::Hydration,
            "bedtime" => GoalType::Bedtime,
            "wake_time" => GoalType::WakeTime,
            "alcohol_limit" => GoalType::AlcoholLimit,
            "stress_management" => GoalType::StressManagement,
            other => GoalType::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for GoalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user goal.
///
/// The write path keeps at most one active row per `(owner_id, goal_type)`
/// by deactivating prior rows before inserting a replacement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    pub id: i64,
    pub owner_id: String,
    pub goal_type: GoalType,
    /// Target as the user phrased it, e.g. "4x/week", "10000", "22:30-06:30"
    pub target_value: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Nudge type accepted by the gate. `"all"` is reserved for ledger
/// bookkeeping rows (snooze and mute events that apply to every type).
pub const NUDGE_TYPE_ALL: &str = "all";

/// One row of the nudge ledger.
///
/// The ledger is append-only: a `muted` row is a mute toggle-on event, a row
/// with `snoozed_until` is a temporary suppression window, and any other row
/// records a sent nudge. Unmuting deletes the mute rows; there is no unmute
/// row type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NudgeRecord {
    pub id: i64,
    pub owner_id: String,
    pub nudge_type: String,
    pub sent_at: DateTime<Utc>,
    pub snoozed_until: Option<DateTime<Utc>>,
    pub muted: bool,
}
