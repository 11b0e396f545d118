//! Wellness Engine - analytics and behavioral-state engine for self-tracked
//! wellness data
//!
//! The engine tracks a single user's self-reported behavior (exercise,
//! stress, alcohol, sleep habits) alongside daily biometric summaries from a
//! wearable, and derives four kinds of insight:
//!
//! - **Correlations**: lagged behavior → next-day outcome splits and the
//!   sleep-lever breakdown
//! - **Streaks**: current and longest consecutive-day runs of qualifying
//!   behavior
//! - **Goals**: normalized 0-100 progress for heterogeneous goal types
//! - **Nudges**: a rate-limiting gate (mute/snooze/cap) over an append-only
//!   ledger
//!
//! All four consume the same [`Store`] independently; none calls another.
//! Every public operation captures one reference instant at entry and reuses
//! it for all date math within the call.

pub mod correlations;
pub mod error;
pub mod goals;
pub mod model;
pub mod nudges;
pub mod store;
pub mod streaks;

pub use correlations::CorrelationAnalyzer;
pub use error::EngineError;
pub use goals::{GoalProgress, GoalProgressEvaluator, GoalWithProgress};
pub use model::{DailySummary, Goal, GoalType, LogCategory, LogEntry, NewLogEntry, NudgeRecord};
pub use nudges::{NudgeDecision, NudgeGate};
pub use store::{LogFilter, Store};
pub use streaks::{StreakCalculator, StreakInfo, StreakSummary};

/// Engine version embedded in exports and the CLI
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
