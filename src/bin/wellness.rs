//! Wellness CLI - command-line surface over the analytics engine
//!
//! Commands:
//! - log / entries: append and query behavior log entries
//! - import-summaries: upsert daily wearable summaries from NDJSON
//! - streaks / correlate / sleep-levers / trends: analytics reports
//! - goal: manage goals and evaluate progress
//! - nudge: gate checks plus snooze/mute/unmute
//! - admin: delete entries or wipe a date range
//! - stats / export: overview numbers and a full JSON snapshot

use clap::{Parser, Subcommand};
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;

use chrono::Utc;
use wellness_engine::nudges::{DEFAULT_MAX_PER_DAY, DEFAULT_SNOOZE_HOURS};
use wellness_engine::store::day_start;
use wellness_engine::{
    CorrelationAnalyzer, DailySummary, EngineError, GoalProgressEvaluator, GoalType, LogCategory,
    LogFilter, NewLogEntry, NudgeGate, Store, StreakCalculator, ENGINE_VERSION,
};

/// Wellness - analytics engine for self-tracked behavior and wearable data
#[derive(Parser)]
#[command(name = "wellness")]
#[command(version = ENGINE_VERSION)]
#[command(about = "Track behavior, correlate it with wearable data, and keep streaks honest", long_about = None)]
struct Cli {
    /// Path to the SQLite store
    #[arg(long, default_value = "wellness.db")]
    db: PathBuf,

    /// Owner id used for goals and nudges
    #[arg(long, default_value = "default")]
    owner: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Append a behavior log entry
    Log {
        /// Category (exercise, stress, alcohol, ...)
        #[arg(long)]
        category: String,

        #[arg(long)]
        subcategory: Option<String>,

        #[arg(long)]
        value: Option<f64>,

        #[arg(long)]
        unit: Option<String>,

        #[arg(long)]
        notes: Option<String>,
    },

    /// Query recent log entries
    Entries {
        #[arg(long)]
        category: Option<String>,

        /// Days to look back
        #[arg(long, default_value = "30")]
        days: i64,

        /// Max entries to return
        #[arg(long, default_value = "50")]
        limit: u32,
    },

    /// Upsert daily summaries from NDJSON (one summary per line, - for stdin)
    ImportSummaries {
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Named streak report over the trailing 90 days
    Streaks {
        /// Per-category streaks instead of the named report
        #[arg(long)]
        categories: bool,
    },

    /// Lagged behavior vs next-day outcome split
    Correlate {
        /// Behavior category to analyze
        #[arg(long)]
        category: String,

        #[arg(long, default_value = "30")]
        days: i64,
    },

    /// What was logged before good sleep vs bad sleep
    SleepLevers {
        #[arg(long, default_value = "30")]
        days: i64,
    },

    /// Week-by-week log and summary trends
    Trends {
        #[arg(long, default_value = "30")]
        days: i64,
    },

    /// Manage goals and evaluate progress
    Goal {
        #[command(subcommand)]
        action: GoalAction,
    },

    /// Nudge gate checks and suppression controls
    Nudge {
        #[command(subcommand)]
        action: NudgeAction,
    },

    /// Delete entries or wipe a date range
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },

    /// Overview stats for the dataset
    Stats,

    /// Print a full JSON snapshot of the store
    Export,
}

#[derive(Subcommand)]
enum GoalAction {
    /// Set a goal, superseding any active goal of the same type
    Set {
        #[arg(long = "type")]
        goal_type: String,

        #[arg(long)]
        target: String,
    },

    /// Update the target of an active goal
    Update {
        #[arg(long = "type")]
        goal_type: String,

        #[arg(long)]
        target: String,
    },

    /// Show one active goal
    View {
        #[arg(long = "type")]
        goal_type: String,
    },

    /// List all active goals
    List,

    /// Deactivate an active goal
    Deactivate {
        #[arg(long = "type")]
        goal_type: String,
    },

    /// Evaluate progress for every active goal
    Progress,
}

#[derive(Subcommand)]
enum AdminAction {
    /// Delete the most recently logged entry
    DeleteLast,

    /// Delete one entry by id
    Delete {
        #[arg(long)]
        id: i64,
    },

    /// Delete every entry logged within [from, to] (YYYY-MM-DD)
    Wipe {
        #[arg(long)]
        from: String,

        #[arg(long)]
        to: String,
    },
}

#[derive(Subcommand)]
enum NudgeAction {
    /// Check whether a nudge may be sent (an allow is recorded)
    Check {
        #[arg(long = "type")]
        nudge_type: String,

        #[arg(long, default_value_t = DEFAULT_MAX_PER_DAY)]
        max_per_day: u32,
    },

    /// Suppress all nudges for a few hours
    Snooze {
        #[arg(long, default_value_t = DEFAULT_SNOOZE_HOURS)]
        hours: i64,
    },

    /// Mute all nudges until unmute
    Mute,

    /// Remove mute rows
    Unmute,
}

/// CLI-layer errors: engine failures plus file/stdin handling
#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let store = Store::open(&cli.db)?;
    let now = Utc::now();

    match cli.command {
        Commands::Log {
            category,
            subcategory,
            value,
            unit,
            notes,
        } => {
            let id = store.append_log_entry(&NewLogEntry {
                category: LogCategory::from(category.as_str()),
                subcategory,
                value,
                unit,
                notes,
                logged_at: now,
            })?;
            println!("{}", serde_json::json!({ "id": id }));
        }

        Commands::Entries {
            category,
            days,
            limit,
        } => {
            let filter = LogFilter {
                category: category.as_deref().map(LogCategory::from),
                date_from: Some(now - chrono::Duration::days(days)),
                date_to: None,
                limit: Some(limit),
            };
            let entries = store.query_log_entries(&filter)?;
            let summary = store.log_category_summary(now - chrono::Duration::days(days))?;
            let total = entries.len();
            print_json(&serde_json::json!({
                "entries": entries,
                "summary": summary,
                "total": total,
            }))?;
        }

        Commands::ImportSummaries { input } => {
            let data = if input.to_string_lossy() == "-" {
                let mut buffer = String::new();
                io::stdin().read_to_string(&mut buffer)?;
                buffer
            } else {
                fs::read_to_string(&input)?
            };

            let mut imported = 0usize;
            for line in data.lines().filter(|l| !l.trim().is_empty()) {
                let summary: DailySummary = serde_json::from_str(line)?;
                store.upsert_daily_summary(&summary, now)?;
                imported += 1;
            }
            println!("{}", serde_json::json!({ "imported": imported }));
        }

        Commands::Streaks { categories } => {
            let calculator = StreakCalculator::new(&store);
            if categories {
                print_json(&calculator.category_report_at(now)?)?;
            } else {
                print_json(&calculator.report_at(now)?)?;
            }
        }

        Commands::Correlate { category, days } => {
            let analyzer = CorrelationAnalyzer::new(&store);
            let report =
                analyzer.lagged_outcomes_at(LogCategory::from(category.as_str()), days, now)?;
            print_json(&report)?;
        }

        Commands::SleepLevers { days } => {
            let analyzer = CorrelationAnalyzer::new(&store);
            print_json(&analyzer.sleep_levers_at(days, now)?)?;
        }

        Commands::Trends { days } => {
            let analyzer = CorrelationAnalyzer::new(&store);
            print_json(&analyzer.weekly_trends_at(days, now)?)?;
        }

        Commands::Goal { action } => match action {
            GoalAction::Set { goal_type, target } => {
                let goal =
                    store.set_goal(&cli.owner, &GoalType::from(goal_type.as_str()), &target, now)?;
                print_json(&goal)?;
            }
            GoalAction::Update { goal_type, target } => {
                let changed = store.update_goal(
                    &cli.owner,
                    &GoalType::from(goal_type.as_str()),
                    &target,
                    now,
                )?;
                println!("{}", serde_json::json!({ "updated": changed }));
            }
            GoalAction::View { goal_type } => {
                let goal = store.get_active_goal(&cli.owner, &GoalType::from(goal_type.as_str()))?;
                print_json(&goal)?;
            }
            GoalAction::List => {
                print_json(&store.list_active_goals(&cli.owner)?)?;
            }
            GoalAction::Deactivate { goal_type } => {
                let changed =
                    store.deactivate_goal(&cli.owner, &GoalType::from(goal_type.as_str()), now)?;
                println!("{}", serde_json::json!({ "deactivated": changed }));
            }
            GoalAction::Progress => {
                let evaluator = GoalProgressEvaluator::new(&store);
                print_json(&evaluator.goals_with_progress(&cli.owner, now)?)?;
            }
        },

        Commands::Nudge { action } => match action {
            NudgeAction::Check {
                nudge_type,
                max_per_day,
            } => {
                let gate = NudgeGate::with_max_per_day(&store, max_per_day);
                print_json(&gate.check_at(&cli.owner, &nudge_type, now)?)?;
            }
            NudgeAction::Snooze { hours } => {
                let gate = NudgeGate::new(&store);
                let until = gate.snooze_at(&cli.owner, hours, now)?;
                println!("{}", serde_json::json!({ "snoozed_until": until.to_rfc3339() }));
            }
            NudgeAction::Mute => {
                NudgeGate::new(&store).mute_at(&cli.owner, now)?;
                println!("{}", serde_json::json!({ "muted": true }));
            }
            NudgeAction::Unmute => {
                let removed = NudgeGate::new(&store).unmute(&cli.owner)?;
                println!("{}", serde_json::json!({ "unmuted": removed }));
            }
        },

        Commands::Admin { action } => match action {
            AdminAction::DeleteLast => {
                let deleted = store.delete_last_entry()?;
                print_json(&deleted)?;
            }
            AdminAction::Delete { id } => {
                let removed = store.delete_log_entry(id)?;
                println!("{}", serde_json::json!({ "deleted": removed }));
            }
            AdminAction::Wipe { from, to } => {
                let from_day = parse_day(&from)?;
                let to_day = parse_day(&to)?;
                let end = day_start(to_day) + chrono::Duration::days(1)
                    - chrono::Duration::seconds(1);
                let wiped = store.wipe_log_range(day_start(from_day), end)?;
                println!("{}", serde_json::json!({ "wiped": wiped }));
            }
        },

        Commands::Stats => {
            print_json(&store.overview_stats(&cli.owner, now)?)?;
        }

        Commands::Export => {
            print_json(&store.export_snapshot(&cli.owner)?)?;
        }
    }

    Ok(())
}

fn parse_day(raw: &str) -> Result<chrono::NaiveDate, CliError> {
    raw.parse().map_err(|_| {
        CliError::Engine(EngineError::InvalidParameter(format!(
            "expected YYYY-MM-DD, got {raw}"
        )))
    })
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
