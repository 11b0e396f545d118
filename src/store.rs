//! SQLite-backed store for logs, daily summaries, goals, and the nudge ledger.
//!
//! The store is the single persistence seam of the engine: filtered range
//! reads plus idempotent upserts. Each analyzer receives an explicit `&Store`
//! at construction; opening and closing the handle is the caller's job.
//!
//! Timestamps are stored as RFC 3339 text in UTC, calendar days as
//! `YYYY-MM-DD` text, so lexicographic comparison matches chronological
//! order.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::path::Path;

use crate::error::EngineError;
use crate::model::{DailySummary, Goal, GoalType, LogCategory, LogEntry, NewLogEntry, NudgeRecord};

/// Filter for log entry queries. Unset fields do not constrain the result.
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    pub category: Option<LogCategory>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
}

impl LogFilter {
    /// Entries of `category` logged at or after `from`
    pub fn category_since(category: LogCategory, from: DateTime<Utc>) -> Self {
        Self {
            category: Some(category),
            date_from: Some(from),
            ..Default::default()
        }
    }

    /// All entries logged at or after `from`
    pub fn since(from: DateTime<Utc>) -> Self {
        Self {
            date_from: Some(from),
            ..Default::default()
        }
    }
}

/// Per-category count and mean value over a query window
#[derive(Debug, Clone, Serialize)]
pub struct CategorySummary {
    pub category: LogCategory,
    pub count: u32,
    pub avg_value: Option<f64>,
}

/// Per-category entry count for overview stats
#[derive(Debug, Clone, Serialize)]
pub struct CategoryCount {
    pub category: LogCategory,
    pub count: u32,
}

/// Headline numbers for the tracked dataset
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverviewStats {
    pub total_entries: u32,
    pub summary_days: u32,
    pub active_goals: u32,
    /// 30-day entry counts per category, descending
    pub categories: Vec<CategoryCount>,
    pub this_week_entries: u32,
}

/// Full data snapshot for export. Writing it anywhere is the caller's job.
#[derive(Debug, Clone, Serialize)]
pub struct ExportSnapshot {
    pub log_entries: Vec<LogEntry>,
    pub daily_summaries: Vec<DailySummary>,
    pub goals: Vec<Goal>,
}

/// SQLite store handle.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (or create) the store at `path` and apply the schema migration.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, EngineError> {
        let conn = Connection::open(path.as_ref())?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        let store = Self { conn };
        store.migrate()?;
        log::info!("store opened at {}", path.as_ref().display());
        Ok(store)
    }

    /// Open an in-memory store (tests, ephemeral runs).
    pub fn open_memory() -> Result<Self, EngineError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<(), rusqlite::Error> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS log_entries (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                category    TEXT NOT NULL,
                subcategory TEXT,
                value       REAL,
                unit        TEXT,
                notes       TEXT,
                logged_at   TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS daily_summary (
                id                  INTEGER PRIMARY KEY AUTOINCREMENT,
                date                TEXT UNIQUE NOT NULL,
                sleep_score         INTEGER,
                readiness_score     INTEGER,
                activity_score      INTEGER,
                hrv_average         REAL,
                resting_hr          REAL,
                total_sleep_minutes INTEGER,
                deep_sleep_minutes  INTEGER,
                rem_sleep_minutes   INTEGER,
                steps               INTEGER,
                active_calories     INTEGER,
                bedtime_start       TEXT,
                bedtime_end         TEXT,
                synced_at           TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS goals (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id     TEXT NOT NULL,
                goal_type    TEXT NOT NULL,
                target_value TEXT NOT NULL,
                active       INTEGER NOT NULL DEFAULT 1,
                created_at   TEXT NOT NULL,
                updated_at   TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS nudge_log (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id      TEXT NOT NULL,
                nudge_type    TEXT NOT NULL,
                sent_at       TEXT NOT NULL,
                snoozed_until TEXT,
                muted         INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_log_entries_category ON log_entries(category);
            CREATE INDEX IF NOT EXISTS idx_log_entries_logged_at ON log_entries(logged_at);
            CREATE INDEX IF NOT EXISTS idx_daily_summary_date ON daily_summary(date);
            CREATE INDEX IF NOT EXISTS idx_goals_owner_type ON goals(owner_id, goal_type, active);
            CREATE INDEX IF NOT EXISTS idx_nudge_log_owner_sent ON nudge_log(owner_id, sent_at);",
        )?;
        Ok(())
    }

    // ---- log entries ----

    /// Append a log entry and return its id.
    pub fn append_log_entry(&self, entry: &NewLogEntry) -> Result<i64, EngineError> {
        self.conn.execute(
            "INSERT INTO log_entries (category, subcategory, value, unit, notes, logged_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.category.as_str(),
                entry.subcategory,
                entry.value,
                entry.unit,
                entry.notes,
                ts_to_sql(entry.logged_at),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Query log entries, newest first.
    pub fn query_log_entries(&self, filter: &LogFilter) -> Result<Vec<LogEntry>, EngineError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, category, subcategory, value, unit, notes, logged_at
             FROM log_entries
             WHERE (?1 IS NULL OR category = ?1)
               AND (?2 IS NULL OR logged_at >= ?2)
               AND (?3 IS NULL OR logged_at <= ?3)
             ORDER BY logged_at DESC
             LIMIT ?4",
        )?;
        let rows = stmt.query_map(
            params![
                filter.category.as_ref().map(|c| c.as_str().to_string()),
                filter.date_from.map(ts_to_sql),
                filter.date_to.map(ts_to_sql),
                filter.limit.map(|l| l as i64).unwrap_or(-1),
            ],
            row_to_log_entry,
        )?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Per-category count and mean value for entries at or after `from`,
    /// descending by count.
    pub fn log_category_summary(
        &self,
        from: DateTime<Utc>,
    ) -> Result<Vec<CategorySummary>, EngineError> {
        let mut stmt = self.conn.prepare(
            "SELECT category, COUNT(*), AVG(value)
             FROM log_entries
             WHERE logged_at >= ?1
             GROUP BY category
             ORDER BY COUNT(*) DESC, category",
        )?;
        let rows = stmt.query_map(params![ts_to_sql(from)], |row| {
            let category: String = row.get(0)?;
            Ok(CategorySummary {
                category: LogCategory::from(category.as_str()),
                count: row.get(1)?,
                avg_value: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Delete a single entry by id. Returns whether a row was removed.
    pub fn delete_log_entry(&self, id: i64) -> Result<bool, EngineError> {
        let changed = self
            .conn
            .execute("DELETE FROM log_entries WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    /// Delete the most recently logged entry and return it, if any.
    pub fn delete_last_entry(&self) -> Result<Option<LogEntry>, EngineError> {
        let last = self
            .conn
            .query_row(
                "SELECT id, category, subcategory, value, unit, notes, logged_at
                 FROM log_entries ORDER BY logged_at DESC, id DESC LIMIT 1",
                [],
                row_to_log_entry,
            )
            .optional()?;
        if let Some(ref entry) = last {
            self.conn
                .execute("DELETE FROM log_entries WHERE id = ?1", params![entry.id])?;
        }
        Ok(last)
    }

    /// Delete every entry logged within `[from, to]`. Returns the count.
    pub fn wipe_log_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<usize, EngineError> {
        let changed = self.conn.execute(
            "DELETE FROM log_entries WHERE logged_at >= ?1 AND logged_at <= ?2",
            params![ts_to_sql(from), ts_to_sql(to)],
        )?;
        log::info!("wiped {changed} log entries");
        Ok(changed)
    }

    /// Earliest entry of `category` carrying a numeric value.
    pub fn first_entry_with_value(
        &self,
        category: &LogCategory,
    ) -> Result<Option<LogEntry>, EngineError> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, category, subcategory, value, unit, notes, logged_at
                 FROM log_entries
                 WHERE category = ?1 AND value IS NOT NULL
                 ORDER BY logged_at ASC LIMIT 1",
                params![category.as_str()],
                row_to_log_entry,
            )
            .optional()?)
    }

    /// Most recent entry of `category` carrying a numeric value.
    pub fn latest_entry_with_value(
        &self,
        category: &LogCategory,
    ) -> Result<Option<LogEntry>, EngineError> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, category, subcategory, value, unit, notes, logged_at
                 FROM log_entries
                 WHERE category = ?1 AND value IS NOT NULL
                 ORDER BY logged_at DESC LIMIT 1",
                params![category.as_str()],
                row_to_log_entry,
            )
            .optional()?)
    }

    // ---- daily summaries ----

    /// Insert or refresh the summary row for its date (last-write-wins).
    pub fn upsert_daily_summary(
        &self,
        summary: &DailySummary,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        self.conn.execute(
            "INSERT INTO daily_summary (date, sleep_score, readiness_score, activity_score,
                hrv_average, resting_hr, total_sleep_minutes, deep_sleep_minutes,
                rem_sleep_minutes, steps, active_calories, bedtime_start, bedtime_end, synced_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
             ON CONFLICT(date) DO UPDATE SET
                sleep_score = excluded.sleep_score,
                readiness_score = excluded.readiness_score,
                activity_score = excluded.activity_score,
                hrv_average = excluded.hrv_average,
                resting_hr = excluded.resting_hr,
                total_sleep_minutes = excluded.total_sleep_minutes,
                deep_sleep_minutes = excluded.deep_sleep_minutes,
                rem_sleep_minutes = excluded.rem_sleep_minutes,
                steps = excluded.steps,
                active_calories = excluded.active_calories,
                bedtime_start = excluded.bedtime_start,
                bedtime_end = excluded.bedtime_end,
                synced_at = excluded.synced_at",
            params![
                summary.date.to_string(),
                summary.sleep_score,
                summary.readiness_score,
                summary.activity_score,
                summary.hrv_average,
                summary.resting_hr,
                summary.total_sleep_minutes,
                summary.deep_sleep_minutes,
                summary.rem_sleep_minutes,
                summary.steps,
                summary.active_calories,
                summary.bedtime_start,
                summary.bedtime_end,
                ts_to_sql(now),
            ],
        )?;
        log::debug!("daily summary upserted for {}", summary.date);
        Ok(())
    }

    /// Summaries with `from <= date <= to`, ascending by date.
    pub fn query_daily_summaries(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DailySummary>, EngineError> {
        let mut stmt = self.conn.prepare(
            "SELECT date, sleep_score, readiness_score, activity_score, hrv_average,
                    resting_hr, total_sleep_minutes, deep_sleep_minutes, rem_sleep_minutes,
                    steps, active_calories, bedtime_start, bedtime_end
             FROM daily_summary
             WHERE date >= ?1 AND date <= ?2
             ORDER BY date ASC",
        )?;
        let rows = stmt.query_map(params![from.to_string(), to.to_string()], row_to_summary)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Most recent summary row, if any.
    pub fn latest_daily_summary(&self) -> Result<Option<DailySummary>, EngineError> {
        Ok(self
            .conn
            .query_row(
                "SELECT date, sleep_score, readiness_score, activity_score, hrv_average,
                        resting_hr, total_sleep_minutes, deep_sleep_minutes, rem_sleep_minutes,
                        steps, active_calories, bedtime_start, bedtime_end
                 FROM daily_summary ORDER BY date DESC LIMIT 1",
                [],
                row_to_summary,
            )
            .optional()?)
    }

    // ---- goals ----

    /// Set a goal, superseding any active goal of the same type.
    ///
    /// Deactivate-then-insert runs inside one transaction so two concurrent
    /// set calls cannot leave two active rows.
    pub fn set_goal(
        &self,
        owner_id: &str,
        goal_type: &GoalType,
        target_value: &str,
        now: DateTime<Utc>,
    ) -> Result<Goal, EngineError> {
        if target_value.trim().is_empty() {
            return Err(EngineError::InvalidParameter(
                "target_value must not be empty".to_string(),
            ));
        }
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "UPDATE goals SET active = 0, updated_at = ?1
             WHERE owner_id = ?2 AND goal_type = ?3 AND active = 1",
            params![ts_to_sql(now), owner_id, goal_type.as_str()],
        )?;
        tx.execute(
            "INSERT INTO goals (owner_id, goal_type, target_value, active, created_at, updated_at)
             VALUES (?1, ?2, ?3, 1, ?4, ?4)",
            params![owner_id, goal_type.as_str(), target_value, ts_to_sql(now)],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;
        log::info!("goal set: {goal_type} -> {target_value}");
        Ok(Goal {
            id,
            owner_id: owner_id.to_string(),
            goal_type: goal_type.clone(),
            target_value: target_value.to_string(),
            active: true,
            created_at: now,
            updated_at: now,
        })
    }

    /// Update the target of an active goal. Returns rows affected; zero
    /// means no active goal of that type exists.
    pub fn update_goal(
        &self,
        owner_id: &str,
        goal_type: &GoalType,
        target_value: &str,
        now: DateTime<Utc>,
    ) -> Result<usize, EngineError> {
        if target_value.trim().is_empty() {
            return Err(EngineError::InvalidParameter(
                "target_value must not be empty".to_string(),
            ));
        }
        let changed = self.conn.execute(
            "UPDATE goals SET target_value = ?1, updated_at = ?2
             WHERE owner_id = ?3 AND goal_type = ?4 AND active = 1",
            params![target_value, ts_to_sql(now), owner_id, goal_type.as_str()],
        )?;
        Ok(changed)
    }

    /// Deactivate an active goal. Returns rows affected (zero is a no-op,
    /// not an error).
    pub fn deactivate_goal(
        &self,
        owner_id: &str,
        goal_type: &GoalType,
        now: DateTime<Utc>,
    ) -> Result<usize, EngineError> {
        let changed = self.conn.execute(
            "UPDATE goals SET active = 0, updated_at = ?1
             WHERE owner_id = ?2 AND goal_type = ?3 AND active = 1",
            params![ts_to_sql(now), owner_id, goal_type.as_str()],
        )?;
        Ok(changed)
    }

    /// The active goal of `goal_type` for `owner_id`, if any.
    pub fn get_active_goal(
        &self,
        owner_id: &str,
        goal_type: &GoalType,
    ) -> Result<Option<Goal>, EngineError> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, owner_id, goal_type, target_value, active, created_at, updated_at
                 FROM goals
                 WHERE owner_id = ?1 AND goal_type = ?2 AND active = 1
                 ORDER BY created_at DESC LIMIT 1",
                params![owner_id, goal_type.as_str()],
                row_to_goal,
            )
            .optional()?)
    }

    /// All active goals for `owner_id`, newest first.
    pub fn list_active_goals(&self, owner_id: &str) -> Result<Vec<Goal>, EngineError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, owner_id, goal_type, target_value, active, created_at, updated_at
             FROM goals WHERE owner_id = ?1 AND active = 1
             ORDER BY created_at DESC, id DESC",
        )?;
        let rows = stmt.query_map(params![owner_id], row_to_goal)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // ---- nudge ledger ----

    /// Append a ledger row and return its id.
    pub fn append_nudge_record(
        &self,
        owner_id: &str,
        nudge_type: &str,
        sent_at: DateTime<Utc>,
        snoozed_until: Option<DateTime<Utc>>,
        muted: bool,
    ) -> Result<i64, EngineError> {
        self.conn.execute(
            "INSERT INTO nudge_log (owner_id, nudge_type, sent_at, snoozed_until, muted)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                owner_id,
                nudge_type,
                ts_to_sql(sent_at),
                snoozed_until.map(ts_to_sql),
                muted,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Most recent mute row for `owner_id`, if one still exists.
    pub fn latest_mute(&self, owner_id: &str) -> Result<Option<NudgeRecord>, EngineError> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, owner_id, nudge_type, sent_at, snoozed_until, muted
                 FROM nudge_log WHERE owner_id = ?1 AND muted = 1
                 ORDER BY sent_at DESC LIMIT 1",
                params![owner_id],
                row_to_nudge_record,
            )
            .optional()?)
    }

    /// The snooze row with the furthest expiry still strictly after `now`.
    pub fn active_snooze(
        &self,
        owner_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<NudgeRecord>, EngineError> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, owner_id, nudge_type, sent_at, snoozed_until, muted
                 FROM nudge_log
                 WHERE owner_id = ?1 AND snoozed_until IS NOT NULL AND snoozed_until > ?2
                 ORDER BY snoozed_until DESC LIMIT 1",
                params![owner_id, ts_to_sql(now)],
                row_to_nudge_record,
            )
            .optional()?)
    }

    /// Count of sent-nudge rows since `since`, excluding bookkeeping rows
    /// (mute/snooze events and the reserved `all` type).
    pub fn count_sent_since(
        &self,
        owner_id: &str,
        since: DateTime<Utc>,
    ) -> Result<u32, EngineError> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM nudge_log
             WHERE owner_id = ?1 AND nudge_type != 'all' AND sent_at >= ?2
               AND muted = 0 AND snoozed_until IS NULL",
            params![owner_id, ts_to_sql(since)],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Count of sent-nudge rows of `nudge_type` since `since`.
    pub fn count_type_sent_since(
        &self,
        owner_id: &str,
        nudge_type: &str,
        since: DateTime<Utc>,
    ) -> Result<u32, EngineError> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM nudge_log
             WHERE owner_id = ?1 AND nudge_type = ?2 AND sent_at >= ?3
               AND muted = 0 AND snoozed_until IS NULL",
            params![owner_id, nudge_type, ts_to_sql(since)],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Delete all mute rows for `owner_id`; this is what unmute means,
    /// there is no unmute row type. Returns rows removed.
    pub fn delete_mutes(&self, owner_id: &str) -> Result<usize, EngineError> {
        let changed = self.conn.execute(
            "DELETE FROM nudge_log WHERE owner_id = ?1 AND muted = 1",
            params![owner_id],
        )?;
        Ok(changed)
    }

    /// Recent ledger rows for `owner_id`, newest first.
    pub fn query_nudge_records(
        &self,
        owner_id: &str,
        limit: u32,
    ) -> Result<Vec<NudgeRecord>, EngineError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, owner_id, nudge_type, sent_at, snoozed_until, muted
             FROM nudge_log WHERE owner_id = ?1
             ORDER BY sent_at DESC, id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![owner_id, limit as i64], row_to_nudge_record)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // ---- overview & export ----

    /// Headline stats over the whole dataset, with trailing-window counts
    /// relative to `now`.
    pub fn overview_stats(
        &self,
        owner_id: &str,
        now: DateTime<Utc>,
    ) -> Result<OverviewStats, EngineError> {
        let total_entries: u32 =
            self.conn
                .query_row("SELECT COUNT(*) FROM log_entries", [], |row| row.get(0))?;
        let summary_days: u32 =
            self.conn
                .query_row("SELECT COUNT(*) FROM daily_summary", [], |row| row.get(0))?;
        let active_goals: u32 = self.conn.query_row(
            "SELECT COUNT(*) FROM goals WHERE owner_id = ?1 AND active = 1",
            params![owner_id],
            |row| row.get(0),
        )?;

        let month_start = now - chrono::Duration::days(30);
        let mut stmt = self.conn.prepare(
            "SELECT category, COUNT(*) FROM log_entries
             WHERE logged_at >= ?1
             GROUP BY category ORDER BY COUNT(*) DESC, category",
        )?;
        let categories = stmt
            .query_map(params![ts_to_sql(month_start)], |row| {
                let category: String = row.get(0)?;
                Ok(CategoryCount {
                    category: LogCategory::from(category.as_str()),
                    count: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let week_start = now - chrono::Duration::days(7);
        let this_week_entries: u32 = self.conn.query_row(
            "SELECT COUNT(*) FROM log_entries WHERE logged_at >= ?1",
            params![ts_to_sql(week_start)],
            |row| row.get(0),
        )?;

        Ok(OverviewStats {
            total_entries,
            summary_days,
            active_goals,
            categories,
            this_week_entries,
        })
    }

    /// Everything the engine owns, as one serializable snapshot.
    pub fn export_snapshot(&self, owner_id: &str) -> Result<ExportSnapshot, EngineError> {
        let log_entries = self.query_log_entries(&LogFilter::default())?;
        let mut stmt = self.conn.prepare(
            "SELECT date, sleep_score, readiness_score, activity_score, hrv_average,
                    resting_hr, total_sleep_minutes, deep_sleep_minutes, rem_sleep_minutes,
                    steps, active_calories, bedtime_start, bedtime_end
             FROM daily_summary ORDER BY date ASC",
        )?;
        let daily_summaries = stmt
            .query_map([], row_to_summary)?
            .collect::<Result<Vec<_>, _>>()?;
        let goals = self.list_active_goals(owner_id)?;
        Ok(ExportSnapshot {
            log_entries,
            daily_summaries,
            goals,
        })
    }
}

/// UTC instant at 00:00:00 of `date`
pub fn day_start(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

fn ts_to_sql(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

fn ts_from_sql(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn date_from_sql(idx: usize, raw: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn row_to_log_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<LogEntry> {
    let category: String = row.get(1)?;
    let logged_at: String = row.get(6)?;
    Ok(LogEntry {
        id: row.get(0)?,
        category: LogCategory::from(category.as_str()),
        subcategory: row.get(2)?,
        value: row.get(3)?,
        unit: row.get(4)?,
        notes: row.get(5)?,
        logged_at: ts_from_sql(6, &logged_at)?,
    })
}

fn row_to_summary(row: &rusqlite::Row<'_>) -> rusqlite::Result<DailySummary> {
    let date: String = row.get(0)?;
    Ok(DailySummary {
        date: date_from_sql(0, &date)?,
        sleep_score: row.get(1)?,
        readiness_score: row.get(2)?,
        activity_score: row.get(3)?,
        hrv_average: row.get(4)?,
        resting_hr: row.get(5)?,
        total_sleep_minutes: row.get(6)?,
        deep_sleep_minutes: row.get(7)?,
        rem_sleep_minutes: row.get(8)?,
        steps: row.get(9)?,
        active_calories: row.get(10)?,
        bedtime_start: row.get(11)?,
        bedtime_end: row.get(12)?,
    })
}

fn row_to_goal(row: &rusqlite::Row<'_>) -> rusqlite::Result<Goal> {
    let goal_type: String = row.get(2)?;
    let created_at: String = row.get(5)?;
    let updated_at: String = row.get(6)?;
    Ok(Goal {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        goal_type: GoalType::from(goal_type.as_str()),
        target_value: row.get(3)?,
        active: row.get::<_, i64>(4)? != 0,
        created_at: ts_from_sql(5, &created_at)?,
        updated_at: ts_from_sql(6, &updated_at)?,
    })
}

fn row_to_nudge_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<NudgeRecord> {
    let sent_at: String = row.get(3)?;
    let snoozed_until: Option<String> = row.get(4)?;
    Ok(NudgeRecord {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        nudge_type: row.get(2)?,
        sent_at: ts_from_sql(3, &sent_at)?,
        snoozed_until: match snoozed_until {
            Some(raw) => Some(ts_from_sql(4, &raw)?),
            None => None,
        },
        muted: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 15, 0, 0).unwrap()
    }

    fn entry(category: LogCategory, at: DateTime<Utc>) -> NewLogEntry {
        NewLogEntry::new(category, at)
    }

    #[test]
    fn test_append_and_query_entries() {
        let store = Store::open_memory().unwrap();
        let id = store
            .append_log_entry(&NewLogEntry {
                value: Some(45.0),
                unit: Some("minutes".to_string()),
                subcategory: Some("HIIT".to_string()),
                ..entry(LogCategory::Exercise, now())
            })
            .unwrap();
        assert_eq!(id, 1);

        let all = store.query_log_entries(&LogFilter::default()).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].category, LogCategory::Exercise);
        assert_eq!(all[0].subcategory.as_deref(), Some("HIIT"));
        assert_eq!(all[0].value, Some(45.0));
        assert_eq!(all[0].logged_at, now());
    }

    #[test]
    fn test_filter_by_category_and_window() {
        let store = Store::open_memory().unwrap();
        store
            .append_log_entry(&entry(LogCategory::Stress, now()))
            .unwrap();
        store
            .append_log_entry(&entry(
                LogCategory::Exercise,
                now() - chrono::Duration::days(10),
            ))
            .unwrap();

        let stress = store
            .query_log_entries(&LogFilter::category_since(
                LogCategory::Stress,
                now() - chrono::Duration::days(7),
            ))
            .unwrap();
        assert_eq!(stress.len(), 1);

        let recent = store
            .query_log_entries(&LogFilter::since(now() - chrono::Duration::days(7)))
            .unwrap();
        assert_eq!(recent.len(), 1);
    }

    #[test]
    fn test_upsert_summary_is_last_write_wins() {
        let store = Store::open_memory().unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();

        let mut summary = DailySummary::new(date);
        summary.sleep_score = Some(70);
        store.upsert_daily_summary(&summary, now()).unwrap();

        summary.sleep_score = Some(82);
        summary.steps = Some(9000);
        store.upsert_daily_summary(&summary, now()).unwrap();

        let rows = store.query_daily_summaries(date, date).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].sleep_score, Some(82));
        assert_eq!(rows[0].steps, Some(9000));
    }

    #[test]
    fn test_set_goal_supersedes_prior_active() {
        let store = Store::open_memory().unwrap();
        store
            .set_goal("user-1", &GoalType::DailySteps, "8000", now())
            .unwrap();
        store
            .set_goal("user-1", &GoalType::DailySteps, "10000", now())
            .unwrap();

        let active = store.list_active_goals("user-1").unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].target_value, "10000");
    }

    #[test]
    fn test_update_missing_goal_is_zero_rows() {
        let store = Store::open_memory().unwrap();
        let changed = store
            .update_goal("user-1", &GoalType::Bedtime, "23:00", now())
            .unwrap();
        assert_eq!(changed, 0);

        let changed = store
            .deactivate_goal("user-1", &GoalType::Bedtime, now())
            .unwrap();
        assert_eq!(changed, 0);
    }

    #[test]
    fn test_set_goal_rejects_empty_target() {
        let store = Store::open_memory().unwrap();
        let result = store.set_goal("user-1", &GoalType::DailySteps, "  ", now());
        assert!(matches!(result, Err(EngineError::InvalidParameter(_))));
    }

    #[test]
    fn test_delete_last_entry() {
        let store = Store::open_memory().unwrap();
        assert!(store.delete_last_entry().unwrap().is_none());

        store
            .append_log_entry(&entry(
                LogCategory::Alcohol,
                now() - chrono::Duration::hours(2),
            ))
            .unwrap();
        store
            .append_log_entry(&entry(LogCategory::Reading, now()))
            .unwrap();

        let deleted = store.delete_last_entry().unwrap().unwrap();
        assert_eq!(deleted.category, LogCategory::Reading);
        assert_eq!(
            store.query_log_entries(&LogFilter::default()).unwrap().len(),
            1
        );
    }

    #[test]
    fn test_nudge_ledger_counts_exclude_bookkeeping() {
        let store = Store::open_memory().unwrap();
        let day = day_start(now().date_naive());

        store
            .append_nudge_record("user-1", "morning_readiness", now(), None, false)
            .unwrap();
        // bookkeeping rows must not count toward the daily cap
        store
            .append_nudge_record("user-1", "all", now(), None, true)
            .unwrap();
        store
            .append_nudge_record(
                "user-1",
                "all",
                now(),
                Some(now() + chrono::Duration::hours(4)),
                false,
            )
            .unwrap();

        assert_eq!(store.count_sent_since("user-1", day).unwrap(), 1);
        assert_eq!(
            store
                .count_type_sent_since("user-1", "morning_readiness", day)
                .unwrap(),
            1
        );
        assert_eq!(
            store
                .count_type_sent_since("user-1", "afternoon_movement", day)
                .unwrap(),
            0
        );
    }

    #[test]
    fn test_unmute_deletes_mute_rows() {
        let store = Store::open_memory().unwrap();
        store
            .append_nudge_record("user-1", "all", now(), None, true)
            .unwrap();
        assert!(store.latest_mute("user-1").unwrap().is_some());

        let removed = store.delete_mutes("user-1").unwrap();
        assert_eq!(removed, 1);
        assert!(store.latest_mute("user-1").unwrap().is_none());
    }

    #[test]
    fn test_overview_stats() {
        let store = Store::open_memory().unwrap();
        store
            .append_log_entry(&entry(LogCategory::Exercise, now()))
            .unwrap();
        store
            .append_log_entry(&entry(
                LogCategory::Exercise,
                now() - chrono::Duration::days(2),
            ))
            .unwrap();
        store
            .append_log_entry(&entry(
                LogCategory::Stress,
                now() - chrono::Duration::days(20),
            ))
            .unwrap();
        store
            .set_goal("user-1", &GoalType::DailySteps, "10000", now())
            .unwrap();

        let stats = store.overview_stats("user-1", now()).unwrap();
        assert_eq!(stats.total_entries, 3);
        assert_eq!(stats.active_goals, 1);
        assert_eq!(stats.this_week_entries, 2);
        assert_eq!(stats.categories[0].category, LogCategory::Exercise);
        assert_eq!(stats.categories[0].count, 2);
    }
}
