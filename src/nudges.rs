//! Rate-limiting gate for proactive nudges
//!
//! A check-then-act state machine over the nudge ledger, evaluated per
//! (owner, nudge type) request. Rules run in strict priority order: muted,
//! snoozed, daily cap, type already sent today. Only the allow path writes
//! to the ledger; every deny is a pure read.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::error::EngineError;
use crate::model::NUDGE_TYPE_ALL;
use crate::store::{day_start, Store};

/// Default nudges allowed per calendar day
pub const DEFAULT_MAX_PER_DAY: u32 = 3;

/// Default snooze duration in hours
pub const DEFAULT_SNOOZE_HOURS: i64 = 4;

/// Why a nudge was denied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    Muted,
    Snoozed,
    RateLimited,
    AlreadySentToday,
}

/// Outcome of a nudge check
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NudgeDecision {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenyReason>,
    /// Present when denied for an active snooze
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snoozed_until: Option<DateTime<Utc>>,
    /// Nudges sent so far today, when the rule consulted the count
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sent_today: Option<u32>,
}

impl NudgeDecision {
    fn allow(sent_today: u32) -> Self {
        Self {
            allowed: true,
            reason: None,
            snoozed_until: None,
            sent_today: Some(sent_today),
        }
    }

    fn deny(reason: DenyReason) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
            snoozed_until: None,
            sent_today: None,
        }
    }
}

/// Store-backed nudge gate.
pub struct NudgeGate<'a> {
    store: &'a Store,
    max_per_day: u32,
}

impl<'a> NudgeGate<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self {
            store,
            max_per_day: DEFAULT_MAX_PER_DAY,
        }
    }

    /// Gate with a custom daily cap
    pub fn with_max_per_day(store: &'a Store, max_per_day: u32) -> Self {
        Self { store, max_per_day }
    }

    /// Check whether a nudge may be sent, capturing the reference instant
    /// at entry.
    pub fn check(&self, owner_id: &str, nudge_type: &str) -> Result<NudgeDecision, EngineError> {
        self.check_at(owner_id, nudge_type, Utc::now())
    }

    /// Check whether a nudge may be sent, relative to `now`.
    ///
    /// An allow appends the ledger row before returning, so the decision is
    /// observably recorded: one allow, one row.
    pub fn check_at(
        &self,
        owner_id: &str,
        nudge_type: &str,
        now: DateTime<Utc>,
    ) -> Result<NudgeDecision, EngineError> {
        if nudge_type == NUDGE_TYPE_ALL {
            return Err(EngineError::InvalidParameter(
                "nudge_type 'all' is reserved for ledger bookkeeping".to_string(),
            ));
        }

        if self.store.latest_mute(owner_id)?.is_some() {
            log::debug!("nudge denied for {owner_id}: muted");
            return Ok(NudgeDecision::deny(DenyReason::Muted));
        }

        if let Some(snooze) = self.store.active_snooze(owner_id, now)? {
            log::debug!("nudge denied for {owner_id}: snoozed");
            return Ok(NudgeDecision {
                snoozed_until: snooze.snoozed_until,
                ..NudgeDecision::deny(DenyReason::Snoozed)
            });
        }

        let today_start = day_start(now.date_naive());
        let sent_today = self.store.count_sent_since(owner_id, today_start)?;
        if sent_today >= self.max_per_day {
            log::debug!("nudge denied for {owner_id}: daily cap of {} reached", self.max_per_day);
            return Ok(NudgeDecision {
                sent_today: Some(sent_today),
                ..NudgeDecision::deny(DenyReason::RateLimited)
            });
        }

        if self
            .store
            .count_type_sent_since(owner_id, nudge_type, today_start)?
            > 0
        {
            log::debug!("nudge denied for {owner_id}: {nudge_type} already sent today");
            return Ok(NudgeDecision::deny(DenyReason::AlreadySentToday));
        }

        self.store
            .append_nudge_record(owner_id, nudge_type, now, None, false)?;
        log::info!("nudge allowed for {owner_id}: {nudge_type}");
        Ok(NudgeDecision::allow(sent_today + 1))
    }

    /// Suppress all nudges for `hours` from `now`.
    pub fn snooze_at(
        &self,
        owner_id: &str,
        hours: i64,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, EngineError> {
        if hours <= 0 {
            return Err(EngineError::InvalidParameter(
                "snooze hours must be positive".to_string(),
            ));
        }
        let until = now + Duration::hours(hours);
        self.store
            .append_nudge_record(owner_id, NUDGE_TYPE_ALL, now, Some(until), false)?;
        log::info!("nudges snoozed for {owner_id} until {until}");
        Ok(until)
    }

    /// Mute all nudges until an explicit unmute.
    pub fn mute_at(&self, owner_id: &str, now: DateTime<Utc>) -> Result<(), EngineError> {
        self.store
            .append_nudge_record(owner_id, NUDGE_TYPE_ALL, now, None, true)?;
        log::info!("nudges muted for {owner_id}");
        Ok(())
    }

    /// Unmute by deleting prior mute rows. Returns how many were removed.
    pub fn unmute(&self, owner_id: &str) -> Result<usize, EngineError> {
        let removed = self.store.delete_mutes(owner_id)?;
        log::info!("nudges unmuted for {owner_id} ({removed} mute rows removed)");
        Ok(removed)
    }
}
