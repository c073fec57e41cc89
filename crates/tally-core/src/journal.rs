//! The session journal and its lifecycle transitions.
//!
//! A [`Journal`] is owned by exactly one driver and mutated in place.
//! Records stay in creation order (oldest first) because that order drives
//! delivery. At most one record is `open`, and it is always the last one.
//!
//! Transitions:
//!
//! | Operation | Effect |
//! |---|---|
//! | [`Journal::on_boot`] | close stale records, append a new open one |
//! | [`Journal::tick`] | set the open record's run length to elapsed boot time |
//! | [`Journal::close_current`] | clean-shutdown close of the open record |
//! | [`Journal::backfill_unsynced`] | replace unknown timestamps once time is trusted |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clock::{ClockSource, WallTime};
use crate::session::{SessionRecord, SessionStatus};

/// Device identity plus the ordered session history.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Journal {
    /// Persisted device identifier. Validated by the identity manager; may be
    /// absent or malformed on disk.
    #[serde(default, alias = "device_id")]
    pub device_uuid: Option<String>,
    /// Sessions in creation order, oldest first.
    #[serde(default)]
    pub sessions: Vec<SessionRecord>,
}

impl Journal {
    /// An empty journal with no identity.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new boot.
    ///
    /// Every record not already closed is closed with a one-second redelivery
    /// gap (see [`SessionRecord`]), then a fresh open record is appended.
    /// Returns how many stale records were recovered.
    pub fn on_boot(&mut self, clock: &impl ClockSource) -> usize {
        let mut recovered = 0;
        for record in self.sessions.iter_mut().filter(|r| !r.is_closed()) {
            record.close_with_redelivery_gap();
            recovered += 1;
        }
        if recovered > 0 {
            warn!(recovered, "closed sessions left open by an unclean shutdown");
        }

        let now = clock.wall_clock_utc();
        self.sessions.push(SessionRecord::open(now));
        info!(start = %now, sessions = self.sessions.len(), "new session");
        recovered
    }

    /// Advance the open record to `elapsed_seconds` since boot.
    ///
    /// The run length never decreases within a boot. Returns `false` when
    /// there is no open record.
    pub fn tick(&mut self, elapsed_seconds: u64, clock: &impl ClockSource) -> bool {
        let now = clock.wall_clock_utc();
        let Some(record) = self.open_session_mut() else {
            return false;
        };
        record.run_seconds = record.run_seconds.max(elapsed_seconds);
        record.touch(now);
        debug!(run_seconds = record.run_seconds, "session tick");
        true
    }

    /// Close the open record on a clean shutdown.
    ///
    /// Applies a final [`Journal::tick`] first so the closing delta carries
    /// the full run length. Returns `false` when nothing was open.
    pub fn close_current(&mut self, elapsed_seconds: u64, clock: &impl ClockSource) -> bool {
        if !self.tick(elapsed_seconds, clock) {
            return false;
        }
        if let Some(record) = self.open_session_mut() {
            record.close_with_redelivery_gap();
            info!(run_seconds = record.run_seconds, "session closed");
        }
        true
    }

    /// Replace every unknown `start` / `last_update` with `now`.
    ///
    /// Called once trusted time first becomes available. Known values are
    /// never overwritten. Returns the number of records touched.
    pub fn backfill_unsynced(&mut self, now: DateTime<Utc>) -> usize {
        let now = WallTime::known(now);
        let mut touched = 0;
        for record in &mut self.sessions {
            let mut changed = false;
            if !record.start.is_known() {
                record.start = now;
                changed = true;
            }
            if !record.last_update.is_known() {
                record.last_update = now;
                changed = true;
            }
            if changed {
                touched += 1;
            }
        }
        if touched > 0 {
            info!(touched, at = %now, "backfilled unsynced timestamps");
        }
        touched
    }

    /// Repair values a hand-edited or older file may carry.
    ///
    /// Clamps ack counters to their run length. Returns how many records were
    /// changed.
    pub fn normalize(&mut self) -> usize {
        let mut fixed = 0;
        for record in &mut self.sessions {
            if record.acked_run_seconds > record.run_seconds {
                record.acked_run_seconds = record.run_seconds;
                fixed += 1;
            }
        }
        if fixed > 0 {
            warn!(fixed, "clamped ack counters above run length");
        }
        fixed
    }

    /// The record belonging to the current boot, if any.
    #[must_use]
    pub fn open_session(&self) -> Option<&SessionRecord> {
        self.sessions
            .last()
            .filter(|r| r.status == SessionStatus::Open)
    }

    fn open_session_mut(&mut self) -> Option<&mut SessionRecord> {
        self.sessions
            .last_mut()
            .filter(|r| r.status == SessionStatus::Open)
    }

    /// Number of records with status `open`.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.sessions.iter().filter(|r| !r.is_closed()).count()
    }

    /// Number of records with undelivered run time, eligible or not.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.sessions.iter().filter(|r| !r.is_fully_acked()).count()
    }

    /// Whether any record still carries an unknown timestamp.
    #[must_use]
    pub fn has_unsynced(&self) -> bool {
        self.sessions.iter().any(|r| !r.has_known_times())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
