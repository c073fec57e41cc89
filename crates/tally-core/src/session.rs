//! Session records.
//!
//! One [`SessionRecord`] per boot. Its `run_seconds` grows while the device
//! is up; `acked_run_seconds` trails it and only moves when the collector
//! confirms a delivery.

use serde::{Deserialize, Serialize};

use crate::clock::WallTime;

/// Lifecycle state of a session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// The session belongs to the current boot and is still accumulating time.
    #[default]
    Open,
    /// The session ended, cleanly or by being found stale on the next boot.
    Closed,
}

impl SessionStatus {
    /// Wire spelling.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

/// One contiguous device-uptime interval.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Wall-clock time the session was created.
    pub start: WallTime,
    /// Elapsed up time for this boot, in seconds.
    #[serde(default)]
    pub run_seconds: u64,
    /// Highest `run_seconds` the collector has confirmed.
    #[serde(default)]
    pub acked_run_seconds: u64,
    /// Wall-clock time of the most recent mutation.
    #[serde(default)]
    pub last_update: WallTime,
    /// Lifecycle state.
    #[serde(default)]
    pub status: SessionStatus,
}

impl SessionRecord {
    /// A fresh open session stamped with `now`.
    #[must_use]
    pub fn open(now: WallTime) -> Self {
        Self {
            start: now,
            run_seconds: 0,
            acked_run_seconds: 0,
            last_update: now,
            status: SessionStatus::Open,
        }
    }

    /// Whether the session has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.status == SessionStatus::Closed
    }

    /// Whether the collector has confirmed everything recorded so far.
    #[must_use]
    pub fn is_fully_acked(&self) -> bool {
        self.acked_run_seconds >= self.run_seconds
    }

    /// Whether both timestamps are concrete, which the collector requires.
    #[must_use]
    pub fn has_known_times(&self) -> bool {
        self.start.is_known() && self.last_update.is_known()
    }

    /// Whether there is undelivered run time that may be sent now.
    #[must_use]
    pub fn is_deliverable(&self) -> bool {
        self.has_known_times() && self.run_seconds > self.acked_run_seconds
    }

    /// Whether retention may discard this record.
    #[must_use]
    pub fn is_droppable(&self) -> bool {
        self.is_closed() && self.is_fully_acked()
    }

    /// Record a confirmed delivery of `run_seconds`.
    ///
    /// The ack counter never moves backwards and never passes `run_seconds`.
    pub fn acknowledge(&mut self, run_seconds: u64) {
        let confirmed = run_seconds.min(self.run_seconds);
        if confirmed > self.acked_run_seconds {
            self.acked_run_seconds = confirmed;
        }
    }

    /// Refresh `last_update`. An unknown reading never overwrites a known one.
    pub(crate) fn touch(&mut self, now: WallTime) {
        if now.is_known() {
            self.last_update = now;
        }
    }

    /// Close the record and reopen a one-second delivery gap.
    ///
    /// Dropping the ack counter by one guarantees the `closed` status is sent
    /// at least once even if the last `open` delta for this run length was
    /// already confirmed. The collector is expected to treat a status change
    /// for the same `run_seconds` idempotently.
    pub(crate) fn close_with_redelivery_gap(&mut self) {
        self.status = SessionStatus::Closed;
        self.acked_run_seconds = self.acked_run_seconds.saturating_sub(1);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn known() -> WallTime {
        WallTime::known(Utc.with_ymd_and_hms(2025, 10, 23, 18, 0, 0).unwrap())
    }

    fn record(run: u64, ack: u64, status: SessionStatus) -> SessionRecord {
        SessionRecord {
            start: known(),
            run_seconds: run,
            acked_run_seconds: ack,
            last_update: known(),
            status,
        }
    }

    #[test]
    fn open_record_starts_at_zero() {
        let r = SessionRecord::open(known());
        assert_eq!(r.run_seconds, 0);
        assert_eq!(r.acked_run_seconds, 0);
        assert_eq!(r.status, SessionStatus::Open);
        assert_eq!(r.start, r.last_update);
    }

    #[test]
    fn serde_field_names_match_file_format() {
        let json = serde_json::to_value(record(120, 60, SessionStatus::Closed)).unwrap();
        assert_eq!(json["start"], "2025-10-23T18:00:00Z");
        assert_eq!(json["run_seconds"], 120);
        assert_eq!(json["acked_run_seconds"], 60);
        assert_eq!(json["last_update"], "2025-10-23T18:00:00Z");
        assert_eq!(json["status"], "closed");
    }

    #[test]
    fn missing_fields_take_defaults() {
        let r: SessionRecord = serde_json::from_str(r#"{"start":"(unsynced)"}"#).unwrap();
        assert_eq!(r.start, WallTime::Unknown);
        assert_eq!(r.run_seconds, 0);
        assert_eq!(r.status, SessionStatus::Open);
    }

    #[test]
    fn acknowledge_never_exceeds_run() {
        let mut r = record(50, 0, SessionStatus::Open);
        r.acknowledge(80);
        assert_eq!(r.acked_run_seconds, 50);
    }

    #[test]
    fn acknowledge_never_regresses() {
        let mut r = record(50, 40, SessionStatus::Open);
        r.acknowledge(10);
        assert_eq!(r.acked_run_seconds, 40);
    }

    #[test]
    fn unknown_times_block_delivery() {
        let mut r = record(50, 0, SessionStatus::Open);
        r.last_update = WallTime::Unknown;
        assert!(!r.is_deliverable());
    }

    #[test]
    fn close_reopens_gap() {
        let mut r = record(100, 100, SessionStatus::Open);
        r.close_with_redelivery_gap();
        assert!(r.is_closed());
        assert_eq!(r.acked_run_seconds, 99);
        assert!(r.is_deliverable());
    }

    #[test]
    fn close_with_zero_ack_stays_zero() {
        let mut r = record(0, 0, SessionStatus::Open);
        r.close_with_redelivery_gap();
        assert_eq!(r.acked_run_seconds, 0);
    }

    #[test]
    fn droppable_requires_closed_and_acked() {
        assert!(record(10, 10, SessionStatus::Closed).is_droppable());
        assert!(!record(10, 10, SessionStatus::Open).is_droppable());
        assert!(!record(10, 9, SessionStatus::Closed).is_droppable());
    }

    #[test]
    fn touch_ignores_unknown() {
        let mut r = record(1, 0, SessionStatus::Open);
        r.touch(WallTime::Unknown);
        assert_eq!(r.last_update, known());
    }
}
