//! In-memory record of what the collector has accepted.
//!
//! Deliveries are at-least-once, so the ledger drops repeats. Each session
//! keeps only its high-water mark: the largest `run_seconds` seen and whether
//! it has been `closed`. A delta that raises neither is a repeat. This covers
//! a plain re-send of the same `msg_id` and also stale deltas that arrive out
//! of order, while memory stays at one entry per session. A `closed` delta
//! for an already seen run length still lands: the device re-sends its final
//! run length with `closed` after a restart, under the `msg_id` it already
//! used for `open`.
//!
//! Sessions are keyed by `(device_uuid, session_start)`. A device that booted
//! without a wall clock backfills every unsynced session with the same "now"
//! once time arrives, so two such boots share a start and show up here as a
//! single session carrying the larger run length.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use serde::Serialize;
use tally_core::SessionStatus;
use tally_sync::SessionDelta;

/// Whether a delta changed the ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Receipt {
    /// Raised the session's run length or closed it.
    Accepted,
    /// At or below what is already recorded; nothing changed.
    Duplicate,
}

/// Latest known state of one device session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SessionView {
    /// Reporting device.
    pub device_uuid: String,
    /// Session start, UTC.
    pub session_start: String,
    /// Highest run length received.
    pub run_seconds: u64,
    /// `last_update` of the delta that set `run_seconds`.
    pub last_update: String,
    /// Latest status.
    pub status: SessionStatus,
}

/// Aggregate counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LedgerStats {
    /// Deltas accepted.
    pub accepted: u64,
    /// Deltas dropped as repeats or stale.
    pub duplicates: u64,
    /// Distinct sessions seen.
    pub sessions: usize,
    /// Distinct devices seen.
    pub devices: usize,
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<(String, String), SessionView>,
    stats: LedgerStats,
}

impl SessionView {
    fn from_delta(delta: &SessionDelta) -> Self {
        Self {
            device_uuid: delta.device_uuid.clone(),
            session_start: delta.session_start.clone(),
            run_seconds: delta.run_seconds,
            last_update: delta.last_update.clone(),
            status: delta.status,
        }
    }

    /// Fold `delta` in; `false` if it raised nothing.
    fn apply(&mut self, delta: &SessionDelta) -> bool {
        let mut changed = false;
        if delta.run_seconds > self.run_seconds {
            self.run_seconds = delta.run_seconds;
            self.last_update.clone_from(&delta.last_update);
            changed = true;
        }
        if delta.status == SessionStatus::Closed && self.status != SessionStatus::Closed {
            self.status = SessionStatus::Closed;
            changed = true;
        }
        changed
    }
}

/// Thread-safe collector ledger.
#[derive(Default)]
pub struct Ledger {
    inner: Mutex<Inner>,
}

impl Ledger {
    /// Empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `delta`, dropping it if it changes nothing.
    ///
    /// A session's run length never moves backwards, and once `closed` it
    /// stays closed, whatever order deltas arrive in.
    pub fn record(&self, delta: &SessionDelta) -> Receipt {
        let mut inner = self.inner.lock();
        let key = (delta.device_uuid.clone(), delta.session_start.clone());
        let changed = match inner.sessions.entry(key) {
            Entry::Occupied(mut view) => view.get_mut().apply(delta),
            Entry::Vacant(slot) => {
                let _ = slot.insert(SessionView::from_delta(delta));
                true
            }
        };
        if !changed {
            inner.stats.duplicates += 1;
            return Receipt::Duplicate;
        }
        inner.stats.accepted += 1;

        let sessions = inner.sessions.len();
        let devices = inner
            .sessions
            .keys()
            .map(|(device, _)| device.as_str())
            .collect::<HashSet<_>>()
            .len();
        inner.stats.sessions = sessions;
        inner.stats.devices = devices;
        Receipt::Accepted
    }

    /// Latest state of one session.
    pub fn session(&self, device_uuid: &str, session_start: &str) -> Option<SessionView> {
        self.inner
            .lock()
            .sessions
            .get(&(device_uuid.to_owned(), session_start.to_owned()))
            .cloned()
    }

    /// Every known session, ordered by device then start.
    pub fn sessions(&self) -> Vec<SessionView> {
        let mut all: Vec<SessionView> = self.inner.lock().sessions.values().cloned().collect();
        all.sort_by(|a, b| {
            (a.device_uuid.as_str(), a.session_start.as_str())
                .cmp(&(b.device_uuid.as_str(), b.session_start.as_str()))
        });
        all
    }

    /// Current counters.
    pub fn stats(&self) -> LedgerStats {
        self.inner.lock().stats
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const DEVICE: &str = "0b9f3c1e-6a2d-4e8f-9c71-5d3a2b1f0e4c";
    const START: &str = "2025-10-23T18:00:00Z";

    fn delta(run: u64, status: SessionStatus) -> SessionDelta {
        SessionDelta {
            device_uuid: DEVICE.into(),
            session_start: START.into(),
            run_seconds: run,
            last_update: format!("run-{run}"),
            status,
            msg_id: format!("{DEVICE}:{START}:{run}"),
        }
    }

    #[test]
    fn repeat_is_duplicate() {
        let ledger = Ledger::new();
        assert_eq!(ledger.record(&delta(60, SessionStatus::Open)), Receipt::Accepted);
        assert_eq!(ledger.record(&delta(60, SessionStatus::Open)), Receipt::Duplicate);
        let stats = ledger.stats();
        assert_eq!(stats.accepted, 1);
        assert_eq!(stats.duplicates, 1);
        assert_eq!(stats.sessions, 1);
        assert_eq!(stats.devices, 1);
    }

    #[test]
    fn closed_status_for_seen_run_length_is_applied() {
        let ledger = Ledger::new();
        let _ = ledger.record(&delta(60, SessionStatus::Open));
        assert_eq!(ledger.record(&delta(60, SessionStatus::Closed)), Receipt::Accepted);

        let view = ledger.session(DEVICE, START).unwrap();
        assert_eq!(view.status, SessionStatus::Closed);
        assert_eq!(view.run_seconds, 60);
    }

    #[test]
    fn repeated_closed_is_duplicate() {
        let ledger = Ledger::new();
        let _ = ledger.record(&delta(60, SessionStatus::Open));
        let _ = ledger.record(&delta(60, SessionStatus::Closed));
        assert_eq!(ledger.record(&delta(60, SessionStatus::Closed)), Receipt::Duplicate);
        assert_eq!(ledger.stats().accepted, 2);
    }

    #[test]
    fn run_length_never_regresses() {
        let ledger = Ledger::new();
        let _ = ledger.record(&delta(120, SessionStatus::Open));
        assert_eq!(ledger.record(&delta(60, SessionStatus::Open)), Receipt::Duplicate);
        let view = ledger.session(DEVICE, START).unwrap();
        assert_eq!(view.run_seconds, 120);
        assert_eq!(view.last_update, "run-120");
    }

    #[test]
    fn memory_is_one_entry_per_session() {
        let ledger = Ledger::new();
        for run in 1..=500 {
            let _ = ledger.record(&delta(run, SessionStatus::Open));
        }
        let _ = ledger.record(&delta(500, SessionStatus::Closed));

        assert_eq!(ledger.inner.lock().sessions.len(), 1);
        let stats = ledger.stats();
        assert_eq!(stats.accepted, 501);
        assert_eq!(stats.duplicates, 0);
        let view = ledger.session(DEVICE, START).unwrap();
        assert_eq!((view.run_seconds, view.status), (500, SessionStatus::Closed));
    }

    #[test]
    fn shared_start_after_backfill_merges_sessions() {
        let ledger = Ledger::new();
        let _ = ledger.record(&delta(40, SessionStatus::Closed));
        let _ = ledger.record(&delta(25, SessionStatus::Open));

        assert_eq!(ledger.stats().sessions, 1);
        assert_eq!(ledger.session(DEVICE, START).unwrap().run_seconds, 40);
    }

    #[test]
    fn closed_is_sticky() {
        let ledger = Ledger::new();
        let _ = ledger.record(&delta(60, SessionStatus::Closed));
        let _ = ledger.record(&delta(90, SessionStatus::Open));
        assert_eq!(ledger.session(DEVICE, START).unwrap().status, SessionStatus::Closed);
    }

    #[test]
    fn sessions_are_sorted() {
        let ledger = Ledger::new();
        let mut later = delta(5, SessionStatus::Open);
        later.session_start = "2025-10-24T00:00:00Z".into();
        later.msg_id = "x".into();
        let _ = ledger.record(&later);
        let _ = ledger.record(&delta(5, SessionStatus::Open));

        let all = ledger.sessions();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].session_start, START);
    }
}
