//! Journal summary for the `status` subcommand.

use std::path::Path;

use serde::Serialize;
use tally_core::{Journal, SessionRecord};

/// What `tally-agent status` prints.
#[derive(Debug, Serialize)]
pub struct StatusReport<'a> {
    /// Journal file.
    pub state_path: String,
    /// Persisted identity, if any.
    pub device_uuid: Option<&'a str>,
    /// Stored sessions.
    pub sessions: usize,
    /// Sessions still open.
    pub open: usize,
    /// Sessions with undelivered run time.
    pub pending: usize,
    /// Run seconds recorded but not yet acknowledged.
    pub unacked_run_seconds: u64,
    /// Sessions waiting for trusted time.
    pub unsynced: usize,
    /// Newest session.
    pub latest: Option<&'a SessionRecord>,
}

impl<'a> StatusReport<'a> {
    /// Summarise `journal` loaded from `state_path`.
    pub fn new(state_path: &Path, journal: &'a Journal) -> Self {
        Self {
            state_path: state_path.display().to_string(),
            device_uuid: journal.device_uuid.as_deref(),
            sessions: journal.sessions.len(),
            open: journal.open_count(),
            pending: journal.pending_count(),
            unacked_run_seconds: journal
                .sessions
                .iter()
                .map(|s| s.run_seconds.saturating_sub(s.acked_run_seconds))
                .sum(),
            unsynced: journal
                .sessions
                .iter()
                .filter(|s| !s.has_known_times())
                .count(),
            latest: journal.sessions.last(),
        }
    }
}
