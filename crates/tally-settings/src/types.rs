//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` and `#[serde(default)]`
//! so a partial JSON file only needs the keys it changes.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tally_core::backoff::{DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY};
use tally_core::constants::{DEFAULT_MAX_SESSIONS, DEFAULT_TRUSTED_AFTER};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// ```json
/// {
///   "state": { "path": "~/.tally/sessions.json", "maxSessions": 200 },
///   "sync": { "ingestUrl": "https://collector.example/ingest" }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TallySettings {
    /// Journal persistence.
    pub state: StateSettings,
    /// Delivery to the collector.
    pub sync: SyncSettings,
    /// Wall-clock trust.
    pub clock: ClockSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl TallySettings {
    /// Reject values the driver cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.state.save_period_secs == 0 {
            return Err(SettingsError::invalid("state.savePeriodSecs", "must be at least 1"));
        }
        if self.state.max_sessions == 0 {
            return Err(SettingsError::invalid("state.maxSessions", "must be at least 1"));
        }
        if self.sync.post_period_secs == 0 {
            return Err(SettingsError::invalid("sync.postPeriodSecs", "must be at least 1"));
        }
        if self.sync.timeout_secs == 0 {
            return Err(SettingsError::invalid("sync.timeoutSecs", "must be at least 1"));
        }
        if self.sync.reconnect_base_secs > self.sync.reconnect_max_secs {
            return Err(SettingsError::invalid(
                "sync.reconnectBaseSecs",
                format!(
                    "{} exceeds sync.reconnectMaxSecs ({})",
                    self.sync.reconnect_base_secs, self.sync.reconnect_max_secs
                ),
            ));
        }
        let _ = self.clock.trusted_after()?;
        Ok(())
    }
}

/// Journal persistence settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StateSettings {
    /// Journal file. A leading `~/` expands to `$HOME`.
    pub path: String,
    /// Seconds between run-length ticks and saves.
    pub save_period_secs: u64,
    /// Retention cap on stored sessions.
    pub max_sessions: usize,
}

impl Default for StateSettings {
    fn default() -> Self {
        Self {
            path: "~/.tally/sessions.json".to_string(),
            save_period_secs: 60,
            max_sessions: DEFAULT_MAX_SESSIONS,
        }
    }
}

impl StateSettings {
    /// Journal path with `~` expanded.
    pub fn resolved_path(&self) -> PathBuf {
        expand_home(&self.path)
    }

    /// Tick and save cadence.
    pub fn save_period(&self) -> Duration {
        Duration::from_secs(self.save_period_secs)
    }
}

/// Delivery settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncSettings {
    /// Collector endpoint.
    pub ingest_url: String,
    /// Optional bearer credential.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<String>,
    /// Seconds between sync attempts while online.
    pub post_period_secs: u64,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// First reconnect cooldown in seconds.
    pub reconnect_base_secs: u64,
    /// Ceiling for the reconnect cooldown in seconds.
    pub reconnect_max_secs: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            ingest_url: "http://127.0.0.1:8080/ingest".to_string(),
            bearer_token: None,
            post_period_secs: 5,
            timeout_secs: 10,
            reconnect_base_secs: DEFAULT_BASE_DELAY.as_secs(),
            reconnect_max_secs: DEFAULT_MAX_DELAY.as_secs(),
        }
    }
}

impl SyncSettings {
    /// Sync cadence.
    pub fn post_period(&self) -> Duration {
        Duration::from_secs(self.post_period_secs)
    }

    /// Per-request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Reconnect cooldown bounds as `(base, max)`.
    pub fn reconnect_bounds(&self) -> (Duration, Duration) {
        (
            Duration::from_secs(self.reconnect_base_secs),
            Duration::from_secs(self.reconnect_max_secs),
        )
    }
}

/// Wall-clock trust settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClockSettings {
    /// Host clock readings before this instant count as unknown.
    pub trusted_after: String,
}

impl Default for ClockSettings {
    fn default() -> Self {
        Self {
            trusted_after: DEFAULT_TRUSTED_AFTER.to_string(),
        }
    }
}

impl ClockSettings {
    /// Parsed trust floor.
    pub fn trusted_after(&self) -> Result<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.trusted_after)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| {
                SettingsError::invalid("clock.trustedAfter", format!("{:?}: {e}", self.trusted_after))
            })
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(rest)
        }
        None => PathBuf::from(path),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
