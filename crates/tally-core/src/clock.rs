//! Clock source capability and the wall-clock value type.
//!
//! Two notions of time are in play:
//!
//! - **Monotonic elapsed time** since boot, always available, used for
//!   `run_seconds`.
//! - **Wall-clock UTC time**, which may be unknown until the host has
//!   acquired network time. [`WallTime::Unknown`] is an explicit variant so
//!   it can never be confused with an empty or unparsable value.

use std::fmt;
use std::time::{Duration, Instant};

use chrono::{DateTime, SubsecRound, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::constants::{DEFAULT_TRUSTED_AFTER_UNIX, LEGACY_UNSYNCED_MARKER, TIMESTAMP_FORMAT};

// ─────────────────────────────────────────────────────────────────────────────
// WallTime
// ─────────────────────────────────────────────────────────────────────────────

/// A wall-clock reading that may not be available yet.
///
/// Serialized as `"YYYY-MM-DDTHH:MM:SSZ"` when known and as `null` when
/// unknown. The legacy `"(unsynced)"` string also reads back as `Unknown`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WallTime {
    /// A trusted UTC timestamp, truncated to whole seconds.
    Known(DateTime<Utc>),
    /// No trusted clock was available.
    #[default]
    Unknown,
}

impl WallTime {
    /// Wrap a timestamp, dropping sub-second precision.
    #[must_use]
    pub fn known(ts: DateTime<Utc>) -> Self {
        Self::Known(ts.trunc_subsecs(0))
    }

    /// Parse an RFC 3339 timestamp.
    pub fn parse(value: &str) -> Result<Self, chrono::ParseError> {
        let parsed = DateTime::parse_from_rfc3339(value)?;
        Ok(Self::known(parsed.with_timezone(&Utc)))
    }

    /// Whether a concrete timestamp is present.
    #[must_use]
    pub fn is_known(&self) -> bool {
        matches!(self, Self::Known(_))
    }

    /// The timestamp, if known.
    #[must_use]
    pub fn as_known(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Known(ts) => Some(*ts),
            Self::Unknown => None,
        }
    }

    /// Wire representation, `None` when unknown.
    #[must_use]
    pub fn to_wire(&self) -> Option<String> {
        self.as_known()
            .map(|ts| ts.format(TIMESTAMP_FORMAT).to_string())
    }
}

impl fmt::Display for WallTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(ts) => write!(f, "{}", ts.format(TIMESTAMP_FORMAT)),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}

impl Serialize for WallTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Known(ts) => serializer.collect_str(&ts.format(TIMESTAMP_FORMAT)),
            Self::Unknown => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for WallTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        match raw.as_deref() {
            None | Some(LEGACY_UNSYNCED_MARKER) => Ok(Self::Unknown),
            Some(value) => Self::parse(value).map_err(|e| {
                serde::de::Error::custom(format!("invalid timestamp {value:?}: {e}"))
            }),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ClockSource capability
// ─────────────────────────────────────────────────────────────────────────────

/// Time as seen by the core.
pub trait ClockSource {
    /// Monotonic time since this process booted.
    fn monotonic_elapsed(&self) -> Duration;

    /// Current UTC time, or [`WallTime::Unknown`] if it cannot be trusted yet.
    fn wall_clock_utc(&self) -> WallTime;
}

/// Host clock: [`Instant`] for elapsed time, [`Utc::now`] for wall time.
///
/// Wall-clock readings earlier than `trusted_after` are reported as
/// unknown, which is how an unset RTC looks before network time arrives.
#[derive(Clone, Debug)]
pub struct SystemClock {
    boot: Instant,
    trusted_after: DateTime<Utc>,
}

impl SystemClock {
    /// Start counting from now, trusting wall time after `trusted_after`.
    pub fn new(trusted_after: DateTime<Utc>) -> Self {
        Self {
            boot: Instant::now(),
            trusted_after,
        }
    }

    /// The instant elapsed time is measured from.
    pub fn boot_instant(&self) -> Instant {
        self.boot
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new(DateTime::from_timestamp(DEFAULT_TRUSTED_AFTER_UNIX, 0).unwrap_or_default())
    }
}

impl ClockSource for SystemClock {
    fn monotonic_elapsed(&self) -> Duration {
        self.boot.elapsed()
    }

    fn wall_clock_utc(&self) -> WallTime {
        let now = Utc::now();
        if now >= self.trusted_after {
            WallTime::known(now)
        } else {
            WallTime::Unknown
        }
    }
}

/// A hand-driven clock for tests and simulations.
#[derive(Debug, Default)]
pub struct ManualClock {
    elapsed: Mutex<Duration>,
    wall: Mutex<WallTime>,
}

impl ManualClock {
    /// A clock at zero elapsed time reading `wall`.
    pub fn new(wall: WallTime) -> Self {
        Self {
            elapsed: Mutex::new(Duration::ZERO),
            wall: Mutex::new(wall),
        }
    }

    /// A clock whose wall time is not known yet.
    pub fn unsynced() -> Self {
        Self::new(WallTime::Unknown)
    }

    /// A clock reading the given UTC time.
    pub fn at(ts: DateTime<Utc>) -> Self {
        Self::new(WallTime::known(ts))
    }

    /// Replace the wall-clock reading.
    pub fn set_wall(&self, wall: WallTime) {
        *self.wall.lock() = wall;
    }

    /// Replace the elapsed time.
    pub fn set_elapsed(&self, elapsed: Duration) {
        *self.elapsed.lock() = elapsed;
    }

    /// Move both clocks forward. Unknown wall time stays unknown.
    pub fn advance(&self, by: Duration) {
        *self.elapsed.lock() += by;
        let mut wall = self.wall.lock();
        if let WallTime::Known(ts) = *wall {
            let step = chrono::Duration::from_std(by).unwrap_or_default();
            *wall = WallTime::known(ts + step);
        }
    }
}

impl ClockSource for ManualClock {
    fn monotonic_elapsed(&self) -> Duration {
        *self.elapsed.lock()
    }

    fn wall_clock_utc(&self) -> WallTime {
        *self.wall.lock()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
