//! Link health with reconnect cooldown.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tally_core::ConnectivitySignal;
use tally_core::backoff::{DEFAULT_JITTER_FACTOR, cooldown_delay};
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Default)]
struct Cooldown {
    failures: u32,
    until: Option<Instant>,
}

/// Wraps a platform connectivity signal with a failure cooldown.
///
/// After a transport-level failure the link reports offline until the
/// cooldown expires; consecutive failures double it up to `max`. The next
/// success resets it.
pub struct LinkMonitor {
    signal: Arc<dyn ConnectivitySignal + Send + Sync>,
    base: Duration,
    max: Duration,
    jitter: f64,
    state: Mutex<Cooldown>,
}

impl LinkMonitor {
    /// Monitor over `signal` with the given cooldown bounds.
    pub fn new(signal: Arc<dyn ConnectivitySignal + Send + Sync>, base: Duration, max: Duration) -> Self {
        Self {
            signal,
            base,
            max,
            jitter: DEFAULT_JITTER_FACTOR,
            state: Mutex::new(Cooldown::default()),
        }
    }

    /// Monitor for a host whose network stack is managed by the OS.
    pub fn host(base: Duration, max: Duration) -> Self {
        Self::new(Arc::new(|| true), base, max)
    }

    /// Override the jitter factor (`0.0` makes cooldowns exact).
    #[must_use]
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    /// Start or extend the cooldown after a link failure.
    pub fn record_failure(&self) -> Duration {
        let mut state = self.state.lock();
        let delay = cooldown_delay(
            state.failures,
            self.base,
            self.max,
            self.jitter,
            rand::random::<f64>(),
        );
        state.failures = state.failures.saturating_add(1);
        state.until = Some(Instant::now() + delay);
        warn!(
            failures = state.failures,
            cooldown_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "link down, cooling off"
        );
        delay
    }

    /// Clear the cooldown after a successful exchange.
    pub fn record_success(&self) {
        let mut state = self.state.lock();
        if state.failures > 0 {
            info!(after_failures = state.failures, "link restored");
        }
        *state = Cooldown::default();
    }

    /// Consecutive failures since the last success.
    pub fn failures(&self) -> u32 {
        self.state.lock().failures
    }
}

impl ConnectivitySignal for LinkMonitor {
    fn is_online(&self) -> bool {
        let cooling = self
            .state
            .lock()
            .until
            .is_some_and(|until| Instant::now() < until);
        !cooling && self.signal.is_online()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
