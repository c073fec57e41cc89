//! Simulated device for exercising a collector.
//!
//! [`Simulation`] runs a sequence of boots against the real journal, store
//! and sync engine, stepping each boot through device time on a
//! [`ManualClock`]. At every step the link is up or down at random, and
//! [`FlakyTransport`] fails a share of requests with a server error before
//! they reach the network. Undelivered run time stays in the journal and is
//! flushed oldest-first whenever the link allows, the same as on a device.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tally_core::ManualClock;
use tally_core::backoff::{DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY};
use tally_store::StateStore;
use tally_sync::{SyncConfig, SyncEngine, Transport, TransportError};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::driver::{Driver, DriverConfig};
use crate::link::LinkMonitor;

/// Status returned for an injected server failure.
pub const INJECTED_STATUS: u16 = 503;

/// Powered-off time between simulated boots, in seconds.
const GAP_SECS: std::ops::RangeInclusive<u64> = 60..=3_600;

/// A simulation parameter out of range.
#[derive(Debug, Error)]
#[error("invalid simulation {field}: {reason}")]
pub struct SimulationError {
    /// Offending parameter.
    pub field: &'static str,
    /// What is wrong with it.
    pub reason: String,
}

fn invalid(field: &'static str, reason: impl Into<String>) -> SimulationError {
    SimulationError {
        field,
        reason: reason.into(),
    }
}

/// Shape of a simulated run.
#[derive(Clone, Debug)]
pub struct SimulationConfig {
    /// RNG seed; equal seeds give equal session lengths and link patterns.
    pub seed: u64,
    /// Number of boots.
    pub sessions: u32,
    /// Shortest session.
    pub min_session: Duration,
    /// Longest session.
    pub max_session: Duration,
    /// Device time advanced per step.
    pub step: Duration,
    /// Chance the link is down at a step, `0.0..=1.0`.
    pub offline_prob: f64,
    /// Chance a request fails with [`INJECTED_STATUS`], `0.0..=1.0`.
    pub error_prob: f64,
    /// Real time slept after each step.
    pub step_delay: Duration,
    /// Flush attempts without progress before the final drain gives up.
    pub drain_attempts: u32,
    /// Wall-clock time of the first boot.
    pub start: DateTime<Utc>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            sessions: 5,
            min_session: Duration::from_secs(5 * 60),
            max_session: Duration::from_secs(60 * 60),
            step: Duration::from_secs(60),
            offline_prob: 0.2,
            error_prob: 0.1,
            step_delay: Duration::ZERO,
            drain_attempts: 50,
            start: Utc::now() - chrono::Duration::days(1),
        }
    }
}

impl SimulationConfig {
    /// Reject parameters the simulation cannot run with.
    pub fn validate(&self) -> Result<(), SimulationError> {
        if self.sessions == 0 {
            return Err(invalid("sessions", "must be at least 1"));
        }
        if self.min_session.as_secs() == 0 {
            return Err(invalid("min session", "must be at least 1s"));
        }
        if self.min_session > self.max_session {
            return Err(invalid(
                "min session",
                format!("{:?} exceeds max session {:?}", self.min_session, self.max_session),
            ));
        }
        if self.step.as_secs() == 0 {
            return Err(invalid("step", "must be at least 1s"));
        }
        for (field, p) in [("offline probability", self.offline_prob), ("error probability", self.error_prob)] {
            if !(0.0..=1.0).contains(&p) {
                return Err(invalid(field, format!("{p} is outside 0..=1")));
            }
        }
        Ok(())
    }
}

/// What a simulated run did.
#[derive(Clone, Debug, Default, Serialize)]
pub struct SimulationReport {
    /// Identity the simulated device generated.
    pub device_uuid: String,
    /// Seed used.
    pub seed: u64,
    /// Run length of each boot, in seconds.
    pub session_lengths: Vec<u64>,
    /// Steps across all boots.
    pub steps: u64,
    /// Steps spent with the link down.
    pub offline_steps: u64,
    /// Requests failed by injection.
    pub injected_errors: u64,
    /// Flush attempts after the last boot.
    pub drain_attempts: u32,
    /// Records still not fully delivered at the end.
    pub pending: usize,
}

struct Faults {
    rng: StdRng,
    injected: u64,
}

/// [`Transport`] that fails a share of requests before sending them.
pub struct FlakyTransport {
    inner: Arc<dyn Transport>,
    error_prob: f64,
    faults: Mutex<Faults>,
}

impl FlakyTransport {
    /// Wrap `inner`, failing each request with probability `error_prob`.
    pub fn new(inner: Arc<dyn Transport>, error_prob: f64, seed: u64) -> Self {
        Self {
            inner,
            error_prob,
            faults: Mutex::new(Faults {
                rng: StdRng::seed_from_u64(seed),
                injected: 0,
            }),
        }
    }

    /// Requests failed so far.
    pub fn injected(&self) -> u64 {
        self.faults.lock().injected
    }

    fn should_fail(&self) -> bool {
        let mut faults = self.faults.lock();
        let fail = faults.rng.random::<f64>() < self.error_prob;
        if fail {
            faults.injected += 1;
        }
        fail
    }
}

#[async_trait]
impl Transport for FlakyTransport {
    async fn post(
        &self,
        url: &str,
        body: Vec<u8>,
        headers: &[(&str, &str)],
        timeout: Duration,
    ) -> Result<u16, TransportError> {
        if self.should_fail() {
            debug!(url, status = INJECTED_STATUS, "injected server error");
            return Ok(INJECTED_STATUS);
        }
        self.inner.post(url, body, headers, timeout).await
    }
}

/// A simulated device.
pub struct Simulation {
    config: SimulationConfig,
    sync: SyncConfig,
    driver: DriverConfig,
    reconnect: (Duration, Duration),
    transport: Arc<FlakyTransport>,
    online: Arc<AtomicBool>,
    rng: StdRng,
}

impl Simulation {
    /// A device delivering through `transport` with `sync` settings.
    pub fn new(
        config: SimulationConfig,
        sync: SyncConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, SimulationError> {
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(config.seed);
        let transport = Arc::new(FlakyTransport::new(transport, config.error_prob, rng.random()));
        Ok(Self {
            config,
            sync,
            driver: DriverConfig::default(),
            reconnect: (DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY),
            transport,
            online: Arc::new(AtomicBool::new(true)),
            rng,
        })
    }

    /// Use `driver` for retention.
    #[must_use]
    pub fn with_driver_config(mut self, driver: DriverConfig) -> Self {
        self.driver = driver;
        self
    }

    /// Reconnect cooldown bounds after a transport failure.
    #[must_use]
    pub fn with_reconnect(mut self, base: Duration, max: Duration) -> Self {
        self.reconnect = (base, max);
        self
    }

    /// Run every boot against the journal at `state_path`, then flush
    /// what is left with the link held up.
    pub async fn run(mut self, state_path: &Path) -> SimulationReport {
        let mut report = SimulationReport {
            seed: self.config.seed,
            ..SimulationReport::default()
        };
        let mut wall = self.config.start;

        for n in 1..=self.config.sessions {
            let length = self.session_length();
            report.session_lengths.push(length.as_secs());
            info!(session = n, start = %wall, length_secs = length.as_secs(), "simulated boot");

            let mut driver = self.boot(state_path, wall);
            report.device_uuid = driver.identity().to_string();
            self.run_session(&mut driver, length, &mut report).await;
            driver.shutdown().await;

            if n == self.config.sessions {
                self.drain(&mut driver, &mut report).await;
                report.pending = driver.journal().pending_count();
            }

            let gap = self.rng.random_range(GAP_SECS);
            wall += chrono::Duration::seconds(i64::try_from(length.as_secs() + gap).unwrap_or(i64::MAX));
        }

        report.injected_errors = self.transport.injected();
        info!(
            steps = report.steps,
            offline_steps = report.offline_steps,
            injected_errors = report.injected_errors,
            pending = report.pending,
            "simulation finished"
        );
        report
    }

    fn session_length(&mut self) -> Duration {
        let min = self.config.min_session.as_secs();
        let max = self.config.max_session.as_secs();
        Duration::from_secs(self.rng.random_range(min..=max))
    }

    fn boot(&self, state_path: &Path, wall: DateTime<Utc>) -> Driver<ManualClock> {
        let engine = SyncEngine::new(self.transport.clone(), self.sync.clone());
        let signal = Arc::clone(&self.online);
        let (base, max) = self.reconnect;
        let link = LinkMonitor::new(Arc::new(move || signal.load(Ordering::Relaxed)), base, max);
        Driver::boot(
            StateStore::open(state_path),
            ManualClock::at(wall),
            engine,
            link,
            self.driver.clone(),
        )
    }

    async fn run_session(
        &mut self,
        driver: &mut Driver<ManualClock>,
        length: Duration,
        report: &mut SimulationReport,
    ) {
        let mut elapsed = Duration::ZERO;
        while elapsed < length {
            let step = self.config.step.min(length - elapsed);
            driver.clock().advance(step);
            elapsed += step;
            report.steps += 1;

            if let Err(e) = driver.tick() {
                warn!(error = %e, "simulated save failed");
            }

            let online = self.rng.random::<f64>() >= self.config.offline_prob;
            self.online.store(online, Ordering::Relaxed);
            if online {
                let _ = driver.sync_once().await;
            } else {
                report.offline_steps += 1;
                debug!(run_secs = elapsed.as_secs(), "link down");
            }

            if !self.config.step_delay.is_zero() {
                tokio::time::sleep(self.config.step_delay).await;
            }
        }
    }

    async fn drain(&self, driver: &mut Driver<ManualClock>, report: &mut SimulationReport) {
        self.online.store(true, Ordering::Relaxed);
        let mut stalled = 0;
        while driver.journal().pending_count() > 0 && stalled < self.config.drain_attempts {
            report.drain_attempts += 1;
            match driver.sync_once().await {
                Some(outcome) if outcome.made_progress() => stalled = 0,
                _ => stalled += 1,
            }
            if !self.config.step_delay.is_zero() {
                tokio::time::sleep(self.config.step_delay).await;
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
