//! The driver loop.
//!
//! [`Driver`] owns the journal and wires the core together: ticks and saves
//! on one timer, delivery attempts on another, and a final close, save and
//! sync when the shutdown token fires. It is the journal's only writer.

use std::time::Duration;

use tally_core::retention::prune;
use tally_core::{ClockSource, ConnectivitySignal, DeviceIdentity, Journal};
use tally_settings::TallySettings;
use tally_store::{FsStorage, StateStore, Storage, StoreError, ensure_identity, get_or_create};
use tally_sync::{SyncEngine, SyncOutcome};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::link::LinkMonitor;

/// Timer cadence and retention cap.
#[derive(Clone, Debug)]
pub struct DriverConfig {
    /// Tick and save cadence.
    pub save_period: Duration,
    /// Delivery attempt cadence.
    pub post_period: Duration,
    /// Retention cap.
    pub max_sessions: usize,
}

impl DriverConfig {
    /// Cadence and cap from loaded settings.
    pub fn from_settings(settings: &TallySettings) -> Self {
        Self {
            save_period: settings.state.save_period(),
            post_period: settings.sync.post_period(),
            max_sessions: settings.state.max_sessions,
        }
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self::from_settings(&TallySettings::default())
    }
}

/// Owns the journal for one boot.
pub struct Driver<C: ClockSource, S: Storage = FsStorage> {
    journal: Journal,
    identity: DeviceIdentity,
    store: StateStore<S>,
    clock: C,
    engine: SyncEngine,
    link: LinkMonitor,
    config: DriverConfig,
}

impl<C: ClockSource, S: Storage> Driver<C, S> {
    /// Load the journal, settle the device identity and start a new session.
    ///
    /// Save failures here are logged, not returned: the journal is still
    /// usable in memory and the next tick retries the write.
    pub fn boot(
        store: StateStore<S>,
        clock: C,
        engine: SyncEngine,
        link: LinkMonitor,
        config: DriverConfig,
    ) -> Self {
        let mut journal = store.load();
        let identity = get_or_create(&store, &mut journal).unwrap_or_else(|e| {
            warn!(error = %e, "could not persist device identity, continuing");
            // the fresh value is already on the journal
            ensure_identity(&mut journal).0
        });

        let _ = journal.on_boot(&clock);
        let mut driver = Self {
            journal,
            identity,
            store,
            clock,
            engine,
            link,
            config,
        };
        let _ = driver.backfill_if_synced();
        driver.persist();
        info!(
            device_uuid = %driver.identity,
            sessions = driver.journal.sessions.len(),
            pending = driver.journal.pending_count(),
            "booted"
        );
        driver
    }

    /// The in-memory journal.
    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    /// This device's identity.
    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    /// The backing store.
    pub fn store(&self) -> &StateStore<S> {
        &self.store
    }

    /// The clock in use.
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// The link monitor in use.
    pub fn link(&self) -> &LinkMonitor {
        &self.link
    }

    /// Record elapsed run time and save.
    pub fn tick(&mut self) -> Result<(), StoreError> {
        let elapsed = self.clock.monotonic_elapsed().as_secs();
        let _ = self.journal.tick(elapsed, &self.clock);
        let _ = self.backfill_if_synced();
        self.store.save(&self.journal)
    }

    /// One delivery attempt, if the link is up.
    ///
    /// Returns `None` when offline. After progress the journal is pruned
    /// and saved at once so acknowledgements survive a power cut.
    pub async fn sync_once(&mut self) -> Option<SyncOutcome> {
        if !self.link.is_online() {
            debug!("offline, skipping sync");
            return None;
        }
        if self.backfill_if_synced() {
            self.persist();
        }

        let outcome = self
            .engine
            .attempt(&self.identity, &mut self.journal.sessions)
            .await;

        if outcome.link_failed() {
            let _ = self.link.record_failure();
        } else {
            self.link.record_success();
        }

        if outcome.made_progress() {
            let dropped = prune(&mut self.journal, self.config.max_sessions);
            debug!(
                delivered = outcome.delivered,
                dropped,
                pending = self.journal.pending_count(),
                "sync progress"
            );
            self.persist();
        }
        Some(outcome)
    }

    /// Close the current session, save, and make a last delivery attempt.
    pub async fn shutdown(&mut self) {
        let elapsed = self.clock.monotonic_elapsed().as_secs();
        let _ = self.journal.close_current(elapsed, &self.clock);
        self.persist();
        let _ = self.sync_once().await;
        info!(pending = self.journal.pending_count(), "shut down");
    }

    /// Run until `shutdown` is cancelled, then close out via [`Driver::shutdown`].
    pub async fn run(&mut self, shutdown: CancellationToken) {
        let mut tick_timer = tokio::time::interval(self.config.save_period);
        let mut sync_timer = tokio::time::interval(self.config.post_period);
        tick_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        sync_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                _ = tick_timer.tick() => {
                    if let Err(e) = self.tick() {
                        warn!(error = %e, "periodic save failed");
                    }
                }
                _ = sync_timer.tick() => {
                    let _ = self.sync_once().await;
                }
            }
        }

        self.shutdown().await;
    }

    fn backfill_if_synced(&mut self) -> bool {
        if !self.journal.has_unsynced() {
            return false;
        }
        match self.clock.wall_clock_utc().as_known() {
            Some(now) => self.journal.backfill_unsynced(now) > 0,
            None => false,
        }
    }

    fn persist(&self) {
        if let Err(e) = self.store.save(&self.journal) {
            warn!(error = %e, "failed to save journal");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
