#![allow(missing_docs, unused_results)]

//! Journal, store, sync and retention working together.

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use chrono::{DateTime, Utc};
use tally_agent::{Driver, DriverConfig, LinkMonitor};
use tally_core::retention::prune;
use tally_core::{DeviceIdentity, Journal, ManualClock, SessionRecord, SessionStatus, WallTime};
use tally_store::testing::FaultyStorage;
use tally_store::{SaveStage, StateStore, StoreError};
use tally_sync::testing::ScriptedTransport;
use tally_sync::{DeliveryError, SyncConfig, SyncEngine, TransportError};
use tempfile::TempDir;

const URL: &str = "http://collector.test/ingest";

fn ts(secs_after: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_761_242_400 + secs_after, 0).unwrap()
}

fn record(at: i64, run: u64, acked: u64, status: SessionStatus) -> SessionRecord {
    SessionRecord {
        start: WallTime::known(ts(at)),
        run_seconds: run,
        acked_run_seconds: acked,
        last_update: WallTime::known(ts(at + i64::try_from(run).unwrap())),
        status,
    }
}

fn identity() -> DeviceIdentity {
    DeviceIdentity::parse("0b9f3c1e-6a2d-4e8f-9c71-5d3a2b1f0e4c").unwrap()
}

fn engine(transport: &Arc<ScriptedTransport>) -> SyncEngine {
    SyncEngine::new(transport.clone(), SyncConfig::new(URL))
}

fn link() -> LinkMonitor {
    LinkMonitor::host(Duration::from_secs(2), Duration::from_secs(120)).with_jitter(0.0)
}

// ── Scenario A: retention ───────────────────────────────────────────────

#[test]
fn scenario_a_prune_drops_oldest_delivered() {
    let mut journal = Journal::new();
    journal.sessions = vec![
        record(0, 10, 10, SessionStatus::Closed),
        record(100, 20, 20, SessionStatus::Closed),
        record(200, 30, 30, SessionStatus::Closed),
    ];

    let dropped = prune(&mut journal, 2);

    assert_eq!(dropped, 1);
    assert_eq!(journal.sessions.len(), 2);
    assert_eq!(journal.sessions[0].run_seconds, 20);
    assert_eq!(journal.sessions[1].run_seconds, 30);
}

#[tokio::test]
async fn scenario_a_driver_prunes_after_progress() {
    let dir = TempDir::new().unwrap();
    let store = StateStore::open(dir.path().join("sessions.json"));
    let mut seeded = Journal::new();
    seeded.device_uuid = Some(identity().to_string());
    seeded.sessions = vec![
        record(0, 10, 10, SessionStatus::Closed),
        record(100, 20, 20, SessionStatus::Closed),
        record(200, 30, 30, SessionStatus::Closed),
        record(300, 40, 0, SessionStatus::Closed),
    ];
    store.save(&seeded).unwrap();

    let transport = Arc::new(ScriptedTransport::always(200));
    let config = DriverConfig {
        max_sessions: 2,
        ..DriverConfig::default()
    };
    let mut driver =
        Driver::boot(store, ManualClock::at(ts(1_000)), engine(&transport), link(), config);
    let outcome = driver.sync_once().await.unwrap();
    assert_eq!(outcome.delivered, 1);

    let on_disk = driver.store().load();
    assert_eq!(on_disk.sessions.len(), 2);
    assert_eq!(on_disk.sessions[0].run_seconds, 40);
    assert_eq!(on_disk.sessions[1].status, SessionStatus::Open);
}

// ── Scenario B: successful delivery ─────────────────────────────────────

#[tokio::test]
async fn scenario_b_success_acknowledges() {
    let transport = Arc::new(ScriptedTransport::always(200));
    let mut sessions = vec![
        record(0, 100, 100, SessionStatus::Closed),
        record(200, 50, 0, SessionStatus::Open),
    ];

    let outcome = engine(&transport).attempt(&identity(), &mut sessions).await;

    assert!(outcome.made_progress());
    assert_eq!(sessions[1].acked_run_seconds, 50);
    assert_eq!(sessions[0].acked_run_seconds, 100);
    assert_eq!(transport.requests().len(), 1);
}

// ── Scenario C: failed delivery ─────────────────────────────────────────

#[tokio::test]
async fn scenario_c_failure_leaves_journal_unchanged() {
    let transport = Arc::new(ScriptedTransport::new([Ok(500)]));
    let mut sessions = vec![
        record(0, 100, 100, SessionStatus::Closed),
        record(200, 50, 0, SessionStatus::Open),
    ];
    let before = sessions.clone();

    let outcome = engine(&transport).attempt(&identity(), &mut sessions).await;

    assert!(!outcome.made_progress());
    assert_matches!(
        outcome.halted.map(|h| (h.index, h.error)),
        Some((1, DeliveryError::Status(500)))
    );
    assert_eq!(sessions, before);
}

#[tokio::test]
async fn scenario_c_network_error_behaves_the_same() {
    let transport = Arc::new(ScriptedTransport::new([Err(TransportError::Timeout(
        Duration::from_secs(10),
    ))]));
    let mut sessions = vec![record(200, 50, 0, SessionStatus::Open)];
    let before = sessions.clone();

    let outcome = engine(&transport).attempt(&identity(), &mut sessions).await;
    assert!(!outcome.made_progress());
    assert!(outcome.link_failed());
    assert_eq!(sessions, before);
}

// ── Scenario D: interrupted save ────────────────────────────────────────

#[test]
fn scenario_d_interrupted_save_keeps_committed_journal() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sessions.json");
    let store = StateStore::with_storage(FaultyStorage::new(), &path);
    let transport = Arc::new(ScriptedTransport::always(200));
    let clock = ManualClock::at(ts(0));
    let mut driver = Driver::boot(store, clock, engine(&transport), link(), DriverConfig::default());

    driver.clock().advance(Duration::from_secs(60));
    driver.tick().unwrap();
    let committed = StateStore::open(&path).load();
    assert_eq!(committed.sessions[0].run_seconds, 60);

    driver.clock().advance(Duration::from_secs(60));
    driver.store().storage().fail_next(SaveStage::WriteTemp);
    let err = driver.tick().unwrap_err();
    assert_matches!(err, StoreError::Write { stage: SaveStage::WriteTemp, .. });

    // a fresh process sees the last committed journal, not a partial one
    let reloaded = StateStore::open(&path).load();
    assert_eq!(reloaded, committed);

    // and the next periodic save succeeds
    driver.tick().unwrap();
    assert_eq!(StateStore::open(&path).load().sessions[0].run_seconds, 120);
}

#[test]
fn scenario_d_power_loss_before_rename_never_yields_partial_data() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sessions.json");
    let store = StateStore::with_storage(FaultyStorage::new(), &path);

    let mut committed = Journal::new();
    committed.on_boot(&ManualClock::at(ts(0)));
    store.save(&committed).unwrap();

    let mut next = committed.clone();
    next.tick(30, &ManualClock::at(ts(30)));
    for stage in [SaveStage::WriteTemp, SaveStage::RemoveCanonical, SaveStage::Rename] {
        store.storage().fail_next(stage);
        assert!(store.save(&next).is_err());
        let loaded = store.load();
        assert!(loaded == committed || loaded == next, "partial journal after {stage}");
        store.save(&committed).unwrap();
    }
}

// ── Scenario E: unsynced sessions ───────────────────────────────────────

#[tokio::test]
async fn scenario_e_unsynced_record_waits_for_backfill() {
    let transport = Arc::new(ScriptedTransport::always(200));
    let clock = ManualClock::unsynced();
    let mut journal = Journal::new();
    journal.on_boot(&clock);
    journal.tick(40, &clock);

    let engine = engine(&transport);
    let outcome = engine.attempt(&identity(), &mut journal.sessions).await;
    assert_eq!(outcome.skipped_unsynced, 1);
    assert!(!outcome.made_progress());
    assert!(transport.requests().is_empty());

    assert_eq!(journal.backfill_unsynced(ts(500)), 1);
    let outcome = engine.attempt(&identity(), &mut journal.sessions).await;
    assert!(outcome.made_progress());
    assert_eq!(journal.sessions[0].acked_run_seconds, 40);

    let sent = transport.deltas();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].session_start, "2025-10-23T18:08:20Z");
}

// ── Properties across boots ─────────────────────────────────────────────

#[tokio::test]
async fn exactly_one_open_session_after_each_boot() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sessions.json");
    let transport = Arc::new(ScriptedTransport::offline());

    for boot in 1..=4 {
        let clock = ManualClock::at(ts(boot * 1_000));
        let mut driver = Driver::boot(
            StateStore::open(&path),
            clock,
            engine(&transport),
            link(),
            DriverConfig::default(),
        );
        driver.clock().advance(Duration::from_secs(5));
        driver.tick().unwrap();

        let journal = driver.journal();
        assert_eq!(journal.open_count(), 1);
        assert_eq!(journal.sessions.len(), usize::try_from(boot).unwrap());
        assert!(journal.sessions.last().is_some_and(|s| !s.is_closed()));
        assert!(journal.sessions.iter().all(|s| s.acked_run_seconds <= s.run_seconds));
    }
}

#[tokio::test]
async fn crash_then_reboot_redelivers_closed_status() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sessions.json");
    let transport = Arc::new(ScriptedTransport::always(200));

    // first boot: deliver the open run length, then lose power
    let mut first = Driver::boot(
        StateStore::open(&path),
        ManualClock::at(ts(0)),
        engine(&transport),
        link(),
        DriverConfig::default(),
    );
    first.clock().advance(Duration::from_secs(300));
    first.tick().unwrap();
    assert!(first.sync_once().await.unwrap().made_progress());
    drop(first);
    transport.clear();

    // second boot closes the stale session and re-sends it as closed
    let mut second = Driver::boot(
        StateStore::open(&path),
        ManualClock::at(ts(1_000)),
        engine(&transport),
        link(),
        DriverConfig::default(),
    );
    assert_eq!(second.journal().sessions[0].acked_run_seconds, 299);
    let _ = second.sync_once().await.unwrap();

    let sent = transport.deltas();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].status, SessionStatus::Closed);
    assert_eq!(sent[0].run_seconds, 300);
    assert_eq!(second.journal().sessions[0].acked_run_seconds, 300);
}

#[tokio::test]
async fn failure_mid_journal_holds_back_newer_sessions() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sessions.json");
    let mut seeded = Journal::new();
    seeded.device_uuid = Some(identity().to_string());
    seeded.sessions = vec![
        record(0, 10, 0, SessionStatus::Closed),
        record(100, 20, 0, SessionStatus::Closed),
        record(200, 30, 0, SessionStatus::Closed),
    ];
    StateStore::open(&path).save(&seeded).unwrap();

    let transport = Arc::new(ScriptedTransport::new([Ok(200), Ok(503)]));
    let mut driver = Driver::boot(
        StateStore::open(&path),
        ManualClock::at(ts(1_000)),
        engine(&transport),
        link(),
        DriverConfig::default(),
    );
    let outcome = driver.sync_once().await.unwrap();
    assert_eq!(outcome.delivered, 1);

    let acked: Vec<u64> = driver.store().load().sessions.iter().map(|s| s.acked_run_seconds).collect();
    assert_eq!(acked, vec![10, 0, 0, 0]);
}
