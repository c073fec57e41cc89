#![allow(missing_docs, unused_results)]

//! Simulated device against a live collector.

use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use tally_agent::{Simulation, SimulationConfig};
use tally_core::SessionStatus;
use tally_ingest::{IngestConfig, IngestServer};
use tally_sync::{ReqwestTransport, SyncConfig};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn every_simulated_session_reaches_the_collector_closed() {
    let dir = TempDir::new().unwrap();
    let server = IngestServer::new(IngestConfig {
        port: 0,
        ..IngestConfig::default()
    });
    let shutdown = CancellationToken::new();
    let handle = server.start(shutdown.clone()).await.unwrap();

    let config = SimulationConfig {
        seed: 2025,
        sessions: 4,
        min_session: Duration::from_secs(300),
        max_session: Duration::from_secs(900),
        offline_prob: 0.3,
        error_prob: 0.2,
        start: DateTime::from_timestamp(1_761_242_400, 0).unwrap(),
        ..SimulationConfig::default()
    };
    let mut sync = SyncConfig::new(handle.ingest_url());
    sync.timeout = Duration::from_secs(5);
    let simulation = Simulation::new(config, sync, Arc::new(ReqwestTransport::new())).unwrap();

    let report = simulation.run(&dir.path().join("sessions.json")).await;

    assert_eq!(report.pending, 0);
    let sessions = server.ledger().sessions();
    assert_eq!(sessions.len(), 4);
    assert!(sessions.iter().all(|s| s.device_uuid == report.device_uuid));
    assert!(sessions.iter().all(|s| s.status == SessionStatus::Closed));
    let lengths: Vec<u64> = sessions.iter().map(|s| s.run_seconds).collect();
    assert_eq!(lengths, report.session_lengths);

    shutdown.cancel();
    handle.join().await;
}

#[tokio::test]
async fn clean_link_sends_each_run_length_once() {
    let dir = TempDir::new().unwrap();
    let server = IngestServer::new(IngestConfig {
        port: 0,
        ..IngestConfig::default()
    });
    let shutdown = CancellationToken::new();
    let handle = server.start(shutdown.clone()).await.unwrap();

    let config = SimulationConfig {
        seed: 99,
        sessions: 2,
        min_session: Duration::from_secs(120),
        max_session: Duration::from_secs(240),
        offline_prob: 0.0,
        error_prob: 0.0,
        start: DateTime::from_timestamp(1_761_242_400, 0).unwrap(),
        ..SimulationConfig::default()
    };
    let sync = SyncConfig::new(handle.ingest_url());
    let report = Simulation::new(config, sync, Arc::new(ReqwestTransport::new()))
        .unwrap()
        .run(&dir.path().join("sessions.json"))
        .await;

    // one delta per step plus one closing delta per session, none repeated
    let stats = server.ledger().stats();
    assert_eq!(stats.accepted, report.steps + 2);
    assert_eq!(stats.duplicates, 0);
    assert_eq!(stats.sessions, 2);
    assert_eq!(stats.devices, 1);

    shutdown.cancel();
    handle.join().await;
}
