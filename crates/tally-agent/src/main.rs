//! # tally-agent
//!
//! Records device uptime sessions and forwards them to a collector.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tally_agent::{
    Driver, DriverConfig, LinkMonitor, Simulation, SimulationConfig, StatusReport,
};
use tally_core::SystemClock;
use tally_ingest::{IngestConfig, IngestServer};
use tally_settings::TallySettings;
use tally_store::StateStore;
use tally_sync::{ReqwestTransport, SyncConfig, SyncEngine};
use tokio_util::sync::CancellationToken;

/// Device uptime recorder.
#[derive(Parser, Debug)]
#[command(name = "tally-agent", about = "Device uptime recorder with store-and-forward sync")]
struct Cli {
    /// Settings file (defaults to `~/.tally/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Record sessions and deliver them until interrupted.
    Run {
        /// Journal file (overrides settings).
        #[arg(long)]
        state_path: Option<PathBuf>,
        /// Collector endpoint (overrides settings).
        #[arg(long)]
        ingest_url: Option<String>,
    },
    /// Print a summary of the journal as JSON.
    Status {
        /// Journal file (overrides settings).
        #[arg(long)]
        state_path: Option<PathBuf>,
    },
    /// Replay random boots against a collector with a flaky link.
    Simulate(SimulateArgs),
    /// Run the reference collector.
    Ingest {
        /// Host to bind.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        /// Port to bind.
        #[arg(long, default_value = "8080")]
        port: u16,
        /// Require this bearer token.
        #[arg(long)]
        token: Option<String>,
    },
}

#[derive(clap::Args, Debug)]
struct SimulateArgs {
    /// Collector endpoint (overrides settings).
    #[arg(long)]
    ingest_url: Option<String>,
    /// Journal file for the simulated device (defaults to a temp dir).
    #[arg(long)]
    state_path: Option<PathBuf>,
    /// RNG seed (random if omitted).
    #[arg(long)]
    seed: Option<u64>,
    /// Number of boots to simulate.
    #[arg(long, default_value = "5")]
    sessions: u32,
    /// Shortest session in seconds.
    #[arg(long, default_value = "300")]
    min_session_secs: u64,
    /// Longest session in seconds.
    #[arg(long, default_value = "3600")]
    max_session_secs: u64,
    /// Device seconds per step.
    #[arg(long, default_value = "60")]
    step_secs: u64,
    /// Chance the link is down at a step.
    #[arg(long, default_value = "0.2")]
    offline_prob: f64,
    /// Chance a request fails with a server error.
    #[arg(long, default_value = "0.1")]
    error_prob: f64,
    /// Real milliseconds slept per step.
    #[arg(long, default_value = "0")]
    step_delay_ms: u64,
}

impl SimulateArgs {
    fn config(&self) -> SimulationConfig {
        SimulationConfig {
            seed: self.seed.unwrap_or_else(rand::random),
            sessions: self.sessions,
            min_session: Duration::from_secs(self.min_session_secs),
            max_session: Duration::from_secs(self.max_session_secs),
            step: Duration::from_secs(self.step_secs),
            offline_prob: self.offline_prob,
            error_prob: self.error_prob,
            step_delay: Duration::from_millis(self.step_delay_ms),
            ..SimulationConfig::default()
        }
    }
}

fn load_settings(path: Option<&PathBuf>) -> Result<TallySettings> {
    let path = path.cloned().unwrap_or_else(tally_settings::settings_path);
    let settings = tally_settings::load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    settings.validate().context("Invalid settings")?;
    Ok(settings)
}

fn state_path(settings: &TallySettings, cli_override: Option<PathBuf>) -> PathBuf {
    cli_override.unwrap_or_else(|| settings.state.resolved_path())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut term = signal(SignalKind::terminate()).context("Failed to listen for SIGTERM")?;
        tokio::select! {
            r = tokio::signal::ctrl_c() => r.context("Failed to listen for ctrl-c")?,
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    Ok(())
}

fn cancel_on_signal() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    drop(tokio::spawn(async move {
        if let Err(e) = shutdown_signal().await {
            tracing::error!(error = %e, "signal handler failed, shutting down");
        }
        tracing::info!("shutdown requested");
        trigger.cancel();
    }));
    token
}

async fn run(settings: TallySettings, state_path: PathBuf, ingest_url: Option<String>) -> Result<()> {
    let trusted_after = settings.clock.trusted_after()?;
    let clock = SystemClock::new(trusted_after);
    let store = StateStore::open(&state_path);

    let mut sync = SyncConfig::new(ingest_url.unwrap_or_else(|| settings.sync.ingest_url.clone()));
    sync.bearer_token.clone_from(&settings.sync.bearer_token);
    sync.timeout = settings.sync.timeout();
    let engine = SyncEngine::new(Arc::new(ReqwestTransport::new()), sync);

    let (base, max) = settings.sync.reconnect_bounds();
    let link = LinkMonitor::host(base, max);

    tracing::info!(
        state_path = %state_path.display(),
        ingest_url = %engine.config().ingest_url,
        "starting recorder"
    );
    let mut driver = Driver::boot(store, clock, engine, link, DriverConfig::from_settings(&settings));

    driver.run(cancel_on_signal()).await;
    tracing::info!("Shutdown complete");
    Ok(())
}

fn status(state_path: &Path) -> Result<()> {
    let journal = StateStore::open(state_path).load();
    let report = StatusReport::new(state_path, &journal);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn simulate(settings: &TallySettings, args: SimulateArgs) -> Result<()> {
    let mut sync = SyncConfig::new(args.ingest_url.clone().unwrap_or_else(|| settings.sync.ingest_url.clone()));
    sync.bearer_token.clone_from(&settings.sync.bearer_token);
    sync.timeout = settings.sync.timeout();
    let (base, max) = settings.sync.reconnect_bounds();

    let simulation = Simulation::new(args.config(), sync, Arc::new(ReqwestTransport::new()))?
        .with_driver_config(DriverConfig::from_settings(settings))
        .with_reconnect(base, max);

    // lives until the run ends
    let scratch;
    let state_path = match args.state_path {
        Some(path) => path,
        None => {
            scratch = tempfile::tempdir().context("Failed to create simulation state dir")?;
            scratch.path().join("sessions.json")
        }
    };
    tracing::info!(state_path = %state_path.display(), "starting simulation");

    let report = simulation.run(&state_path).await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn ingest(config: IngestConfig) -> Result<()> {
    let server = IngestServer::new(config);
    let token = cancel_on_signal();
    let handle = server
        .start(token.clone())
        .await
        .with_context(|| format!("Failed to bind collector on {}", server.config().bind_addr()))?;
    tracing::info!(url = %handle.ingest_url(), "collector ready");
    handle.join().await;
    tracing::info!(stats = ?server.ledger().stats(), "collector stopped");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(cli.settings.as_ref())?;
    tally_core::logging::init_subscriber(&settings.logging.level);

    match cli.command {
        Command::Run {
            state_path: path,
            ingest_url,
        } => {
            let path = state_path(&settings, path);
            run(settings, path, ingest_url).await
        }
        Command::Status { state_path: path } => status(&state_path(&settings, path)),
        Command::Simulate(args) => simulate(&settings, args).await,
        Command::Ingest { host, port, token } => {
            ingest(IngestConfig {
                host,
                port,
                bearer_token: token,
                ..IngestConfig::default()
            })
            .await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_with_overrides() {
        let cli = Cli::parse_from([
            "tally-agent",
            "run",
            "--state-path",
            "/tmp/s.json",
            "--ingest-url",
            "http://x/ingest",
        ]);
        match cli.command {
            Command::Run {
                state_path,
                ingest_url,
            } => {
                assert_eq!(state_path, Some(PathBuf::from("/tmp/s.json")));
                assert_eq!(ingest_url.as_deref(), Some("http://x/ingest"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn ingest_defaults() {
        let cli = Cli::parse_from(["tally-agent", "ingest"]);
        match cli.command {
            Command::Ingest { host, port, token } => {
                assert_eq!(host, "127.0.0.1");
                assert_eq!(port, 8080);
                assert!(token.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn global_settings_flag_after_subcommand() {
        let cli = Cli::parse_from(["tally-agent", "status", "--settings", "/etc/tally.json"]);
        assert_eq!(cli.settings, Some(PathBuf::from("/etc/tally.json")));
        assert!(matches!(cli.command, Command::Status { state_path: None }));
    }

    #[test]
    fn simulate_flags() {
        let cli = Cli::parse_from([
            "tally-agent",
            "simulate",
            "--seed",
            "9",
            "--sessions",
            "3",
            "--min-session-secs",
            "120",
            "--max-session-secs",
            "240",
            "--offline-prob",
            "0.5",
            "--error-prob",
            "0",
        ]);
        let Command::Simulate(args) = cli.command else {
            panic!("expected simulate");
        };
        let config = args.config();
        assert_eq!(config.seed, 9);
        assert_eq!(config.sessions, 3);
        assert_eq!(config.min_session, Duration::from_secs(120));
        assert_eq!(config.max_session, Duration::from_secs(240));
        assert_eq!(config.step, Duration::from_secs(60));
        assert!((config.offline_prob - 0.5).abs() < f64::EPSILON);
        assert!(config.error_prob.abs() < f64::EPSILON);
        assert!(config.validate().is_ok());
        assert!(args.state_path.is_none());
    }

    #[test]
    fn subcommand_required() {
        assert!(Cli::try_parse_from(["tally-agent"]).is_err());
    }

    #[test]
    fn state_path_override_wins() {
        let settings = TallySettings::default();
        assert_eq!(
            state_path(&settings, Some(PathBuf::from("/x.json"))),
            PathBuf::from("/x.json")
        );
        assert!(state_path(&settings, None).ends_with(".tally/sessions.json"));
    }
}
