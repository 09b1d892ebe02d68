//! manifoldd — the Manifold daemon.
//!
//! Single binary around the manifest repository:
//! - State store and event log (redb)
//! - Transformer apply engine
//! - esl-audit background task
//! - Readiness endpoint (`/healthz`) and gauge (`/metrics`)
//!
//! # Usage
//!
//! ```text
//! manifoldd --config /etc/manifold/manifold.toml serve --port 8080
//! manifoldd apply --file transformers.json
//! manifoldd log --since 10
//! manifoldd replay --from /backup/manifold.redb
//! ```

mod audit;
mod config;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use manifold_health::{Backoff, ExponentialBackoff, HealthServer, Supervisor};
use manifold_repository::{EslEnvelope, Repository, Transformer};
use manifold_state::{StateRead, StateStore};

use crate::config::{LogFormat, ManifoldConfig};

const DEFAULT_LOG_FILTER: &str = "info,manifoldd=debug,manifold=debug";
const DB_FILE: &str = "manifold.redb";

#[derive(Parser)]
#[command(name = "manifoldd", about = "Manifold daemon")]
struct Cli {
    /// Path to manifold.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory for persistent state (overrides the config file).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the background tasks and the readiness endpoint.
    Serve {
        /// Port to listen on (overrides the config file).
        #[arg(long)]
        port: Option<u16>,
    },
    /// Apply a JSON array of `{event_type, event_json}` envelopes as one batch.
    Apply {
        #[arg(long)]
        file: PathBuf,
    },
    /// Print event log rows as JSON lines.
    Log {
        /// Only rows with a greater sequence.
        #[arg(long, default_value = "0")]
        since: u64,
    },
    /// Re-apply the event log of another database to this one.
    Replay {
        #[arg(long)]
        from: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = ManifoldConfig::load(cli.config.as_deref())?;
    init_tracing(&config)?;

    let data_dir = cli.data_dir.unwrap_or_else(|| config.data_dir());

    match cli.command {
        Command::Serve { port } => {
            let port = port.unwrap_or_else(|| config.port());
            run_serve(&config, &data_dir, port).await
        }
        Command::Apply { file } => run_apply(&data_dir, &file),
        Command::Log { since } => run_log(&data_dir, since),
        Command::Replay { from } => run_replay(&data_dir, &from),
    }
}

fn init_tracing(config: &ManifoldConfig) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(config.log_filter().unwrap_or(DEFAULT_LOG_FILTER))
            .context("invalid log filter")?,
    };

    match config.log_format() {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
    }
    Ok(())
}

fn open_repository(data_dir: &Path) -> anyhow::Result<Repository> {
    std::fs::create_dir_all(data_dir)?;
    let db_path = data_dir.join(DB_FILE);
    let store = StateStore::open(&db_path)
        .with_context(|| format!("opening state store at {}", db_path.display()))?;
    info!(path = ?db_path, "state store opened");
    Ok(Repository::new(store))
}

async fn run_serve(config: &ManifoldConfig, data_dir: &Path, port: u16) -> anyhow::Result<()> {
    info!("Manifold daemon starting");

    let repo = Arc::new(open_repository(data_dir)?);
    if let Some(latest) = repo.latest_event()? {
        info!(sequence = latest.sequence, "event log loaded");
    }

    let (initial, max) = config.backoff();
    let health = HealthServer::new().with_backoff_factory(move || -> Box<dyn Backoff> {
        Box::new(ExponentialBackoff::new(initial, max))
    });

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for shutdown signal");
            return;
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    // ── Background tasks and readiness ─────────────────────────

    let interval = config.audit_interval();
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    Supervisor::new(health)
        .task(audit::TASK_NAME, move |reporter, shutdown| {
            audit::run(repo, interval, reporter, shutdown)
        })
        .run(addr, shutdown_rx)
        .await?;

    info!("Manifold daemon stopped");
    Ok(())
}

fn run_apply(data_dir: &Path, file: &Path) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("reading {}", file.display()))?;
    let envelopes: Vec<EslEnvelope> =
        serde_json::from_str(&content).context("parsing transformer envelopes")?;
    let transformers = envelopes
        .iter()
        .enumerate()
        .map(|(i, envelope)| {
            envelope
                .decode()
                .with_context(|| format!("envelope #{i} ({})", envelope.event_type))
        })
        .collect::<anyhow::Result<Vec<Transformer>>>()?;

    let repo = open_repository(data_dir)?;
    for applied in repo.apply(transformers)? {
        println!(
            "{} {}: {}",
            applied.event.sequence, applied.event.event_type, applied.description
        );
        if let Some(report) = &applied.train {
            println!("{}", report.summary());
        }
    }
    Ok(())
}

fn run_log(data_dir: &Path, since: u64) -> anyhow::Result<()> {
    let repo = open_repository(data_dir)?;
    for row in repo.history(since)? {
        println!("{}", serde_json::to_string(&row)?);
    }
    Ok(())
}

fn run_replay(data_dir: &Path, from: &Path) -> anyhow::Result<()> {
    let source = StateStore::open(from)
        .with_context(|| format!("opening source store at {}", from.display()))?;
    let rows = source.begin_read()?.events_after(0)?;

    let repo = open_repository(data_dir)?;
    let applied = repo.replay(&rows)?;
    println!("replayed {applied} of {} events", rows.len());
    Ok(())
}
