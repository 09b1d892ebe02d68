//! esl-audit: background task that keeps decoding the event log.
//!
//! Every interval the task decodes the rows appended since its last pass.
//! An undecodable row is a permanent failure: retrying cannot repair
//! history. Storage errors are retried with the reporter's backoff.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::anyhow;
use tokio::sync::watch;
use tracing::debug;

use manifold_health::{Health, HealthReporter, permanent};
use manifold_repository::{Repository, esl};

/// Name the task reports under.
pub const TASK_NAME: &str = "esl-audit";

/// Decode every row after `after`; returns the last sequence seen.
pub fn audit_once(repo: &Repository, after: u64) -> anyhow::Result<u64> {
    let rows = repo.history(after)?;
    let mut last = after;
    for row in &rows {
        esl::decode_row(row).map_err(|e| {
            permanent(anyhow!("event {} ({}) is unreadable: {e}", row.sequence, row.event_type))
        })?;
        last = row.sequence;
    }
    if !rows.is_empty() {
        debug!(from = after + 1, through = last, "event log audited");
    }
    Ok(last)
}

/// Run the audit until shutdown or a permanent failure.
pub async fn run(
    repo: Arc<Repository>,
    interval: Duration,
    reporter: HealthReporter,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    // Progress survives retries.
    let audited = Arc::new(AtomicU64::new(0));
    let worker = reporter.clone();

    reporter
        .retry(shutdown.clone(), move || {
            let repo = repo.clone();
            let audited = audited.clone();
            let reporter = worker.clone();
            let mut shutdown = shutdown.clone();
            async move {
                loop {
                    if *shutdown.borrow() {
                        return Ok(());
                    }
                    let through = audit_once(&repo, audited.load(Ordering::SeqCst))?;
                    audited.store(through, Ordering::SeqCst);
                    reporter.report_health(Health::Ready, format!("audited through {through}"));

                    tokio::select! {
                        _ = tokio::time::sleep(interval) => {}
                        _ = shutdown.changed() => return Ok(()),
                    }
                }
            }
        })
        .await
}
