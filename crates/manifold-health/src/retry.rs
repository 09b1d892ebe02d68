//! Retry combinator for background work.
//!
//! [`HealthReporter::retry`] runs a unit of work until it returns `Ok`, the
//! shutdown signal fires, or it fails with an error wrapped by
//! [`permanent`]. Ordinary errors mark the component `Failed` and are retried
//! after the reporter's backoff.

use std::future::Future;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::health::{Health, HealthReporter};

/// Marks an error that retrying cannot fix.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct Permanent(anyhow::Error);

impl Permanent {
    pub fn into_inner(self) -> anyhow::Error {
        self.0
    }
}

/// Wrap `err` so [`HealthReporter::retry`] stops instead of retrying.
pub fn permanent(err: impl Into<anyhow::Error>) -> anyhow::Error {
    anyhow::Error::new(Permanent(err.into()))
}

impl HealthReporter {
    /// Run `work` until it succeeds, shutdown is signalled, or it fails
    /// permanently.
    ///
    /// Returns `Ok(())` on success or shutdown, and the unwrapped error of a
    /// permanent failure.
    pub async fn retry<F, Fut>(&self, mut shutdown: watch::Receiver<bool>, mut work: F) -> anyhow::Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        *self.backoff.lock().unwrap_or_else(std::sync::PoisonError::into_inner) =
            Some(self.fresh_backoff());

        loop {
            if *shutdown.borrow() {
                return Ok(());
            }

            let err = match work().await {
                Ok(()) => return Ok(()),
                Err(err) => err,
            };

            let err = match err.downcast::<Permanent>() {
                Ok(permanent) => {
                    let inner = permanent.into_inner();
                    self.report_health(Health::Failed, inner.to_string());
                    return Err(inner);
                }
                Err(err) => err,
            };

            self.report_health(Health::Failed, err.to_string());
            let delay = self.next_backoff();
            warn!(component = %self.name(), error = %err, ?delay, "background work failed, retrying");

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => {
                    debug!(component = %self.name(), "retry loop shutting down");
                    return Ok(());
                }
            }
        }
    }

    fn next_backoff(&self) -> std::time::Duration {
        self.backoff
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .as_mut()
            .map(|b| b.next_backoff())
            .unwrap_or_default()
    }
}
