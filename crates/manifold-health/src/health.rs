//! Health registry: named components and their last reported state.
//!
//! Every background component gets a [`HealthReporter`] from the shared
//! [`HealthServer`] and reports `Starting`, `Ready` or `Failed`. The HTTP
//! router and the metrics exposition read the same registry.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::backoff::{Backoff, ExponentialBackoff};

/// Health of one component.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Health {
    #[default]
    Starting,
    Ready,
    Failed,
}

/// The last report of one component.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Report {
    pub health: Health,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub message: String,
}

/// Builds a fresh backoff for each retry loop.
pub type BackoffFactory = Arc<dyn Fn() -> Box<dyn Backoff> + Send + Sync>;

/// Shared registry of component health.
#[derive(Clone)]
pub struct HealthServer {
    reports: Arc<RwLock<BTreeMap<String, Report>>>,
    backoff_factory: BackoffFactory,
}

impl Default for HealthServer {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthServer {
    /// Create an empty registry using [`ExponentialBackoff::default`].
    pub fn new() -> Self {
        Self {
            reports: Arc::new(RwLock::new(BTreeMap::new())),
            backoff_factory: Arc::new(|| -> Box<dyn Backoff> { Box::new(ExponentialBackoff::default()) }),
        }
    }

    /// Replace the backoff used by [`HealthReporter::retry`].
    pub fn with_backoff_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Backoff> + Send + Sync + 'static,
    {
        self.backoff_factory = Arc::new(factory);
        self
    }

    /// Register `name` as `Starting` and hand out its reporter.
    pub fn reporter(&self, name: &str) -> HealthReporter {
        self.reports
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), Report::default());
        debug!(component = %name, "health reporter registered");
        HealthReporter {
            name: name.to_string(),
            server: self.clone(),
            backoff: Arc::new(Mutex::new(None)),
        }
    }

    /// Whether `name` last reported `Ready`.
    pub fn is_ready(&self, name: &str) -> bool {
        self.reports
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .is_some_and(|r| r.health == Health::Ready)
    }

    /// Whether every registered component is `Ready`.
    pub fn all_ready(&self) -> bool {
        self.reports
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .all(|r| r.health == Health::Ready)
    }

    /// Copy of every component's last report, ordered by name.
    pub fn snapshot(&self) -> BTreeMap<String, Report> {
        self.reports
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// `{"<name>":{"health":"<state>"[,"message":"<msg>"]}, ...}`
    pub fn readiness_json(&self) -> String {
        // A map of plain strings and enums always serializes.
        serde_json::to_string(&self.snapshot()).unwrap_or_else(|_| "{}".to_string())
    }

    pub(crate) fn new_backoff(&self) -> Box<dyn Backoff> {
        (self.backoff_factory)()
    }

    fn set(&self, name: &str, report: Report) -> Option<Report> {
        self.reports
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), report)
    }
}

/// Handle through which one component reports its health.
///
/// Clones share the component's slot and, inside
/// [`retry`](HealthReporter::retry), its backoff.
#[derive(Clone)]
pub struct HealthReporter {
    name: String,
    server: HealthServer,
    pub(crate) backoff: Arc<Mutex<Option<Box<dyn Backoff>>>>,
}

impl HealthReporter {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn fresh_backoff(&self) -> Box<dyn Backoff> {
        self.server.new_backoff()
    }

    /// Record the component's current health.
    ///
    /// Reporting `Ready` while retrying resets the backoff.
    pub fn report_health(&self, health: Health, message: impl Into<String>) {
        let report = Report {
            health,
            message: message.into(),
        };
        let previous = self.server.set(&self.name, report.clone());

        if previous.as_ref().map(|p| p.health) != Some(health) {
            match health {
                Health::Ready => info!(component = %self.name, message = %report.message, "component ready"),
                Health::Failed => warn!(component = %self.name, message = %report.message, "component failed"),
                Health::Starting => debug!(component = %self.name, "component starting"),
            }
        }

        if health == Health::Ready {
            if let Some(backoff) = self
                .backoff
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .as_mut()
            {
                backoff.reset();
            }
        }
    }
}
