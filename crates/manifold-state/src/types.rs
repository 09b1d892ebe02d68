//! Domain types for the Manifold state store.
//!
//! These types represent the persisted manifest tree (environments,
//! applications, releases, deployments), the lock scopes, and the rows of
//! the event-sourcing log. All types are serializable to/from JSON for
//! storage in redb tables.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ── Identity ──────────────────────────────────────────────────────

/// Opaque identity of the actor performing a change.
///
/// Recorded on every transformer, lock and deployment; never validated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authentication {
    pub name: String,
    pub email: String,
}

impl Authentication {
    pub fn new(name: &str, email: &str) -> Self {
        Self {
            name: name.to_string(),
            email: email.to_string(),
        }
    }
}

// ── Environment ───────────────────────────────────────────────────

/// Configuration of a single environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    /// Where release trains into this environment take their versions from.
    pub upstream: Option<Upstream>,
    /// External sync (Argo CD) settings. Stored, never acted on.
    pub argocd: Option<ArgoCdConfig>,
    /// Group this environment belongs to, for group locks and group trains.
    pub environment_group: Option<String>,
}

/// Source of versions for a release train.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Upstream {
    /// Take whatever is deployed on another environment.
    Environment { name: String },
    /// Take the latest release of every application.
    Latest,
}

/// Argo CD sync settings for an environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgoCdConfig {
    pub destination: SyncDestination,
    #[serde(default)]
    pub sync_windows: Vec<SyncWindow>,
    #[serde(default)]
    pub application_annotations: BTreeMap<String, String>,
}

/// Cluster destination of an Argo CD application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncDestination {
    pub name: String,
    pub server: String,
    pub namespace: Option<String>,
}

/// Window in which Argo CD may (or may not) sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncWindow {
    pub kind: SyncWindowKind,
    /// Cron expression, e.g. `"0 22 * * *"`.
    pub schedule: String,
    /// Length of the window, e.g. `"1h"`.
    pub duration: String,
    #[serde(default)]
    pub applications: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncWindowKind {
    Allow,
    Deny,
}

/// An environment together with its name, as returned by listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub name: String,
    pub config: EnvironmentConfig,
}

// ── Application ───────────────────────────────────────────────────

/// An application known to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub name: String,
    /// Owning team, used for team locks and team-filtered release trains.
    pub team: Option<String>,
}

/// An immutable version of an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub application: String,
    pub version: u64,
    /// Rendered manifest per environment name.
    pub manifests: BTreeMap<String, String>,
    pub source: ReleaseSource,
    pub display_version: String,
    /// Marks the version that removes the application everywhere.
    pub undeploy: bool,
    pub created_by: Authentication,
    /// Unix timestamp (seconds) when this release was created.
    pub created_at: u64,
}

/// Commit metadata a release was built from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseSource {
    pub commit_id: String,
    pub author: String,
    pub message: String,
    pub repo_url: String,
}

/// The manifest currently rendered for an (environment, application) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    pub environment: String,
    pub application: String,
    pub version: u64,
    pub manifest: String,
    pub deployed_by: Authentication,
    pub author: Option<String>,
    /// Set when the deployment was made by a release train.
    pub source_train: Option<TrainSource>,
    /// Unix timestamp (seconds) of the deployment.
    pub deployed_at: u64,
}

/// Where a train-driven deployment came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainSource {
    /// Upstream environment name, or `"latest"`.
    pub upstream: String,
    /// Group the train targeted, when it targeted a group.
    pub target_group: Option<String>,
}

/// A deploy request parked because the target was locked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedDeployment {
    pub environment: String,
    pub application: String,
    pub version: u64,
    pub queued_by: Authentication,
    pub queued_at: u64,
}

// ── Locks ─────────────────────────────────────────────────────────

/// One of the four independent lock namespaces.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum LockScope {
    Environment { environment: String },
    EnvironmentGroup { group: String },
    EnvironmentTeam { environment: String, team: String },
    EnvironmentApplication { environment: String, application: String },
}

impl LockScope {
    /// Key prefix shared by every lock in this scope instance.
    pub fn key_prefix(&self) -> String {
        match self {
            Self::Environment { environment } => format!("{environment}/"),
            Self::EnvironmentGroup { group } => format!("{group}/"),
            Self::EnvironmentTeam { environment, team } => format!("{environment}/{team}/"),
            Self::EnvironmentApplication {
                environment,
                application,
            } => format!("{environment}/{application}/"),
        }
    }

    /// Build the composite key for one lock in this scope.
    pub fn lock_key(&self, lock_id: &str) -> String {
        format!("{}{lock_id}", self.key_prefix())
    }
}

impl fmt::Display for LockScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Environment { environment } => write!(f, "environment {environment}"),
            Self::EnvironmentGroup { group } => write!(f, "environment group {group}"),
            Self::EnvironmentTeam { environment, team } => {
                write!(f, "team {team} on {environment}")
            }
            Self::EnvironmentApplication {
                environment,
                application,
            } => write!(f, "application {application} on {environment}"),
        }
    }
}

/// A lock record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lock {
    pub lock_id: String,
    pub message: String,
    pub created_by: Authentication,
    pub created_at: u64,
}

// ── Event-sourcing log ────────────────────────────────────────────

/// One applied transformer, as persisted in the event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EslEventRow {
    /// Monotonically increasing, starting at 1. Authoritative replay order.
    pub sequence: u64,
    /// Discriminator naming the transformer variant.
    pub event_type: String,
    /// The transformer's public fields as JSON.
    pub event_json: String,
    /// Unix timestamp (seconds) of the append.
    pub timestamp: u64,
}

// ── Keys ──────────────────────────────────────────────────────────

impl Release {
    /// Build the composite key for the releases table.
    pub fn table_key(&self) -> String {
        release_key(&self.application, self.version)
    }
}

impl Deployment {
    /// Build the composite key for the deployments table.
    pub fn table_key(&self) -> String {
        pair_key(&self.environment, &self.application)
    }
}

impl QueuedDeployment {
    /// Build the composite key for the queued deployments table.
    pub fn table_key(&self) -> String {
        pair_key(&self.environment, &self.application)
    }
}

/// `{application}/{version}` with the version zero-padded so keys sort numerically.
pub fn release_key(application: &str, version: u64) -> String {
    format!("{application}/{version:020}")
}

/// `{environment}/{application}`.
pub fn pair_key(environment: &str, application: &str) -> String {
    format!("{environment}/{application}")
}
