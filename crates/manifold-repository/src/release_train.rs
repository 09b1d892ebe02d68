//! Release train: promote upstream versions onto a target.
//!
//! A train is planned once against a consistent view of state, then each
//! planned deploy is handed to the caller, which decides the transaction it
//! runs in. Lock and validation failures become skip entries; anything else
//! stops the train.

use serde::Serialize;
use tracing::{info, warn};

use manifold_state::{Environment, StateRead, TrainSource, Upstream};

use crate::error::{RepoResult, RepositoryError};
use crate::locks::{self, BlockingLock};
use crate::transformer::{DeployApplicationVersion, LockBehaviour, ReleaseTrain};

/// Why one application was not moved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// The target environment already runs this version.
    AlreadyDeployed { version: u64 },
    /// The upstream version has no manifest for the target environment.
    NoManifest { version: u64 },
    /// The deploy was blocked by locks.
    Locked { locks: Vec<BlockingLock> },
    /// The deploy failed validation.
    Invalid { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrainSkip {
    pub environment: String,
    pub application: String,
    #[serde(flatten)]
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrainDeployment {
    pub environment: String,
    pub application: String,
    pub version: u64,
}

/// Aggregate outcome of a release train.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TrainReport {
    pub target: String,
    pub deployed: Vec<TrainDeployment>,
    pub skipped: Vec<TrainSkip>,
}

impl TrainReport {
    /// One-line change description.
    pub fn summary(&self) -> String {
        let mut out = format!(
            "release train to {}: deployed {}, skipped {}",
            self.target,
            self.deployed.len(),
            self.skipped.len()
        );
        for skip in &self.skipped {
            let why = match &skip.reason {
                SkipReason::AlreadyDeployed { version } => format!("already on v{version}"),
                SkipReason::NoManifest { version } => format!("v{version} has no manifest"),
                SkipReason::Locked { locks } => format!("locked by {}", locks::describe(locks)),
                SkipReason::Invalid { message } => message.clone(),
            };
            out.push_str(&format!("\n  skipped {} on {}: {why}", skip.application, skip.environment));
        }
        out
    }
}

/// One leg of a planned train.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedStep {
    Deploy(DeployApplicationVersion),
    Skip(TrainSkip),
}

/// Resolve the train's target to environments, and the group if it named one.
fn targets(reader: &impl StateRead, target: &str) -> RepoResult<(Vec<Environment>, Option<String>)> {
    if let Some(env) = reader.environment(target)? {
        return Ok((vec![env], None));
    }
    let members = reader.environments_in_group(target)?;
    if members.is_empty() {
        return Err(RepositoryError::validation(format!(
            "release train target {target} is neither an environment nor an environment group"
        )));
    }
    Ok((members, Some(target.to_string())))
}

/// Work out every leg of `train` against `reader`'s view of state.
pub fn plan(reader: &impl StateRead, train: &ReleaseTrain) -> RepoResult<Vec<PlannedStep>> {
    let (environments, target_group) = targets(reader, &train.target)?;

    // Fail before planning anything if one member cannot take a train.
    let mut upstreams = Vec::with_capacity(environments.len());
    for env in &environments {
        let upstream = env.config.upstream.clone().ok_or_else(|| {
            RepositoryError::validation(format!("environment {} has no upstream", env.name))
        })?;
        upstreams.push(upstream);
    }

    let mut steps = Vec::new();
    for (env, upstream) in environments.iter().zip(upstreams) {
        let (upstream_name, candidates) = match upstream {
            Upstream::Environment { name } => {
                let versions: Vec<(String, u64)> = reader
                    .deployments_on(&name)?
                    .into_iter()
                    .map(|d| (d.application, d.version))
                    .collect();
                (name, versions)
            }
            Upstream::Latest => {
                let mut versions = Vec::new();
                for app in reader.applications()? {
                    if let Some(release) = reader.latest_release(&app.name)? {
                        versions.push((app.name, release.version));
                    }
                }
                ("latest".to_string(), versions)
            }
        };

        for (application, version) in candidates {
            if let Some(team) = &train.team {
                let owner = reader.application(&application)?.and_then(|app| app.team);
                if owner.as_ref() != Some(team) {
                    continue;
                }
            }

            let skip = |reason| {
                PlannedStep::Skip(TrainSkip {
                    environment: env.name.clone(),
                    application: application.clone(),
                    reason,
                })
            };
            let current = reader.deployment(&env.name, &application)?;
            if current.is_some_and(|d| d.version == version) {
                steps.push(skip(SkipReason::AlreadyDeployed { version }));
                continue;
            }
            let has_manifest = reader
                .release(&application, version)?
                .is_some_and(|release| release.manifests.contains_key(&env.name));
            if !has_manifest {
                steps.push(skip(SkipReason::NoManifest { version }));
                continue;
            }

            steps.push(PlannedStep::Deploy(DeployApplicationVersion {
                environment: env.name.clone(),
                application: application.clone(),
                version,
                lock_behaviour: LockBehaviour::Fail,
                source_train: Some(TrainSource {
                    upstream: upstream_name.clone(),
                    target_group: target_group.clone(),
                }),
                author: None,
                authentication: train.authentication.clone(),
            }));
        }
    }
    Ok(steps)
}

/// Execute planned steps through `deploy`, collecting the report.
///
/// Locked and validation failures are recorded as skips. Any other error
/// stops the train; deploys already made stay made.
pub fn run<F>(target: &str, steps: Vec<PlannedStep>, mut deploy: F) -> RepoResult<TrainReport>
where
    F: FnMut(&DeployApplicationVersion) -> RepoResult<()>,
{
    let mut report = TrainReport {
        target: target.to_string(),
        ..Default::default()
    };

    for step in steps {
        let leg = match step {
            PlannedStep::Skip(skip) => {
                report.skipped.push(skip);
                continue;
            }
            PlannedStep::Deploy(leg) => leg,
        };

        let reason = match deploy(&leg) {
            Ok(()) => {
                info!(
                    environment = %leg.environment,
                    application = %leg.application,
                    version = leg.version,
                    "release train deployed"
                );
                report.deployed.push(TrainDeployment {
                    environment: leg.environment,
                    application: leg.application,
                    version: leg.version,
                });
                continue;
            }
            Err(RepositoryError::Locked { locks }) => SkipReason::Locked { locks },
            Err(RepositoryError::Validation(message)) => SkipReason::Invalid { message },
            Err(e) => return Err(e),
        };

        warn!(
            environment = %leg.environment,
            application = %leg.application,
            version = leg.version,
            ?reason,
            "release train skipped application"
        );
        report.skipped.push(TrainSkip {
            environment: leg.environment,
            application: leg.application,
            reason,
        });
    }

    Ok(report)
}
