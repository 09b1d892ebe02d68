//! Per-variant validation and mutation.
//!
//! Every function here checks locks first, then validates against current
//! state, and only then writes. Lock and validation failures therefore leave
//! the transaction untouched; a storage error can strike after some writes,
//! and the caller must abort.

use std::fmt;

use tracing::{debug, info};

use manifold_state::*;

use crate::apply;
use crate::error::{RepoResult, RepositoryError};
use crate::locks::{self, BlockingLock, LockTarget};
use crate::release_train::{self, TrainReport};
use crate::transformer::*;
use crate::validation;

/// One piece of state written by a transformer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateChange {
    EnvironmentConfigured { environment: String },
    ReleaseCreated { application: String, version: u64 },
    Deployed { environment: String, application: String, version: u64 },
    Queued { environment: String, application: String, version: u64 },
    ManifestRemoved { environment: String, application: String },
    LockCreated { scope: LockScope, lock_id: String },
    LockDeleted { scope: LockScope, lock_id: String },
    ApplicationRemoved { application: String },
}

impl fmt::Display for StateChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EnvironmentConfigured { environment } => {
                write!(f, "configured environment {environment}")
            }
            Self::ReleaseCreated {
                application,
                version,
            } => write!(f, "created {application} v{version}"),
            Self::Deployed {
                environment,
                application,
                version,
            } => write!(f, "deployed {application} v{version} to {environment}"),
            Self::Queued {
                environment,
                application,
                version,
            } => write!(f, "queued {application} v{version} for {environment}"),
            Self::ManifestRemoved {
                environment,
                application,
            } => write!(f, "removed {application} from {environment}"),
            Self::LockCreated { scope, lock_id } => write!(f, "locked {scope} ({lock_id})"),
            Self::LockDeleted { scope, lock_id } => write!(f, "unlocked {scope} ({lock_id})"),
            Self::ApplicationRemoved { application } => write!(f, "removed application {application}"),
        }
    }
}

/// What a transformer did, before its event row is appended.
#[derive(Debug, Default)]
pub(crate) struct Outcome {
    pub changes: Vec<StateChange>,
    pub description: String,
    pub train: Option<TrainReport>,
}

impl Outcome {
    fn new(description: impl Into<String>, changes: Vec<StateChange>) -> Self {
        Self {
            changes,
            description: description.into(),
            train: None,
        }
    }
}

/// Validate and apply one transformer inside `writer`.
pub(crate) fn execute(writer: &mut StateWriter, transformer: &Transformer) -> RepoResult<Outcome> {
    match transformer {
        Transformer::CreateEnvironment(t) => create_environment(writer, t),
        Transformer::CreateApplicationVersion(t) => create_application_version(writer, t),
        Transformer::DeployApplicationVersion(t) => deploy(writer, t),
        Transformer::CreateUndeployApplicationVersion(t) => create_undeploy_version(writer, t),
        Transformer::UndeployApplication(t) => undeploy_application(writer, t),
        Transformer::DeleteEnvFromApp(t) => delete_env_from_app(writer, t),
        Transformer::CreateEnvironmentLock(t) => {
            validation::environment_name(&t.environment)?;
            require_environment(writer, &t.environment)?;
            create_lock(writer, t.scope(), &t.lock_id, &t.message, &t.authentication)
        }
        Transformer::DeleteEnvironmentLock(t) => delete_lock(writer, t.scope(), &t.lock_id),
        Transformer::CreateEnvironmentTeamLock(t) => {
            validation::environment_name(&t.environment)?;
            validation::key_segment("team", &t.team)?;
            require_environment(writer, &t.environment)?;
            create_lock(writer, t.scope(), &t.lock_id, &t.message, &t.authentication)
        }
        Transformer::DeleteEnvironmentTeamLock(t) => delete_lock(writer, t.scope(), &t.lock_id),
        Transformer::CreateEnvironmentGroupLock(t) => {
            validation::key_segment("environment group", &t.environment_group)?;
            if writer.environments_in_group(&t.environment_group)?.is_empty() {
                return Err(RepositoryError::validation(format!(
                    "environment group {} has no environments",
                    t.environment_group
                )));
            }
            create_lock(writer, t.scope(), &t.lock_id, &t.message, &t.authentication)
        }
        Transformer::DeleteEnvironmentGroupLock(t) => delete_lock(writer, t.scope(), &t.lock_id),
        Transformer::CreateEnvironmentApplicationLock(t) => {
            validation::environment_name(&t.environment)?;
            validation::application_name(&t.application)?;
            require_environment(writer, &t.environment)?;
            create_lock(writer, t.scope(), &t.lock_id, &t.message, &t.authentication)
        }
        Transformer::DeleteEnvironmentApplicationLock(t) => {
            delete_lock(writer, t.scope(), &t.lock_id)
        }
        Transformer::ReleaseTrain(t) => release_train_in(writer, t),
    }
}

fn require_environment(reader: &impl StateRead, name: &str) -> RepoResult<Environment> {
    reader
        .environment(name)?
        .ok_or_else(|| RepositoryError::validation(format!("unknown environment {name}")))
}

// ── Environments ──────────────────────────────────────────────────

fn create_environment(writer: &mut StateWriter, t: &CreateEnvironment) -> RepoResult<Outcome> {
    validation::environment_name(&t.environment)?;
    if let Some(Upstream::Environment { name }) = &t.config.upstream {
        if name == &t.environment {
            return Err(RepositoryError::validation(format!(
                "environment {} cannot be its own upstream",
                t.environment
            )));
        }
    }
    if let Some(group) = &t.config.environment_group {
        validation::key_segment("environment group", group)?;
    }

    let existed = writer.environment(&t.environment)?.is_some();
    writer.put_environment(&Environment {
        name: t.environment.clone(),
        config: t.config.clone(),
    })?;

    let verb = if existed { "updated" } else { "created" };
    Ok(Outcome::new(
        format!("{verb} environment {}", t.environment),
        vec![StateChange::EnvironmentConfigured {
            environment: t.environment.clone(),
        }],
    ))
}

// ── Releases ──────────────────────────────────────────────────────

fn create_application_version(
    writer: &mut StateWriter,
    t: &CreateApplicationVersion,
) -> RepoResult<Outcome> {
    validation::application_name(&t.application)?;
    if t.version == 0 {
        return Err(RepositoryError::validation("version must be greater than 0"));
    }
    if let Some(team) = &t.team {
        validation::key_segment("team", team)?;
    }
    if writer.release(&t.application, t.version)?.is_some() {
        return Err(RepositoryError::validation(format!(
            "{} v{} already exists",
            t.application, t.version
        )));
    }
    for environment in t.manifests.keys() {
        require_environment(writer, environment)?;
    }

    let team = match &t.team {
        Some(team) => Some(team.clone()),
        None => writer.application(&t.application)?.and_then(|app| app.team),
    };
    writer.put_application(&Application {
        name: t.application.clone(),
        team,
    })?;
    writer.put_release(&Release {
        application: t.application.clone(),
        version: t.version,
        manifests: t.manifests.clone(),
        source: ReleaseSource {
            commit_id: t.source_commit_id.clone(),
            author: t.source_author.clone(),
            message: t.source_message.clone(),
            repo_url: t.source_repo_url.clone(),
        },
        display_version: t.display_version.clone(),
        undeploy: false,
        created_by: t.authentication.clone(),
        created_at: epoch_secs(),
    })?;

    Ok(Outcome::new(
        format!(
            "created {} v{} for {} environment(s)",
            t.application,
            t.version,
            t.manifests.len()
        ),
        vec![StateChange::ReleaseCreated {
            application: t.application.clone(),
            version: t.version,
        }],
    ))
}

// ── Deploy ────────────────────────────────────────────────────────

/// Deploy one release onto one environment, honouring `lock_behaviour`.
pub(crate) fn deploy(writer: &mut StateWriter, t: &DeployApplicationVersion) -> RepoResult<Outcome> {
    let target = LockTarget::resolve(&*writer, &t.environment, &t.application)?;
    let blocking = match t.lock_behaviour {
        LockBehaviour::Ignore => Vec::new(),
        LockBehaviour::Fail | LockBehaviour::Record => locks::blocking_locks(&*writer, &target)?,
    };
    if t.lock_behaviour == LockBehaviour::Fail && !blocking.is_empty() {
        return Err(RepositoryError::Locked { locks: blocking });
    }

    require_environment(writer, &t.environment)?;
    let release = writer.release(&t.application, t.version)?.ok_or_else(|| {
        RepositoryError::validation(format!("{} v{} does not exist", t.application, t.version))
    })?;
    let manifest = release.manifests.get(&t.environment).cloned().ok_or_else(|| {
        RepositoryError::validation(format!(
            "{} v{} has no manifest for {}",
            t.application, t.version, t.environment
        ))
    })?;

    if !blocking.is_empty() {
        writer.put_queued(&QueuedDeployment {
            environment: t.environment.clone(),
            application: t.application.clone(),
            version: t.version,
            queued_by: t.authentication.clone(),
            queued_at: epoch_secs(),
        })?;
        info!(
            environment = %t.environment,
            application = %t.application,
            version = t.version,
            locks = blocking.len(),
            "deployment queued behind locks"
        );
        return Ok(Outcome::new(
            format!(
                "queued {} v{} for {}: {}",
                t.application,
                t.version,
                t.environment,
                locks::describe(&blocking)
            ),
            vec![StateChange::Queued {
                environment: t.environment.clone(),
                application: t.application.clone(),
                version: t.version,
            }],
        ));
    }

    writer.put_deployment(&Deployment {
        environment: t.environment.clone(),
        application: t.application.clone(),
        version: t.version,
        manifest,
        deployed_by: t.authentication.clone(),
        author: t.author.clone(),
        source_train: t.source_train.clone(),
        deployed_at: epoch_secs(),
    })?;
    writer.delete_queued(&t.environment, &t.application)?;

    Ok(Outcome::new(
        format!("deployed {} v{} to {}", t.application, t.version, t.environment),
        vec![StateChange::Deployed {
            environment: t.environment.clone(),
            application: t.application.clone(),
            version: t.version,
        }],
    ))
}

// ── Undeploy ──────────────────────────────────────────────────────

fn require_application(reader: &impl StateRead, name: &str) -> RepoResult<Application> {
    reader
        .application(name)?
        .ok_or_else(|| RepositoryError::validation(format!("unknown application {name}")))
}

fn create_undeploy_version(
    writer: &mut StateWriter,
    t: &CreateUndeployApplicationVersion,
) -> RepoResult<Outcome> {
    require_application(writer, &t.application)?;
    let version = match writer.latest_release(&t.application)? {
        None => 1,
        Some(release) => release.version.checked_add(1).ok_or_else(|| {
            RepositoryError::validation(format!(
                "{} has no version left for an undeploy release",
                t.application
            ))
        })?,
    };

    // Lock state is read before the first write so a locked environment
    // is skipped, not half-written.
    let mut free = Vec::new();
    let mut locked: Vec<(String, Vec<BlockingLock>)> = Vec::new();
    for deployment in writer.deployments_of(&t.application)? {
        let target = LockTarget::resolve(&*writer, &deployment.environment, &t.application)?;
        let blocking = locks::blocking_locks(&*writer, &target)?;
        if blocking.is_empty() {
            free.push(deployment.environment);
        } else {
            locked.push((deployment.environment, blocking));
        }
    }

    let manifests = writer
        .environments()?
        .into_iter()
        .map(|env| (env.name, String::new()))
        .collect();
    writer.put_release(&Release {
        application: t.application.clone(),
        version,
        manifests,
        source: ReleaseSource::default(),
        display_version: String::new(),
        undeploy: true,
        created_by: t.authentication.clone(),
        created_at: epoch_secs(),
    })?;

    let mut changes = vec![StateChange::ReleaseCreated {
        application: t.application.clone(),
        version,
    }];
    for environment in &free {
        writer.put_deployment(&Deployment {
            environment: environment.clone(),
            application: t.application.clone(),
            version,
            manifest: String::new(),
            deployed_by: t.authentication.clone(),
            author: None,
            source_train: None,
            deployed_at: epoch_secs(),
        })?;
        writer.delete_queued(environment, &t.application)?;
        changes.push(StateChange::Deployed {
            environment: environment.clone(),
            application: t.application.clone(),
            version,
        });
    }

    let mut description = format!("created undeploy version v{version} of {}", t.application);
    if !free.is_empty() {
        description.push_str(&format!("; deployed to {}", free.join(", ")));
    }
    if !locked.is_empty() {
        let skipped: Vec<String> = locked
            .iter()
            .map(|(env, blocking)| format!("{env} [{}]", locks::describe(blocking)))
            .collect();
        description.push_str(&format!("; locked: {}", skipped.join(", ")));
    }
    Ok(Outcome::new(description, changes))
}

fn undeploy_application(writer: &mut StateWriter, t: &UndeployApplication) -> RepoResult<Outcome> {
    let deployments = writer.deployments_of(&t.application)?;

    let mut blocking = Vec::new();
    for deployment in &deployments {
        let target = LockTarget::resolve(&*writer, &deployment.environment, &t.application)?;
        blocking.extend(locks::blocking_locks(&*writer, &target)?);
    }
    if !blocking.is_empty() {
        return Err(RepositoryError::Locked { locks: blocking });
    }

    require_application(writer, &t.application)?;
    match writer.latest_release(&t.application)? {
        Some(release) if release.undeploy => {}
        _ => {
            return Err(RepositoryError::validation(format!(
                "latest release of {} is not an undeploy version",
                t.application
            )));
        }
    }
    for deployment in &deployments {
        let is_undeploy = writer
            .release(&t.application, deployment.version)?
            .is_some_and(|release| release.undeploy);
        if !is_undeploy {
            return Err(RepositoryError::validation(format!(
                "{} still runs v{} on {}",
                t.application, deployment.version, deployment.environment
            )));
        }
    }

    let mut changes = Vec::new();
    for deployment in &deployments {
        writer.delete_deployment(&deployment.environment, &t.application)?;
        changes.push(StateChange::ManifestRemoved {
            environment: deployment.environment.clone(),
            application: t.application.clone(),
        });
    }
    for env in writer.environments()? {
        writer.delete_queued(&env.name, &t.application)?;
    }
    for release in writer.releases(&t.application)? {
        writer.delete_release(&t.application, release.version)?;
    }
    writer.delete_application(&t.application)?;
    changes.push(StateChange::ApplicationRemoved {
        application: t.application.clone(),
    });

    Ok(Outcome::new(
        format!(
            "undeployed {} from {} environment(s)",
            t.application,
            deployments.len()
        ),
        changes,
    ))
}

fn delete_env_from_app(writer: &mut StateWriter, t: &DeleteEnvFromApp) -> RepoResult<Outcome> {
    validation::application_name(&t.application)?;
    validation::environment_name(&t.environment)?;

    let removed = writer.delete_deployment(&t.environment, &t.application)?;
    writer.delete_queued(&t.environment, &t.application)?;
    for mut release in writer.releases(&t.application)? {
        if release.manifests.remove(&t.environment).is_some() {
            writer.put_release(&release)?;
        }
    }

    if !removed {
        debug!(environment = %t.environment, application = %t.application, "no deployment to remove");
        return Ok(Outcome::new(
            format!("{} was not deployed on {}", t.application, t.environment),
            Vec::new(),
        ));
    }
    Ok(Outcome::new(
        format!("removed environment {} from {}", t.environment, t.application),
        vec![StateChange::ManifestRemoved {
            environment: t.environment.clone(),
            application: t.application.clone(),
        }],
    ))
}

// ── Locks ─────────────────────────────────────────────────────────

fn create_lock(
    writer: &mut StateWriter,
    scope: LockScope,
    lock_id: &str,
    message: &str,
    authentication: &Authentication,
) -> RepoResult<Outcome> {
    validation::lock_id(lock_id)?;
    writer.put_lock(
        &scope,
        &Lock {
            lock_id: lock_id.to_string(),
            message: message.to_string(),
            created_by: authentication.clone(),
            created_at: epoch_secs(),
        },
    )?;
    Ok(Outcome::new(
        format!("created lock {lock_id} on {scope}"),
        vec![StateChange::LockCreated {
            scope,
            lock_id: lock_id.to_string(),
        }],
    ))
}

fn delete_lock(writer: &mut StateWriter, scope: LockScope, lock_id: &str) -> RepoResult<Outcome> {
    if !writer.delete_lock(&scope, lock_id)? {
        return Ok(Outcome::new(
            format!("lock {lock_id} on {scope} did not exist"),
            Vec::new(),
        ));
    }
    Ok(Outcome::new(
        format!("deleted lock {lock_id} on {scope}"),
        vec![StateChange::LockDeleted {
            scope,
            lock_id: lock_id.to_string(),
        }],
    ))
}

// ── Release train (caller's transaction) ──────────────────────────

fn release_train_in(writer: &mut StateWriter, t: &ReleaseTrain) -> RepoResult<Outcome> {
    let steps = release_train::plan(&*writer, t)?;
    let mut changes = Vec::new();
    let report = release_train::run(&t.target, steps, |deploy| {
        let applied = apply::apply_in(writer, &Transformer::from(deploy.clone()))?;
        changes.extend(applied.changes);
        Ok(())
    })?;
    Ok(Outcome {
        changes,
        description: report.summary(),
        train: Some(report),
    })
}
