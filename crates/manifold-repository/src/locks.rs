//! Lock hierarchy: which locks block a deploy.
//!
//! A deploy-class operation on `(environment, application)` is blocked by any
//! lock in the environment's group, on the environment itself, on the
//! application's team in that environment, or on the application in that
//! environment.

use std::fmt;

use serde::Serialize;

use manifold_state::{Lock, LockScope, StateRead, StateResult};

/// The resolved target of a deploy-class operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockTarget {
    pub environment: String,
    pub application: String,
    pub team: Option<String>,
    pub group: Option<String>,
}

impl LockTarget {
    /// Look up the group of `environment` and the team of `application`.
    pub fn resolve(reader: &impl StateRead, environment: &str, application: &str) -> StateResult<Self> {
        let group = reader
            .environment(environment)?
            .and_then(|env| env.config.environment_group);
        let team = reader.application(application)?.and_then(|app| app.team);
        Ok(Self {
            environment: environment.to_string(),
            application: application.to_string(),
            team,
            group,
        })
    }

    /// Every scope whose locks apply to this target, widest first.
    pub fn probes(&self) -> Vec<LockScope> {
        let mut probes = Vec::with_capacity(4);
        if let Some(group) = &self.group {
            probes.push(LockScope::EnvironmentGroup {
                group: group.clone(),
            });
        }
        probes.push(LockScope::Environment {
            environment: self.environment.clone(),
        });
        if let Some(team) = &self.team {
            probes.push(LockScope::EnvironmentTeam {
                environment: self.environment.clone(),
                team: team.clone(),
            });
        }
        probes.push(LockScope::EnvironmentApplication {
            environment: self.environment.clone(),
            application: self.application.clone(),
        });
        probes
    }
}

/// A lock that blocks a target, together with the scope it was found in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockingLock {
    pub scope: LockScope,
    pub lock: Lock,
}

impl fmt::Display for BlockingLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {}", self.lock.lock_id, self.scope)?;
        if !self.lock.message.is_empty() {
            write!(f, " ({})", self.lock.message)?;
        }
        Ok(())
    }
}

/// Collect every lock blocking `target`. Empty means the target is free.
pub fn blocking_locks(reader: &impl StateRead, target: &LockTarget) -> StateResult<Vec<BlockingLock>> {
    let mut blocking = Vec::new();
    for scope in target.probes() {
        for lock in reader.locks(&scope)? {
            blocking.push(BlockingLock {
                scope: scope.clone(),
                lock,
            });
        }
    }
    Ok(blocking)
}

/// Render locks for error messages and change descriptions.
pub fn describe(locks: &[BlockingLock]) -> String {
    locks
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
