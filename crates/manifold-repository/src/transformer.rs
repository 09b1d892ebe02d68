//! Transformer variants: the closed set of change operations.
//!
//! Every variant is a plain payload struct whose serde representation is
//! exactly the JSON stored in the event log. The [`Transformer`] enum and the
//! [`EventType`] discriminator are generated together by
//! `define_transformers!`, so a variant cannot exist without its event type
//! and both directions of the mapping.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use manifold_state::{Authentication, EnvironmentConfig, LockScope, TrainSource};

// ── Payloads ──────────────────────────────────────────────────────

/// Create an environment, or update the config of an existing one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateEnvironment {
    pub environment: String,
    #[serde(default)]
    pub config: EnvironmentConfig,
    pub authentication: Authentication,
}

/// Register a new immutable release. Does not deploy it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateApplicationVersion {
    pub application: String,
    pub version: u64,
    /// Rendered manifest per environment name.
    pub manifests: BTreeMap<String, String>,
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub source_commit_id: String,
    #[serde(default)]
    pub source_author: String,
    #[serde(default)]
    pub source_message: String,
    #[serde(default)]
    pub source_repo_url: String,
    #[serde(default)]
    pub display_version: String,
    pub authentication: Authentication,
}

/// What a deploy does when the target is locked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockBehaviour {
    /// Reject the deploy with a `Locked` error.
    #[default]
    Fail,
    /// Park the request as a queued deployment.
    Record,
    /// Deploy regardless of locks.
    Ignore,
}

/// Deploy an existing release onto one environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployApplicationVersion {
    pub environment: String,
    pub application: String,
    pub version: u64,
    #[serde(default)]
    pub lock_behaviour: LockBehaviour,
    /// Set when a release train issued this deploy.
    #[serde(default)]
    pub source_train: Option<TrainSource>,
    #[serde(default)]
    pub author: Option<String>,
    pub authentication: Authentication,
}

/// Create the release that removes an application everywhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateUndeployApplicationVersion {
    pub application: String,
    pub authentication: Authentication,
}

/// Remove an application whose undeploy release is rolled out everywhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndeployApplication {
    pub application: String,
    pub authentication: Authentication,
}

/// Remove one environment from an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteEnvFromApp {
    pub application: String,
    pub environment: String,
    pub authentication: Authentication,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateEnvironmentLock {
    pub environment: String,
    pub lock_id: String,
    #[serde(default)]
    pub message: String,
    pub authentication: Authentication,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteEnvironmentLock {
    pub environment: String,
    pub lock_id: String,
    pub authentication: Authentication,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateEnvironmentTeamLock {
    pub environment: String,
    pub team: String,
    pub lock_id: String,
    #[serde(default)]
    pub message: String,
    pub authentication: Authentication,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteEnvironmentTeamLock {
    pub environment: String,
    pub team: String,
    pub lock_id: String,
    pub authentication: Authentication,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateEnvironmentGroupLock {
    pub environment_group: String,
    pub lock_id: String,
    #[serde(default)]
    pub message: String,
    pub authentication: Authentication,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteEnvironmentGroupLock {
    pub environment_group: String,
    pub lock_id: String,
    pub authentication: Authentication,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateEnvironmentApplicationLock {
    pub environment: String,
    pub application: String,
    pub lock_id: String,
    #[serde(default)]
    pub message: String,
    pub authentication: Authentication,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteEnvironmentApplicationLock {
    pub environment: String,
    pub application: String,
    pub lock_id: String,
    pub authentication: Authentication,
}

/// Promote versions from each target environment's upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseTrain {
    /// An environment name, or else an environment group name.
    pub target: String,
    /// Only move applications owned by this team.
    #[serde(default)]
    pub team: Option<String>,
    pub authentication: Authentication,
}

// ── Lock scopes ───────────────────────────────────────────────────

impl CreateEnvironmentLock {
    pub fn scope(&self) -> LockScope {
        LockScope::Environment {
            environment: self.environment.clone(),
        }
    }
}

impl DeleteEnvironmentLock {
    pub fn scope(&self) -> LockScope {
        LockScope::Environment {
            environment: self.environment.clone(),
        }
    }
}

impl CreateEnvironmentTeamLock {
    pub fn scope(&self) -> LockScope {
        LockScope::EnvironmentTeam {
            environment: self.environment.clone(),
            team: self.team.clone(),
        }
    }
}

impl DeleteEnvironmentTeamLock {
    pub fn scope(&self) -> LockScope {
        LockScope::EnvironmentTeam {
            environment: self.environment.clone(),
            team: self.team.clone(),
        }
    }
}

impl CreateEnvironmentGroupLock {
    pub fn scope(&self) -> LockScope {
        LockScope::EnvironmentGroup {
            group: self.environment_group.clone(),
        }
    }
}

impl DeleteEnvironmentGroupLock {
    pub fn scope(&self) -> LockScope {
        LockScope::EnvironmentGroup {
            group: self.environment_group.clone(),
        }
    }
}

impl CreateEnvironmentApplicationLock {
    pub fn scope(&self) -> LockScope {
        LockScope::EnvironmentApplication {
            environment: self.environment.clone(),
            application: self.application.clone(),
        }
    }
}

impl DeleteEnvironmentApplicationLock {
    pub fn scope(&self) -> LockScope {
        LockScope::EnvironmentApplication {
            environment: self.environment.clone(),
            application: self.application.clone(),
        }
    }
}

// ── Enum + discriminator ──────────────────────────────────────────

macro_rules! define_transformers {
    ($($variant:ident),+ $(,)?) => {
        /// A change operation. Immutable once constructed.
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub enum Transformer {
            $($variant($variant),)+
        }

        /// Discriminator stored next to each encoded transformer.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum EventType {
            $($variant,)+
        }

        impl EventType {
            /// Every event type, in declaration order.
            pub const ALL: &'static [EventType] = &[$(EventType::$variant,)+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $(EventType::$variant => stringify!($variant),)+
                }
            }
        }

        impl FromStr for EventType {
            type Err = UnknownEventType;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $(stringify!($variant) => Ok(EventType::$variant),)+
                    other => Err(UnknownEventType(other.to_string())),
                }
            }
        }

        impl Transformer {
            pub fn event_type(&self) -> EventType {
                match self {
                    $(Transformer::$variant(_) => EventType::$variant,)+
                }
            }

            /// Identity of whoever requested this change.
            pub fn authentication(&self) -> &Authentication {
                match self {
                    $(Transformer::$variant(t) => &t.authentication,)+
                }
            }

            /// Serialize the payload (without discriminator).
            pub(crate) fn payload_json(&self) -> serde_json::Result<String> {
                match self {
                    $(Transformer::$variant(t) => serde_json::to_string(t),)+
                }
            }

            /// Deserialize the payload selected by `event_type`.
            pub(crate) fn from_payload_json(
                event_type: EventType,
                json: &str,
            ) -> serde_json::Result<Self> {
                match event_type {
                    $(EventType::$variant => {
                        serde_json::from_str::<$variant>(json).map(Transformer::$variant)
                    })+
                }
            }
        }

        $(
            impl From<$variant> for Transformer {
                fn from(t: $variant) -> Self {
                    Transformer::$variant(t)
                }
            }
        )+
    };
}

define_transformers! {
    CreateEnvironment,
    CreateApplicationVersion,
    DeployApplicationVersion,
    CreateUndeployApplicationVersion,
    UndeployApplication,
    DeleteEnvFromApp,
    CreateEnvironmentLock,
    DeleteEnvironmentLock,
    CreateEnvironmentTeamLock,
    DeleteEnvironmentTeamLock,
    CreateEnvironmentGroupLock,
    DeleteEnvironmentGroupLock,
    CreateEnvironmentApplicationLock,
    DeleteEnvironmentApplicationLock,
    ReleaseTrain,
}

/// An event type string no variant answers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEventType(pub String);

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
