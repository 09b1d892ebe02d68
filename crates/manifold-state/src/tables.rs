//! redb table definitions for the Manifold state store.
//!
//! Tables use `&str` keys and `&[u8]` values (JSON-serialized domain types),
//! except the event log which is keyed by its sequence number.
//! Every segment but the last never contains `/` (enforced by the
//! transformer layer), so `{prefix}/` scans are exact. Lock ids are always
//! the last segment and may contain anything.

use redb::TableDefinition;

/// Definition of a string-keyed JSON table.
pub type JsonTable = TableDefinition<'static, &'static str, &'static [u8]>;

/// Environment configs keyed by `{environment}`.
pub const ENVIRONMENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("environments");

/// Application records keyed by `{application}`.
pub const APPLICATIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("applications");

/// Immutable releases keyed by `{application}/{version:020}`.
pub const RELEASES: TableDefinition<&str, &[u8]> = TableDefinition::new("releases");

/// Deployed manifests keyed by `{environment}/{application}`.
pub const DEPLOYMENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("deployments");

/// Deployments parked behind a lock, keyed by `{environment}/{application}`.
pub const QUEUED: TableDefinition<&str, &[u8]> = TableDefinition::new("queued_deployments");

/// Environment locks keyed by `{environment}/{lock_id}`.
pub const ENVIRONMENT_LOCKS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("environment_locks");

/// Environment-group locks keyed by `{group}/{lock_id}`.
pub const GROUP_LOCKS: TableDefinition<&str, &[u8]> = TableDefinition::new("group_locks");

/// Team locks keyed by `{environment}/{team}/{lock_id}`.
pub const TEAM_LOCKS: TableDefinition<&str, &[u8]> = TableDefinition::new("team_locks");

/// Application locks keyed by `{environment}/{application}/{lock_id}`.
pub const APPLICATION_LOCKS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("application_locks");

/// Event-sourcing log keyed by sequence number.
pub const EVENTS: TableDefinition<u64, &[u8]> = TableDefinition::new("esl_events");
