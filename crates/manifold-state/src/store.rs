//! StateStore: redb-backed persistence for Manifold.
//!
//! The store itself only opens transactions. Reads go through the
//! [`StateRead`] trait, implemented by both snapshot readers and write
//! transactions; mutations go through [`StateWriter`], which must be
//! committed explicitly. Dropping a writer without committing rolls it back.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadTransaction, ReadableDatabase, ReadableTable, WriteTransaction};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        for table in [
            ENVIRONMENTS,
            APPLICATIONS,
            RELEASES,
            DEPLOYMENTS,
            QUEUED,
            ENVIRONMENT_LOCKS,
            GROUP_LOCKS,
            TEAM_LOCKS,
            APPLICATION_LOCKS,
        ] {
            txn.open_table(table).map_err(map_err!(Table))?;
        }
        txn.open_table(EVENTS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Open a consistent read-only snapshot.
    ///
    /// Never blocks on, and never observes, an in-flight writer.
    pub fn begin_read(&self) -> StateResult<StateReader> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        Ok(StateReader { txn })
    }

    /// Begin the single write transaction.
    ///
    /// Blocks while another writer is open on this store.
    pub fn begin_write(&self) -> StateResult<StateWriter> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        Ok(StateWriter { txn })
    }
}

/// Read-only snapshot of the store.
pub struct StateReader {
    txn: ReadTransaction,
}

/// The store's single write transaction.
pub struct StateWriter {
    txn: WriteTransaction,
}

mod sealed {
    use super::*;

    /// Raw byte access shared by readers and writers.
    pub trait RawRead {
        fn get_raw(&self, table: JsonTable, key: &str) -> StateResult<Option<Vec<u8>>>;
        fn scan_raw(&self, table: JsonTable, prefix: &str) -> StateResult<Vec<Vec<u8>>>;
        fn events_raw(&self, after: u64) -> StateResult<Vec<Vec<u8>>>;
        fn last_event_raw(&self) -> StateResult<Option<(u64, Vec<u8>)>>;
    }
}

use sealed::RawRead;

fn get_from<T>(table: &T, key: &str) -> StateResult<Option<Vec<u8>>>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    Ok(table
        .get(key)
        .map_err(map_err!(Read))?
        .map(|guard| guard.value().to_vec()))
}

fn scan_from<T>(table: &T, prefix: &str) -> StateResult<Vec<Vec<u8>>>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    let mut results = Vec::new();
    for entry in table.iter().map_err(map_err!(Read))? {
        let (key, value) = entry.map_err(map_err!(Read))?;
        if key.value().starts_with(prefix) {
            results.push(value.value().to_vec());
        }
    }
    Ok(results)
}

fn events_from<T>(table: &T, after: u64) -> StateResult<Vec<Vec<u8>>>
where
    T: ReadableTable<u64, &'static [u8]>,
{
    let mut results = Vec::new();
    let Some(start) = after.checked_add(1) else {
        return Ok(results);
    };
    for entry in table.range(start..).map_err(map_err!(Read))? {
        let (_, value) = entry.map_err(map_err!(Read))?;
        results.push(value.value().to_vec());
    }
    Ok(results)
}

fn last_from<T>(table: &T) -> StateResult<Option<(u64, Vec<u8>)>>
where
    T: ReadableTable<u64, &'static [u8]>,
{
    Ok(table
        .last()
        .map_err(map_err!(Read))?
        .map(|(key, value)| (key.value(), value.value().to_vec())))
}

impl RawRead for StateReader {
    fn get_raw(&self, table: JsonTable, key: &str) -> StateResult<Option<Vec<u8>>> {
        let table = self.txn.open_table(table).map_err(map_err!(Table))?;
        get_from(&table, key)
    }

    fn scan_raw(&self, table: JsonTable, prefix: &str) -> StateResult<Vec<Vec<u8>>> {
        let table = self.txn.open_table(table).map_err(map_err!(Table))?;
        scan_from(&table, prefix)
    }

    fn events_raw(&self, after: u64) -> StateResult<Vec<Vec<u8>>> {
        let table = self.txn.open_table(EVENTS).map_err(map_err!(Table))?;
        events_from(&table, after)
    }

    fn last_event_raw(&self) -> StateResult<Option<(u64, Vec<u8>)>> {
        let table = self.txn.open_table(EVENTS).map_err(map_err!(Table))?;
        last_from(&table)
    }
}

impl RawRead for StateWriter {
    fn get_raw(&self, table: JsonTable, key: &str) -> StateResult<Option<Vec<u8>>> {
        let table = self.txn.open_table(table).map_err(map_err!(Table))?;
        get_from(&table, key)
    }

    fn scan_raw(&self, table: JsonTable, prefix: &str) -> StateResult<Vec<Vec<u8>>> {
        let table = self.txn.open_table(table).map_err(map_err!(Table))?;
        scan_from(&table, prefix)
    }

    fn events_raw(&self, after: u64) -> StateResult<Vec<Vec<u8>>> {
        let table = self.txn.open_table(EVENTS).map_err(map_err!(Table))?;
        events_from(&table, after)
    }

    fn last_event_raw(&self) -> StateResult<Option<(u64, Vec<u8>)>> {
        let table = self.txn.open_table(EVENTS).map_err(map_err!(Table))?;
        last_from(&table)
    }
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StateResult<T> {
    serde_json::from_slice(bytes).map_err(map_err!(Deserialize))
}

fn decode_opt<T: DeserializeOwned>(bytes: Option<Vec<u8>>) -> StateResult<Option<T>> {
    bytes.map(|b| decode(&b)).transpose()
}

fn decode_all<T: DeserializeOwned>(rows: Vec<Vec<u8>>) -> StateResult<Vec<T>> {
    rows.iter().map(|b| decode(b)).collect()
}

fn lock_table(scope: &LockScope) -> JsonTable {
    match scope {
        LockScope::Environment { .. } => ENVIRONMENT_LOCKS,
        LockScope::EnvironmentGroup { .. } => GROUP_LOCKS,
        LockScope::EnvironmentTeam { .. } => TEAM_LOCKS,
        LockScope::EnvironmentApplication { .. } => APPLICATION_LOCKS,
    }
}

/// Typed reads over the manifest tree, lock tables and event log.
///
/// Implemented by [`StateReader`] (snapshot) and [`StateWriter`] (sees its
/// own uncommitted writes).
pub trait StateRead: RawRead {
    // ── Environments ───────────────────────────────────────────────

    /// Get an environment by name.
    fn environment(&self, name: &str) -> StateResult<Option<Environment>> {
        decode_opt(self.get_raw(ENVIRONMENTS, name)?)
    }

    /// List all environments, ordered by name.
    fn environments(&self) -> StateResult<Vec<Environment>> {
        decode_all(self.scan_raw(ENVIRONMENTS, "")?)
    }

    /// List the environments of a group, ordered by name.
    fn environments_in_group(&self, group: &str) -> StateResult<Vec<Environment>> {
        Ok(self
            .environments()?
            .into_iter()
            .filter(|env| env.config.environment_group.as_deref() == Some(group))
            .collect())
    }

    // ── Applications and releases ──────────────────────────────────

    /// Get an application record by name.
    fn application(&self, name: &str) -> StateResult<Option<Application>> {
        decode_opt(self.get_raw(APPLICATIONS, name)?)
    }

    /// List all applications, ordered by name.
    fn applications(&self) -> StateResult<Vec<Application>> {
        decode_all(self.scan_raw(APPLICATIONS, "")?)
    }

    /// Get one release of an application.
    fn release(&self, application: &str, version: u64) -> StateResult<Option<Release>> {
        decode_opt(self.get_raw(RELEASES, &release_key(application, version))?)
    }

    /// List the releases of an application, ordered by version.
    fn releases(&self, application: &str) -> StateResult<Vec<Release>> {
        decode_all(self.scan_raw(RELEASES, &format!("{application}/"))?)
    }

    /// Highest-numbered release of an application.
    fn latest_release(&self, application: &str) -> StateResult<Option<Release>> {
        Ok(self.releases(application)?.pop())
    }

    // ── Deployments (manifest storage) ─────────────────────────────

    /// Get the deployment of an application on an environment.
    fn deployment(&self, environment: &str, application: &str) -> StateResult<Option<Deployment>> {
        decode_opt(self.get_raw(DEPLOYMENTS, &pair_key(environment, application))?)
    }

    /// Rendered manifest of an (environment, application) pair, if any.
    fn manifest(&self, environment: &str, application: &str) -> StateResult<Option<String>> {
        Ok(self
            .deployment(environment, application)?
            .map(|deployment| deployment.manifest))
    }

    /// List every deployment on an environment, ordered by application.
    fn deployments_on(&self, environment: &str) -> StateResult<Vec<Deployment>> {
        decode_all(self.scan_raw(DEPLOYMENTS, &format!("{environment}/"))?)
    }

    /// List every deployment of an application, ordered by environment.
    fn deployments_of(&self, application: &str) -> StateResult<Vec<Deployment>> {
        let all: Vec<Deployment> = decode_all(self.scan_raw(DEPLOYMENTS, "")?)?;
        Ok(all
            .into_iter()
            .filter(|deployment| deployment.application == application)
            .collect())
    }

    /// Get the queued deployment for a pair, if one is parked.
    fn queued(&self, environment: &str, application: &str) -> StateResult<Option<QueuedDeployment>> {
        decode_opt(self.get_raw(QUEUED, &pair_key(environment, application))?)
    }

    // ── Locks ──────────────────────────────────────────────────────

    /// List every lock held in one scope instance, ordered by lock id.
    fn locks(&self, scope: &LockScope) -> StateResult<Vec<Lock>> {
        decode_all(self.scan_raw(lock_table(scope), &scope.key_prefix())?)
    }

    /// Get a single lock.
    fn lock(&self, scope: &LockScope, lock_id: &str) -> StateResult<Option<Lock>> {
        decode_opt(self.get_raw(lock_table(scope), &scope.lock_key(lock_id))?)
    }

    // ── Event log ──────────────────────────────────────────────────

    /// The most recently appended event.
    fn latest_event(&self) -> StateResult<Option<EslEventRow>> {
        self.last_event_raw()?
            .map(|(_, bytes)| decode(&bytes))
            .transpose()
    }

    /// Events with a sequence strictly greater than `after`, in order.
    fn events_after(&self, after: u64) -> StateResult<Vec<EslEventRow>> {
        decode_all(self.events_raw(after)?)
    }

    /// Either the latest event only, or the whole log.
    fn read_recent_events(&self, all: bool) -> StateResult<Vec<EslEventRow>> {
        if all {
            self.events_after(0)
        } else {
            Ok(self.latest_event()?.into_iter().collect())
        }
    }
}

impl StateRead for StateReader {}
impl StateRead for StateWriter {}

impl StateWriter {
    fn put_json<T: Serialize>(&mut self, table: JsonTable, key: &str, value: &T) -> StateResult<()> {
        let bytes = serde_json::to_vec(value).map_err(map_err!(Serialize))?;
        let mut table = self.txn.open_table(table).map_err(map_err!(Table))?;
        table
            .insert(key, bytes.as_slice())
            .map_err(map_err!(Write))?;
        Ok(())
    }

    fn remove(&mut self, table: JsonTable, key: &str) -> StateResult<bool> {
        let mut table = self.txn.open_table(table).map_err(map_err!(Table))?;
        let existed = table.remove(key).map_err(map_err!(Write))?.is_some();
        Ok(existed)
    }

    // ── Environments ───────────────────────────────────────────────

    /// Insert or update an environment.
    pub fn put_environment(&mut self, env: &Environment) -> StateResult<()> {
        self.put_json(ENVIRONMENTS, &env.name, env)?;
        debug!(environment = %env.name, "environment stored");
        Ok(())
    }

    // ── Applications and releases ──────────────────────────────────

    /// Insert or update an application record.
    pub fn put_application(&mut self, app: &Application) -> StateResult<()> {
        self.put_json(APPLICATIONS, &app.name, app)
    }

    /// Delete an application record. Returns true if it existed.
    pub fn delete_application(&mut self, name: &str) -> StateResult<bool> {
        self.remove(APPLICATIONS, name)
    }

    /// Insert or replace a release.
    pub fn put_release(&mut self, release: &Release) -> StateResult<()> {
        self.put_json(RELEASES, &release.table_key(), release)?;
        debug!(application = %release.application, version = release.version, "release stored");
        Ok(())
    }

    /// Delete a release. Returns true if it existed.
    pub fn delete_release(&mut self, application: &str, version: u64) -> StateResult<bool> {
        self.remove(RELEASES, &release_key(application, version))
    }

    // ── Deployments (manifest storage) ─────────────────────────────

    /// Write the rendered manifest for a pair.
    pub fn put_deployment(&mut self, deployment: &Deployment) -> StateResult<()> {
        self.put_json(DEPLOYMENTS, &deployment.table_key(), deployment)?;
        debug!(
            environment = %deployment.environment,
            application = %deployment.application,
            version = deployment.version,
            "deployment stored"
        );
        Ok(())
    }

    /// Delete the manifest for a pair. Returns true if it existed.
    pub fn delete_deployment(&mut self, environment: &str, application: &str) -> StateResult<bool> {
        self.remove(DEPLOYMENTS, &pair_key(environment, application))
    }

    /// Park a deployment behind a lock, replacing any earlier one for the pair.
    pub fn put_queued(&mut self, queued: &QueuedDeployment) -> StateResult<()> {
        self.put_json(QUEUED, &queued.table_key(), queued)
    }

    /// Drop a parked deployment. Returns true if it existed.
    pub fn delete_queued(&mut self, environment: &str, application: &str) -> StateResult<bool> {
        self.remove(QUEUED, &pair_key(environment, application))
    }

    // ── Locks ──────────────────────────────────────────────────────

    /// Insert a lock, overwriting one with the same id in the same scope.
    pub fn put_lock(&mut self, scope: &LockScope, lock: &Lock) -> StateResult<()> {
        self.put_json(lock_table(scope), &scope.lock_key(&lock.lock_id), lock)?;
        debug!(%scope, lock_id = %lock.lock_id, "lock stored");
        Ok(())
    }

    /// Delete a lock. Returns true if it existed.
    pub fn delete_lock(&mut self, scope: &LockScope, lock_id: &str) -> StateResult<bool> {
        self.remove(lock_table(scope), &scope.lock_key(lock_id))
    }

    // ── Event log ──────────────────────────────────────────────────

    /// Append an event with the next sequence number and return the stored row.
    pub fn append_event(&mut self, event_type: &str, event_json: String) -> StateResult<EslEventRow> {
        let sequence = self.last_event_raw()?.map_or(1, |(seq, _)| seq + 1);
        let row = EslEventRow {
            sequence,
            event_type: event_type.to_string(),
            event_json,
            timestamp: epoch_secs(),
        };
        let bytes = serde_json::to_vec(&row).map_err(map_err!(Serialize))?;
        {
            let mut table = self.txn.open_table(EVENTS).map_err(map_err!(Table))?;
            table
                .insert(sequence, bytes.as_slice())
                .map_err(map_err!(Write))?;
        }
        debug!(sequence, %event_type, "event appended");
        Ok(row)
    }

    // ── Transaction ────────────────────────────────────────────────

    /// Make every write of this transaction visible atomically.
    pub fn commit(self) -> StateResult<()> {
        self.txn.commit().map_err(map_err!(Transaction))
    }

    /// Discard every write of this transaction.
    pub fn abort(self) -> StateResult<()> {
        self.txn.abort().map_err(map_err!(Transaction))
    }
}

/// Current unix time in seconds.
pub fn epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
