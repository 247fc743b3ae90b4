// crates/convoy-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Fleet Store
// Description: Durable FleetStore backed by SQLite WAL.
// Purpose: Persist instances, configs, deployments, and sessions relationally.
// Dependencies: convoy-core, rusqlite, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! This module implements a durable [`FleetStore`] using `SQLite`. All typed
//! operations run behind one full-mutex connection; multi-statement
//! operations (the config-version bump, the terminal-status guard) run in
//! transactions so concurrent callers can never observe torn state.
//! Security posture: database contents are untrusted on load and fail closed
//! on malformed rows.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;

use convoy_core::Config;
use convoy_core::ConfigId;
use convoy_core::ConfigVersion;
use convoy_core::ConfigVersionId;
use convoy_core::Deployment;
use convoy_core::DeploymentId;
use convoy_core::DeploymentProgress;
use convoy_core::DeploymentStatus;
use convoy_core::DeploymentStrategy;
use convoy_core::FleetStore;
use convoy_core::HashDigest;
use convoy_core::Instance;
use convoy_core::InstanceId;
use convoy_core::InstanceStatus;
use convoy_core::LabelSelector;
use convoy_core::SessionRecord;
use convoy_core::StoreError;
use convoy_core::TargetSelector;
use convoy_core::Timestamp;
use convoy_core::UpdateOutcome;
use convoy_core::content_digest;
use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::Transaction;
use rusqlite::params;
use serde::Deserialize;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `synchronous` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` fleet store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `busy_timeout_ms` is interpreted as milliseconds.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

/// Returns the default busy timeout.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Durable [`FleetStore`] backed by `SQLite`.
///
/// # Invariants
/// - All access is serialized through one full-mutex connection.
/// - The on-disk schema version matches [`SCHEMA_VERSION`].
pub struct SqliteFleetStore {
    /// Guarded database connection.
    connection: Mutex<Connection>,
}

impl SqliteFleetStore {
    /// Opens or creates the store at the configured path.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Internal`] when the database cannot be opened or
    /// the schema cannot be initialized.
    pub fn new(config: &SqliteStoreConfig) -> Result<Self, StoreError> {
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(config)?;
        initialize_schema(&mut connection)?;
        Ok(Self {
            connection: Mutex::new(connection),
        })
    }

    /// Locks the connection, mapping poisoning to an internal error.
    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.connection
            .lock()
            .map_err(|_| StoreError::Internal("store mutex poisoned".to_string()))
    }
}

// ============================================================================
// SECTION: Open Helpers
// ============================================================================

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), StoreError> {
    let Some(parent) = path.parent() else {
        return Err(StoreError::Internal("store path missing parent directory".to_string()));
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| StoreError::Internal(err.to_string()))
}

/// Opens an `SQLite` connection with durability pragmas applied.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, StoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags).map_err(db_err)?;
    connection.execute_batch("PRAGMA foreign_keys = ON;").map_err(db_err)?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(db_err)?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(db_err)?;
    connection.busy_timeout(Duration::from_millis(config.busy_timeout_ms)).map_err(db_err)?;
    Ok(connection)
}

/// Initializes the `SQLite` schema or validates the existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), StoreError> {
    let tx = connection.transaction().map_err(db_err)?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(db_err)?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(db_err)?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(db_err)?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS instances (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL UNIQUE,
                    hostname TEXT NOT NULL,
                    agent_version TEXT NOT NULL,
                    worker_version TEXT NOT NULL,
                    labels_json TEXT NOT NULL,
                    capabilities_json TEXT NOT NULL,
                    status TEXT NOT NULL,
                    last_seen INTEGER NOT NULL,
                    applied_config_id TEXT,
                    applied_config_version INTEGER,
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL
                );
                CREATE TABLE IF NOT EXISTS configs (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL UNIQUE,
                    description TEXT,
                    current_version INTEGER NOT NULL,
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL
                );
                CREATE TABLE IF NOT EXISTS config_versions (
                    id TEXT PRIMARY KEY,
                    config_id TEXT NOT NULL,
                    version INTEGER NOT NULL,
                    content TEXT NOT NULL,
                    content_hash TEXT NOT NULL,
                    change_summary TEXT,
                    created_at INTEGER NOT NULL,
                    UNIQUE (config_id, version),
                    FOREIGN KEY (config_id) REFERENCES configs(id) ON DELETE CASCADE
                );
                CREATE INDEX IF NOT EXISTS idx_config_versions_config
                    ON config_versions (config_id, version);
                CREATE TABLE IF NOT EXISTS deployments (
                    id TEXT PRIMARY KEY,
                    config_id TEXT NOT NULL,
                    config_version INTEGER NOT NULL,
                    target_json TEXT NOT NULL,
                    resolved_targets_json TEXT NOT NULL,
                    strategy TEXT NOT NULL,
                    batch_size INTEGER NOT NULL,
                    status TEXT NOT NULL,
                    progress_json TEXT NOT NULL,
                    started_at INTEGER,
                    completed_at INTEGER,
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_deployments_status
                    ON deployments (status);
                CREATE TABLE IF NOT EXISTS agent_sessions (
                    instance_id TEXT PRIMARY KEY,
                    token_salt TEXT NOT NULL,
                    token_digest TEXT NOT NULL,
                    created_at INTEGER NOT NULL,
                    expires_at INTEGER NOT NULL
                );",
            )
            .map_err(db_err)?;
        }
        Some(SCHEMA_VERSION) => {}
        Some(other) => {
            return Err(StoreError::Internal(format!(
                "unsupported store schema version: {other}"
            )));
        }
    }
    tx.commit().map_err(db_err)
}

// ============================================================================
// SECTION: Error Mapping
// ============================================================================

/// Maps a database error to an internal store error.
fn db_err(err: rusqlite::Error) -> StoreError {
    StoreError::Internal(err.to_string())
}

/// Returns true when the error is a uniqueness constraint violation.
fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == ErrorCode::ConstraintViolation
    )
}

// ============================================================================
// SECTION: Value Conversion
// ============================================================================

/// Converts an unsigned count to a database integer.
fn to_db_u64(value: u64) -> Result<i64, StoreError> {
    i64::try_from(value)
        .map_err(|_| StoreError::Internal(format!("value exceeds database range: {value}")))
}

/// Converts an unsigned size to a database integer.
fn to_db_usize(value: usize) -> Result<i64, StoreError> {
    i64::try_from(value)
        .map_err(|_| StoreError::Internal(format!("value exceeds database range: {value}")))
}

/// Converts a database integer to an unsigned count.
fn from_db_u64(value: i64) -> Result<u64, StoreError> {
    u64::try_from(value)
        .map_err(|_| StoreError::Internal(format!("negative value in unsigned column: {value}")))
}

/// Converts a database integer to an unsigned size.
fn from_db_usize(value: i64) -> Result<usize, StoreError> {
    usize::try_from(value)
        .map_err(|_| StoreError::Internal(format!("negative value in unsigned column: {value}")))
}

/// Serializes a value into a JSON text column.
fn to_json<T: serde::Serialize>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|err| StoreError::Internal(err.to_string()))
}

/// Deserializes a JSON text column, failing closed on malformed rows.
fn from_json<T: serde::de::DeserializeOwned>(json: &str) -> Result<T, StoreError> {
    serde_json::from_str(json)
        .map_err(|err| StoreError::Internal(format!("corrupt json column: {err}")))
}

// ============================================================================
// SECTION: Row Mapping
// ============================================================================

/// Intermediate instance row used before JSON columns are parsed.
struct InstanceRow {
    /// Instance identifier.
    id: String,
    /// Unique name.
    name: String,
    /// Reported hostname.
    hostname: String,
    /// Agent build.
    agent_version: String,
    /// Worker build.
    worker_version: String,
    /// Labels JSON column.
    labels_json: String,
    /// Capabilities JSON column.
    capabilities_json: String,
    /// Status label.
    status: String,
    /// Last-seen millis.
    last_seen: i64,
    /// Applied config id, if any.
    applied_config_id: Option<String>,
    /// Applied config version, if any.
    applied_config_version: Option<i64>,
    /// Created millis.
    created_at: i64,
    /// Updated millis.
    updated_at: i64,
}

/// Reads an instance row from a query result.
fn read_instance_row(row: &Row<'_>) -> rusqlite::Result<InstanceRow> {
    Ok(InstanceRow {
        id: row.get(0)?,
        name: row.get(1)?,
        hostname: row.get(2)?,
        agent_version: row.get(3)?,
        worker_version: row.get(4)?,
        labels_json: row.get(5)?,
        capabilities_json: row.get(6)?,
        status: row.get(7)?,
        last_seen: row.get(8)?,
        applied_config_id: row.get(9)?,
        applied_config_version: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

/// Converts an instance row into the domain type.
fn instance_from_row(row: InstanceRow) -> Result<Instance, StoreError> {
    let labels: BTreeMap<String, String> = from_json(&row.labels_json)?;
    let capabilities: BTreeSet<String> = from_json(&row.capabilities_json)?;
    let status = InstanceStatus::parse(&row.status)
        .ok_or_else(|| StoreError::Internal(format!("unknown instance status: {}", row.status)))?;
    let applied_config_version =
        row.applied_config_version.map(from_db_u64).transpose()?;
    Ok(Instance {
        id: InstanceId::new(row.id),
        name: row.name,
        hostname: row.hostname,
        agent_version: row.agent_version,
        worker_version: row.worker_version,
        labels,
        capabilities,
        status,
        last_seen: Timestamp::from_unix_millis(row.last_seen),
        applied_config_id: row.applied_config_id.map(ConfigId::new),
        applied_config_version,
        created_at: Timestamp::from_unix_millis(row.created_at),
        updated_at: Timestamp::from_unix_millis(row.updated_at),
    })
}

/// Reads a config row from a query result.
fn config_from_row(row: &Row<'_>) -> rusqlite::Result<(Config, i64)> {
    let current_version: i64 = row.get(3)?;
    Ok((
        Config {
            id: ConfigId::new(row.get::<_, String>(0)?),
            name: row.get(1)?,
            description: row.get(2)?,
            current_version: 0,
            created_at: Timestamp::from_unix_millis(row.get(4)?),
            updated_at: Timestamp::from_unix_millis(row.get(5)?),
        },
        current_version,
    ))
}

/// Finishes config conversion with checked version arithmetic.
fn finish_config(parts: (Config, i64)) -> Result<Config, StoreError> {
    let (mut config, current_version) = parts;
    config.current_version = from_db_u64(current_version)?;
    Ok(config)
}

/// Reads a config version row from a query result.
fn config_version_from_row(row: &Row<'_>) -> rusqlite::Result<(ConfigVersion, i64)> {
    let version: i64 = row.get(2)?;
    Ok((
        ConfigVersion {
            id: ConfigVersionId::new(row.get::<_, String>(0)?),
            config_id: ConfigId::new(row.get::<_, String>(1)?),
            version: 0,
            content: row.get(3)?,
            content_hash: HashDigest::from_hex(row.get::<_, String>(4)?),
            change_summary: row.get(5)?,
            created_at: Timestamp::from_unix_millis(row.get(6)?),
        },
        version,
    ))
}

/// Finishes config-version conversion with checked version arithmetic.
fn finish_config_version(parts: (ConfigVersion, i64)) -> Result<ConfigVersion, StoreError> {
    let (mut row, version) = parts;
    row.version = from_db_u64(version)?;
    Ok(row)
}

/// Intermediate deployment row used before JSON columns are parsed.
struct DeploymentRow {
    /// Deployment identifier.
    id: String,
    /// Config identifier.
    config_id: String,
    /// Bound config version.
    config_version: i64,
    /// Original target selection JSON column.
    target_json: String,
    /// Resolved target list JSON column.
    resolved_targets_json: String,
    /// Strategy label.
    strategy: String,
    /// Normalized batch size.
    batch_size: i64,
    /// Status label.
    status: String,
    /// Progress JSON column.
    progress_json: String,
    /// Start millis, if started.
    started_at: Option<i64>,
    /// Completion millis, if terminal.
    completed_at: Option<i64>,
    /// Created millis.
    created_at: i64,
    /// Updated millis.
    updated_at: i64,
}

/// Reads a deployment row from a query result.
fn read_deployment_row(row: &Row<'_>) -> rusqlite::Result<DeploymentRow> {
    Ok(DeploymentRow {
        id: row.get(0)?,
        config_id: row.get(1)?,
        config_version: row.get(2)?,
        target_json: row.get(3)?,
        resolved_targets_json: row.get(4)?,
        strategy: row.get(5)?,
        batch_size: row.get(6)?,
        status: row.get(7)?,
        progress_json: row.get(8)?,
        started_at: row.get(9)?,
        completed_at: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

/// Converts a deployment row into the domain type.
fn deployment_from_row(row: DeploymentRow) -> Result<Deployment, StoreError> {
    let target: TargetSelector = from_json(&row.target_json)?;
    let resolved_targets: Vec<InstanceId> = from_json(&row.resolved_targets_json)?;
    let progress: DeploymentProgress = from_json(&row.progress_json)?;
    let strategy = DeploymentStrategy::parse(&row.strategy).ok_or_else(|| {
        StoreError::Internal(format!("unknown deployment strategy: {}", row.strategy))
    })?;
    let status = DeploymentStatus::parse(&row.status).ok_or_else(|| {
        StoreError::Internal(format!("unknown deployment status: {}", row.status))
    })?;
    Ok(Deployment {
        id: DeploymentId::new(row.id),
        config_id: ConfigId::new(row.config_id),
        config_version: from_db_u64(row.config_version)?,
        target,
        resolved_targets,
        strategy,
        batch_size: from_db_usize(row.batch_size)?,
        status,
        progress,
        started_at: row.started_at.map(Timestamp::from_unix_millis),
        completed_at: row.completed_at.map(Timestamp::from_unix_millis),
        created_at: Timestamp::from_unix_millis(row.created_at),
        updated_at: Timestamp::from_unix_millis(row.updated_at),
    })
}

/// Column list shared by instance queries.
const INSTANCE_COLUMNS: &str = "id, name, hostname, agent_version, worker_version, labels_json, \
                                capabilities_json, status, last_seen, applied_config_id, \
                                applied_config_version, created_at, updated_at";

/// Column list shared by deployment queries.
const DEPLOYMENT_COLUMNS: &str = "id, config_id, config_version, target_json, \
                                  resolved_targets_json, strategy, batch_size, status, \
                                  progress_json, started_at, completed_at, created_at, updated_at";

// ============================================================================
// SECTION: FleetStore Implementation
// ============================================================================

impl FleetStore for SqliteFleetStore {
    fn upsert_instance(&self, instance: &Instance) -> Result<(), StoreError> {
        let guard = self.lock()?;
        let labels_json = to_json(&instance.labels)?;
        let capabilities_json = to_json(&instance.capabilities)?;
        let applied_config_version =
            instance.applied_config_version.map(to_db_u64).transpose()?;
        let result = guard.execute(
            "INSERT INTO instances (id, name, hostname, agent_version, worker_version, \
             labels_json, capabilities_json, status, last_seen, applied_config_id, \
             applied_config_version, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, \
             ?8, ?9, ?10, ?11, ?12, ?13) ON CONFLICT(id) DO UPDATE SET name = excluded.name, \
             hostname = excluded.hostname, agent_version = excluded.agent_version, \
             worker_version = excluded.worker_version, labels_json = excluded.labels_json, \
             capabilities_json = excluded.capabilities_json, status = excluded.status, last_seen \
             = excluded.last_seen, applied_config_id = excluded.applied_config_id, \
             applied_config_version = excluded.applied_config_version, updated_at = \
             excluded.updated_at",
            params![
                instance.id.as_str(),
                instance.name,
                instance.hostname,
                instance.agent_version,
                instance.worker_version,
                labels_json,
                capabilities_json,
                instance.status.as_str(),
                instance.last_seen.unix_millis(),
                instance.applied_config_id.as_ref().map(ConfigId::as_str),
                applied_config_version,
                instance.created_at.unix_millis(),
                instance.updated_at.unix_millis(),
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(StoreError::AlreadyExists(format!(
                "instance name already in use: {}",
                instance.name
            ))),
            Err(err) => Err(db_err(err)),
        }
    }

    fn get_instance(&self, id: &InstanceId) -> Result<Option<Instance>, StoreError> {
        let guard = self.lock()?;
        let row = guard
            .query_row(
                &format!("SELECT {INSTANCE_COLUMNS} FROM instances WHERE id = ?1"),
                params![id.as_str()],
                read_instance_row,
            )
            .optional()
            .map_err(db_err)?;
        row.map(instance_from_row).transpose()
    }

    fn list_instances(&self) -> Result<Vec<Instance>, StoreError> {
        let guard = self.lock()?;
        let mut statement = guard
            .prepare(&format!("SELECT {INSTANCE_COLUMNS} FROM instances ORDER BY id"))
            .map_err(db_err)?;
        let rows = statement
            .query_map(params![], read_instance_row)
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;
        rows.into_iter().map(instance_from_row).collect()
    }

    fn update_instance_status(
        &self,
        id: &InstanceId,
        status: InstanceStatus,
        last_seen: Timestamp,
    ) -> Result<(), StoreError> {
        let guard = self.lock()?;
        let changed = guard
            .execute(
                "UPDATE instances SET status = ?2, last_seen = ?3, updated_at = ?3 WHERE id = ?1",
                params![id.as_str(), status.as_str(), last_seen.unix_millis()],
            )
            .map_err(db_err)?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("instance: {id}")));
        }
        Ok(())
    }

    fn update_instance_applied_config(
        &self,
        id: &InstanceId,
        config_id: &ConfigId,
        version: u64,
        at: Timestamp,
    ) -> Result<(), StoreError> {
        let guard = self.lock()?;
        let changed = guard
            .execute(
                "UPDATE instances SET applied_config_id = ?2, applied_config_version = ?3, \
                 updated_at = ?4 WHERE id = ?1",
                params![
                    id.as_str(),
                    config_id.as_str(),
                    to_db_u64(version)?,
                    at.unix_millis()
                ],
            )
            .map_err(db_err)?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("instance: {id}")));
        }
        Ok(())
    }

    fn instances_matching_labels(
        &self,
        selector: &LabelSelector,
    ) -> Result<Vec<InstanceId>, StoreError> {
        let guard = self.lock()?;
        let mut statement =
            guard.prepare("SELECT id, labels_json FROM instances ORDER BY id").map_err(db_err)?;
        let rows = statement
            .query_map(params![], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;
        let mut matched = Vec::new();
        for (id, labels_json) in rows {
            let labels: BTreeMap<String, String> = from_json(&labels_json)?;
            if selector.matches(&labels) {
                matched.push(InstanceId::new(id));
            }
        }
        Ok(matched)
    }

    fn create_config(&self, config: &Config) -> Result<(), StoreError> {
        let guard = self.lock()?;
        let result = guard.execute(
            "INSERT INTO configs (id, name, description, current_version, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                config.id.as_str(),
                config.name,
                config.description,
                to_db_u64(config.current_version)?,
                config.created_at.unix_millis(),
                config.updated_at.unix_millis(),
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(StoreError::AlreadyExists(format!(
                "config id or name already in use: {}",
                config.name
            ))),
            Err(err) => Err(db_err(err)),
        }
    }

    fn get_config(&self, id: &ConfigId) -> Result<Option<Config>, StoreError> {
        let guard = self.lock()?;
        let row = guard
            .query_row(
                "SELECT id, name, description, current_version, created_at, updated_at FROM \
                 configs WHERE id = ?1",
                params![id.as_str()],
                config_from_row,
            )
            .optional()
            .map_err(db_err)?;
        row.map(finish_config).transpose()
    }

    fn get_config_by_name(&self, name: &str) -> Result<Option<Config>, StoreError> {
        let guard = self.lock()?;
        let row = guard
            .query_row(
                "SELECT id, name, description, current_version, created_at, updated_at FROM \
                 configs WHERE name = ?1",
                params![name],
                config_from_row,
            )
            .optional()
            .map_err(db_err)?;
        row.map(finish_config).transpose()
    }

    fn create_config_version(
        &self,
        config_id: &ConfigId,
        content: &str,
        change_summary: Option<&str>,
        at: Timestamp,
    ) -> Result<ConfigVersion, StoreError> {
        let mut guard = self.lock()?;
        let tx = guard.transaction().map_err(db_err)?;
        let current: Option<i64> = tx
            .query_row(
                "SELECT current_version FROM configs WHERE id = ?1",
                params![config_id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        let Some(current) = current else {
            return Err(StoreError::NotFound(format!("config: {config_id}")));
        };
        let next = current
            .checked_add(1)
            .ok_or_else(|| StoreError::Internal(format!("version overflow for {config_id}")))?;
        tx.execute(
            "UPDATE configs SET current_version = ?2, updated_at = ?3 WHERE id = ?1",
            params![config_id.as_str(), next, at.unix_millis()],
        )
        .map_err(db_err)?;
        let row = ConfigVersion {
            id: ConfigVersionId::new(format!("{config_id}:{next}")),
            config_id: config_id.clone(),
            version: from_db_u64(next)?,
            content: content.to_string(),
            content_hash: content_digest(content.as_bytes()),
            change_summary: change_summary.map(ToString::to_string),
            created_at: at,
        };
        tx.execute(
            "INSERT INTO config_versions (id, config_id, version, content, content_hash, \
             change_summary, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                row.id.as_str(),
                row.config_id.as_str(),
                next,
                row.content,
                row.content_hash.as_str(),
                row.change_summary,
                row.created_at.unix_millis(),
            ],
        )
        .map_err(db_err)?;
        tx.commit().map_err(db_err)?;
        Ok(row)
    }

    fn get_config_version(
        &self,
        config_id: &ConfigId,
        version: u64,
    ) -> Result<Option<ConfigVersion>, StoreError> {
        let guard = self.lock()?;
        let row = guard
            .query_row(
                "SELECT id, config_id, version, content, content_hash, change_summary, \
                 created_at FROM config_versions WHERE config_id = ?1 AND version = ?2",
                params![config_id.as_str(), to_db_u64(version)?],
                config_version_from_row,
            )
            .optional()
            .map_err(db_err)?;
        row.map(finish_config_version).transpose()
    }

    fn latest_config_version(
        &self,
        config_id: &ConfigId,
    ) -> Result<Option<ConfigVersion>, StoreError> {
        let guard = self.lock()?;
        let row = guard
            .query_row(
                "SELECT id, config_id, version, content, content_hash, change_summary, \
                 created_at FROM config_versions WHERE config_id = ?1 ORDER BY version DESC \
                 LIMIT 1",
                params![config_id.as_str()],
                config_version_from_row,
            )
            .optional()
            .map_err(db_err)?;
        row.map(finish_config_version).transpose()
    }

    fn create_deployment(&self, deployment: &Deployment) -> Result<(), StoreError> {
        let guard = self.lock()?;
        let result = guard.execute(
            "INSERT INTO deployments (id, config_id, config_version, target_json, \
             resolved_targets_json, strategy, batch_size, status, progress_json, started_at, \
             completed_at, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, \
             ?10, ?11, ?12, ?13)",
            params![
                deployment.id.as_str(),
                deployment.config_id.as_str(),
                to_db_u64(deployment.config_version)?,
                to_json(&deployment.target)?,
                to_json(&deployment.resolved_targets)?,
                deployment.strategy.as_str(),
                to_db_usize(deployment.batch_size)?,
                deployment.status.as_str(),
                to_json(&deployment.progress)?,
                deployment.started_at.map(Timestamp::unix_millis),
                deployment.completed_at.map(Timestamp::unix_millis),
                deployment.created_at.unix_millis(),
                deployment.updated_at.unix_millis(),
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => {
                Err(StoreError::AlreadyExists(format!("deployment: {}", deployment.id)))
            }
            Err(err) => Err(db_err(err)),
        }
    }

    fn get_deployment(&self, id: &DeploymentId) -> Result<Option<Deployment>, StoreError> {
        let guard = self.lock()?;
        let row = guard
            .query_row(
                &format!("SELECT {DEPLOYMENT_COLUMNS} FROM deployments WHERE id = ?1"),
                params![id.as_str()],
                read_deployment_row,
            )
            .optional()
            .map_err(db_err)?;
        row.map(deployment_from_row).transpose()
    }

    fn list_deployments_with_status(
        &self,
        statuses: &[DeploymentStatus],
    ) -> Result<Vec<Deployment>, StoreError> {
        let guard = self.lock()?;
        let mut statement = guard
            .prepare(&format!(
                "SELECT {DEPLOYMENT_COLUMNS} FROM deployments ORDER BY created_at"
            ))
            .map_err(db_err)?;
        let rows = statement
            .query_map(params![], read_deployment_row)
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;
        let mut matched = Vec::new();
        for row in rows {
            let deployment = deployment_from_row(row)?;
            if statuses.contains(&deployment.status) {
                matched.push(deployment);
            }
        }
        Ok(matched)
    }

    fn update_deployment_status(
        &self,
        id: &DeploymentId,
        status: DeploymentStatus,
        at: Timestamp,
    ) -> Result<UpdateOutcome, StoreError> {
        let mut guard = self.lock()?;
        let tx = guard.transaction().map_err(db_err)?;
        let Some(current) = current_status(&tx, id)? else {
            return Err(StoreError::NotFound(format!("deployment: {id}")));
        };
        if current.is_terminal() {
            return Ok(UpdateOutcome::AlreadyTerminal);
        }
        tx.execute(
            "UPDATE deployments SET status = ?2, updated_at = ?3, started_at = CASE WHEN ?2 = \
             'in_progress' AND started_at IS NULL THEN ?3 ELSE started_at END, completed_at = \
             CASE WHEN ?4 THEN ?3 ELSE completed_at END WHERE id = ?1",
            params![id.as_str(), status.as_str(), at.unix_millis(), status.is_terminal()],
        )
        .map_err(db_err)?;
        tx.commit().map_err(db_err)?;
        Ok(UpdateOutcome::Applied)
    }

    fn update_deployment_progress(
        &self,
        id: &DeploymentId,
        progress: &DeploymentProgress,
        at: Timestamp,
    ) -> Result<UpdateOutcome, StoreError> {
        let mut guard = self.lock()?;
        let tx = guard.transaction().map_err(db_err)?;
        let Some(current) = current_status(&tx, id)? else {
            return Err(StoreError::NotFound(format!("deployment: {id}")));
        };
        if current.is_terminal() {
            return Ok(UpdateOutcome::AlreadyTerminal);
        }
        tx.execute(
            "UPDATE deployments SET progress_json = ?2, updated_at = ?3 WHERE id = ?1",
            params![id.as_str(), to_json(progress)?, at.unix_millis()],
        )
        .map_err(db_err)?;
        tx.commit().map_err(db_err)?;
        Ok(UpdateOutcome::Applied)
    }

    fn put_session(&self, session: &SessionRecord) -> Result<(), StoreError> {
        let guard = self.lock()?;
        guard
            .execute(
                "INSERT INTO agent_sessions (instance_id, token_salt, token_digest, created_at, \
                 expires_at) VALUES (?1, ?2, ?3, ?4, ?5) ON CONFLICT(instance_id) DO UPDATE SET \
                 token_salt = excluded.token_salt, token_digest = excluded.token_digest, \
                 created_at = excluded.created_at, expires_at = excluded.expires_at",
                params![
                    session.instance_id.as_str(),
                    session.token_salt,
                    session.token_digest.as_str(),
                    session.created_at.unix_millis(),
                    session.expires_at.unix_millis(),
                ],
            )
            .map_err(db_err)?;
        Ok(())
    }

    fn get_session(&self, instance_id: &InstanceId) -> Result<Option<SessionRecord>, StoreError> {
        let guard = self.lock()?;
        guard
            .query_row(
                "SELECT instance_id, token_salt, token_digest, created_at, expires_at FROM \
                 agent_sessions WHERE instance_id = ?1",
                params![instance_id.as_str()],
                |row| {
                    Ok(SessionRecord {
                        instance_id: InstanceId::new(row.get::<_, String>(0)?),
                        token_salt: row.get(1)?,
                        token_digest: HashDigest::from_hex(row.get::<_, String>(2)?),
                        created_at: Timestamp::from_unix_millis(row.get(3)?),
                        expires_at: Timestamp::from_unix_millis(row.get(4)?),
                    })
                },
            )
            .optional()
            .map_err(db_err)
    }

    fn delete_session(&self, instance_id: &InstanceId) -> Result<(), StoreError> {
        let guard = self.lock()?;
        guard
            .execute(
                "DELETE FROM agent_sessions WHERE instance_id = ?1",
                params![instance_id.as_str()],
            )
            .map_err(db_err)?;
        Ok(())
    }

    fn readiness(&self) -> Result<(), StoreError> {
        let guard = self.lock()?;
        guard
            .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| {
                row.get::<_, i64>(0)
            })
            .map_err(db_err)?;
        Ok(())
    }
}

/// Reads the current status of a deployment inside a transaction.
fn current_status(
    tx: &Transaction<'_>,
    id: &DeploymentId,
) -> Result<Option<DeploymentStatus>, StoreError> {
    let label: Option<String> = tx
        .query_row("SELECT status FROM deployments WHERE id = ?1", params![id.as_str()], |row| {
            row.get(0)
        })
        .optional()
        .map_err(db_err)?;
    label
        .map(|label| {
            DeploymentStatus::parse(&label)
                .ok_or_else(|| StoreError::Internal(format!("unknown deployment status: {label}")))
        })
        .transpose()
}
