//! The workspace store handle.
//!
//! One [`WorkspaceStore`] per workspace, owned by the caller and passed to
//! whatever view models need it; its lifecycle is tied to the active
//! workspace, never to the process.

use super::connection::{
    acquire_lock, configure_connection, op_failed, record_operation_metrics,
};
use super::schema::run_migrations;
use crate::config::{StoreConfig, WorkspaceConfig};
use crate::models::{EntityId, EntityKind};
use crate::{Error, Result};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

/// Handle to one workspace's persisted hierarchy.
///
/// # Concurrency Model
///
/// Uses a `Mutex<Connection>` for thread-safe access; WAL mode and the
/// `busy_timeout` pragma keep contention graceful:
///
/// - **WAL mode**: concurrent readers alongside the single writer
/// - **`busy_timeout`**: bounded wait on a held lock, then fail
/// - **NORMAL synchronous**: balances durability with performance
///
/// Write operations are serialized and each runs inside exactly one
/// `BEGIN IMMEDIATE` transaction; a cascade or purge is never partially
/// applied. Callers are expected to invoke the store from a background
/// execution context; nothing here blocks a UI thread by design of the
/// caller, not of the store.
pub struct WorkspaceStore {
    /// Connection to the workspace database.
    ///
    /// Protected by `Mutex` because `rusqlite::Connection` is not `Sync`.
    conn: Mutex<Connection>,
    /// Path to the database file (`None` for in-memory).
    db_path: Option<PathBuf>,
}

impl WorkspaceStore {
    /// Opens (or creates) a workspace database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// use atelier::WorkspaceStore;
    ///
    /// let store = WorkspaceStore::open("./workspace.db")?;
    /// # Ok::<(), atelier::Error>(())
    /// ```
    pub fn open(db_path: impl Into<PathBuf>) -> Result<Self> {
        Self::open_with_config(db_path, &StoreConfig::default())
    }

    /// Opens a workspace database with explicit connection tuning.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open_with_config(db_path: impl Into<PathBuf>, config: &StoreConfig) -> Result<Self> {
        let db_path = db_path.into();
        let conn = Connection::open(&db_path).map_err(|e| op_failed("open_sqlite", &e))?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path: Some(db_path),
        };

        store.initialize(config)?;
        Ok(store)
    }

    /// Opens the store for a workspace described by the registry.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open_workspace(config: &WorkspaceConfig) -> Result<Self> {
        Self::open_with_config(config.database_path(), &config.store)
    }

    /// Creates an in-memory store (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| op_failed("open_sqlite_in_memory", &e))?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path: None,
        };

        store.initialize(&StoreConfig::default())?;
        Ok(store)
    }

    /// Returns the database path (`None` for in-memory).
    #[must_use]
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Configures the connection and brings the schema up to date.
    fn initialize(&self, config: &StoreConfig) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        configure_connection(&conn, config)?;
        run_migrations(&conn)
    }

    /// Acquires the connection lock with poison recovery.
    pub(crate) fn lock(&self) -> MutexGuard<'_, Connection> {
        acquire_lock(&self.conn)
    }

    /// Runs `f`, recording operation counters and duration.
    pub(crate) fn timed<T>(
        &self,
        operation: &'static str,
        f: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        let start = Instant::now();
        let result = f();
        let status = if result.is_ok() { "success" } else { "error" };
        record_operation_metrics(operation, start, status);
        result
    }
}

/// Delete-state and parentage of one row, read inside a transaction.
pub(crate) struct EntityState {
    /// Soft-delete timestamp; `None` means live.
    pub deleted_at: Option<i64>,
    /// The row's parent id (`None` for environments).
    pub parent_id: Option<EntityId>,
}

impl EntityState {
    pub(crate) const fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }
}

/// Reads a row's delete state and parent id. `Ok(None)` means the row
/// does not exist at all.
pub(crate) fn entity_state(
    conn: &Connection,
    kind: EntityKind,
    id: &EntityId,
) -> Result<Option<EntityState>> {
    let sql = kind.parent_column().map_or_else(
        || format!("SELECT deleted_at, NULL FROM {} WHERE id = ?1", kind.table()),
        |parent| {
            format!(
                "SELECT deleted_at, {parent} FROM {} WHERE id = ?1",
                kind.table()
            )
        },
    );

    conn.query_row(&sql, params![id.as_str()], |row| {
        Ok(EntityState {
            deleted_at: row.get(0)?,
            parent_id: row.get::<_, Option<String>>(1)?.map(EntityId::new),
        })
    })
    .optional()
    .map_err(|e| op_failed(format!("read_{}_state", kind.as_str()), &e))
}

/// Requires a live row of the given kind, failing fast with `NotFound`
/// before any write touches the database.
pub(crate) fn require_live(
    conn: &Connection,
    kind: EntityKind,
    id: &EntityId,
) -> Result<EntityState> {
    match entity_state(conn, kind, id)? {
        Some(state) if state.is_live() => Ok(state),
        _ => Err(Error::NotFound {
            kind,
            id: id.clone(),
        }),
    }
}

/// Next `sort_index` among live siblings: `max + 1`, starting at 0.
/// Indexes are never renumbered, so gaps appear after deletions.
pub(crate) fn next_sort_index(
    conn: &Connection,
    kind: EntityKind,
    parent_id: Option<&EntityId>,
) -> Result<i64> {
    let result = match (kind.parent_column(), parent_id) {
        (Some(parent), Some(pid)) => conn.query_row(
            &format!(
                "SELECT COALESCE(MAX(sort_index) + 1, 0) FROM {}
                 WHERE deleted_at IS NULL AND {parent} = ?1",
                kind.table()
            ),
            params![pid.as_str()],
            |row| row.get(0),
        ),
        _ => conn.query_row(
            &format!(
                "SELECT COALESCE(MAX(sort_index) + 1, 0) FROM {}
                 WHERE deleted_at IS NULL",
                kind.table()
            ),
            [],
            |row| row.get(0),
        ),
    };

    result.map_err(|e| op_failed(format!("next_sort_index_{}", kind.as_str()), &e))
}

/// Bumps one row's `updated_at`.
pub(crate) fn touch_entity(
    conn: &Connection,
    kind: EntityKind,
    id: &EntityId,
    now: i64,
) -> Result<()> {
    conn.execute(
        &format!("UPDATE {} SET updated_at = ?2 WHERE id = ?1", kind.table()),
        params![id.as_str(), now],
    )
    .map_err(|e| op_failed(format!("touch_{}", kind.as_str()), &e))?;
    Ok(())
}

/// Bumps the parent's `updated_at`, if the kind has one.
pub(crate) fn touch_parent(
    conn: &Connection,
    kind: EntityKind,
    state: &EntityState,
    now: i64,
) -> Result<()> {
    if let (Some(parent_kind), Some(parent_id)) = (kind.parent(), state.parent_id.as_ref()) {
        touch_entity(conn, parent_kind, parent_id, now)?;
    }
    Ok(())
}
