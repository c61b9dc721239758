//! Schema definition and versioned migrations.
//!
//! Provides a compile-time embedded migration system that upgrades the
//! workspace database when a store is opened. Each migration applies
//! inside one transaction and is recorded in a `schema_migrations`
//! ledger, so a half-applied schema can never be observed.

use super::connection::op_failed;
use crate::Result;
use rusqlite::Connection;

/// A single migration with version and SQL.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    /// Migration version (sequential, starting at 1).
    pub version: i32,
    /// Human-readable description.
    pub description: &'static str,
    /// SQL to apply (may contain multiple statements).
    pub sql: &'static str,
}

/// All migrations, oldest first.
///
/// The hierarchy tables share a common shape: the soft-delete pair
/// `(deleted_at, deleted_root_id)` on every level above messages, the
/// parent foreign key, and the `sort_index` assigned at creation time.
/// `tracks.last_opened_scene_id` deliberately carries no foreign key;
/// a purge clears dangling values instead of failing.
pub const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "workspace hierarchy, content index",
    sql: "
        CREATE TABLE IF NOT EXISTS environments (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            sort_index INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            deleted_at INTEGER,
            deleted_root_id TEXT
        );

        CREATE TABLE IF NOT EXISTS projects (
            id TEXT PRIMARY KEY,
            environment_id TEXT NOT NULL REFERENCES environments(id),
            name TEXT NOT NULL,
            sort_index INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            deleted_at INTEGER,
            deleted_root_id TEXT
        );

        CREATE TABLE IF NOT EXISTS tracks (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL REFERENCES projects(id),
            name TEXT NOT NULL,
            sort_index INTEGER NOT NULL,
            last_opened_scene_id TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            deleted_at INTEGER,
            deleted_root_id TEXT
        );

        CREATE TABLE IF NOT EXISTS scenes (
            id TEXT PRIMARY KEY,
            track_id TEXT NOT NULL REFERENCES tracks(id),
            title TEXT NOT NULL,
            sort_index INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            deleted_at INTEGER,
            deleted_root_id TEXT
        );

        CREATE TABLE IF NOT EXISTS blocks (
            id TEXT PRIMARY KEY,
            scene_id TEXT NOT NULL REFERENCES scenes(id),
            kind TEXT NOT NULL,
            title TEXT NOT NULL,
            subtitle TEXT,
            is_canonical INTEGER NOT NULL DEFAULT 0,
            document_text TEXT,
            sort_index INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            deleted_at INTEGER,
            deleted_root_id TEXT
        );

        CREATE TABLE IF NOT EXISTS messages (
            id TEXT PRIMARY KEY,
            block_id TEXT NOT NULL REFERENCES blocks(id),
            is_user INTEGER NOT NULL,
            timestamp INTEGER NOT NULL,
            body TEXT NOT NULL,
            tag TEXT NOT NULL,
            cycle_index INTEGER NOT NULL,
            assumptions TEXT NOT NULL,
            sources TEXT NOT NULL,
            sources_table_json TEXT,
            locus TEXT NOT NULL,
            is_valid_vpp INTEGER NOT NULL,
            validation_issues_json TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_projects_environment ON projects(environment_id);
        CREATE INDEX IF NOT EXISTS idx_tracks_project ON tracks(project_id);
        CREATE INDEX IF NOT EXISTS idx_scenes_track ON scenes(track_id);
        CREATE INDEX IF NOT EXISTS idx_blocks_scene ON blocks(scene_id);
        CREATE INDEX IF NOT EXISTS idx_messages_block ON messages(block_id);

        CREATE INDEX IF NOT EXISTS idx_projects_deleted_root ON projects(deleted_root_id);
        CREATE INDEX IF NOT EXISTS idx_tracks_deleted_root ON tracks(deleted_root_id);
        CREATE INDEX IF NOT EXISTS idx_scenes_deleted_root ON scenes(deleted_root_id);
        CREATE INDEX IF NOT EXISTS idx_blocks_deleted_root ON blocks(deleted_root_id);

        CREATE VIRTUAL TABLE IF NOT EXISTS content_index USING fts5(
            entity_id,
            entity_kind,
            environment_id,
            project_id,
            track_id,
            scene_id,
            text
        );
    ",
}];

/// Runs all pending migrations.
///
/// # Errors
///
/// Returns [`crate::Error::OperationFailed`] if a migration fails; the
/// failing migration is rolled back and the ledger is left at the last
/// fully applied version.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    ensure_migrations_table(conn)?;
    let current = current_version(conn)?;

    for migration in MIGRATIONS {
        if migration.version > current {
            apply_migration(conn, migration)?;
        }
    }

    Ok(())
}

/// Returns the current schema version (0 for a fresh database).
///
/// # Errors
///
/// Returns [`crate::Error::OperationFailed`] if the ledger cannot be read.
pub fn current_version(conn: &Connection) -> Result<i32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )
    .map_err(|e| op_failed("read_schema_version", &e))
}

/// Ensures the `schema_migrations` ledger exists.
fn ensure_migrations_table(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at INTEGER NOT NULL
        )",
        [],
    )
    .map_err(|e| op_failed("create_migrations_table", &e))?;
    Ok(())
}

/// Applies a single migration within a transaction.
///
/// All migration statements and the ledger record execute in one
/// transaction; if any statement fails, the whole migration rolls back.
fn apply_migration(conn: &Connection, migration: &Migration) -> Result<()> {
    super::connection::with_immediate_tx(
        conn,
        &format!("migration_v{}", migration.version),
        |conn| {
            conn.execute_batch(migration.sql).map_err(|e| {
                op_failed(
                    format!("migration_v{}: {}", migration.version, migration.description),
                    &e,
                )
            })?;

            conn.execute(
                "INSERT INTO schema_migrations (version, description, applied_at)
                 VALUES (?1, ?2, ?3)",
                rusqlite::params![
                    migration.version,
                    migration.description,
                    crate::current_timestamp_millis()
                ],
            )
            .map_err(|e| op_failed("record_migration", &e))?;

            Ok(())
        },
    )?;

    tracing::info!(
        version = migration.version,
        description = migration.description,
        "applied migration"
    );

    Ok(())
}
