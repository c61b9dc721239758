//! Irreversible purge of the trash.
//!
//! The only hard-delete path in the store. One transaction, strict
//! child-before-parent order, so no intermediate state has a child row
//! outliving its purged parent.

use super::connection::{op_failed, with_immediate_tx};
use super::search::remove_index_orphans;
use super::store::WorkspaceStore;
use crate::Result;
use crate::models::PurgeStats;
use rusqlite::Connection;
use tracing::instrument;

fn purge_count(conn: &Connection, operation: &'static str, sql: &str) -> Result<u64> {
    let deleted = conn.execute(sql, []).map_err(|e| op_failed(operation, &e))?;
    Ok(deleted as u64)
}

impl WorkspaceStore {
    /// Permanently removes every soft-deleted row and its dependents.
    ///
    /// Messages die with their soft-deleted Blocks first, then Blocks,
    /// Scenes, Tracks, Projects, and Environments. Dangling
    /// `last_opened_scene_id` pointers on surviving tracks are cleared,
    /// and derived-index rows whose entity no longer exists are removed,
    /// all inside the same transaction. Either the whole purge commits or
    /// none of it does.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OperationFailed`] on storage failure; the
    /// trash is then left exactly as it was.
    #[instrument(skip(self))]
    pub fn empty_trash(&self) -> Result<PurgeStats> {
        self.timed("empty_trash", || {
            let conn = self.lock();
            with_immediate_tx(&conn, "empty_trash", |conn| {
                let messages = purge_count(
                    conn,
                    "purge_messages",
                    "DELETE FROM messages WHERE block_id IN
                         (SELECT id FROM blocks WHERE deleted_at IS NOT NULL)",
                )?;
                let blocks = purge_count(
                    conn,
                    "purge_blocks",
                    "DELETE FROM blocks WHERE deleted_at IS NOT NULL",
                )?;

                // Live tracks may still point at a scene that is about to
                // be purged.
                conn.execute(
                    "UPDATE tracks SET last_opened_scene_id = NULL
                     WHERE last_opened_scene_id IN
                         (SELECT id FROM scenes WHERE deleted_at IS NOT NULL)",
                    [],
                )
                .map_err(|e| op_failed("clear_dangling_last_opened", &e))?;

                let scenes = purge_count(
                    conn,
                    "purge_scenes",
                    "DELETE FROM scenes WHERE deleted_at IS NOT NULL",
                )?;
                let tracks = purge_count(
                    conn,
                    "purge_tracks",
                    "DELETE FROM tracks WHERE deleted_at IS NOT NULL",
                )?;
                let projects = purge_count(
                    conn,
                    "purge_projects",
                    "DELETE FROM projects WHERE deleted_at IS NOT NULL",
                )?;
                let environments = purge_count(
                    conn,
                    "purge_environments",
                    "DELETE FROM environments WHERE deleted_at IS NOT NULL",
                )?;

                let index_rows = remove_index_orphans(conn)?;

                let stats = PurgeStats {
                    messages,
                    blocks,
                    scenes,
                    tracks,
                    projects,
                    environments,
                };
                tracing::info!(
                    rows = stats.total(),
                    index_rows,
                    "emptied trash"
                );
                Ok(stats)
            })
        })
    }
}
