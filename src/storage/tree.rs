//! Tree assembly and flat snapshots.
//!
//! Pure reads: each level is loaded as one flat ordered query, grouped by
//! parent id in a single pass, then attached bottom-up. A failure surfaces
//! as a storage error; a partially built tree is never returned.

use super::connection::op_failed;
use super::rows::{
    BLOCK_COLUMNS, ENVIRONMENT_COLUMNS, MESSAGE_COLUMNS, PROJECT_COLUMNS, SCENE_COLUMNS,
    TRACK_COLUMNS, block_from_row, environment_from_row, message_from_row, project_from_row,
    scene_from_row, track_from_row,
};
use super::store::WorkspaceStore;
use crate::Result;
use crate::models::{
    EnvironmentNode, ProjectNode, SceneNode, TrackNode, WorkspaceSnapshot,
};
use rusqlite::{Connection, Row};
use std::collections::HashMap;
use tracing::instrument;

/// Ordering applied at every level of the tree.
const LEVEL_ORDER: &str = "ORDER BY sort_index ASC, updated_at DESC";

fn load_level<T>(
    conn: &Connection,
    operation: &'static str,
    columns: &str,
    table: &str,
    include_deleted: bool,
    from_row: impl Fn(&Row<'_>) -> rusqlite::Result<T>,
) -> Result<Vec<T>> {
    let filter = if include_deleted {
        ""
    } else {
        "WHERE deleted_at IS NULL "
    };
    let sql = format!("SELECT {columns} FROM {table} {filter}{LEVEL_ORDER}");

    let mut stmt = conn.prepare(&sql).map_err(|e| op_failed(operation, &e))?;
    let rows = stmt
        .query_map([], |row| from_row(row))
        .map_err(|e| op_failed(operation, &e))?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.map_err(|e| op_failed(operation, &e))?);
    }
    Ok(out)
}

impl WorkspaceStore {
    /// Loads the whole workspace as a nested tree.
    ///
    /// Soft-deleted rows are filtered out unless `include_deleted`; the
    /// ordering at every level is `sort_index ASC, updated_at DESC`.
    /// Messages are not part of the tree (see [`Self::snapshot`]).
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OperationFailed`] on storage failure.
    #[instrument(skip(self))]
    pub fn fetch_tree(&self, include_deleted: bool) -> Result<Vec<EnvironmentNode>> {
        self.timed("fetch_tree", || {
            let conn = self.lock();

            let environments = load_level(
                &conn,
                "load_environments",
                ENVIRONMENT_COLUMNS,
                "environments",
                include_deleted,
                environment_from_row,
            )?;
            let projects = load_level(
                &conn,
                "load_projects",
                PROJECT_COLUMNS,
                "projects",
                include_deleted,
                project_from_row,
            )?;
            let tracks = load_level(
                &conn,
                "load_tracks",
                TRACK_COLUMNS,
                "tracks",
                include_deleted,
                track_from_row,
            )?;
            let scenes = load_level(
                &conn,
                "load_scenes",
                SCENE_COLUMNS,
                "scenes",
                include_deleted,
                scene_from_row,
            )?;
            let blocks = load_level(
                &conn,
                "load_blocks",
                BLOCK_COLUMNS,
                "blocks",
                include_deleted,
                block_from_row,
            )?;

            // Group bottom-up; pushing in query order preserves the
            // per-level ordering inside each parent bucket.
            let mut blocks_by_scene: HashMap<String, Vec<_>> = HashMap::new();
            for block in blocks {
                blocks_by_scene
                    .entry(block.scene_id.as_str().to_string())
                    .or_default()
                    .push(block);
            }

            let mut scenes_by_track: HashMap<String, Vec<SceneNode>> = HashMap::new();
            for scene in scenes {
                let blocks = blocks_by_scene
                    .remove(scene.id.as_str())
                    .unwrap_or_default();
                scenes_by_track
                    .entry(scene.track_id.as_str().to_string())
                    .or_default()
                    .push(SceneNode { scene, blocks });
            }

            let mut tracks_by_project: HashMap<String, Vec<TrackNode>> = HashMap::new();
            for track in tracks {
                let scenes = scenes_by_track.remove(track.id.as_str()).unwrap_or_default();
                tracks_by_project
                    .entry(track.project_id.as_str().to_string())
                    .or_default()
                    .push(TrackNode { track, scenes });
            }

            let mut projects_by_environment: HashMap<String, Vec<ProjectNode>> = HashMap::new();
            for project in projects {
                let tracks = tracks_by_project
                    .remove(project.id.as_str())
                    .unwrap_or_default();
                projects_by_environment
                    .entry(project.environment_id.as_str().to_string())
                    .or_default()
                    .push(ProjectNode { project, tracks });
            }

            Ok(environments
                .into_iter()
                .map(|environment| {
                    let projects = projects_by_environment
                        .remove(environment.id.as_str())
                        .unwrap_or_default();
                    EnvironmentNode {
                        environment,
                        projects,
                    }
                })
                .collect())
        })
    }

    /// Returns all raw rows, including Messages, for export/diagnostics.
    ///
    /// With `include_deleted == false`, soft-deleted rows are filtered out
    /// and messages are restricted to live blocks.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OperationFailed`] on storage failure.
    #[instrument(skip(self))]
    pub fn snapshot(&self, include_deleted: bool) -> Result<WorkspaceSnapshot> {
        self.timed("snapshot", || {
            let conn = self.lock();

            let environments = load_level(
                &conn,
                "snapshot_environments",
                ENVIRONMENT_COLUMNS,
                "environments",
                include_deleted,
                environment_from_row,
            )?;
            let projects = load_level(
                &conn,
                "snapshot_projects",
                PROJECT_COLUMNS,
                "projects",
                include_deleted,
                project_from_row,
            )?;
            let tracks = load_level(
                &conn,
                "snapshot_tracks",
                TRACK_COLUMNS,
                "tracks",
                include_deleted,
                track_from_row,
            )?;
            let scenes = load_level(
                &conn,
                "snapshot_scenes",
                SCENE_COLUMNS,
                "scenes",
                include_deleted,
                scene_from_row,
            )?;
            let blocks = load_level(
                &conn,
                "snapshot_blocks",
                BLOCK_COLUMNS,
                "blocks",
                include_deleted,
                block_from_row,
            )?;

            let message_sql = if include_deleted {
                format!("SELECT {MESSAGE_COLUMNS} FROM messages ORDER BY timestamp ASC")
            } else {
                let qualified = MESSAGE_COLUMNS
                    .split(", ")
                    .map(|column| format!("m.{column}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!(
                    "SELECT {qualified} FROM messages m
                     JOIN blocks b ON m.block_id = b.id
                     WHERE b.deleted_at IS NULL
                     ORDER BY m.timestamp ASC"
                )
            };

            let mut stmt = conn
                .prepare(&message_sql)
                .map_err(|e| op_failed("snapshot_messages", &e))?;
            let rows = stmt
                .query_map([], |row| message_from_row(row))
                .map_err(|e| op_failed("snapshot_messages", &e))?;
            let mut messages = Vec::new();
            for row in rows {
                messages.push(row.map_err(|e| op_failed("snapshot_messages", &e))?);
            }

            Ok(WorkspaceSnapshot {
                environments,
                projects,
                tracks,
                scenes,
                blocks,
                messages,
            })
        })
    }
}
