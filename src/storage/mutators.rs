//! Single-entity write operations.
//!
//! Every mutator pre-checks existence and fails fast with `NotFound` or
//! `InvalidInput` before issuing any write, so the engine's own constraint
//! errors are never the first line of defense. Each operation is one
//! transaction; a failure leaves the tree unchanged.

use super::connection::{op_failed, with_immediate_tx};
use super::search::{refresh_index_scope, sync_block_index, sync_message_index};
use super::store::{
    WorkspaceStore, entity_state, next_sort_index, require_live, touch_entity, touch_parent,
};
use crate::models::{BlockKind, EntityId, EntityKind, NewMessage};
use crate::{Error, Result, current_timestamp_millis};
use rusqlite::{Connection, params};
use tracing::instrument;

fn validate_title(kind: EntityKind, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::InvalidInput(format!(
            "{} {} must not be empty",
            kind.as_str(),
            kind.title_column()
        )));
    }
    Ok(())
}

/// Shared create path for the four container kinds. Blocks carry extra
/// columns and go through [`WorkspaceStore::create_block`] instead.
fn create_entity(
    conn: &Connection,
    kind: EntityKind,
    parent_id: Option<&EntityId>,
    title: &str,
) -> Result<EntityId> {
    validate_title(kind, title)?;

    if let (Some(parent_kind), Some(pid)) = (kind.parent(), parent_id) {
        require_live(conn, parent_kind, pid)?;
    }

    let id = EntityId::generate();
    let now = current_timestamp_millis();
    let sort_index = next_sort_index(conn, kind, parent_id)?;

    match (kind.parent_column(), parent_id) {
        (Some(parent_column), Some(pid)) => {
            conn.execute(
                &format!(
                    "INSERT INTO {} (id, {parent_column}, {}, sort_index, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                    kind.table(),
                    kind.title_column()
                ),
                params![id.as_str(), pid.as_str(), title, sort_index, now],
            )
            .map_err(|e| op_failed(format!("insert_{}", kind.as_str()), &e))?;
            touch_entity(
                conn,
                kind.parent().ok_or_else(|| {
                    Error::InvariantViolation(format!("{kind} has a parent column but no parent kind"))
                })?,
                pid,
                now,
            )?;
        },
        _ => {
            conn.execute(
                &format!(
                    "INSERT INTO {} (id, {}, sort_index, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?4)",
                    kind.table(),
                    kind.title_column()
                ),
                params![id.as_str(), title, sort_index, now],
            )
            .map_err(|e| op_failed(format!("insert_{}", kind.as_str()), &e))?;
        },
    }

    Ok(id)
}

impl WorkspaceStore {
    /// Creates a new Environment at the top level.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a blank name.
    #[instrument(skip(self))]
    pub fn create_environment(&self, name: &str) -> Result<EntityId> {
        self.timed("create_environment", || {
            let conn = self.lock();
            with_immediate_tx(&conn, "create_environment", |conn| {
                create_entity(conn, EntityKind::Environment, None, name)
            })
        })
    }

    /// Creates a new Project under a live Environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the environment is missing or
    /// trashed, [`Error::InvalidInput`] for a blank name.
    #[instrument(skip(self))]
    pub fn create_project(&self, environment_id: &EntityId, name: &str) -> Result<EntityId> {
        self.timed("create_project", || {
            let conn = self.lock();
            with_immediate_tx(&conn, "create_project", |conn| {
                create_entity(conn, EntityKind::Project, Some(environment_id), name)
            })
        })
    }

    /// Creates a new Track under a live Project.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the project is missing or trashed,
    /// [`Error::InvalidInput`] for a blank name.
    #[instrument(skip(self))]
    pub fn create_track(&self, project_id: &EntityId, name: &str) -> Result<EntityId> {
        self.timed("create_track", || {
            let conn = self.lock();
            with_immediate_tx(&conn, "create_track", |conn| {
                create_entity(conn, EntityKind::Track, Some(project_id), name)
            })
        })
    }

    /// Creates a new Scene under a live Track.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the track is missing or trashed,
    /// [`Error::InvalidInput`] for a blank title.
    #[instrument(skip(self))]
    pub fn create_scene(&self, track_id: &EntityId, title: &str) -> Result<EntityId> {
        self.timed("create_scene", || {
            let conn = self.lock();
            with_immediate_tx(&conn, "create_scene", |conn| {
                create_entity(conn, EntityKind::Scene, Some(track_id), title)
            })
        })
    }

    /// Creates a new Block under a live Scene and indexes its content.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the scene is missing or trashed,
    /// [`Error::InvalidInput`] for a blank title.
    #[instrument(skip(self, subtitle, document_text))]
    pub fn create_block(
        &self,
        scene_id: &EntityId,
        kind: BlockKind,
        title: &str,
        subtitle: Option<&str>,
        document_text: Option<&str>,
    ) -> Result<EntityId> {
        self.timed("create_block", || {
            let conn = self.lock();
            with_immediate_tx(&conn, "create_block", |conn| {
                validate_title(EntityKind::Block, title)?;
                require_live(conn, EntityKind::Scene, scene_id)?;

                let id = EntityId::generate();
                let now = current_timestamp_millis();
                let sort_index = next_sort_index(conn, EntityKind::Block, Some(scene_id))?;

                conn.execute(
                    "INSERT INTO blocks (id, scene_id, kind, title, subtitle, is_canonical,
                                         document_text, sort_index, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7, ?8, ?8)",
                    params![
                        id.as_str(),
                        scene_id.as_str(),
                        kind.as_str(),
                        title,
                        subtitle,
                        document_text,
                        sort_index,
                        now
                    ],
                )
                .map_err(|e| op_failed("insert_block", &e))?;

                touch_entity(conn, EntityKind::Scene, scene_id, now)?;
                sync_block_index(conn, &id)?;
                Ok(id)
            })
        })
    }

    /// Replaces a live Block's document text and re-syncs the index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the block is missing or trashed.
    #[instrument(skip(self, text))]
    pub fn update_block_document(&self, block_id: &EntityId, text: &str) -> Result<()> {
        self.timed("update_block_document", || {
            let conn = self.lock();
            with_immediate_tx(&conn, "update_block_document", |conn| {
                let state = require_live(conn, EntityKind::Block, block_id)?;
                let now = current_timestamp_millis();

                conn.execute(
                    "UPDATE blocks SET document_text = ?2, updated_at = ?3 WHERE id = ?1",
                    params![block_id.as_str(), text, now],
                )
                .map_err(|e| op_failed("update_block_document", &e))?;

                touch_parent(conn, EntityKind::Block, &state, now)?;
                sync_block_index(conn, block_id)
            })
        })
    }

    /// Marks or unmarks a live Block as canonical for its scene.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the block is missing or trashed.
    #[instrument(skip(self))]
    pub fn set_block_canonical(&self, block_id: &EntityId, canonical: bool) -> Result<()> {
        self.timed("set_block_canonical", || {
            let conn = self.lock();
            with_immediate_tx(&conn, "set_block_canonical", |conn| {
                let state = require_live(conn, EntityKind::Block, block_id)?;
                let now = current_timestamp_millis();

                conn.execute(
                    "UPDATE blocks SET is_canonical = ?2, updated_at = ?3 WHERE id = ?1",
                    params![block_id.as_str(), canonical, now],
                )
                .map_err(|e| op_failed("set_block_canonical", &e))?;

                touch_parent(conn, EntityKind::Block, &state, now)
            })
        })
    }

    /// Appends a Message to a live Block and indexes its body.
    ///
    /// The store assigns the id and timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the block is missing or trashed.
    #[instrument(skip(self, message))]
    pub fn append_message(&self, block_id: &EntityId, message: &NewMessage) -> Result<EntityId> {
        self.timed("append_message", || {
            let conn = self.lock();
            with_immediate_tx(&conn, "append_message", |conn| {
                require_live(conn, EntityKind::Block, block_id)?;

                let id = EntityId::generate();
                let now = current_timestamp_millis();
                let assumptions = serde_json::to_string(&message.assumptions)
                    .map_err(|e| op_failed("encode_assumptions", &e))?;
                let sources = serde_json::to_string(&message.sources)
                    .map_err(|e| op_failed("encode_sources", &e))?;

                conn.execute(
                    "INSERT INTO messages (id, block_id, is_user, timestamp, body, tag,
                                           cycle_index, assumptions, sources, sources_table_json,
                                           locus, is_valid_vpp, validation_issues_json)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                    params![
                        id.as_str(),
                        block_id.as_str(),
                        message.is_user,
                        now,
                        message.body,
                        message.tag,
                        message.cycle_index,
                        assumptions,
                        sources,
                        message.sources_table_json,
                        message.locus,
                        message.is_valid_vpp,
                        message.validation_issues_json
                    ],
                )
                .map_err(|e| op_failed("insert_message", &e))?;

                touch_entity(conn, EntityKind::Block, block_id, now)?;
                sync_message_index(conn, &id)?;
                Ok(id)
            })
        })
    }

    /// Records the Scene a Track last had open, or clears it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the track or scene is missing or
    /// trashed, [`Error::InvalidInput`] if the scene belongs to another
    /// track.
    #[instrument(skip(self))]
    pub fn set_last_opened_scene(
        &self,
        track_id: &EntityId,
        scene_id: Option<&EntityId>,
    ) -> Result<()> {
        self.timed("set_last_opened_scene", || {
            let conn = self.lock();
            with_immediate_tx(&conn, "set_last_opened_scene", |conn| {
                require_live(conn, EntityKind::Track, track_id)?;

                if let Some(sid) = scene_id {
                    let scene = require_live(conn, EntityKind::Scene, sid)?;
                    if scene.parent_id.as_ref() != Some(track_id) {
                        return Err(Error::InvalidInput(format!(
                            "scene {sid} does not belong to track {track_id}"
                        )));
                    }
                }

                let now = current_timestamp_millis();
                conn.execute(
                    "UPDATE tracks SET last_opened_scene_id = ?2, updated_at = ?3 WHERE id = ?1",
                    params![track_id.as_str(), scene_id.map(EntityId::as_str), now],
                )
                .map_err(|e| op_failed("set_last_opened_scene", &e))?;
                Ok(())
            })
        })
    }

    /// Renames a live Environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if missing or trashed,
    /// [`Error::InvalidInput`] for a blank name.
    #[instrument(skip(self))]
    pub fn rename_environment(&self, id: &EntityId, name: &str) -> Result<()> {
        self.rename_entity(EntityKind::Environment, "rename_environment", id, name)
    }

    /// Renames a live Project.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if missing or trashed,
    /// [`Error::InvalidInput`] for a blank name.
    #[instrument(skip(self))]
    pub fn rename_project(&self, id: &EntityId, name: &str) -> Result<()> {
        self.rename_entity(EntityKind::Project, "rename_project", id, name)
    }

    /// Renames a live Track.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if missing or trashed,
    /// [`Error::InvalidInput`] for a blank name.
    #[instrument(skip(self))]
    pub fn rename_track(&self, id: &EntityId, name: &str) -> Result<()> {
        self.rename_entity(EntityKind::Track, "rename_track", id, name)
    }

    /// Renames a live Scene.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if missing or trashed,
    /// [`Error::InvalidInput`] for a blank title.
    #[instrument(skip(self))]
    pub fn rename_scene(&self, id: &EntityId, title: &str) -> Result<()> {
        self.rename_entity(EntityKind::Scene, "rename_scene", id, title)
    }

    fn rename_entity(
        &self,
        kind: EntityKind,
        operation: &'static str,
        id: &EntityId,
        title: &str,
    ) -> Result<()> {
        self.timed(operation, || {
            let conn = self.lock();
            with_immediate_tx(&conn, operation, |conn| {
                validate_title(kind, title)?;
                let state = require_live(conn, kind, id)?;
                let now = current_timestamp_millis();

                conn.execute(
                    &format!(
                        "UPDATE {} SET {} = ?2, updated_at = ?3 WHERE id = ?1",
                        kind.table(),
                        kind.title_column()
                    ),
                    params![id.as_str(), title, now],
                )
                .map_err(|e| op_failed(operation, &e))?;

                touch_parent(conn, kind, &state, now)
            })
        })
    }

    /// Moves a live Project under another live Environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for a missing project or destination,
    /// [`Error::InvalidInput`] if the project is trashed.
    #[instrument(skip(self))]
    pub fn move_project(&self, id: &EntityId, new_environment_id: &EntityId) -> Result<()> {
        self.move_entity(EntityKind::Project, "move_project", id, new_environment_id)
    }

    /// Moves a live Track under another live Project.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for a missing track or destination,
    /// [`Error::InvalidInput`] if the track is trashed.
    #[instrument(skip(self))]
    pub fn move_track(&self, id: &EntityId, new_project_id: &EntityId) -> Result<()> {
        self.move_entity(EntityKind::Track, "move_track", id, new_project_id)
    }

    /// Moves a live Scene under another live Track.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for a missing scene or destination,
    /// [`Error::InvalidInput`] if the scene is trashed.
    #[instrument(skip(self))]
    pub fn move_scene(&self, id: &EntityId, new_track_id: &EntityId) -> Result<()> {
        self.move_entity(EntityKind::Scene, "move_scene", id, new_track_id)
    }

    fn move_entity(
        &self,
        kind: EntityKind,
        operation: &'static str,
        id: &EntityId,
        new_parent_id: &EntityId,
    ) -> Result<()> {
        self.timed(operation, || {
            let conn = self.lock();
            with_immediate_tx(&conn, operation, |conn| {
                let Some(state) = entity_state(conn, kind, id)? else {
                    return Err(Error::NotFound {
                        kind,
                        id: id.clone(),
                    });
                };
                if !state.is_live() {
                    return Err(Error::InvalidInput(format!(
                        "trashed {kind} cannot be moved; restore it instead"
                    )));
                }

                let (Some(parent_kind), Some(parent_column)) =
                    (kind.parent(), kind.parent_column())
                else {
                    return Err(Error::InvariantViolation(format!(
                        "{kind} is not movable"
                    )));
                };
                require_live(conn, parent_kind, new_parent_id)?;

                let now = current_timestamp_millis();
                conn.execute(
                    &format!(
                        "UPDATE {} SET {parent_column} = ?2, updated_at = ?3 WHERE id = ?1",
                        kind.table()
                    ),
                    params![id.as_str(), new_parent_id.as_str(), now],
                )
                .map_err(|e| op_failed(operation, &e))?;

                // Old context and new destination both see the change.
                touch_parent(conn, kind, &state, now)?;
                touch_entity(conn, parent_kind, new_parent_id, now)?;

                // Indexed content under the moved entity changed ancestry.
                refresh_index_scope(conn, kind, id)
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_scene() -> (WorkspaceStore, EntityId, EntityId, EntityId, EntityId) {
        let store = WorkspaceStore::in_memory().unwrap();
        let env = store.create_environment("E").unwrap();
        let project = store.create_project(&env, "P").unwrap();
        let track = store.create_track(&project, "T").unwrap();
        let scene = store.create_scene(&track, "S").unwrap();
        (store, env, project, track, scene)
    }

    #[test]
    fn test_create_assigns_sequential_sort_indexes() {
        let store = WorkspaceStore::in_memory().unwrap();
        let env = store.create_environment("E").unwrap();
        store.create_project(&env, "P0").unwrap();
        store.create_project(&env, "P1").unwrap();
        store.create_project(&env, "P2").unwrap();

        let tree = store.fetch_tree(false).unwrap();
        let indexes: Vec<i64> = tree[0]
            .projects
            .iter()
            .map(|p| p.project.sort_index)
            .collect();
        assert_eq!(indexes, vec![0, 1, 2]);
    }

    #[test]
    fn test_create_under_missing_parent_is_not_found() {
        let store = WorkspaceStore::in_memory().unwrap();
        let err = store
            .create_project(&EntityId::new("missing"), "P")
            .unwrap_err();
        assert!(matches!(
            err,
            Error::NotFound {
                kind: EntityKind::Environment,
                ..
            }
        ));
    }

    #[test]
    fn test_create_under_trashed_parent_is_not_found() {
        let (store, _env, _project, track, _scene) = store_with_scene();
        store.trash(EntityKind::Track, &track).unwrap();

        let err = store.create_scene(&track, "S2").unwrap_err();
        assert!(matches!(
            err,
            Error::NotFound {
                kind: EntityKind::Track,
                ..
            }
        ));
    }

    #[test]
    fn test_blank_name_is_invalid_input() {
        let store = WorkspaceStore::in_memory().unwrap();
        let err = store.create_environment("   ").unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_rename_updates_name_and_bumps_parent() {
        let (store, env, project, _track, _scene) = store_with_scene();

        let before = store.fetch_tree(false).unwrap();
        let parent_before = before[0].environment.updated_at;

        store.rename_project(&project, "Renamed").unwrap();

        let after = store.fetch_tree(false).unwrap();
        assert_eq!(after[0].projects[0].project.name, "Renamed");
        assert!(after[0].environment.updated_at >= parent_before);
        assert_eq!(after[0].environment.id, env);
    }

    #[test]
    fn test_rename_trashed_entity_is_not_found() {
        let (store, _env, project, _track, _scene) = store_with_scene();
        store.trash(EntityKind::Project, &project).unwrap();

        let err = store.rename_project(&project, "X").unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn test_move_scene_to_other_track() {
        let (store, _env, project, track, scene) = store_with_scene();
        let other_track = store.create_track(&project, "T2").unwrap();

        store.move_scene(&scene, &other_track).unwrap();

        let tree = store.fetch_tree(false).unwrap();
        let tracks = &tree[0].projects[0].tracks;
        let original = tracks.iter().find(|t| t.track.id == track).unwrap();
        let destination = tracks.iter().find(|t| t.track.id == other_track).unwrap();
        assert!(original.scenes.is_empty());
        assert_eq!(destination.scenes.len(), 1);
        assert_eq!(destination.scenes[0].scene.id, scene);
    }

    #[test]
    fn test_move_to_trashed_destination_is_not_found() {
        let (store, _env, project, _track, scene) = store_with_scene();
        let doomed = store.create_track(&project, "doomed").unwrap();
        store.trash(EntityKind::Track, &doomed).unwrap();

        let err = store.move_scene(&scene, &doomed).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn test_move_trashed_entity_is_invalid_input() {
        let (store, _env, project, _track, scene) = store_with_scene();
        let other_track = store.create_track(&project, "T2").unwrap();
        store.trash(EntityKind::Scene, &scene).unwrap();

        let err = store.move_scene(&scene, &other_track).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_append_message_requires_live_block() {
        let (store, _env, _project, _track, scene) = store_with_scene();
        let block = store
            .create_block(&scene, BlockKind::Conversation, "B", None, None)
            .unwrap();
        store.trash(EntityKind::Block, &block).unwrap();

        let err = store
            .append_message(&block, &NewMessage::default())
            .unwrap_err();
        assert!(matches!(
            err,
            Error::NotFound {
                kind: EntityKind::Block,
                ..
            }
        ));
    }

    #[test]
    fn test_set_last_opened_scene_rejects_foreign_scene() {
        let (store, _env, project, track, _scene) = store_with_scene();
        let other_track = store.create_track(&project, "T2").unwrap();
        let foreign_scene = store.create_scene(&other_track, "S2").unwrap();

        let err = store
            .set_last_opened_scene(&track, Some(&foreign_scene))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        store
            .set_last_opened_scene(&other_track, Some(&foreign_scene))
            .unwrap();
        store.set_last_opened_scene(&other_track, None).unwrap();
    }
}
