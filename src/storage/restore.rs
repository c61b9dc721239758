//! Restoring trashed subtrees.
//!
//! A restore undoes exactly one prior cascade: it clears delete flags on
//! the named entity and on every descendant row whose `deleted_root_id`
//! names it — never on rows that were independently trashed and merely
//! share ancestry.

use super::connection::{op_failed, with_immediate_tx};
use super::search::refresh_index_scope;
use super::store::{WorkspaceStore, entity_state, require_live, touch_entity};
use crate::models::{EntityId, EntityKind};
use crate::{Error, Result, current_timestamp_millis};
use tracing::instrument;

impl WorkspaceStore {
    /// Restores a trashed entity and the descendants its cascade carried.
    ///
    /// Project, Track, and Scene require a destination parent because the
    /// original parent may itself still be trashed or reorganized; the
    /// foreign key is rewritten to the destination before the delete flags
    /// are cleared. Environment and Block restores take no destination: an
    /// Environment has no parent, and a Block goes back into its own
    /// Scene, which must still be live.
    ///
    /// Restoring a live entity is an Ok no-op.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] — the entity does not exist, or a required
    ///   destination does not resolve to a live parent of the right kind.
    /// - [`Error::InvalidInput`] — a required destination was omitted, or
    ///   one was supplied for a kind that does not accept it.
    #[instrument(skip(self), fields(kind = %kind, id = %id))]
    pub fn restore(
        &self,
        kind: EntityKind,
        id: &EntityId,
        new_parent_id: Option<&EntityId>,
    ) -> Result<()> {
        self.timed("restore", || {
            let conn = self.lock();
            with_immediate_tx(&conn, "restore", |conn| {
                let Some(state) = entity_state(conn, kind, id)? else {
                    return Err(Error::NotFound {
                        kind,
                        id: id.clone(),
                    });
                };
                if state.is_live() {
                    return Ok(());
                }

                let now = current_timestamp_millis();

                match kind {
                    EntityKind::Environment | EntityKind::Block => {
                        if new_parent_id.is_some() {
                            return Err(Error::InvalidInput(format!(
                                "restore of a {kind} does not accept a destination"
                            )));
                        }
                        // A block returns into its own scene; restoring it
                        // under a trashed scene would leave a live row
                        // inside a trashed subtree.
                        if kind == EntityKind::Block {
                            let Some(scene_id) = state.parent_id.as_ref() else {
                                return Err(Error::InvariantViolation(format!(
                                    "block {id} has no scene"
                                )));
                            };
                            require_live(conn, EntityKind::Scene, scene_id)?;
                            touch_entity(conn, EntityKind::Scene, scene_id, now)?;
                        }
                    },
                    EntityKind::Project | EntityKind::Track | EntityKind::Scene => {
                        let Some(destination) = new_parent_id else {
                            return Err(Error::InvalidInput(format!(
                                "restore of a {kind} requires a destination {}",
                                kind.parent().map_or("parent", EntityKind::as_str)
                            )));
                        };
                        let (Some(parent_kind), Some(parent_column)) =
                            (kind.parent(), kind.parent_column())
                        else {
                            return Err(Error::InvariantViolation(format!(
                                "{kind} has no parent to restore into"
                            )));
                        };
                        require_live(conn, parent_kind, destination)?;

                        // Re-parent before clearing the delete flags.
                        conn.execute(
                            &format!(
                                "UPDATE {} SET {parent_column} = ?2 WHERE id = ?1",
                                kind.table()
                            ),
                            rusqlite::params![id.as_str(), destination.as_str()],
                        )
                        .map_err(|e| op_failed("restore_reparent", &e))?;
                        touch_entity(conn, parent_kind, destination, now)?;
                    },
                }

                conn.execute(
                    &format!(
                        "UPDATE {} SET deleted_at = NULL, deleted_root_id = NULL,
                                       updated_at = ?2
                         WHERE id = ?1",
                        kind.table()
                    ),
                    rusqlite::params![id.as_str(), now],
                )
                .map_err(|e| op_failed("restore_root", &e))?;

                // Only rows this entity's cascade carried come back with it.
                let mut cursor = kind.child();
                while let Some(level) = cursor {
                    conn.execute(
                        &format!(
                            "UPDATE {} SET deleted_at = NULL, deleted_root_id = NULL
                             WHERE deleted_root_id = ?1",
                            level.table()
                        ),
                        rusqlite::params![id.as_str()],
                    )
                    .map_err(|e| op_failed(format!("restore_{}", level.as_str()), &e))?;
                    cursor = level.child();
                }

                // A re-parented restore changed the ancestry of any
                // indexed content beneath the entity.
                refresh_index_scope(conn, kind, id)
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BlockKind;

    struct Fixture {
        store: WorkspaceStore,
        env: EntityId,
        project: EntityId,
        track: EntityId,
        scene: EntityId,
        blocks: Vec<EntityId>,
    }

    fn fixture() -> Fixture {
        let store = WorkspaceStore::in_memory().unwrap();
        let env = store.create_environment("E").unwrap();
        let project = store.create_project(&env, "P").unwrap();
        let track = store.create_track(&project, "T").unwrap();
        let scene = store.create_scene(&track, "S").unwrap();
        let blocks = (0..2)
            .map(|i| {
                store
                    .create_block(
                        &scene,
                        BlockKind::Conversation,
                        &format!("B{i}"),
                        None,
                        None,
                    )
                    .unwrap()
            })
            .collect();
        Fixture {
            store,
            env,
            project,
            track,
            scene,
            blocks,
        }
    }

    fn delete_state(
        store: &WorkspaceStore,
        kind: EntityKind,
        id: &EntityId,
    ) -> (Option<i64>, Option<String>) {
        let conn = store.lock();
        conn.query_row(
            &format!(
                "SELECT deleted_at, deleted_root_id FROM {} WHERE id = ?1",
                kind.table()
            ),
            rusqlite::params![id.as_str()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap()
    }

    #[test]
    fn test_restore_scene_to_new_track_restores_cascaded_blocks() {
        let f = fixture();
        let new_track = f.store.create_track(&f.project, "T2").unwrap();
        f.store.trash(EntityKind::Scene, &f.scene).unwrap();

        f.store
            .restore(EntityKind::Scene, &f.scene, Some(&new_track))
            .unwrap();

        let conn = f.store.lock();
        let track_id: String = conn
            .query_row(
                "SELECT track_id FROM scenes WHERE id = ?1",
                rusqlite::params![f.scene.as_str()],
                |row| row.get(0),
            )
            .unwrap();
        drop(conn);
        assert_eq!(track_id, new_track.as_str().to_string());

        let (deleted, root) = delete_state(&f.store, EntityKind::Scene, &f.scene);
        assert!(deleted.is_none());
        assert!(root.is_none());

        for block in &f.blocks {
            let (deleted, root) = delete_state(&f.store, EntityKind::Block, block);
            assert!(deleted.is_none(), "cascaded block must come back");
            assert!(root.is_none());
        }
    }

    #[test]
    fn test_restore_without_destination_is_invalid_input() {
        let f = fixture();
        f.store.trash(EntityKind::Scene, &f.scene).unwrap();

        let err = f
            .store
            .restore(EntityKind::Scene, &f.scene, None)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        // The failed restore left everything trashed.
        let (deleted, _) = delete_state(&f.store, EntityKind::Scene, &f.scene);
        assert!(deleted.is_some());
    }

    #[test]
    fn test_restore_to_trashed_destination_is_not_found() {
        let f = fixture();
        let doomed_track = f.store.create_track(&f.project, "doomed").unwrap();
        f.store.trash(EntityKind::Track, &doomed_track).unwrap();
        f.store.trash(EntityKind::Scene, &f.scene).unwrap();

        let err = f
            .store
            .restore(EntityKind::Scene, &f.scene, Some(&doomed_track))
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn test_restore_environment_takes_no_destination() {
        let f = fixture();
        f.store.trash(EntityKind::Environment, &f.env).unwrap();

        let err = f
            .store
            .restore(EntityKind::Environment, &f.env, Some(&f.project))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        f.store
            .restore(EntityKind::Environment, &f.env, None)
            .unwrap();

        for (kind, id) in [
            (EntityKind::Environment, &f.env),
            (EntityKind::Project, &f.project),
            (EntityKind::Track, &f.track),
            (EntityKind::Scene, &f.scene),
        ] {
            let (deleted, root) = delete_state(&f.store, kind, id);
            assert!(deleted.is_none(), "{kind} must be live after restore");
            assert!(root.is_none());
        }
    }

    #[test]
    fn test_restore_leaves_independently_trashed_siblings_alone() {
        let f = fixture();
        // The first block is trashed on its own, then the scene cascade
        // covers the second. Restoring the scene must not revive the
        // first block, whose root is itself.
        f.store.trash(EntityKind::Block, &f.blocks[0]).unwrap();
        f.store.trash(EntityKind::Scene, &f.scene).unwrap();
        let new_track = f.store.create_track(&f.project, "T2").unwrap();

        f.store
            .restore(EntityKind::Scene, &f.scene, Some(&new_track))
            .unwrap();

        let (deleted, root) = delete_state(&f.store, EntityKind::Block, &f.blocks[0]);
        assert!(deleted.is_some(), "independent trash root must stay trashed");
        assert!(root.is_none());

        let (deleted, _) = delete_state(&f.store, EntityKind::Block, &f.blocks[1]);
        assert!(deleted.is_none());
    }

    #[test]
    fn test_restore_block_requires_live_scene() {
        let f = fixture();
        f.store.trash(EntityKind::Block, &f.blocks[0]).unwrap();
        f.store.trash(EntityKind::Scene, &f.scene).unwrap();

        let err = f
            .store
            .restore(EntityKind::Block, &f.blocks[0], None)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::NotFound {
                kind: EntityKind::Scene,
                ..
            }
        ));
    }

    #[test]
    fn test_restore_live_entity_is_a_noop() {
        let f = fixture();
        f.store
            .restore(EntityKind::Environment, &f.env, None)
            .unwrap();
        let (deleted, _) = delete_state(&f.store, EntityKind::Environment, &f.env);
        assert!(deleted.is_none());
    }

    #[test]
    fn test_restore_missing_entity_is_not_found() {
        let f = fixture();
        let err = f
            .store
            .restore(EntityKind::Project, &EntityId::new("missing"), Some(&f.env))
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }
}
