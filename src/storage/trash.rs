//! Cascading soft-delete and the trash listing.
//!
//! One transactional cascade parameterized by [`EntityKind`]: the named
//! entity becomes the trash root (`deleted_root_id` NULL), then each
//! descendant table gets a single scoped update that only touches rows
//! still live. Rows trashed by an earlier, narrower operation keep their
//! original root, which is what makes a later restore undo exactly one
//! cascade.

use super::connection::{op_failed, with_immediate_tx};
use super::store::{WorkspaceStore, entity_state, touch_parent};
use crate::models::{EntityId, EntityKind, TrashRoot};
use crate::{Error, Result, current_timestamp_millis};
use rusqlite::{Connection, params};
use tracing::instrument;

/// Walks the kinds strictly below `root`, yielding each level together
/// with an ancestry scope clause whose single parameter is the root id.
/// The subqueries are deliberately not filtered by liveness; only the
/// `deleted_at IS NULL` guard on the updated rows decides what changes.
fn for_each_descendant_level(
    root: EntityKind,
    mut visit: impl FnMut(EntityKind, &str) -> Result<()>,
) -> Result<()> {
    let mut previous = root;
    let mut cursor = root.child();
    let mut scope: Option<String> = None;

    while let Some(level) = cursor {
        let Some(parent_column) = level.parent_column() else {
            return Err(Error::InvariantViolation(format!(
                "{level} has no parent column"
            )));
        };
        let clause = scope.as_ref().map_or_else(
            || format!("{parent_column} = ?1"),
            |inner| {
                format!(
                    "{parent_column} IN (SELECT id FROM {} WHERE {inner})",
                    previous.table()
                )
            },
        );

        visit(level, &clause)?;

        scope = Some(clause);
        previous = level;
        cursor = level.child();
    }

    Ok(())
}

impl WorkspaceStore {
    /// Soft-deletes an entity and every live descendant.
    ///
    /// The named entity becomes the trash root; descendants record its id
    /// in `deleted_root_id`. Descendants already trashed by an earlier
    /// operation are untouched and keep their original root. Trashing an
    /// already-trashed entity is an Ok no-op. The derived search index is
    /// not touched; trashed content stays findable until purge.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the entity does not exist at all.
    #[instrument(skip(self), fields(kind = %kind, id = %id))]
    pub fn trash(&self, kind: EntityKind, id: &EntityId) -> Result<()> {
        self.timed("trash", || {
            let conn = self.lock();
            with_immediate_tx(&conn, "trash", |conn| {
                let Some(state) = entity_state(conn, kind, id)? else {
                    return Err(Error::NotFound {
                        kind,
                        id: id.clone(),
                    });
                };
                if !state.is_live() {
                    // Repeated trash is idempotent, not an error.
                    return Ok(());
                }

                let now = current_timestamp_millis();
                let marked = conn
                    .execute(
                        &format!(
                            "UPDATE {} SET deleted_at = ?2, deleted_root_id = NULL
                             WHERE id = ?1 AND deleted_at IS NULL",
                            kind.table()
                        ),
                        params![id.as_str(), now],
                    )
                    .map_err(|e| op_failed("mark_trash_root", &e))?;
                if marked != 1 {
                    return Err(Error::InvariantViolation(format!(
                        "trash root {id} changed state mid-transaction"
                    )));
                }

                for_each_descendant_level(kind, |level, scope| {
                    conn.execute(
                        &format!(
                            "UPDATE {} SET deleted_at = ?2, deleted_root_id = ?1
                             WHERE deleted_at IS NULL AND {scope}",
                            level.table()
                        ),
                        params![id.as_str(), now],
                    )
                    .map_err(|e| op_failed(format!("cascade_{}", level.as_str()), &e))?;
                    Ok(())
                })?;

                touch_parent(conn, kind, &state, now)
            })
        })
    }

    /// Lists the roots of every trash operation still in the trash,
    /// most recently deleted first.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OperationFailed`] on storage failure.
    #[instrument(skip(self))]
    pub fn fetch_trash_roots(&self) -> Result<Vec<TrashRoot>> {
        self.timed("fetch_trash_roots", || {
            let conn = self.lock();
            let mut roots = Vec::new();

            for kind in EntityKind::ALL {
                let sql = format!(
                    "SELECT id, {}, deleted_at FROM {}
                     WHERE deleted_at IS NOT NULL AND deleted_root_id IS NULL",
                    kind.title_column(),
                    kind.table()
                );
                let mut stmt = conn
                    .prepare(&sql)
                    .map_err(|e| op_failed("list_trash_roots", &e))?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok((
                            EntityId::new(row.get::<_, String>(0)?),
                            row.get::<_, String>(1)?,
                            row.get::<_, i64>(2)?,
                        ))
                    })
                    .map_err(|e| op_failed("list_trash_roots", &e))?;

                let mut level_roots = Vec::new();
                for row in rows {
                    level_roots.push(row.map_err(|e| op_failed("list_trash_roots", &e))?);
                }

                for (id, title, deleted_at) in level_roots {
                    let child_count = cascade_child_count(&conn, kind, &id)?;
                    roots.push(TrashRoot {
                        id,
                        kind,
                        title,
                        deleted_at,
                        child_count,
                    });
                }
            }

            roots.sort_by(|a, b| b.deleted_at.cmp(&a.deleted_at));
            Ok(roots)
        })
    }
}

/// Counts the descendant rows a cascade carried along with the root.
fn cascade_child_count(conn: &Connection, kind: EntityKind, id: &EntityId) -> Result<u64> {
    let mut count: u64 = 0;
    let mut cursor = kind.child();

    while let Some(level) = cursor {
        let level_count: i64 = conn
            .query_row(
                &format!(
                    "SELECT COUNT(*) FROM {} WHERE deleted_root_id = ?1",
                    level.table()
                ),
                params![id.as_str()],
                |row| row.get(0),
            )
            .map_err(|e| op_failed("count_cascade_children", &e))?;
        count += u64::try_from(level_count).unwrap_or(0);
        cursor = level.child();
    }

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BlockKind;
    use test_case::test_case;

    struct Fixture {
        store: WorkspaceStore,
        env: EntityId,
        project: EntityId,
        track: EntityId,
        scene: EntityId,
        block: EntityId,
    }

    fn fixture() -> Fixture {
        let store = WorkspaceStore::in_memory().unwrap();
        let env = store.create_environment("E").unwrap();
        let project = store.create_project(&env, "P").unwrap();
        let track = store.create_track(&project, "T").unwrap();
        let scene = store.create_scene(&track, "S").unwrap();
        let block = store
            .create_block(&scene, BlockKind::Conversation, "B", None, None)
            .unwrap();
        Fixture {
            store,
            env,
            project,
            track,
            scene,
            block,
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
            params![id.as_str()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap()
    }

    #[test]
    fn test_trash_cascades_to_all_live_descendants() {
        let f = fixture();
        f.store.trash(EntityKind::Project, &f.project).unwrap();

        let (deleted, root) = delete_state(&f.store, EntityKind::Project, &f.project);
        assert!(deleted.is_some());
        assert!(root.is_none(), "the named entity is the root");

        for (kind, id) in [
            (EntityKind::Track, &f.track),
            (EntityKind::Scene, &f.scene),
            (EntityKind::Block, &f.block),
        ] {
            let (deleted, root) = delete_state(&f.store, kind, id);
            assert!(deleted.is_some(), "{kind} must be cascaded");
            assert_eq!(root.as_deref(), Some(f.project.as_str()));
        }

        // The environment above the root is untouched.
        let (deleted, _) = delete_state(&f.store, EntityKind::Environment, &f.env);
        assert!(deleted.is_none());
    }

    #[test]
    fn test_trash_twice_is_a_noop_and_keeps_roots() {
        let f = fixture();
        f.store.trash(EntityKind::Project, &f.project).unwrap();
        let before = delete_state(&f.store, EntityKind::Block, &f.block);

        f.store.trash(EntityKind::Project, &f.project).unwrap();

        let after = delete_state(&f.store, EntityKind::Block, &f.block);
        assert_eq!(before, after);
    }

    #[test]
    fn test_trash_missing_entity_is_not_found() {
        let f = fixture();
        let err = f
            .store
            .trash(EntityKind::Scene, &EntityId::new("missing"))
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn test_trash_does_not_touch_sibling_subtrees() {
        let f = fixture();
        let sibling = f.store.create_project(&f.env, "P2").unwrap();
        let sibling_track = f.store.create_track(&sibling, "T2").unwrap();

        f.store.trash(EntityKind::Project, &sibling).unwrap();

        for (kind, id) in [
            (EntityKind::Project, &f.project),
            (EntityKind::Track, &f.track),
            (EntityKind::Scene, &f.scene),
            (EntityKind::Block, &f.block),
        ] {
            let (deleted, root) = delete_state(&f.store, kind, id);
            assert!(deleted.is_none(), "{kind} outside the subtree must stay live");
            assert!(root.is_none());
        }

        let (deleted, root) = delete_state(&f.store, EntityKind::Track, &sibling_track);
        assert!(deleted.is_some());
        assert_eq!(root.as_deref(), Some(sibling.as_str()));
    }

    #[test]
    fn test_overlapping_trash_keeps_original_root() {
        let f = fixture();
        // Narrow first: the track becomes a root carrying the scene+block.
        f.store.trash(EntityKind::Track, &f.track).unwrap();
        // Wider second: the project cascade must not re-assign them.
        f.store.trash(EntityKind::Project, &f.project).unwrap();

        let (_, scene_root) = delete_state(&f.store, EntityKind::Scene, &f.scene);
        assert_eq!(scene_root.as_deref(), Some(f.track.as_str()));
        let (_, block_root) = delete_state(&f.store, EntityKind::Block, &f.block);
        assert_eq!(block_root.as_deref(), Some(f.track.as_str()));

        let (_, track_root) = delete_state(&f.store, EntityKind::Track, &f.track);
        assert!(track_root.is_none(), "the track stays its own root");
    }

    #[test_case(EntityKind::Environment ; "environment")]
    #[test_case(EntityKind::Project ; "project")]
    #[test_case(EntityKind::Track ; "track")]
    #[test_case(EntityKind::Scene ; "scene")]
    #[test_case(EntityKind::Block ; "block")]
    fn test_every_kind_is_trashable(kind: EntityKind) {
        let f = fixture();
        let id = match kind {
            EntityKind::Environment => &f.env,
            EntityKind::Project => &f.project,
            EntityKind::Track => &f.track,
            EntityKind::Scene => &f.scene,
            EntityKind::Block => &f.block,
        };

        f.store.trash(kind, id).unwrap();

        let (deleted, root) = delete_state(&f.store, kind, id);
        assert!(deleted.is_some());
        assert!(root.is_none());
    }

    #[test]
    fn test_fetch_trash_roots_counts_cascade_children() {
        let f = fixture();
        f.store
            .append_message(&f.block, &crate::models::NewMessage::default())
            .unwrap();
        f.store.trash(EntityKind::Scene, &f.scene).unwrap();

        let roots = f.store.fetch_trash_roots().unwrap();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].id, f.scene);
        assert_eq!(roots[0].kind, EntityKind::Scene);
        assert_eq!(roots[0].title, "S");
        // One block carried; messages are not soft-deleted rows.
        assert_eq!(roots[0].child_count, 1);
    }

    #[test]
    fn test_fetch_trash_roots_ignores_cascaded_rows() {
        let f = fixture();
        f.store.trash(EntityKind::Environment, &f.env).unwrap();

        let roots = f.store.fetch_trash_roots().unwrap();
        assert_eq!(roots.len(), 1, "only the root appears, not descendants");
        assert_eq!(roots[0].kind, EntityKind::Environment);
        assert_eq!(roots[0].child_count, 4);
    }
}
