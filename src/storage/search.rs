//! Derived content index (FTS5) and the search read path.
//!
//! One derived record per Block and Message, carrying denormalized scope
//! ids and searchable text. Sync happens inside the same transaction as
//! the source-row write: delete the old derived record, insert the new
//! one. Soft-delete state never touches the index; rows disappear from it
//! only when the purge removes their source row.

use super::connection::op_failed;
use super::store::WorkspaceStore;
use crate::models::{EntityId, EntityKind, IndexedKind, SearchHit};
use crate::{Error, Result};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::instrument;

/// Denormalized ancestry of an indexable row.
struct IndexScope {
    environment_id: String,
    project_id: String,
    track_id: String,
    scene_id: String,
    text: String,
}

/// Replaces the derived record for one entity.
fn upsert_index_record(
    conn: &Connection,
    kind: IndexedKind,
    entity_id: &EntityId,
    scope: &IndexScope,
) -> Result<()> {
    conn.execute(
        "DELETE FROM content_index WHERE entity_id = ?1 AND entity_kind = ?2",
        params![entity_id.as_str(), kind.as_str()],
    )
    .map_err(|e| op_failed("delete_index_record", &e))?;

    conn.execute(
        "INSERT INTO content_index (entity_id, entity_kind, environment_id, project_id,
                                    track_id, scene_id, text)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            entity_id.as_str(),
            kind.as_str(),
            scope.environment_id,
            scope.project_id,
            scope.track_id,
            scope.scene_id,
            scope.text
        ],
    )
    .map_err(|e| op_failed("insert_index_record", &e))?;

    Ok(())
}

/// Re-derives the index record for a block from its current row.
///
/// Must run inside the transaction that wrote the block.
pub(crate) fn sync_block_index(conn: &Connection, block_id: &EntityId) -> Result<()> {
    let scope = conn
        .query_row(
            "SELECT b.title, b.subtitle, b.document_text,
                    s.id, s.track_id, t.project_id, p.environment_id
             FROM blocks b
             JOIN scenes s ON b.scene_id = s.id
             JOIN tracks t ON s.track_id = t.id
             JOIN projects p ON t.project_id = p.id
             WHERE b.id = ?1",
            params![block_id.as_str()],
            |row| {
                let title: String = row.get(0)?;
                let subtitle: Option<String> = row.get(1)?;
                let document_text: Option<String> = row.get(2)?;
                let text = [Some(title), subtitle, document_text]
                    .into_iter()
                    .flatten()
                    .collect::<Vec<_>>()
                    .join("\n");
                Ok(IndexScope {
                    environment_id: row.get(6)?,
                    project_id: row.get(5)?,
                    track_id: row.get(4)?,
                    scene_id: row.get(3)?,
                    text,
                })
            },
        )
        .optional()
        .map_err(|e| op_failed("resolve_block_scope", &e))?;

    let Some(scope) = scope else {
        return Err(Error::InvariantViolation(format!(
            "block {block_id} has no resolvable ancestry"
        )));
    };

    upsert_index_record(conn, IndexedKind::Block, block_id, &scope)
}

/// Re-derives the index record for a message from its current row.
///
/// Must run inside the transaction that wrote the message.
pub(crate) fn sync_message_index(conn: &Connection, message_id: &EntityId) -> Result<()> {
    let scope = conn
        .query_row(
            "SELECT m.body, s.id, s.track_id, t.project_id, p.environment_id
             FROM messages m
             JOIN blocks b ON m.block_id = b.id
             JOIN scenes s ON b.scene_id = s.id
             JOIN tracks t ON s.track_id = t.id
             JOIN projects p ON t.project_id = p.id
             WHERE m.id = ?1",
            params![message_id.as_str()],
            |row| {
                Ok(IndexScope {
                    environment_id: row.get(4)?,
                    project_id: row.get(3)?,
                    track_id: row.get(2)?,
                    scene_id: row.get(1)?,
                    text: row.get(0)?,
                })
            },
        )
        .optional()
        .map_err(|e| op_failed("resolve_message_scope", &e))?;

    let Some(scope) = scope else {
        return Err(Error::InvariantViolation(format!(
            "message {message_id} has no resolvable ancestry"
        )));
    };

    upsert_index_record(conn, IndexedKind::Message, message_id, &scope)
}

/// Rewrites the denormalized scope ids of every derived record under a
/// re-parented entity.
///
/// Moving (or restoring into a new parent) a Scene, Track, or Project
/// changes the ancestry of all indexed content beneath it without touching
/// the block or message rows themselves; this keeps the index's scope
/// columns matching the tree. Must run inside the re-parenting
/// transaction, after the foreign key was rewritten.
pub(crate) fn refresh_index_scope(conn: &Connection, kind: EntityKind, id: &EntityId) -> Result<()> {
    let sql = match kind {
        EntityKind::Project => {
            "UPDATE content_index SET
                 environment_id = (SELECT environment_id FROM projects WHERE id = ?1)
             WHERE project_id = ?1"
        },
        EntityKind::Track => {
            "UPDATE content_index SET
                 project_id = (SELECT project_id FROM tracks WHERE id = ?1),
                 environment_id = (SELECT p.environment_id FROM tracks t
                                   JOIN projects p ON t.project_id = p.id
                                   WHERE t.id = ?1)
             WHERE track_id = ?1"
        },
        EntityKind::Scene => {
            "UPDATE content_index SET
                 track_id = (SELECT track_id FROM scenes WHERE id = ?1),
                 project_id = (SELECT t.project_id FROM scenes s
                               JOIN tracks t ON s.track_id = t.id
                               WHERE s.id = ?1),
                 environment_id = (SELECT p.environment_id FROM scenes s
                                   JOIN tracks t ON s.track_id = t.id
                                   JOIN projects p ON t.project_id = p.id
                                   WHERE s.id = ?1)
             WHERE scene_id = ?1"
        },
        EntityKind::Environment | EntityKind::Block => return Ok(()),
    };

    conn.execute(sql, params![id.as_str()])
        .map_err(|e| op_failed("refresh_index_scope", &e))?;
    Ok(())
}

/// Deletes derived records whose source row no longer exists.
///
/// Runs inside the purge transaction.
pub(crate) fn remove_index_orphans(conn: &Connection) -> Result<u64> {
    let removed = conn
        .execute(
            "DELETE FROM content_index
             WHERE (entity_kind = 'block'
                    AND entity_id NOT IN (SELECT id FROM blocks))
                OR (entity_kind = 'message'
                    AND entity_id NOT IN (SELECT id FROM messages))",
            [],
        )
        .map_err(|e| op_failed("remove_index_orphans", &e))?;
    Ok(removed as u64)
}

/// Builds an FTS5 query that ORs the terms, each quoted so FTS operators
/// in user input (`-`, `*`, `:`) stay literal; embedded double quotes are
/// doubled.
fn build_fts_query(query: &str) -> String {
    let terms: Vec<_> = query.split_whitespace().collect();
    let estimated_len = terms.iter().map(|t| t.len() + 8).sum::<usize>();
    let mut fts_query = String::with_capacity(estimated_len);
    for (i, term) in terms.iter().enumerate() {
        if i > 0 {
            fts_query.push_str(" OR ");
        }
        fts_query.push('"');
        for c in term.chars() {
            if c == '"' {
                fts_query.push_str("\"\"");
            } else {
                fts_query.push(c);
            }
        }
        fts_query.push('"');
    }
    fts_query
}

/// Maps a BM25 score to (0, 1), higher meaning a better match.
///
/// `SQLite` FTS5 `bm25()` returns negative values where more negative is
/// better; we negate and apply a gentle sigmoid.
fn normalize_bm25(score: f64) -> f32 {
    let positive_score = -score;
    let sigmoid = 1.0 / (1.0 + (-0.5 * positive_score).exp());
    #[allow(clippy::cast_possible_truncation)]
    let clamped = sigmoid.clamp(0.0, 1.0) as f32;
    clamped
}

impl WorkspaceStore {
    /// Full-text search over block and message content.
    ///
    /// The index covers trashed content until the purge removes it;
    /// callers needing live-only results filter the hits against the
    /// tree themselves.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a blank query,
    /// [`crate::Error::OperationFailed`] on storage failure.
    #[instrument(skip(self), fields(query_length = query.len(), limit = limit))]
    pub fn search_content(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        self.timed("search_content", || {
            if query.trim().is_empty() {
                return Err(Error::InvalidInput("search query is empty".to_string()));
            }

            let conn = self.lock();
            let fts_query = build_fts_query(query);

            let mut stmt = conn
                .prepare(
                    "SELECT entity_id, entity_kind, environment_id, project_id,
                            track_id, scene_id, bm25(content_index) AS score
                     FROM content_index
                     WHERE content_index MATCH ?1
                     ORDER BY score
                     LIMIT ?2",
                )
                .map_err(|e| op_failed("prepare_search", &e))?;

            let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);
            let rows = stmt
                .query_map(params![fts_query, limit_i64], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, f64>(6)?,
                    ))
                })
                .map_err(|e| op_failed("execute_search", &e))?;

            let mut hits = Vec::new();
            for row in rows {
                let (entity_id, kind, environment_id, project_id, track_id, scene_id, score) =
                    row.map_err(|e| op_failed("read_search_row", &e))?;
                let Some(entity_kind) = IndexedKind::parse(&kind) else {
                    return Err(Error::InvariantViolation(format!(
                        "index row {entity_id} has unknown kind '{kind}'"
                    )));
                };
                hits.push(SearchHit {
                    entity_id: EntityId::new(entity_id),
                    entity_kind,
                    environment_id: EntityId::new(environment_id),
                    project_id: EntityId::new(project_id),
                    track_id: EntityId::new(track_id),
                    scene_id: EntityId::new(scene_id),
                    score: normalize_bm25(score),
                });
            }

            Ok(hits)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BlockKind, EntityKind, NewMessage};

    struct Fixture {
        store: WorkspaceStore,
        env: EntityId,
        scene: EntityId,
    }

    fn fixture() -> Fixture {
        let store = WorkspaceStore::in_memory().unwrap();
        let env = store.create_environment("E").unwrap();
        let project = store.create_project(&env, "P").unwrap();
        let track = store.create_track(&project, "T").unwrap();
        let scene = store.create_scene(&track, "S").unwrap();
        Fixture { store, env, scene }
    }

    #[test]
    fn test_block_content_is_searchable_with_scope() {
        let f = fixture();
        let block = f
            .store
            .create_block(
                &f.scene,
                BlockKind::Document,
                "Storage design",
                Some("cascade notes"),
                Some("soft delete keeps the subtree connected"),
            )
            .unwrap();

        let hits = f.store.search_content("cascade", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].entity_id, block);
        assert_eq!(hits[0].entity_kind, IndexedKind::Block);
        assert_eq!(hits[0].environment_id, f.env);
        assert_eq!(hits[0].scene_id, f.scene);
        assert!(hits[0].score > 0.0 && hits[0].score <= 1.0);
    }

    #[test]
    fn test_message_bodies_are_searchable() {
        let f = fixture();
        let block = f
            .store
            .create_block(&f.scene, BlockKind::Conversation, "B", None, None)
            .unwrap();
        let message = f
            .store
            .append_message(
                &block,
                &NewMessage {
                    body: "the quick brown fox".to_string(),
                    ..NewMessage::default()
                },
            )
            .unwrap();

        let hits = f.store.search_content("fox", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].entity_id, message);
        assert_eq!(hits[0].entity_kind, IndexedKind::Message);
    }

    #[test]
    fn test_document_update_reindexes_in_same_transaction() {
        let f = fixture();
        let block = f
            .store
            .create_block(&f.scene, BlockKind::Document, "B", None, Some("original"))
            .unwrap();

        f.store
            .update_block_document(&block, "completely different")
            .unwrap();

        assert!(f.store.search_content("original", 10).unwrap().is_empty());
        let hits = f.store.search_content("different", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].entity_id, block);
    }

    #[test]
    fn test_trashed_content_stays_indexed_until_purge() {
        let f = fixture();
        let block = f
            .store
            .create_block(&f.scene, BlockKind::Document, "B", None, Some("lingering"))
            .unwrap();

        f.store.trash(EntityKind::Block, &block).unwrap();
        assert_eq!(f.store.search_content("lingering", 10).unwrap().len(), 1);

        f.store.empty_trash().unwrap();
        assert!(f.store.search_content("lingering", 10).unwrap().is_empty());
    }

    #[test]
    fn test_moving_a_scene_refreshes_index_scope() {
        let f = fixture();
        let other_project = f.store.create_project(&f.env, "P2").unwrap();
        let other_track = f.store.create_track(&other_project, "T2").unwrap();
        let block = f
            .store
            .create_block(&f.scene, BlockKind::Document, "B", None, Some("movable"))
            .unwrap();

        f.store.move_scene(&f.scene, &other_track).unwrap();

        let hits = f.store.search_content("movable", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].entity_id, block);
        assert_eq!(hits[0].track_id, other_track);
        assert_eq!(hits[0].project_id, other_project);
    }

    #[test]
    fn test_blank_query_is_invalid_input() {
        let f = fixture();
        let err = f.store.search_content("   ", 10).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_search_limit_is_respected() {
        let f = fixture();
        for i in 0..5 {
            f.store
                .create_block(
                    &f.scene,
                    BlockKind::Document,
                    &format!("note {i}"),
                    None,
                    Some("common term"),
                )
                .unwrap();
        }

        assert_eq!(f.store.search_content("common", 3).unwrap().len(), 3);
        assert_eq!(f.store.search_content("common", 10).unwrap().len(), 5);
    }

    #[test]
    fn test_build_fts_query_quotes_and_escapes() {
        assert_eq!(build_fts_query("hello"), "\"hello\"");
        assert_eq!(build_fts_query("hello world"), "\"hello\" OR \"world\"");
        assert_eq!(build_fts_query("say \"hi\""), "\"say\" OR \"\"\"hi\"\"\"");
        assert_eq!(build_fts_query("a-b c:d"), "\"a-b\" OR \"c:d\"");
    }

    #[test]
    fn test_normalize_bm25_orders_matches() {
        // More negative BM25 means a better match; after normalization
        // that must mean a higher score.
        let strong = normalize_bm25(-10.0);
        let weak = normalize_bm25(-1.0);
        assert!(strong > weak);
        assert!((0.0..=1.0).contains(&strong));
    }
}
