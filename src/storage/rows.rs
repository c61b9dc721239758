//! Row decoding for the workspace tables.
//!
//! Rows are decoded once, at the read boundary, into the typed records in
//! [`crate::models`]. Every reader shares the column lists and converters
//! here so the storage layer has exactly one notion of each table's shape.

use crate::models::{
    Block, BlockKind, EntityId, Environment, Message, Project, Scene, Track,
};
use rusqlite::Row;
use rusqlite::types::Type;

/// Column list matching [`environment_from_row`].
pub(crate) const ENVIRONMENT_COLUMNS: &str =
    "id, name, sort_index, created_at, updated_at, deleted_at, deleted_root_id";

/// Column list matching [`project_from_row`].
pub(crate) const PROJECT_COLUMNS: &str =
    "id, environment_id, name, sort_index, created_at, updated_at, deleted_at, deleted_root_id";

/// Column list matching [`track_from_row`].
pub(crate) const TRACK_COLUMNS: &str = "id, project_id, name, sort_index, last_opened_scene_id, \
     created_at, updated_at, deleted_at, deleted_root_id";

/// Column list matching [`scene_from_row`].
pub(crate) const SCENE_COLUMNS: &str =
    "id, track_id, title, sort_index, created_at, updated_at, deleted_at, deleted_root_id";

/// Column list matching [`block_from_row`].
pub(crate) const BLOCK_COLUMNS: &str = "id, scene_id, kind, title, subtitle, is_canonical, \
     document_text, sort_index, created_at, updated_at, deleted_at, deleted_root_id";

/// Column list matching [`message_from_row`].
pub(crate) const MESSAGE_COLUMNS: &str = "id, block_id, is_user, timestamp, body, tag, \
     cycle_index, assumptions, sources, sources_table_json, locus, is_valid_vpp, \
     validation_issues_json";

fn id_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<EntityId> {
    row.get::<_, String>(idx).map(EntityId::new)
}

fn optional_id_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<EntityId>> {
    Ok(row.get::<_, Option<String>>(idx)?.map(EntityId::new))
}

/// Decodes a JSON string-array column, surfacing malformed JSON as a
/// column conversion failure rather than a panic.
fn json_string_list(row: &Row<'_>, idx: usize) -> rusqlite::Result<Vec<String>> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn environment_from_row(row: &Row<'_>) -> rusqlite::Result<Environment> {
    Ok(Environment {
        id: id_at(row, 0)?,
        name: row.get(1)?,
        sort_index: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
        deleted_at: row.get(5)?,
        deleted_root_id: optional_id_at(row, 6)?,
    })
}

pub(crate) fn project_from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: id_at(row, 0)?,
        environment_id: id_at(row, 1)?,
        name: row.get(2)?,
        sort_index: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
        deleted_at: row.get(6)?,
        deleted_root_id: optional_id_at(row, 7)?,
    })
}

pub(crate) fn track_from_row(row: &Row<'_>) -> rusqlite::Result<Track> {
    Ok(Track {
        id: id_at(row, 0)?,
        project_id: id_at(row, 1)?,
        name: row.get(2)?,
        sort_index: row.get(3)?,
        last_opened_scene_id: optional_id_at(row, 4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
        deleted_at: row.get(7)?,
        deleted_root_id: optional_id_at(row, 8)?,
    })
}

pub(crate) fn scene_from_row(row: &Row<'_>) -> rusqlite::Result<Scene> {
    Ok(Scene {
        id: id_at(row, 0)?,
        track_id: id_at(row, 1)?,
        title: row.get(2)?,
        sort_index: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
        deleted_at: row.get(6)?,
        deleted_root_id: optional_id_at(row, 7)?,
    })
}

pub(crate) fn block_from_row(row: &Row<'_>) -> rusqlite::Result<Block> {
    let kind: String = row.get(2)?;
    Ok(Block {
        id: id_at(row, 0)?,
        scene_id: id_at(row, 1)?,
        kind: BlockKind::parse(&kind),
        title: row.get(3)?,
        subtitle: row.get(4)?,
        is_canonical: row.get(5)?,
        document_text: row.get(6)?,
        sort_index: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
        deleted_at: row.get(10)?,
        deleted_root_id: optional_id_at(row, 11)?,
    })
}

pub(crate) fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: id_at(row, 0)?,
        block_id: id_at(row, 1)?,
        is_user: row.get(2)?,
        timestamp: row.get(3)?,
        body: row.get(4)?,
        tag: row.get(5)?,
        cycle_index: row.get(6)?,
        assumptions: json_string_list(row, 7)?,
        sources: json_string_list(row, 8)?,
        sources_table_json: row.get(9)?,
        locus: row.get(10)?,
        is_valid_vpp: row.get(11)?,
        validation_issues_json: row.get(12)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_message_row_round_trip() {
        let conn = Connection::open_in_memory().unwrap();
        crate::storage::schema::run_migrations(&conn).unwrap();
        conn.execute(
            "INSERT INTO environments (id, name, sort_index, created_at, updated_at)
             VALUES ('e', 'E', 0, 1, 1)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO projects (id, environment_id, name, sort_index, created_at, updated_at)
             VALUES ('p', 'e', 'P', 0, 1, 1)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO tracks (id, project_id, name, sort_index, created_at, updated_at)
             VALUES ('t', 'p', 'T', 0, 1, 1)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO scenes (id, track_id, title, sort_index, created_at, updated_at)
             VALUES ('s', 't', 'S', 0, 1, 1)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO blocks (id, scene_id, kind, title, sort_index, created_at, updated_at)
             VALUES ('b', 's', 'conversation', 'B', 0, 1, 1)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO messages (id, block_id, is_user, timestamp, body, tag, cycle_index,
                                   assumptions, sources, sources_table_json, locus,
                                   is_valid_vpp, validation_issues_json)
             VALUES ('m', 'b', 1, 42, 'hello', 'draft', 2,
                     '[\"a1\",\"a2\"]', '[]', NULL, 'top', 0, NULL)",
            [],
        )
        .unwrap();

        let message = conn
            .query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = 'm'"),
                [],
                message_from_row,
            )
            .unwrap();

        assert_eq!(message.block_id.as_str(), "b");
        assert!(message.is_user);
        assert_eq!(message.timestamp, 42);
        assert_eq!(message.assumptions, vec!["a1", "a2"]);
        assert!(message.sources.is_empty());
        assert_eq!(message.locus, "top");
        assert!(!message.is_valid_vpp);
    }

    #[test]
    fn test_malformed_json_column_is_an_error_not_a_panic() {
        let conn = Connection::open_in_memory().unwrap();
        crate::storage::schema::run_migrations(&conn).unwrap();
        // Bypass the store to plant a corrupt row.
        conn.pragma_update(None, "foreign_keys", "OFF").unwrap();
        conn.execute(
            "INSERT INTO messages (id, block_id, is_user, timestamp, body, tag, cycle_index,
                                   assumptions, sources, locus, is_valid_vpp)
             VALUES ('m', 'b', 0, 1, 'x', '', 0, 'not json', '[]', '', 1)",
            [],
        )
        .unwrap();

        let result = conn.query_row(
            &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = 'm'"),
            [],
            message_from_row,
        );
        assert!(result.is_err());
    }
}
