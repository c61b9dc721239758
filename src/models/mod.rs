//! Data models for atelier.
//!
//! Strongly typed records for the workspace hierarchy, decoded once at the
//! read boundary, plus the read models the store produces (nested tree,
//! trash-root listing, snapshot, search hits).

mod entity;
mod tree;

pub use entity::{
    Block, BlockKind, EntityId, EntityKind, Environment, IndexedKind, Message, NewMessage, Project,
    Scene, Track,
};
pub use tree::{
    EnvironmentNode, ProjectNode, PurgeStats, SceneNode, SearchHit, TrackNode, TrashRoot,
    WorkspaceSnapshot,
};
