//! Read models produced by the store.
//!
//! These are disposable, rebuildable projections of the persisted rows;
//! the store remains the single owner of entity state.

use super::entity::{
    Block, EntityId, EntityKind, Environment, IndexedKind, Message, Project, Scene, Track,
};
use serde::{Deserialize, Serialize};

/// An Environment with its nested descendants attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentNode {
    /// The environment row.
    pub environment: Environment,
    /// Child projects, ordered `sort_index ASC, updated_at DESC`.
    pub projects: Vec<ProjectNode>,
}

/// A Project with its nested descendants attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectNode {
    /// The project row.
    pub project: Project,
    /// Child tracks, ordered `sort_index ASC, updated_at DESC`.
    pub tracks: Vec<TrackNode>,
}

/// A Track with its nested descendants attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackNode {
    /// The track row.
    pub track: Track,
    /// Child scenes, ordered `sort_index ASC, updated_at DESC`.
    pub scenes: Vec<SceneNode>,
}

/// A Scene with its blocks attached.
///
/// Messages are not part of the tree; use
/// [`snapshot`](crate::WorkspaceStore::snapshot) to export them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneNode {
    /// The scene row.
    pub scene: Scene,
    /// Child blocks, ordered `sort_index ASC, updated_at DESC`.
    pub blocks: Vec<Block>,
}

/// One entry in the trash listing.
///
/// A trash root is the entity a `trash` call was directly invoked on,
/// identified by `deleted_at` set and `deleted_root_id` null.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrashRoot {
    /// The root entity's id.
    pub id: EntityId,
    /// The root entity's kind.
    pub kind: EntityKind,
    /// The root entity's name or title.
    pub title: String,
    /// When the trash operation ran (Unix epoch milliseconds).
    pub deleted_at: i64,
    /// How many descendant rows the cascade carried along.
    pub child_count: u64,
}

/// Flat raw rows of the whole workspace, for export and diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceSnapshot {
    /// All environment rows.
    pub environments: Vec<Environment>,
    /// All project rows.
    pub projects: Vec<Project>,
    /// All track rows.
    pub tracks: Vec<Track>,
    /// All scene rows.
    pub scenes: Vec<Scene>,
    /// All block rows.
    pub blocks: Vec<Block>,
    /// All message rows.
    pub messages: Vec<Message>,
}

/// One hit from the derived content index.
///
/// The index covers trashed content until it is purged; callers that need
/// live-only results filter against the tree themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    /// Id of the matched block or message.
    pub entity_id: EntityId,
    /// Whether the hit is a block or a message.
    pub entity_kind: IndexedKind,
    /// Environment the hit lives under.
    pub environment_id: EntityId,
    /// Project the hit lives under.
    pub project_id: EntityId,
    /// Track the hit lives under.
    pub track_id: EntityId,
    /// Scene the hit lives under.
    pub scene_id: EntityId,
    /// Relevance in (0, 1); higher is better.
    pub score: f32,
}

/// Per-table row counts removed by an empty-trash purge.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PurgeStats {
    /// Messages removed.
    pub messages: u64,
    /// Blocks removed.
    pub blocks: u64,
    /// Scenes removed.
    pub scenes: u64,
    /// Tracks removed.
    pub tracks: u64,
    /// Projects removed.
    pub projects: u64,
    /// Environments removed.
    pub environments: u64,
}

impl PurgeStats {
    /// Total rows removed across all tables.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.messages
            + self.blocks
            + self.scenes
            + self.tracks
            + self.projects
            + self.environments
    }
}
