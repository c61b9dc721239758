//! Entity types and identifiers for the workspace hierarchy.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for any entity in the workspace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Creates an ID from an existing string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The soft-deletable entity kinds, ordered parent to child.
///
/// Drives the cascade and restore engines: each kind knows its table, its
/// display/title column, and its position in the parent chain, so the
/// per-level scoped updates are written once instead of per kind.
/// Messages are not a kind here; they carry no soft-delete state and die
/// only with their Block's hard delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// Top-level workspace partition.
    Environment,
    /// Grouping of related work inside an Environment.
    Project,
    /// Parallel workstream lane inside a Project.
    Track,
    /// Conversation container inside a Track.
    Scene,
    /// Unit of content within a Scene.
    Block,
}

impl EntityKind {
    /// All kinds in parent-to-child order.
    pub const ALL: [Self; 5] = [
        Self::Environment,
        Self::Project,
        Self::Track,
        Self::Scene,
        Self::Block,
    ];

    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Environment => "environment",
            Self::Project => "project",
            Self::Track => "track",
            Self::Scene => "scene",
            Self::Block => "block",
        }
    }

    /// Table holding rows of this kind.
    #[must_use]
    pub const fn table(self) -> &'static str {
        match self {
            Self::Environment => "environments",
            Self::Project => "projects",
            Self::Track => "tracks",
            Self::Scene => "scenes",
            Self::Block => "blocks",
        }
    }

    /// Column carrying the user-visible name of this kind.
    #[must_use]
    pub const fn title_column(self) -> &'static str {
        match self {
            Self::Environment | Self::Project | Self::Track => "name",
            Self::Scene | Self::Block => "title",
        }
    }

    /// Foreign-key column referencing the parent, if any.
    #[must_use]
    pub const fn parent_column(self) -> Option<&'static str> {
        match self {
            Self::Environment => None,
            Self::Project => Some("environment_id"),
            Self::Track => Some("project_id"),
            Self::Scene => Some("track_id"),
            Self::Block => Some("scene_id"),
        }
    }

    /// The parent kind, if any.
    #[must_use]
    pub const fn parent(self) -> Option<Self> {
        match self {
            Self::Environment => None,
            Self::Project => Some(Self::Environment),
            Self::Track => Some(Self::Project),
            Self::Scene => Some(Self::Track),
            Self::Block => Some(Self::Scene),
        }
    }

    /// The child kind, if any.
    #[must_use]
    pub const fn child(self) -> Option<Self> {
        match self {
            Self::Environment => Some(Self::Project),
            Self::Project => Some(Self::Track),
            Self::Track => Some(Self::Scene),
            Self::Scene => Some(Self::Block),
            Self::Block => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kind of content a Block holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    /// A conversation turn container.
    #[default]
    Conversation,
    /// A standalone document.
    Document,
    /// A reference to external material.
    Reference,
}

impl BlockKind {
    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Conversation => "conversation",
            Self::Document => "document",
            Self::Reference => "reference",
        }
    }

    /// Parses a stored kind string. Unknown values fall back to
    /// `Conversation`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "document" => Self::Document,
            "reference" => Self::Reference,
            _ => Self::Conversation,
        }
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The entity kinds carried by the derived content index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexedKind {
    /// A Block's title, subtitle, and document text.
    Block,
    /// A Message's body.
    Message,
}

impl IndexedKind {
    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Block => "block",
            Self::Message => "message",
        }
    }

    /// Parses a stored kind string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "block" => Some(Self::Block),
            "message" => Some(Self::Message),
            _ => None,
        }
    }
}

impl fmt::Display for IndexedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level workspace partition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Environment {
    /// Unique identifier.
    pub id: EntityId,
    /// User-visible name.
    pub name: String,
    /// Position among siblings; monotonic, gaps allowed after deletions.
    pub sort_index: i64,
    /// Creation timestamp (Unix epoch milliseconds).
    pub created_at: i64,
    /// Last update timestamp (Unix epoch milliseconds).
    pub updated_at: i64,
    /// Soft-delete timestamp; `None` means live.
    pub deleted_at: Option<i64>,
    /// Id of the trash root that deleted this row; `None` on a trash root.
    pub deleted_root_id: Option<EntityId>,
}

/// Grouping of related work inside an Environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    /// Unique identifier.
    pub id: EntityId,
    /// Owning environment.
    pub environment_id: EntityId,
    /// User-visible name.
    pub name: String,
    /// Position among siblings.
    pub sort_index: i64,
    /// Creation timestamp (Unix epoch milliseconds).
    pub created_at: i64,
    /// Last update timestamp (Unix epoch milliseconds).
    pub updated_at: i64,
    /// Soft-delete timestamp; `None` means live.
    pub deleted_at: Option<i64>,
    /// Id of the trash root that deleted this row; `None` on a trash root.
    pub deleted_root_id: Option<EntityId>,
}

/// Parallel workstream lane inside a Project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    /// Unique identifier.
    pub id: EntityId,
    /// Owning project.
    pub project_id: EntityId,
    /// User-visible name.
    pub name: String,
    /// Position among siblings.
    pub sort_index: i64,
    /// Scene the user last had open in this track, if any.
    pub last_opened_scene_id: Option<EntityId>,
    /// Creation timestamp (Unix epoch milliseconds).
    pub created_at: i64,
    /// Last update timestamp (Unix epoch milliseconds).
    pub updated_at: i64,
    /// Soft-delete timestamp; `None` means live.
    pub deleted_at: Option<i64>,
    /// Id of the trash root that deleted this row; `None` on a trash root.
    pub deleted_root_id: Option<EntityId>,
}

/// Conversation container inside a Track.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scene {
    /// Unique identifier.
    pub id: EntityId,
    /// Owning track.
    pub track_id: EntityId,
    /// User-visible title.
    pub title: String,
    /// Position among siblings.
    pub sort_index: i64,
    /// Creation timestamp (Unix epoch milliseconds).
    pub created_at: i64,
    /// Last update timestamp (Unix epoch milliseconds).
    pub updated_at: i64,
    /// Soft-delete timestamp; `None` means live.
    pub deleted_at: Option<i64>,
    /// Id of the trash root that deleted this row; `None` on a trash root.
    pub deleted_root_id: Option<EntityId>,
}

/// Unit of content within a Scene.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    /// Unique identifier.
    pub id: EntityId,
    /// Owning scene.
    pub scene_id: EntityId,
    /// What the block holds.
    pub kind: BlockKind,
    /// User-visible title.
    pub title: String,
    /// Optional subtitle.
    pub subtitle: Option<String>,
    /// Whether this block is the canonical one for its scene.
    pub is_canonical: bool,
    /// Document text for document-kind blocks.
    pub document_text: Option<String>,
    /// Position among siblings.
    pub sort_index: i64,
    /// Creation timestamp (Unix epoch milliseconds).
    pub created_at: i64,
    /// Last update timestamp (Unix epoch milliseconds).
    pub updated_at: i64,
    /// Soft-delete timestamp; `None` means live.
    pub deleted_at: Option<i64>,
    /// Id of the trash root that deleted this row; `None` on a trash root.
    pub deleted_root_id: Option<EntityId>,
}

/// An atomic turn within a Block.
///
/// Messages have no soft-delete state; they are purged only when their
/// Block is hard-deleted by empty-trash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier.
    pub id: EntityId,
    /// Owning block.
    pub block_id: EntityId,
    /// Whether the turn came from the user (vs. the assistant).
    pub is_user: bool,
    /// When the turn happened (Unix epoch milliseconds).
    pub timestamp: i64,
    /// The turn's text.
    pub body: String,
    /// Caller-assigned tag for the turn.
    pub tag: String,
    /// Which reasoning cycle the turn belongs to.
    pub cycle_index: i64,
    /// Assumptions the turn rests on.
    pub assumptions: Vec<String>,
    /// Sources the turn cites.
    pub sources: Vec<String>,
    /// Rendered sources table, kept as raw JSON.
    pub sources_table_json: Option<String>,
    /// Where in the scene the turn anchors.
    pub locus: String,
    /// Whether the turn passed validation.
    pub is_valid_vpp: bool,
    /// Validation issues, kept as raw JSON.
    pub validation_issues_json: Option<String>,
}

/// Payload for appending a message to a block.
///
/// The store assigns the id and timestamp.
#[derive(Debug, Clone, Default)]
pub struct NewMessage {
    /// Whether the turn came from the user.
    pub is_user: bool,
    /// The turn's text.
    pub body: String,
    /// Caller-assigned tag.
    pub tag: String,
    /// Reasoning cycle index.
    pub cycle_index: i64,
    /// Assumptions the turn rests on.
    pub assumptions: Vec<String>,
    /// Sources the turn cites.
    pub sources: Vec<String>,
    /// Rendered sources table, raw JSON.
    pub sources_table_json: Option<String>,
    /// Where in the scene the turn anchors.
    pub locus: String,
    /// Whether the turn passed validation.
    pub is_valid_vpp: bool,
    /// Validation issues, raw JSON.
    pub validation_issues_json: Option<String>,
}
