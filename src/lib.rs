//! # Atelier
//!
//! A hierarchical, transactional workspace store.
//!
//! Atelier organizes user content into a five-level hierarchy
//! (Environment > Project > Track > Scene > Block > Message) persisted in
//! `SQLite` and queried as a tree. The store keeps that tree consistent
//! under three destructive-but-reversible operations (move, soft-delete
//! with cascade, and restore with re-parenting) plus an irreversible purge
//! (empty trash), while a derived full-text index stays exactly
//! synchronized with the source rows.
//!
//! ## Features
//!
//! - Single injected store handle per workspace (no process-wide state)
//! - Every write is exactly one `SQLite` transaction (WAL, busy timeout)
//! - Cascading soft-delete with idempotent trash-root tracking
//! - Restore that undoes exactly one prior cascade, with re-parenting
//! - FTS5 content index synchronized inside the source-row transaction
//!
//! ## Example
//!
//! ```rust,ignore
//! use atelier::WorkspaceStore;
//!
//! let store = WorkspaceStore::open("./workspace.db")?;
//! let env = store.create_environment("Main")?;
//! let project = store.create_project(&env, "First project")?;
//! let tree = store.fetch_tree(false)?;
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

use thiserror::Error as ThisError;

// Module declarations
pub mod config;
pub mod models;
pub mod storage;

// Re-exports for convenience
pub use config::{StoreConfig, WorkspaceConfig};
pub use models::{
    Block, BlockKind, EntityId, EntityKind, Environment, EnvironmentNode, IndexedKind, Message,
    NewMessage, Project, ProjectNode, PurgeStats, Scene, SceneNode, SearchHit, Track, TrackNode,
    TrashRoot, WorkspaceSnapshot,
};
pub use storage::WorkspaceStore;

/// Error type for atelier operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait implementations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `NotFound` | Entity or parent missing, or already soft-deleted where a live one was required |
/// | `InvalidInput` | Blank names, missing restore destination, moving a trashed entity |
/// | `OperationFailed` | `SQLite` engine errors, disk failures, lock timeouts |
/// | `InvariantViolation` | Cascade bookkeeping is inconsistent - a bug, not a user error |
#[derive(Debug, ThisError)]
pub enum Error {
    /// A required live entity does not exist.
    ///
    /// Raised when:
    /// - A create names a parent that is missing or soft-deleted
    /// - A rename/move/trash/restore names a missing entity
    /// - A move or restore destination does not resolve to a live parent
    #[error("{kind} not found: {id}")]
    NotFound {
        /// The kind of entity that was looked up.
        kind: models::EntityKind,
        /// The identifier that failed to resolve.
        id: models::EntityId,
    },

    /// Invalid input was provided.
    ///
    /// Raised when:
    /// - A name or title is empty or blank
    /// - A restore for Project/Track/Scene omits the required destination
    /// - A restore for Environment/Block supplies a destination
    /// - A move targets an entity that is currently trashed
    /// - A track's last-opened scene does not belong to that track
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation against the storage engine failed.
    ///
    /// Surfaced to the caller unchanged; the store never retries. The
    /// enclosing transaction has been rolled back, so the tree is
    /// unaffected by the failed write.
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// Cascade bookkeeping is inconsistent.
    ///
    /// Defensive: should never surface if the cascade logic is correct.
    /// Indicates a bug in the store, not a user error.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

/// Result type alias for atelier operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns the current Unix timestamp in milliseconds.
///
/// Centralized so every row written in one operation carries the same
/// instant, which the trash cascade relies on.
///
/// # Examples
///
/// ```rust
/// use atelier::current_timestamp_millis;
///
/// let ts = current_timestamp_millis();
/// assert!(ts > 0);
/// ```
#[must_use]
pub fn current_timestamp_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntityId, EntityKind};

    #[test]
    fn test_error_display() {
        let err = Error::NotFound {
            kind: EntityKind::Project,
            id: EntityId::new("p-1"),
        };
        assert_eq!(err.to_string(), "project not found: p-1");

        let err = Error::InvalidInput("name must not be empty".to_string());
        assert_eq!(err.to_string(), "invalid input: name must not be empty");

        let err = Error::OperationFailed {
            operation: "insert_scene".to_string(),
            cause: "disk I/O error".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "operation 'insert_scene' failed: disk I/O error"
        );

        let err = Error::InvariantViolation("orphaned block".to_string());
        assert_eq!(err.to_string(), "invariant violation: orphaned block");
    }

    #[test]
    fn test_current_timestamp_millis_is_monotonic_enough() {
        let a = current_timestamp_millis();
        let b = current_timestamp_millis();
        assert!(b >= a);
    }
}
