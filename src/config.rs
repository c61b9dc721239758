//! Configuration for the workspace store.

use std::path::{Path, PathBuf};

/// File name of the workspace database inside the workspace directory.
pub const DB_FILE_NAME: &str = "workspace.db";

/// Tuning knobs for the underlying `SQLite` connection.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// How long a write waits on a held database lock before failing,
    /// in milliseconds.
    pub busy_timeout_ms: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5000,
        }
    }
}

/// Location of a single workspace on disk.
///
/// The workspace registry (external to this crate) decides which directory
/// a workspace lives in; this struct maps that directory to the database
/// file. The blob directory next to it is treated as an opaque unit by
/// export/import and never interpreted here.
#[derive(Debug, Clone)]
pub struct WorkspaceConfig {
    /// Directory holding the workspace database and blob directory.
    pub data_dir: PathBuf,
    /// Connection tuning.
    pub store: StoreConfig,
}

impl WorkspaceConfig {
    /// Creates a configuration rooted at the given directory.
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            store: StoreConfig::default(),
        }
    }

    /// Path to the workspace database file.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILE_NAME)
    }

    /// Returns the workspace directory.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_busy_timeout() {
        let config = StoreConfig::default();
        assert_eq!(config.busy_timeout_ms, 5000);
    }

    #[test]
    fn test_database_path_joins_file_name() {
        let config = WorkspaceConfig::new("/tmp/workspaces/alpha");
        assert_eq!(
            config.database_path(),
            PathBuf::from("/tmp/workspaces/alpha/workspace.db")
        );
    }
}
