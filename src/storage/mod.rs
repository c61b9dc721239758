//! Storage layer.
//!
//! One [`WorkspaceStore`] handle per workspace, holding a single `SQLite`
//! connection. Write operations (create/rename/move/trash/restore/empty
//! trash) are serialized and each executes inside exactly one
//! `BEGIN IMMEDIATE` transaction; read operations (tree fetch, snapshot,
//! trash-root listing, search) are pure queries. The derived FTS5 content
//! index is synchronized inside the same transaction as the source-row
//! write, so it never lags behind a committed change.
//!
//! The store is an explicit handle the caller owns and injects; there is
//! no process-wide state, and no cross-workspace locking.

// Allow significant_drop_tightening - dropping database connections slightly early
// provides no meaningful benefit.
#![allow(clippy::significant_drop_tightening)]

pub mod connection;
pub mod schema;

mod mutators;
mod purge;
mod restore;
mod rows;
mod search;
mod store;
mod trash;
mod tree;

pub use store::WorkspaceStore;
