//! Shared connection handling for the `SQLite` store.
//!
//! Provides mutex handling with poison recovery, connection configuration,
//! the transaction bracket every write operation runs inside, and the
//! error/metrics helpers used across the storage layer.

use crate::config::StoreConfig;
use crate::{Error, Result};
use rusqlite::Connection;
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

/// Helper to acquire a mutex lock with poison recovery.
///
/// If the mutex is poisoned (due to a panic in a previous critical
/// section), we recover the inner value and log a warning. This prevents
/// cascading failures when one operation panics.
pub fn acquire_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("SQLite mutex was poisoned, recovering");
            metrics::counter!("sqlite_mutex_poison_recovery_total").increment(1);
            poisoned.into_inner()
        },
    }
}

/// Configures a `SQLite` connection for the store's concurrency model.
///
/// # Configuration Applied
///
/// - **WAL mode**: concurrent readers alongside the single writer
/// - **NORMAL synchronous**: balances durability with performance
/// - **`busy_timeout`**: bounded wait on a held lock, then fail
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if pragma configuration fails.
pub fn configure_connection(conn: &Connection, config: &StoreConfig) -> Result<()> {
    // Note: pragma_update returns the result which we ignore - journal_mode
    // returns a string like "wal" which would cause execute_batch to fail
    let _ = conn.pragma_update(None, "journal_mode", "WAL");
    let _ = conn.pragma_update(None, "synchronous", "NORMAL");
    let _ = conn.pragma_update(None, "busy_timeout", config.busy_timeout_ms.to_string());
    let _ = conn.pragma_update(None, "foreign_keys", "ON");

    Ok(())
}

/// Maps an engine failure onto [`Error::OperationFailed`] with the failing
/// operation's name attached.
pub(crate) fn op_failed(operation: impl Into<String>, cause: &impl fmt::Display) -> Error {
    Error::OperationFailed {
        operation: operation.into(),
        cause: cause.to_string(),
    }
}

/// Runs `f` inside a `BEGIN IMMEDIATE` transaction.
///
/// Commits when `f` returns `Ok`; rolls back on any error so a failed
/// write never leaves a partially applied state. The cascade and purge
/// engines rely on this bracket being the only transaction wrapper.
///
/// # Errors
///
/// Returns `f`'s error after rollback, or [`Error::OperationFailed`] if
/// the transaction itself cannot begin or commit.
pub(crate) fn with_immediate_tx<T>(
    conn: &Connection,
    operation: &str,
    f: impl FnOnce(&Connection) -> Result<T>,
) -> Result<T> {
    conn.execute("BEGIN IMMEDIATE", [])
        .map_err(|e| op_failed(format!("{operation}_begin"), &e))?;

    match f(conn) {
        Ok(value) => {
            conn.execute("COMMIT", [])
                .map_err(|e| op_failed(format!("{operation}_commit"), &e))?;
            Ok(value)
        },
        Err(err) => {
            let _ = conn.execute("ROLLBACK", []);
            Err(err)
        },
    }
}

/// Records operation counters and duration for one store operation.
pub(crate) fn record_operation_metrics(
    operation: &'static str,
    start: Instant,
    status: &'static str,
) {
    metrics::counter!(
        "store_operations_total",
        "backend" => "sqlite",
        "operation" => operation,
        "status" => status
    )
    .increment(1);
    metrics::histogram!(
        "store_operation_duration_ms",
        "backend" => "sqlite",
        "operation" => operation,
        "status" => status
    )
    .record(start.elapsed().as_secs_f64() * 1000.0);
}
