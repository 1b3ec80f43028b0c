//! SQLite-backed store for the event log, presence, statistics and node data
//!
//! One connection, one mutex. Callers take the lock once per unit of work
//! (an ingested event, a snapshot replacement) and run every statement of
//! that unit through the same guard, so ingestion and aggregation never
//! interleave partial writes.
//!
//! The table-level operations live in the submodules as free functions over
//! `&Connection`; they never lock on their own.

pub mod config_row;
pub mod event_log;
pub mod nodes;
pub mod presence;
pub mod reports;
pub mod schema;
pub mod stats;

use crate::error::{HeardError, Result};
use crate::sqlite_pragma::apply_optimized_pragmas;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

pub use config_row::ConfigRow;
pub use event_log::LoggedEvent;
pub use presence::PresenceEntry;
pub use reports::{ActiveStation, LastHeardEntry, LastHeardFilter};
pub use stats::StatRow;

pub struct HeardStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl HeardStore {
    /// Open (or create) the database file and bring the schema up to date
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    HeardError::StoreUnavailable(format!(
                        "failed to create database directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let conn = Connection::open(db_path)?;
        apply_optimized_pragmas(&conn)?;
        schema::run_schema_migrations(&conn)?;

        log::info!("✅ SQLite store ready: {}", db_path.display());

        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(db_path.to_path_buf()),
        })
    }

    /// Private in-memory database, used by tests and dry runs
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_optimized_pragmas(&conn)?;
        schema::run_schema_migrations(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Acquire the connection for one unit of work
    pub fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| HeardError::StoreUnavailable("store lock poisoned".to_string()))
    }
}
