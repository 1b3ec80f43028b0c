//! Connection PRAGMAs applied to every store connection

use rusqlite::Connection;
use std::time::Duration;

/// How long a statement waits on a locked database before failing
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Apply WAL mode and the throughput settings used by the store
///
/// In-memory databases silently keep `journal_mode=memory`.
pub fn apply_optimized_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    conn.pragma_update(None, "mmap_size", 64 * 1024 * 1024_i64)?;
    conn.pragma_update(None, "cache_size", -8000)?;
    conn.pragma_update(None, "wal_autocheckpoint", 1000)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;

    log::debug!("SQLite pragmas applied (journal_mode={})", mode);
    Ok(())
}
