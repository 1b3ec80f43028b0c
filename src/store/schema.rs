//! Idempotent schema loader
//!
//! The SQL files under `/sql/` are embedded at compile time and executed in
//! filename order. Every statement uses `IF NOT EXISTS`.

use rusqlite::Connection;

pub const MIGRATIONS: &[(&str, &str)] = &[
    ("01_fmlastheard.sql", include_str!("../../sql/01_fmlastheard.sql")),
    ("02_fmstatus.sql", include_str!("../../sql/02_fmstatus.sql")),
    ("03_fmstats.sql", include_str!("../../sql/03_fmstats.sql")),
    ("04_nodes.sql", include_str!("../../sql/04_nodes.sql")),
    ("05_config.sql", include_str!("../../sql/05_config.sql")),
];

/// Run all embedded migrations against `conn`
pub fn run_schema_migrations(conn: &Connection) -> rusqlite::Result<()> {
    for (name, sql) in MIGRATIONS {
        log::debug!("   ├─ Executing: {}", name);
        conn.execute_batch(sql)?;
    }
    log::debug!("✅ Schema ready ({} migrations)", MIGRATIONS.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_schema_migrations(&conn).unwrap();
        run_schema_migrations(&conn).unwrap();

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table'
                 AND name IN ('fmlastheard','fmstatus','fmstats','nodes','config')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 5);
    }

    #[test]
    fn test_talk_column_rejects_unknown_kind() {
        let conn = Connection::open_in_memory().unwrap();
        run_schema_migrations(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO fmlastheard (event_time, talk, callsign, tg, server, created_at)
             VALUES ('2026-01-01 00:00:00', 'pause', 'X', 1, '', '2026-01-01 00:00:00')",
            [],
        );
        assert!(result.is_err());
    }
}
