//! Published statistics snapshot (`fmstats`)
//!
//! A snapshot is a flat list of rows tagged by metric. Replacement is
//! all-or-nothing: the delete and every insert share one transaction.

use crate::clock::fmt_ts;
use chrono::NaiveDateTime;
use rusqlite::{params, Connection};
use serde::Serialize;

pub const METRIC_TOP_CALLS_QSO: &str = "top_calls_qso";
pub const METRIC_TOP_CALLS_DURATION: &str = "top_calls_duration";
pub const METRIC_TOP_CALLS_SCORE: &str = "top_calls_score";
pub const METRIC_TOP_TG_DURATION: &str = "top_tg_duration";
pub const METRIC_HEATMAP_WEEK: &str = "heatmap_week";

pub const ALL_METRICS: [&str; 5] = [
    METRIC_TOP_CALLS_QSO,
    METRIC_TOP_CALLS_DURATION,
    METRIC_TOP_CALLS_SCORE,
    METRIC_TOP_TG_DURATION,
    METRIC_HEATMAP_WEEK,
];

/// One row of `fmstats`. Ranked rows carry `rank` plus a station or group;
/// heatmap rows carry `weekday` and `hour`. `value` is the metric's own
/// sort key (count, seconds, score or bucket count).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatRow {
    pub metric: String,
    pub rank: Option<i64>,
    pub callsign: Option<String>,
    pub tg: Option<i64>,
    pub weekday: Option<i64>,
    pub hour: Option<i64>,
    pub qso_count: Option<i64>,
    pub total_seconds: Option<f64>,
    pub score: Option<f64>,
    pub value: f64,
}

/// Swap the published snapshot for `rows`; returns the number inserted
pub fn replace_snapshot(
    conn: &mut Connection,
    rows: &[StatRow],
    generated_at: NaiveDateTime,
) -> rusqlite::Result<usize> {
    let updated_at = fmt_ts(&generated_at);
    let tx = conn.transaction()?;

    tx.execute("DELETE FROM fmstats", [])?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO fmstats (
                metric, rank, callsign, tg, weekday, hour,
                qso_count, total_seconds, score, value, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        )?;
        for row in rows {
            stmt.execute(params![
                row.metric,
                row.rank,
                row.callsign,
                row.tg,
                row.weekday,
                row.hour,
                row.qso_count,
                row.total_seconds,
                row.score,
                row.value,
                updated_at,
            ])?;
        }
    }

    tx.commit()?;
    Ok(rows.len())
}

/// Published rows of one metric, by rank (heatmap: by weekday, hour)
pub fn read_metric(conn: &Connection, metric: &str) -> rusqlite::Result<Vec<StatRow>> {
    let mut stmt = conn.prepare(
        "SELECT metric, rank, callsign, tg, weekday, hour,
                qso_count, total_seconds, score, value
         FROM fmstats
         WHERE metric = ?1
         ORDER BY rank, weekday, hour, id",
    )?;

    let rows = stmt.query_map(params![metric], |row| {
        Ok(StatRow {
            metric: row.get(0)?,
            rank: row.get(1)?,
            callsign: row.get(2)?,
            tg: row.get(3)?,
            weekday: row.get(4)?,
            hour: row.get(5)?,
            qso_count: row.get(6)?,
            total_seconds: row.get(7)?,
            score: row.get(8)?,
            value: row.get(9)?,
        })
    })?;

    rows.collect()
}

pub fn count_rows(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM fmstats", [], |row| row.get(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::schema::run_schema_migrations;
    use chrono::NaiveDate;

    fn create_test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        run_schema_migrations(&conn).unwrap();
        conn
    }

    fn ranked(metric: &str, rank: i64, call: &str, value: f64) -> StatRow {
        StatRow {
            metric: metric.to_string(),
            rank: Some(rank),
            callsign: Some(call.to_string()),
            tg: None,
            weekday: None,
            hour: None,
            qso_count: Some(value as i64),
            total_seconds: None,
            score: None,
            value,
        }
    }

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 14)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_replace_discards_previous_snapshot() {
        let mut conn = create_test_db();

        replace_snapshot(
            &mut conn,
            &[
                ranked(METRIC_TOP_CALLS_QSO, 1, "OLD1", 9.0),
                ranked(METRIC_TOP_CALLS_QSO, 2, "OLD2", 3.0),
            ],
            now(),
        )
        .unwrap();
        replace_snapshot(&mut conn, &[ranked(METRIC_TOP_CALLS_QSO, 1, "NEW", 1.0)], now()).unwrap();

        let rows = read_metric(&conn, METRIC_TOP_CALLS_QSO).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].callsign.as_deref(), Some("NEW"));
        assert_eq!(count_rows(&conn).unwrap(), 1);
    }

    #[test]
    fn test_read_metric_orders_by_rank() {
        let mut conn = create_test_db();
        replace_snapshot(
            &mut conn,
            &[
                ranked(METRIC_TOP_CALLS_QSO, 2, "SECOND", 2.0),
                ranked(METRIC_TOP_CALLS_QSO, 1, "FIRST", 5.0),
                ranked(METRIC_TOP_CALLS_SCORE, 1, "OTHER", 1.0),
            ],
            now(),
        )
        .unwrap();

        let calls: Vec<_> = read_metric(&conn, METRIC_TOP_CALLS_QSO)
            .unwrap()
            .into_iter()
            .filter_map(|r| r.callsign)
            .collect();
        assert_eq!(calls, vec!["FIRST", "SECOND"]);
    }

    #[test]
    fn test_failed_insert_rolls_back() {
        let mut conn = create_test_db();
        replace_snapshot(&mut conn, &[ranked(METRIC_TOP_CALLS_QSO, 1, "KEEP", 1.0)], now()).unwrap();

        conn.execute_batch(
            "CREATE TRIGGER reject_boom BEFORE INSERT ON fmstats
             WHEN NEW.callsign = 'BOOM'
             BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
        )
        .unwrap();

        let result = replace_snapshot(
            &mut conn,
            &[
                ranked(METRIC_TOP_CALLS_QSO, 1, "FINE", 1.0),
                ranked(METRIC_TOP_CALLS_QSO, 2, "BOOM", 1.0),
            ],
            now(),
        );
        assert!(result.is_err());

        let rows = read_metric(&conn, METRIC_TOP_CALLS_QSO).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].callsign.as_deref(), Some("KEEP"));
    }
}
