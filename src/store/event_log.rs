//! Append-only talker event history (`fmlastheard`)

use crate::clock::{fmt_ts, parse_ts};
use crate::config::RetentionPolicy;
use crate::event::{CanonicalEvent, TalkKind};
use chrono::{Duration, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension};

/// A logged event as read back, with its sequence id
#[derive(Debug, Clone, PartialEq)]
pub struct LoggedEvent {
    pub id: i64,
    pub event: CanonicalEvent,
}

pub fn append_event(
    conn: &Connection,
    event: &CanonicalEvent,
    now: NaiveDateTime,
) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO fmlastheard (event_time, talk, callsign, tg, server, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            fmt_ts(&event.timestamp),
            event.kind.as_str(),
            event.station,
            event.group,
            event.origin,
            fmt_ts(&now),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Kind of the station's most recently logged event, by sequence id
pub fn last_kind_for(conn: &Connection, station: &str) -> rusqlite::Result<Option<TalkKind>> {
    let talk: Option<String> = conn
        .query_row(
            "SELECT talk FROM fmlastheard WHERE callsign = ?1 ORDER BY id DESC LIMIT 1",
            params![station],
            |row| row.get(0),
        )
        .optional()?;
    Ok(talk.as_deref().and_then(TalkKind::parse))
}

/// Enforce the retention policy; returns the number of rows deleted
pub fn apply_retention(
    conn: &Connection,
    policy: &RetentionPolicy,
    now: NaiveDateTime,
) -> rusqlite::Result<usize> {
    match policy {
        RetentionPolicy::MaxAge { days } => {
            let cutoff = now - Duration::days(*days);
            conn.execute(
                "DELETE FROM fmlastheard WHERE event_time < ?1",
                params![fmt_ts(&cutoff)],
            )
        }
        RetentionPolicy::MaxRows { rows } => conn.execute(
            "DELETE FROM fmlastheard
             WHERE id NOT IN (SELECT id FROM fmlastheard ORDER BY id DESC LIMIT ?1)",
            params![i64::try_from(*rows).unwrap_or(i64::MAX)],
        ),
    }
}

/// Events at or after `since`, ordered by station, event time, then id
///
/// Rows whose stored time or kind no longer parses are skipped.
pub fn window_events(
    conn: &Connection,
    since: NaiveDateTime,
) -> rusqlite::Result<Vec<LoggedEvent>> {
    let mut stmt = conn.prepare(
        "SELECT id, event_time, talk, callsign, tg, server
         FROM fmlastheard
         WHERE event_time >= ?1
         ORDER BY callsign, event_time, id",
    )?;

    let rows = stmt.query_map(params![fmt_ts(&since)], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, i64>(4)?,
            row.get::<_, String>(5)?,
        ))
    })?;

    let mut events = Vec::new();
    let mut skipped = 0usize;
    for row in rows {
        let (id, event_time, talk, station, group, origin) = row?;
        match (parse_ts(&event_time), TalkKind::parse(&talk)) {
            (Some(timestamp), Some(kind)) => events.push(LoggedEvent {
                id,
                event: CanonicalEvent {
                    timestamp,
                    kind,
                    station,
                    group,
                    origin,
                },
            }),
            _ => skipped += 1,
        }
    }

    if skipped > 0 {
        log::warn!("⚠️  Skipped {} unreadable event log rows", skipped);
    }

    Ok(events)
}

pub fn count_events(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM fmlastheard", [], |row| row.get(0))
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

    fn at(day: u32, h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, day)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn event(ts: NaiveDateTime, kind: TalkKind, station: &str) -> CanonicalEvent {
        CanonicalEvent {
            timestamp: ts,
            kind,
            station: station.to_string(),
            group: 100,
            origin: "fm1".to_string(),
        }
    }

    #[test]
    fn test_last_kind_follows_sequence_id() {
        let conn = create_test_db();
        assert_eq!(last_kind_for(&conn, "AB1C").unwrap(), None);

        let now = at(14, 9, 0, 0);
        append_event(&conn, &event(at(14, 9, 0, 0), TalkKind::Start, "AB1C"), now).unwrap();
        // Earlier event time but later id still counts as most recent
        append_event(&conn, &event(at(14, 8, 0, 0), TalkKind::Stop, "AB1C"), now).unwrap();

        assert_eq!(last_kind_for(&conn, "AB1C").unwrap(), Some(TalkKind::Stop));
        assert_eq!(last_kind_for(&conn, "XY9Z").unwrap(), None);
    }

    #[test]
    fn test_age_retention_deletes_old_rows() {
        let conn = create_test_db();
        let now = at(14, 12, 0, 0);

        append_event(&conn, &event(at(1, 12, 0, 0), TalkKind::Start, "OLD"), now).unwrap();
        append_event(&conn, &event(at(13, 12, 0, 0), TalkKind::Start, "NEW"), now).unwrap();

        let deleted = apply_retention(&conn, &RetentionPolicy::MaxAge { days: 7 }, now).unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(count_events(&conn).unwrap(), 1);
    }

    #[test]
    fn test_row_cap_keeps_newest() {
        let conn = create_test_db();
        let now = at(14, 12, 0, 0);

        for i in 0..5 {
            append_event(&conn, &event(at(14, 10, i, 0), TalkKind::Start, "AB1C"), now).unwrap();
        }

        let deleted = apply_retention(&conn, &RetentionPolicy::MaxRows { rows: 2 }, now).unwrap();
        assert_eq!(deleted, 3);

        let events = window_events(&conn, at(1, 0, 0, 0)).unwrap();
        let minutes: Vec<_> = events
            .iter()
            .map(|e| e.event.timestamp.format("%M").to_string())
            .collect();
        assert_eq!(minutes, vec!["03", "04"]);
    }

    #[test]
    fn test_huge_row_cap_keeps_everything() {
        let conn = create_test_db();
        let now = at(14, 12, 0, 0);

        for i in 0..3 {
            append_event(&conn, &event(at(14, 10, i, 0), TalkKind::Start, "AB1C"), now).unwrap();
        }

        let policy = RetentionPolicy::MaxRows { rows: u64::MAX };
        assert_eq!(apply_retention(&conn, &policy, now).unwrap(), 0);
        assert_eq!(count_events(&conn).unwrap(), 3);

        let policy = RetentionPolicy::MaxRows { rows: 1 };
        assert_eq!(apply_retention(&conn, &policy, now).unwrap(), 2);
    }

    #[test]
    fn test_window_orders_by_station_then_time() {
        let conn = create_test_db();
        let now = at(14, 12, 0, 0);

        append_event(&conn, &event(at(14, 9, 0, 10), TalkKind::Stop, "BB2B"), now).unwrap();
        append_event(&conn, &event(at(14, 9, 0, 0), TalkKind::Start, "BB2B"), now).unwrap();
        append_event(&conn, &event(at(14, 9, 5, 0), TalkKind::Start, "AA1A"), now).unwrap();
        append_event(&conn, &event(at(2, 9, 0, 0), TalkKind::Start, "AA1A"), now).unwrap();

        let events = window_events(&conn, at(10, 0, 0, 0)).unwrap();
        let order: Vec<_> = events
            .iter()
            .map(|e| (e.event.station.as_str(), e.event.kind))
            .collect();
        assert_eq!(
            order,
            vec![
                ("AA1A", TalkKind::Start),
                ("BB2B", TalkKind::Start),
                ("BB2B", TalkKind::Stop),
            ]
        );
    }
}
