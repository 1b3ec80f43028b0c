//! Live presence cache (`fmstatus`)
//!
//! One row per station. A start creates or replaces the row and refreshes
//! `last_update`; a stop deletes it; the sweep deletes rows untouched for
//! longer than [`PRESENCE_TTL_SECS`].

use crate::clock::{fmt_ts, parse_ts};
use crate::config::PRESENCE_TTL_SECS;
use crate::event::CanonicalEvent;
use chrono::{Duration, NaiveDateTime};
use rusqlite::{params, Connection};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PresenceEntry {
    pub station: String,
    pub since: NaiveDateTime,
    pub group: i64,
    pub origin: String,
    pub last_touched: NaiveDateTime,
}

pub fn upsert_presence(
    conn: &Connection,
    event: &CanonicalEvent,
    now: NaiveDateTime,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO fmstatus (callsign, event_time, tg, server, last_update)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            event.station,
            fmt_ts(&event.timestamp),
            event.group,
            event.origin,
            fmt_ts(&now),
        ],
    )?;
    Ok(())
}

pub fn remove_presence(conn: &Connection, station: &str) -> rusqlite::Result<usize> {
    conn.execute("DELETE FROM fmstatus WHERE callsign = ?1", params![station])
}

/// Drop entries whose last touch is older than the TTL
pub fn sweep(conn: &Connection, now: NaiveDateTime) -> rusqlite::Result<usize> {
    let cutoff = now - Duration::seconds(PRESENCE_TTL_SECS);
    conn.execute(
        "DELETE FROM fmstatus WHERE last_update < ?1",
        params![fmt_ts(&cutoff)],
    )
}

/// All entries, most recently touched first
pub fn list_presence(conn: &Connection) -> rusqlite::Result<Vec<PresenceEntry>> {
    let mut stmt = conn.prepare(
        "SELECT callsign, event_time, tg, server, last_update
         FROM fmstatus
         ORDER BY last_update DESC, callsign",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, i64>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
        ))
    })?;

    let mut entries = Vec::new();
    for row in rows {
        let (station, since, group, origin, last_touched) = row?;
        if let (Some(since), Some(last_touched)) = (parse_ts(&since), parse_ts(&last_touched)) {
            entries.push(PresenceEntry {
                station,
                since,
                group,
                origin,
                last_touched,
            });
        }
    }
    Ok(entries)
}
