//! Read-side views for the dashboard: active stations and last heard

use crate::clock::parse_ts;
use crate::country::prefix_to_country;
use chrono::NaiveDateTime;
use rusqlite::{params_from_iter, Connection};
use serde::Serialize;

pub const LAST_HEARD_LIMIT: usize = 50;

/// Group filter for [`last_heard`]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LastHeardFilter {
    #[default]
    All,
    /// A single group; non-positive means no filter
    Local(i64),
    /// Any of these groups; non-positive ids are ignored, empty means no filter
    Monitored(Vec<i64>),
}

impl LastHeardFilter {
    fn groups(&self) -> Vec<i64> {
        match self {
            LastHeardFilter::All => Vec::new(),
            LastHeardFilter::Local(tg) if *tg > 0 => vec![*tg],
            LastHeardFilter::Local(_) => Vec::new(),
            LastHeardFilter::Monitored(tgs) => tgs.iter().copied().filter(|tg| *tg > 0).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveStation {
    pub station: String,
    pub group: i64,
    pub origin: String,
    pub since: NaiveDateTime,
    pub location: Option<String>,
    pub country_code: Option<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LastHeardEntry {
    pub station: String,
    pub group: i64,
    pub origin: String,
    pub stopped_at: NaiveDateTime,
    /// Seconds since the latest start of the same station, group and origin
    pub duration_seconds: Option<i64>,
    pub location: Option<String>,
    pub country_code: Option<&'static str>,
}

/// Presence rows with node location, newest first
pub fn active_stations(conn: &Connection) -> rusqlite::Result<Vec<ActiveStation>> {
    let mut stmt = conn.prepare(
        "SELECT s.callsign, s.tg, s.server, s.event_time, n.location
         FROM fmstatus s
         LEFT JOIN nodes n ON n.callsign = s.callsign
         ORDER BY s.event_time DESC, s.callsign",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, Option<String>>(4)?,
        ))
    })?;

    let mut stations = Vec::new();
    for row in rows {
        let (station, group, origin, since, location) = row?;
        let Some(since) = parse_ts(&since) else {
            continue;
        };
        stations.push(ActiveStation {
            country_code: prefix_to_country(&station),
            station,
            group,
            origin,
            since,
            location,
        });
    }
    Ok(stations)
}

/// The most recent stop events, each with the duration of its transmission
pub fn last_heard(
    conn: &Connection,
    filter: &LastHeardFilter,
) -> rusqlite::Result<Vec<LastHeardEntry>> {
    let groups = filter.groups();
    let group_clause = if groups.is_empty() {
        String::new()
    } else {
        let placeholders = vec!["?"; groups.len()].join(",");
        format!(" AND s.tg IN ({})", placeholders)
    };

    let sql = format!(
        "SELECT s.callsign, s.tg, s.server, s.event_time,
                (SELECT MAX(st.event_time)
                 FROM fmlastheard st
                 WHERE st.callsign = s.callsign
                   AND st.tg = s.tg
                   AND st.server = s.server
                   AND st.talk = 'start'
                   AND st.event_time <= s.event_time) AS started_at,
                n.location
         FROM fmlastheard s
         LEFT JOIN nodes n ON n.callsign = s.callsign
         WHERE s.talk = 'stop'{}
         ORDER BY s.event_time DESC, s.id DESC
         LIMIT {}",
        group_clause, LAST_HEARD_LIMIT
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(groups.iter()), |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, Option<String>>(4)?,
            row.get::<_, Option<String>>(5)?,
        ))
    })?;

    let mut entries = Vec::new();
    for row in rows {
        let (station, group, origin, stopped_at, started_at, location) = row?;
        let Some(stopped_at) = parse_ts(&stopped_at) else {
            continue;
        };
        let duration_seconds = started_at
            .as_deref()
            .and_then(parse_ts)
            .map(|start| (stopped_at - start).num_seconds());

        entries.push(LastHeardEntry {
            country_code: prefix_to_country(&station),
            station,
            group,
            origin,
            stopped_at,
            duration_seconds,
            location,
        });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{CanonicalEvent, NodeInfo, TalkKind};
    use crate::store::event_log::append_event;
    use crate::store::nodes::upsert_node;
    use crate::store::presence::upsert_presence;
    use crate::store::schema::run_schema_migrations;
    use chrono::{Duration, NaiveDate};

    fn create_test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        run_schema_migrations(&conn).unwrap();
        conn
    }

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 14)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    fn log(conn: &Connection, offset: i64, kind: TalkKind, station: &str, group: i64) {
        let event = CanonicalEvent {
            timestamp: t0() + Duration::seconds(offset),
            kind,
            station: station.to_string(),
            group,
            origin: "fm1".to_string(),
        };
        append_event(conn, &event, t0()).unwrap();
    }

    #[test]
    fn test_last_heard_duration_and_location() {
        let conn = create_test_db();
        upsert_node(
            &conn,
            &NodeInfo {
                callsign: "DL1ABC".to_string(),
                location: "Hamburg".to_string(),
                locator: String::new(),
                lat: None,
                lon: None,
                rx_freq: String::new(),
                tx_freq: String::new(),
            },
            t0(),
        )
        .unwrap();

        log(&conn, 0, TalkKind::Start, "DL1ABC", 262);
        log(&conn, 42, TalkKind::Stop, "DL1ABC", 262);
        log(&conn, 50, TalkKind::Stop, "G4XYZ", 235);

        let entries = last_heard(&conn, &LastHeardFilter::All).unwrap();
        assert_eq!(entries.len(), 2);

        assert_eq!(entries[0].station, "G4XYZ");
        assert_eq!(entries[0].duration_seconds, None);
        assert_eq!(entries[0].country_code, Some("GB"));

        assert_eq!(entries[1].station, "DL1ABC");
        assert_eq!(entries[1].duration_seconds, Some(42));
        assert_eq!(entries[1].location.as_deref(), Some("Hamburg"));
        assert_eq!(entries[1].country_code, Some("DE"));
    }

    #[test]
    fn test_last_heard_group_filters() {
        let conn = create_test_db();
        log(&conn, 10, TalkKind::Stop, "A1", 1);
        log(&conn, 20, TalkKind::Stop, "B2", 2);
        log(&conn, 30, TalkKind::Stop, "C3", 3);

        let stations = |filter: LastHeardFilter| -> Vec<String> {
            last_heard(&conn, &filter)
                .unwrap()
                .into_iter()
                .map(|e| e.station)
                .collect()
        };

        assert_eq!(stations(LastHeardFilter::Local(2)), vec!["B2"]);
        assert_eq!(stations(LastHeardFilter::Local(0)).len(), 3);
        assert_eq!(stations(LastHeardFilter::Monitored(vec![1, 3, -4])), vec!["C3", "A1"]);
        assert_eq!(stations(LastHeardFilter::Monitored(vec![])).len(), 3);
    }

    #[test]
    fn test_last_heard_is_capped() {
        let conn = create_test_db();
        for i in 0..60 {
            log(&conn, i, TalkKind::Stop, "AB1C", 100);
        }
        assert_eq!(last_heard(&conn, &LastHeardFilter::All).unwrap().len(), LAST_HEARD_LIMIT);
    }

    #[test]
    fn test_active_stations_newest_first() {
        let conn = create_test_db();
        for (offset, station) in [(0, "AB1C"), (30, "DL1ABC")] {
            let event = CanonicalEvent {
                timestamp: t0() + Duration::seconds(offset),
                kind: TalkKind::Start,
                station: station.to_string(),
                group: 262,
                origin: String::new(),
            };
            upsert_presence(&conn, &event, t0()).unwrap();
        }

        let active = active_stations(&conn).unwrap();
        let order: Vec<_> = active.iter().map(|s| s.station.as_str()).collect();
        assert_eq!(order, vec!["DL1ABC", "AB1C"]);
        assert_eq!(active[0].location, None);
    }
}
