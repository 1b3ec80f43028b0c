//! Relay node metadata (`nodes`)

use crate::clock::fmt_ts;
use crate::event::NodeInfo;
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};

/// Insert or replace the node row keyed by callsign
pub fn upsert_node(conn: &Connection, node: &NodeInfo, now: NaiveDateTime) -> rusqlite::Result<()> {
    conn.execute(
        "REPLACE INTO nodes (callsign, location, locator, lat, lon, rx_freq, tx_freq, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            node.callsign,
            node.location,
            node.locator,
            node.lat,
            node.lon,
            node.rx_freq,
            node.tx_freq,
            fmt_ts(&now),
        ],
    )?;
    Ok(())
}

pub fn get_node(conn: &Connection, callsign: &str) -> rusqlite::Result<Option<NodeInfo>> {
    conn.query_row(
        "SELECT callsign, location, locator, lat, lon, rx_freq, tx_freq
         FROM nodes WHERE callsign = ?1",
        params![callsign],
        |row| {
            Ok(NodeInfo {
                callsign: row.get(0)?,
                location: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                locator: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                lat: row.get(3)?,
                lon: row.get(4)?,
                rx_freq: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
                tx_freq: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
            })
        },
    )
    .optional()
}
