//! The single node configuration row (`config`, id = 1)
//!
//! The ingestion side only ever seeds this row. Once it exists, the setup
//! surface owns it through [`save_config`].

use crate::clock::fmt_ts;
use crate::config::NodeSeed;
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigRow {
    pub callsign: String,
    pub dns_domain: String,
    pub default_tg: i64,
    pub monitor_tgs: String,
    pub location: String,
    pub locator: String,
    pub sysop: String,
    pub lat: String,
    pub lon: String,
    pub tx_freq: String,
    pub rx_freq: String,
    pub website: String,
    pub node_location: String,
    pub ctcss: String,
    pub updated_at: Option<String>,
}

impl ConfigRow {
    pub fn from_seed(seed: &NodeSeed) -> Self {
        Self {
            callsign: seed.callsign.clone(),
            dns_domain: seed.dns_domain.clone(),
            default_tg: seed.default_tg,
            monitor_tgs: seed.monitor_tgs.clone(),
            ..Default::default()
        }
    }

    /// Parsed `monitor_tgs` list; separators may be commas or whitespace
    pub fn monitored_groups(&self) -> Vec<i64> {
        self.monitor_tgs
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter_map(|s| s.trim().parse::<i64>().ok())
            .collect()
    }
}

/// Insert the row only when none exists; returns true when it was inserted
pub fn seed_config(conn: &Connection, row: &ConfigRow, now: NaiveDateTime) -> rusqlite::Result<bool> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO config (id, callsign, dns_domain, default_tg, monitor_tgs, updated_at)
         VALUES (1, ?1, ?2, ?3, ?4, ?5)",
        params![
            row.callsign,
            row.dns_domain,
            row.default_tg,
            row.monitor_tgs,
            fmt_ts(&now),
        ],
    )?;
    Ok(inserted > 0)
}

pub fn save_config(conn: &Connection, row: &ConfigRow, now: NaiveDateTime) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO config (
            id, callsign, dns_domain, default_tg, monitor_tgs,
            Location, Locator, SysOp, LAT, LON, TXFREQ, RXFREQ,
            Website, nodeLocation, CTCSS, updated_at
         ) VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        params![
            row.callsign,
            row.dns_domain,
            row.default_tg,
            row.monitor_tgs,
            row.location,
            row.locator,
            row.sysop,
            row.lat,
            row.lon,
            row.tx_freq,
            row.rx_freq,
            row.website,
            row.node_location,
            row.ctcss,
            fmt_ts(&now),
        ],
    )?;
    Ok(())
}

pub fn load_config(conn: &Connection) -> rusqlite::Result<Option<ConfigRow>> {
    conn.query_row(
        "SELECT callsign, dns_domain, default_tg, monitor_tgs,
                Location, Locator, SysOp, LAT, LON, TXFREQ, RXFREQ,
                Website, nodeLocation, CTCSS, updated_at
         FROM config WHERE id = 1",
        [],
        |row| {
            let text = |idx: usize| -> rusqlite::Result<String> {
                Ok(row.get::<_, Option<String>>(idx)?.unwrap_or_default())
            };
            Ok(ConfigRow {
                callsign: text(0)?,
                dns_domain: text(1)?,
                default_tg: row.get(2)?,
                monitor_tgs: text(3)?,
                location: text(4)?,
                locator: text(5)?,
                sysop: text(6)?,
                lat: text(7)?,
                lon: text(8)?,
                tx_freq: text(9)?,
                rx_freq: text(10)?,
                website: text(11)?,
                node_location: text(12)?,
                ctcss: text(13)?,
                updated_at: row.get(14)?,
            })
        },
    )
    .optional()
}
