//! Local wall-clock helpers and the timestamp text format used in SQLite

use chrono::{Local, NaiveDateTime};
use std::sync::Arc;

/// Injectable clock, so TTL and window logic can be tested with fixed time
pub type NowFn = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

/// Storage format for every timestamp column. Sorts chronologically as text.
pub const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

pub fn system_clock() -> NowFn {
    Arc::new(local_now)
}

pub fn fmt_ts(ts: &NaiveDateTime) -> String {
    ts.format(TS_FORMAT).to_string()
}

/// Parse a stored timestamp back; tolerates a `T` separator and fractional seconds
pub fn parse_ts(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    NaiveDateTime::parse_from_str(text, TS_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S"))
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f"))
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
}
