//! Session reconstruction from start/stop pairs
//!
//! Input must be ordered by station, then event time, then sequence id.
//! Per station the scan keeps at most one open start:
//!
//! - start: replaces the open start (last start wins)
//! - stop without an open start: discarded
//! - stop shorter than [`MIN_SESSION_SECS`]: discarded, the open start stays
//! - otherwise: a session is emitted with the start's group, and the open
//!   start is cleared

use crate::config::MIN_SESSION_SECS;
use crate::event::TalkKind;
use crate::store::LoggedEvent;
use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub station: String,
    pub group: i64,
    pub started_at: NaiveDateTime,
    pub duration_seconds: f64,
}

struct OpenStart {
    started_at: NaiveDateTime,
    group: i64,
}

/// Rebuild sessions in scan order
pub fn reconstruct_sessions(events: &[LoggedEvent]) -> Vec<Session> {
    let mut open: HashMap<&str, OpenStart> = HashMap::new();
    let mut sessions = Vec::new();

    for logged in events {
        let event = &logged.event;
        match event.kind {
            TalkKind::Start => {
                open.insert(
                    event.station.as_str(),
                    OpenStart {
                        started_at: event.timestamp,
                        group: event.group,
                    },
                );
            }
            TalkKind::Stop => {
                let Some(start) = open.get(event.station.as_str()) else {
                    continue;
                };

                let duration = event.timestamp - start.started_at;
                if duration.num_seconds() < MIN_SESSION_SECS {
                    continue;
                }

                sessions.push(Session {
                    station: event.station.clone(),
                    group: start.group,
                    started_at: start.started_at,
                    duration_seconds: duration.num_milliseconds() as f64 / 1000.0,
                });
                open.remove(event.station.as_str());
            }
        }
    }

    sessions
}
