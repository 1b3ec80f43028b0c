//! Event log and presence maintenance for accepted events
//!
//! Each event is applied under a single acquisition of the store lock:
//!
//! 1. A stop that follows a logged stop for the same station is dropped
//! 2. Excluded stations skip the log write (presence still applies)
//! 3. Append to the event log
//! 4. Presence upsert (start) or removal (stop)
//! 5. Retention
//! 6. Presence sweep
//!
//! Steps 4-6 are best-effort: a failure is logged and the event still
//! counts as ingested.

use crate::clock::{system_clock, NowFn};
use crate::config::HeardConfig;
use crate::error::Result;
use crate::event::{CanonicalEvent, NodeInfo, TalkKind};
use crate::store::{event_log, nodes, presence, HeardStore};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::Connection;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Logged { id: i64 },
    Excluded,
    DuplicateStop,
}

pub struct EventIngestor {
    store: Arc<HeardStore>,
    config: HeardConfig,
    now_fn: NowFn,
}

impl EventIngestor {
    pub fn new(store: Arc<HeardStore>, config: HeardConfig) -> Self {
        Self::new_with_clock(store, config, system_clock())
    }

    /// Used for testing with deterministic timestamps
    pub fn new_with_clock(store: Arc<HeardStore>, config: HeardConfig, now_fn: NowFn) -> Self {
        Self {
            store,
            config,
            now_fn,
        }
    }

    pub fn now(&self) -> NaiveDateTime {
        (self.now_fn)()
    }

    /// Local calendar date used to complete bare `HH:MM:SS` times
    pub fn today(&self) -> NaiveDate {
        self.now().date()
    }

    pub fn ingest(&self, event: &CanonicalEvent) -> Result<IngestOutcome> {
        let now = self.now();
        let conn = self.store.lock()?;

        if event.is_stop() {
            if let Some(TalkKind::Stop) = event_log::last_kind_for(&conn, &event.station)? {
                log::debug!("🔁 Duplicate stop for {} ignored", event.station);
                return Ok(IngestOutcome::DuplicateStop);
            }
        }

        let outcome = if self.config.is_excluded(&event.station) {
            log::debug!("🚫 {} excluded from event log", event.station);
            IngestOutcome::Excluded
        } else {
            let id = event_log::append_event(&conn, event, now)?;
            log::debug!(
                "📝 #{} {} {} tg={} ({})",
                id,
                event.station,
                event.kind.as_str(),
                event.group,
                event.origin
            );
            IngestOutcome::Logged { id }
        };

        self.maintain(&conn, event, now);

        Ok(outcome)
    }

    pub fn ingest_node(&self, node: &NodeInfo) -> Result<()> {
        let now = self.now();
        let conn = self.store.lock()?;
        nodes::upsert_node(&conn, node, now)?;
        log::debug!("📡 Node {} updated", node.callsign);
        Ok(())
    }

    fn maintain(&self, conn: &Connection, event: &CanonicalEvent, now: NaiveDateTime) {
        let presence_result = match event.kind {
            TalkKind::Start => presence::upsert_presence(conn, event, now),
            TalkKind::Stop => presence::remove_presence(conn, &event.station).map(|_| ()),
        };
        if let Err(e) = presence_result {
            log::warn!("⚠️  Presence update failed for {}: {}", event.station, e);
        }

        match event_log::apply_retention(conn, &self.config.retention, now) {
            Ok(0) => {}
            Ok(deleted) => log::debug!("🧹 Retention removed {} event rows", deleted),
            Err(e) => log::warn!("⚠️  Retention failed: {}", e),
        }

        match presence::sweep(conn, now) {
            Ok(0) => {}
            Ok(expired) => log::debug!("🧹 Presence sweep expired {} stations", expired),
            Err(e) => log::warn!("⚠️  Presence sweep failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetentionPolicy;
    use chrono::{Duration, NaiveDate};
    use std::sync::Mutex;

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 14)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    /// Ingestor with a clock the test can move
    fn create_ingestor(config: HeardConfig) -> (EventIngestor, Arc<HeardStore>, Arc<Mutex<NaiveDateTime>>) {
        let store = Arc::new(HeardStore::open_in_memory().unwrap());
        let clock = Arc::new(Mutex::new(t0()));
        let clock_ref = clock.clone();
        let ingestor = EventIngestor::new_with_clock(
            store.clone(),
            config,
            Arc::new(move || *clock_ref.lock().unwrap()),
        );
        (ingestor, store, clock)
    }

    fn event(offset: i64, kind: TalkKind, station: &str) -> CanonicalEvent {
        CanonicalEvent {
            timestamp: t0() + Duration::seconds(offset),
            kind,
            station: station.to_string(),
            group: 100,
            origin: "fm1".to_string(),
        }
    }

    fn presence_count(store: &HeardStore) -> usize {
        presence::list_presence(&store.lock().unwrap()).unwrap().len()
    }

    fn log_count(store: &HeardStore) -> i64 {
        event_log::count_events(&store.lock().unwrap()).unwrap()
    }

    #[test]
    fn test_start_then_stop_updates_log_and_presence() {
        let (ingestor, store, _) = create_ingestor(HeardConfig::default());

        let outcome = ingestor.ingest(&event(0, TalkKind::Start, "AB1C")).unwrap();
        assert!(matches!(outcome, IngestOutcome::Logged { .. }));
        assert_eq!(presence_count(&store), 1);

        ingestor.ingest(&event(30, TalkKind::Stop, "AB1C")).unwrap();
        assert_eq!(presence_count(&store), 0);
        assert_eq!(log_count(&store), 2);
    }

    #[test]
    fn test_second_stop_is_dropped() {
        let (ingestor, store, _) = create_ingestor(HeardConfig::default());

        ingestor.ingest(&event(0, TalkKind::Start, "AB1C")).unwrap();
        ingestor.ingest(&event(10, TalkKind::Stop, "AB1C")).unwrap();
        let outcome = ingestor.ingest(&event(11, TalkKind::Stop, "AB1C")).unwrap();

        assert_eq!(outcome, IngestOutcome::DuplicateStop);
        assert_eq!(log_count(&store), 2);
    }

    #[test]
    fn test_first_stop_for_unknown_station_is_logged() {
        let (ingestor, store, _) = create_ingestor(HeardConfig::default());
        let outcome = ingestor.ingest(&event(0, TalkKind::Stop, "NEW1")).unwrap();
        assert!(matches!(outcome, IngestOutcome::Logged { .. }));
        assert_eq!(log_count(&store), 1);
    }

    #[test]
    fn test_excluded_station_still_gets_presence() {
        let (ingestor, store, _) = create_ingestor(HeardConfig::default());

        let outcome = ingestor.ingest(&event(0, TalkKind::Start, "TG-262")).unwrap();
        assert_eq!(outcome, IngestOutcome::Excluded);
        assert_eq!(log_count(&store), 0);
        assert_eq!(presence_count(&store), 1);

        ingestor.ingest(&event(5, TalkKind::Stop, "TG-262")).unwrap();
        assert_eq!(presence_count(&store), 0);
    }

    #[test]
    fn test_presence_expires_on_next_ingestion_after_ttl() {
        let (ingestor, store, clock) = create_ingestor(HeardConfig::default());

        ingestor.ingest(&event(0, TalkKind::Start, "AB1C")).unwrap();

        *clock.lock().unwrap() = t0() + Duration::seconds(179);
        ingestor.ingest(&event(179, TalkKind::Start, "XY9Z")).unwrap();
        assert_eq!(presence_count(&store), 2);

        *clock.lock().unwrap() = t0() + Duration::seconds(181);
        ingestor.ingest(&event(181, TalkKind::Start, "QQ1Q")).unwrap();
        let stations: Vec<_> = presence::list_presence(&store.lock().unwrap())
            .unwrap()
            .into_iter()
            .map(|p| p.station)
            .collect();
        assert!(!stations.contains(&"AB1C".to_string()));
        assert_eq!(stations.len(), 2);
    }

    #[test]
    fn test_row_cap_retention_applied_on_ingest() {
        let config = HeardConfig {
            retention: RetentionPolicy::MaxRows { rows: 3 },
            ..HeardConfig::default()
        };
        let (ingestor, store, _) = create_ingestor(config);

        for i in 0..6 {
            ingestor.ingest(&event(i, TalkKind::Start, "AB1C")).unwrap();
        }
        assert_eq!(log_count(&store), 3);
    }

    #[test]
    fn test_node_upsert() {
        let (ingestor, store, _) = create_ingestor(HeardConfig::default());
        let node = NodeInfo {
            callsign: "DB0XYZ".to_string(),
            location: "Berlin".to_string(),
            locator: "JO62QM".to_string(),
            lat: Some(52.5),
            lon: Some(13.4),
            rx_freq: String::new(),
            tx_freq: String::new(),
        };
        ingestor.ingest_node(&node).unwrap();

        let stored = nodes::get_node(&store.lock().unwrap(), "DB0XYZ").unwrap();
        assert_eq!(stored, Some(node));
    }
}
