//! Runtime configuration from environment variables
//!
//! Loaded once at startup (after `.env`), with defaults for every value.
//! Window lengths, the presence TTL and the top-N size are fixed constants,
//! not configuration.

use crate::error::{HeardError, Result};
use std::env;
use std::time::Duration;

/// Presence entries untouched for longer than this are swept
pub const PRESENCE_TTL_SECS: i64 = 3 * 60;

/// Spans shorter than this are noise, never sessions
pub const MIN_SESSION_SECS: i64 = 5;

/// Rolling window for the ranking tables
pub const RANKING_WINDOW_DAYS: i64 = 30;

/// Rolling window for the weekday x hour heatmap
pub const HEATMAP_WINDOW_DAYS: i64 = 7;

/// Length of every ranked list
pub const TOP_N: usize = 10;

/// How the event log is kept bounded. Exactly one policy is active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetentionPolicy {
    /// Delete rows whose event time is older than this many days
    MaxAge { days: i64 },
    /// Legacy row-count cap: delete the oldest rows beyond this count
    MaxRows { rows: u64 },
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        // One day beyond the ranking window so the oldest sessions keep their starts
        RetentionPolicy::MaxAge {
            days: RANKING_WINDOW_DAYS + 1,
        }
    }
}

/// Seed values for the single config row
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeSeed {
    pub callsign: String,
    pub dns_domain: String,
    pub default_tg: i64,
    pub monitor_tgs: String,
}

#[derive(Debug, Clone)]
pub struct HeardConfig {
    /// Path to SQLite database file
    pub db_path: String,

    /// Inbound feed channel capacity (messages)
    pub channel_buffer: usize,

    /// Minimum spacing between two statistics recomputations
    pub stats_interval: Duration,

    /// Scheduler wake-up cadence; each wake-up also sweeps presence
    pub scheduler_tick: Duration,

    pub retention: RetentionPolicy,

    /// Station prefixes kept out of the event log (presence still applies)
    pub exclude_prefixes: Vec<String>,

    /// Topic prefix of talker events
    pub talker_topic: String,

    /// Topic prefix of node metadata
    pub nodes_topic: String,

    /// Present when `FMHEARD_NODE_CALLSIGN` is set
    pub node_seed: Option<NodeSeed>,
}

impl Default for HeardConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl HeardConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `FMHEARD_DB_PATH` (default: /var/lib/fmheard/fmheard.db)
    /// - `FMHEARD_CHANNEL_BUFFER` (default: 1000)
    /// - `FMHEARD_STATS_INTERVAL_SECS` (default: 600)
    /// - `FMHEARD_SCHEDULER_TICK_MS` (default: 1000)
    /// - `FMHEARD_RETENTION_DAYS` (default: 31)
    /// - `FMHEARD_MAX_ROWS` (unset; when set, switches to the row-count cap)
    /// - `FMHEARD_EXCLUDE_PREFIXES` (default: TG-)
    /// - `FMHEARD_TALKER_TOPIC` (default: /server/statethr)
    /// - `FMHEARD_NODES_TOPIC` (default: /server/state/nodes/)
    /// - `FMHEARD_NODE_CALLSIGN`, `FMHEARD_DNS_DOMAIN`, `FMHEARD_DEFAULT_TG`,
    ///   `FMHEARD_MONITOR_TGS` (config row seed)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let parsed = |key: &str| lookup(key).and_then(|s| s.trim().parse::<u64>().ok());

        let retention = match parsed("FMHEARD_MAX_ROWS") {
            Some(rows) if rows > 0 => RetentionPolicy::MaxRows { rows },
            _ => match parsed("FMHEARD_RETENTION_DAYS") {
                Some(days) if days > 0 => RetentionPolicy::MaxAge { days: days as i64 },
                _ => RetentionPolicy::default(),
            },
        };

        let exclude_prefixes = lookup("FMHEARD_EXCLUDE_PREFIXES")
            .unwrap_or_else(|| "TG-".to_string())
            .split(',')
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();

        let node_seed = lookup("FMHEARD_NODE_CALLSIGN")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(|callsign| NodeSeed {
                callsign,
                dns_domain: lookup("FMHEARD_DNS_DOMAIN").unwrap_or_default(),
                default_tg: lookup("FMHEARD_DEFAULT_TG")
                    .and_then(|s| s.trim().parse().ok())
                    .unwrap_or(0),
                monitor_tgs: lookup("FMHEARD_MONITOR_TGS").unwrap_or_default(),
            });

        Self {
            db_path: lookup("FMHEARD_DB_PATH")
                .unwrap_or_else(|| "/var/lib/fmheard/fmheard.db".to_string()),

            channel_buffer: parsed("FMHEARD_CHANNEL_BUFFER")
                .map(|n| n.max(1) as usize)
                .unwrap_or(1_000),

            stats_interval: Duration::from_secs(
                parsed("FMHEARD_STATS_INTERVAL_SECS").unwrap_or(600),
            ),

            scheduler_tick: Duration::from_millis(
                parsed("FMHEARD_SCHEDULER_TICK_MS")
                    .filter(|ms| *ms > 0)
                    .unwrap_or(1_000),
            ),

            retention,
            exclude_prefixes,

            talker_topic: lookup("FMHEARD_TALKER_TOPIC")
                .unwrap_or_else(|| "/server/statethr".to_string()),

            nodes_topic: lookup("FMHEARD_NODES_TOPIC")
                .unwrap_or_else(|| "/server/state/nodes/".to_string()),

            node_seed,
        }
    }

    /// Reject settings the runtime cannot start with
    pub fn validate(&self) -> Result<()> {
        if self.db_path.trim().is_empty() {
            return Err(HeardError::Config("FMHEARD_DB_PATH is empty".to_string()));
        }
        if self.talker_topic.is_empty() || self.nodes_topic.is_empty() {
            return Err(HeardError::Config("feed topics must not be empty".to_string()));
        }
        if self.talker_topic.starts_with(&self.nodes_topic)
            || self.nodes_topic.starts_with(&self.talker_topic)
        {
            return Err(HeardError::Config(format!(
                "talker topic '{}' and nodes topic '{}' overlap",
                self.talker_topic, self.nodes_topic
            )));
        }
        Ok(())
    }

    /// True when the station is kept out of the event log
    pub fn is_excluded(&self, station: &str) -> bool {
        self.exclude_prefixes
            .iter()
            .any(|prefix| station.starts_with(prefix.as_str()))
    }
}
