//! Rankings and the weekday x hour heatmap derived from sessions
//!
//! Sessions are expected to cover the ranking window already; only the
//! heatmap applies its own, shorter window. Accumulators keep
//! first-encounter order so that the stable sorts break ties by it.

use crate::config::{HEATMAP_WINDOW_DAYS, TOP_N};
use crate::session::Session;
use crate::store::stats::{
    StatRow, METRIC_HEATMAP_WEEK, METRIC_TOP_CALLS_DURATION, METRIC_TOP_CALLS_QSO,
    METRIC_TOP_CALLS_SCORE, METRIC_TOP_TG_DURATION,
};
use chrono::{Datelike, Duration, NaiveDateTime, Timelike};
use serde::Serialize;
use std::collections::HashMap;

pub type Heatmap = [[u32; 24]; 7];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationRank {
    pub station: String,
    pub qso_count: u64,
    pub total_seconds: f64,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupRank {
    pub group: i64,
    pub qso_count: u64,
    pub total_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateSnapshot {
    pub generated_at: NaiveDateTime,
    pub session_count: usize,
    pub top_stations_by_count: Vec<StationRank>,
    pub top_stations_by_duration: Vec<StationRank>,
    pub top_stations_by_score: Vec<StationRank>,
    pub top_groups_by_duration: Vec<GroupRank>,
    /// `[weekday][hour]`, weekday 0 = Monday
    pub heatmap_week: Heatmap,
}

/// Derive every published metric from `sessions` as of `now`
pub fn aggregate(sessions: &[Session], now: NaiveDateTime) -> AggregateSnapshot {
    let mut stations: Vec<StationRank> = Vec::new();
    let mut station_index: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<GroupRank> = Vec::new();
    let mut group_index: HashMap<i64, usize> = HashMap::new();
    let mut heatmap: Heatmap = [[0; 24]; 7];
    let heatmap_since = now - Duration::days(HEATMAP_WINDOW_DAYS);

    for session in sessions {
        let idx = *station_index
            .entry(session.station.as_str())
            .or_insert_with(|| {
                stations.push(StationRank {
                    station: session.station.clone(),
                    qso_count: 0,
                    total_seconds: 0.0,
                    score: 0.0,
                });
                stations.len() - 1
            });
        stations[idx].qso_count += 1;
        stations[idx].total_seconds += session.duration_seconds;

        let idx = *group_index.entry(session.group).or_insert_with(|| {
            groups.push(GroupRank {
                group: session.group,
                qso_count: 0,
                total_seconds: 0.0,
            });
            groups.len() - 1
        });
        groups[idx].qso_count += 1;
        groups[idx].total_seconds += session.duration_seconds;

        if session.started_at >= heatmap_since {
            let weekday = session.started_at.weekday().num_days_from_monday() as usize;
            let hour = session.started_at.hour() as usize;
            heatmap[weekday][hour] += 1;
        }
    }

    for rank in &mut stations {
        rank.score = rank.qso_count as f64 * rank.total_seconds / 100.0;
    }

    let mut by_count = stations.clone();
    by_count.sort_by(|a, b| b.qso_count.cmp(&a.qso_count));
    by_count.truncate(TOP_N);

    let mut by_duration = stations.clone();
    by_duration.sort_by(|a, b| b.total_seconds.total_cmp(&a.total_seconds));
    by_duration.truncate(TOP_N);

    let mut by_score = stations;
    by_score.sort_by(|a, b| b.score.total_cmp(&a.score));
    by_score.truncate(TOP_N);

    groups.sort_by(|a, b| b.total_seconds.total_cmp(&a.total_seconds));
    groups.truncate(TOP_N);

    AggregateSnapshot {
        generated_at: now,
        session_count: sessions.len(),
        top_stations_by_count: by_count,
        top_stations_by_duration: by_duration,
        top_stations_by_score: by_score,
        top_groups_by_duration: groups,
        heatmap_week: heatmap,
    }
}

impl AggregateSnapshot {
    pub fn heatmap_total(&self) -> u64 {
        self.heatmap_week
            .iter()
            .flat_map(|day| day.iter())
            .map(|&n| n as u64)
            .sum()
    }

    /// Flatten into `fmstats` rows; the heatmap always yields all 168 buckets
    pub fn to_rows(&self) -> Vec<StatRow> {
        let mut rows = Vec::new();

        rows.extend(ranked_rows(METRIC_TOP_CALLS_QSO, &self.top_stations_by_count, |r| {
            r.qso_count as f64
        }));
        rows.extend(ranked_rows(
            METRIC_TOP_CALLS_DURATION,
            &self.top_stations_by_duration,
            |r| r.total_seconds,
        ));
        rows.extend(ranked_rows(METRIC_TOP_CALLS_SCORE, &self.top_stations_by_score, |r| {
            r.score
        }));

        rows.extend(
            self.top_groups_by_duration
                .iter()
                .enumerate()
                .map(|(i, g)| StatRow {
                    metric: METRIC_TOP_TG_DURATION.to_string(),
                    rank: Some(i as i64 + 1),
                    callsign: None,
                    tg: Some(g.group),
                    weekday: None,
                    hour: None,
                    qso_count: Some(g.qso_count as i64),
                    total_seconds: Some(g.total_seconds),
                    score: None,
                    value: g.total_seconds,
                }),
        );

        for (weekday, hours) in self.heatmap_week.iter().enumerate() {
            for (hour, &count) in hours.iter().enumerate() {
                rows.push(StatRow {
                    metric: METRIC_HEATMAP_WEEK.to_string(),
                    rank: None,
                    callsign: None,
                    tg: None,
                    weekday: Some(weekday as i64),
                    hour: Some(hour as i64),
                    qso_count: Some(count as i64),
                    total_seconds: None,
                    score: None,
                    value: count as f64,
                });
            }
        }

        rows
    }
}

fn ranked_rows(metric: &str, list: &[StationRank], value: fn(&StationRank) -> f64) -> Vec<StatRow> {
    list.iter()
        .enumerate()
        .map(|(i, r)| StatRow {
            metric: metric.to_string(),
            rank: Some(i as i64 + 1),
            callsign: Some(r.station.clone()),
            tg: None,
            weekday: None,
            hour: None,
            qso_count: Some(r.qso_count as i64),
            total_seconds: Some(r.total_seconds),
            score: Some(r.score),
            value: value(r),
        })
        .collect()
}
