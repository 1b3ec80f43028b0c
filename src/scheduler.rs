//! Statistics recomputation and its background scheduler
//!
//! The scheduler wakes every tick, sweeps presence so TTL expiry does not
//! depend on incoming traffic, and recomputes statistics whenever the
//! throttle allows.

use crate::aggregate::{aggregate, AggregateSnapshot};
use crate::clock::{system_clock, NowFn};
use crate::config::RANKING_WINDOW_DAYS;
use crate::error::{HeardError, Result};
use crate::publisher::SnapshotWriter;
use crate::session::reconstruct_sessions;
use crate::store::{event_log, presence, HeardStore};
use chrono::Duration as ChronoDuration;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Allows one run per interval; the first call always runs
///
/// The interval counts from the start of the last run, whether it succeeded
/// or not.
#[derive(Debug)]
pub struct RecomputeThrottle {
    interval: Duration,
    last_run: Option<Instant>,
}

impl RecomputeThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_run: None,
        }
    }

    /// True (and the run is recorded) when a recompute is due at `now`
    pub fn try_begin(&mut self, now: Instant) -> bool {
        let due = match self.last_run {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        };
        if due {
            self.last_run = Some(now);
        }
        due
    }
}

/// Read, reconstruct, aggregate, publish
pub struct StatsEngine {
    store: Arc<HeardStore>,
    writer: Arc<dyn SnapshotWriter>,
    now_fn: NowFn,
}

impl StatsEngine {
    pub fn new(store: Arc<HeardStore>, writer: Arc<dyn SnapshotWriter>) -> Self {
        Self::new_with_clock(store, writer, system_clock())
    }

    pub fn new_with_clock(
        store: Arc<HeardStore>,
        writer: Arc<dyn SnapshotWriter>,
        now_fn: NowFn,
    ) -> Self {
        Self {
            store,
            writer,
            now_fn,
        }
    }

    pub async fn recompute(&self) -> Result<AggregateSnapshot> {
        let started = Instant::now();
        let now = (self.now_fn)();
        let since = now - ChronoDuration::days(RANKING_WINDOW_DAYS);

        let events = {
            let conn = self
                .store
                .lock()
                .map_err(|e| HeardError::aggregation("read", e))?;
            event_log::window_events(&conn, since).map_err(|e| HeardError::aggregation("read", e))?
        };

        let sessions = reconstruct_sessions(&events);
        let snapshot = aggregate(&sessions, now);

        let rows = self.writer.publish(&snapshot).await.map_err(|e| match e {
            HeardError::Aggregation { .. } => e,
            other => HeardError::aggregation("publish", other),
        })?;

        log::info!(
            "📊 Stats recomputed: {} events → {} sessions → {} rows ({}) | {}ms",
            events.len(),
            sessions.len(),
            rows,
            self.writer.backend_type(),
            started.elapsed().as_millis()
        );

        Ok(snapshot)
    }

    pub fn sweep_presence(&self) -> Result<usize> {
        let now = (self.now_fn)();
        let conn = self.store.lock()?;
        Ok(presence::sweep(&conn, now)?)
    }
}

/// Handle to the running scheduler task
pub struct StatsScheduler {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl StatsScheduler {
    pub fn spawn(engine: Arc<StatsEngine>, tick: Duration, stats_interval: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(stats_scheduler_task(
            engine,
            tick,
            RecomputeThrottle::new(stats_interval),
            shutdown_rx,
        ));
        Self {
            shutdown_tx,
            handle,
        }
    }

    /// Stop after the current tick completes
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.handle.await {
            log::error!("❌ Stats scheduler task failed: {}", e);
        }
    }
}

async fn stats_scheduler_task(
    engine: Arc<StatsEngine>,
    tick: Duration,
    mut throttle: RecomputeThrottle,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    log::info!("⏰ Starting stats scheduler");
    log::info!("   ├─ Tick: {}ms", tick.as_millis());
    log::info!("   └─ Recompute interval: {}s", throttle.interval.as_secs());

    let mut timer = interval(tick);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = timer.tick() => {
                match engine.sweep_presence() {
                    Ok(0) => {}
                    Ok(expired) => log::debug!("🧹 Presence sweep expired {} stations", expired),
                    Err(e) => log::warn!("⚠️  Presence sweep failed: {}", e),
                }

                if !throttle.try_begin(Instant::now()) {
                    continue;
                }

                if let Err(e) = engine.recompute().await {
                    log::error!("❌ {} (previous snapshot kept)", e);
                }
            }

            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }

    log::info!("✅ Stats scheduler stopped");
}
