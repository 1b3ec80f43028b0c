//! fmheard runtime
//!
//! Reads relay feed lines from stdin, one message per line:
//!
//! ```text
//! /server/statethr {"time":"09:00:00","talk":"start","call":"AB1C","tg":"100"}
//! /server/state/nodes/DB0XYZ {"call":"DB0XYZ","location":"Berlin"}
//! ```
//!
//! A broker bridge such as `mosquitto_sub -v -t '/server/#'` produces this
//! format directly.
//!
//! Usage:
//!   mosquitto_sub -v -t '/server/#' | fmheard
//!
//! Environment variables: see `HeardConfig::from_env`. `RUST_LOG` defaults
//! to `info`.

use dotenv::dotenv;
use fmheard::clock::local_now;
use fmheard::config::{HeardConfig, RetentionPolicy};
use fmheard::store::config_row::{seed_config, ConfigRow};
use fmheard::{
    EventIngestor, HeardError, FeedHandler, FeedListener, FeedMessage, HeardStore, SnapshotWriter,
    SqliteSnapshotWriter, StatsEngine, StatsScheduler,
};
use log::{error, info, warn};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    info!("🚀 fmheard - FM relay talker log");
    info!("   └─ Version: {}", env!("CARGO_PKG_VERSION"));

    let config = HeardConfig::from_env();
    config.validate()?;

    info!("✅ Configuration loaded");
    info!("   ├─ Database: {}", config.db_path);
    info!("   ├─ Channel buffer: {} messages", config.channel_buffer);
    info!("   ├─ Stats interval: {}s", config.stats_interval.as_secs());
    info!("   ├─ Scheduler tick: {}ms", config.scheduler_tick.as_millis());
    match &config.retention {
        RetentionPolicy::MaxAge { days } => info!("   ├─ Retention: {} days", days),
        RetentionPolicy::MaxRows { rows } => info!("   ├─ Retention: newest {} rows", rows),
    }
    info!("   └─ Excluded prefixes: {:?}", config.exclude_prefixes);

    info!("🔧 Initializing database...");
    let store = Arc::new(HeardStore::open(&config.db_path)?);

    if let Some(seed) = &config.node_seed {
        let conn = store.lock()?;
        if seed_config(&conn, &ConfigRow::from_seed(seed), local_now())? {
            info!("✅ Config row seeded for {}", seed.callsign);
        } else {
            info!("   └─ Config row already present, left unchanged");
        }
    }

    let ingestor = Arc::new(EventIngestor::new(store.clone(), config.clone()));
    let listener = FeedListener::spawn(FeedHandler::new(ingestor, &config), config.channel_buffer);

    let writer: Arc<dyn SnapshotWriter> = Arc::new(SqliteSnapshotWriter::new(store.clone()));
    let engine = Arc::new(StatsEngine::new(store.clone(), writer));
    let scheduler = StatsScheduler::spawn(engine, config.scheduler_tick, config.stats_interval);

    info!("✅ All background tasks running");
    info!("🔄 Reading feed from stdin (CTRL+C or EOF to stop)");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut feed_error = None;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    let Some(message) = FeedMessage::parse_line(&line) else {
                        continue;
                    };
                    if let Err(e) = listener.send(message).await {
                        error!("❌ {}", e);
                        break;
                    }
                }
                Ok(None) => {
                    info!("⚠️  Feed closed (EOF), shutting down...");
                    break;
                }
                Err(e) => {
                    warn!("⚠️  Failed to read feed: {}", e);
                    feed_error = Some(e);
                    break;
                }
            },

            signal = &mut ctrl_c => {
                match signal {
                    Ok(()) => info!("⚠️  Received CTRL+C, shutting down..."),
                    Err(e) => error!("❌ Failed to listen for CTRL+C: {}", e),
                }
                break;
            }
        }
    }

    let stats = listener.shutdown().await;
    scheduler.shutdown().await;

    info!("📊 Session summary:");
    info!("   ├─ Messages: {}", stats.received);
    info!("   ├─ Logged events: {}", stats.logged);
    info!("   ├─ Excluded: {}", stats.excluded);
    info!("   ├─ Duplicate stops: {}", stats.duplicate_stops);
    info!("   ├─ Node updates: {}", stats.nodes);
    info!("   └─ Dropped: {}", stats.dropped);
    info!("✅ fmheard stopped");

    match feed_error {
        Some(e) => Err(HeardError::Io(e).into()),
        None => Ok(()),
    }
}
