//! Feed listener: routes relay messages by topic into ingestion
//!
//! Messages arrive on an mpsc channel as `(topic, payload)` pairs and are
//! handled one at a time. Talker topics are normalized and ingested, node
//! topics update node metadata, anything else is ignored. A bad message is
//! logged and dropped; the loop only ends when every sender is gone.

use crate::config::HeardConfig;
use crate::error::{HeardError, Result};
use crate::event::{normalize, NodeInfo, NodePayload, TalkerPayload};
use crate::ingest::{EventIngestor, IngestOutcome};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const RATE_LOG_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedMessage {
    pub topic: String,
    pub payload: String,
}

impl FeedMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// Parse a `<topic> <payload>` line; blank lines and bare topics yield None
    pub fn parse_line(line: &str) -> Option<Self> {
        let (topic, payload) = line.trim().split_once(char::is_whitespace)?;
        let payload = payload.trim();
        if topic.is_empty() || payload.is_empty() {
            return None;
        }
        Some(Self::new(topic, payload))
    }
}

/// What happened to one message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routed {
    Talker(IngestOutcome),
    Node,
    Ignored,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListenerStats {
    pub received: u64,
    pub logged: u64,
    pub excluded: u64,
    pub duplicate_stops: u64,
    pub nodes: u64,
    pub ignored: u64,
    pub dropped: u64,
}

impl ListenerStats {
    fn record(&mut self, result: &Result<Routed>) {
        self.received += 1;
        match result {
            Ok(Routed::Talker(IngestOutcome::Logged { .. })) => self.logged += 1,
            Ok(Routed::Talker(IngestOutcome::Excluded)) => self.excluded += 1,
            Ok(Routed::Talker(IngestOutcome::DuplicateStop)) => self.duplicate_stops += 1,
            Ok(Routed::Node) => self.nodes += 1,
            Ok(Routed::Ignored) => self.ignored += 1,
            Err(_) => self.dropped += 1,
        }
    }
}

/// Topic routing plus the ingestion sink
pub struct FeedHandler {
    ingestor: Arc<EventIngestor>,
    talker_topic: String,
    nodes_topic: String,
}

impl FeedHandler {
    pub fn new(ingestor: Arc<EventIngestor>, config: &HeardConfig) -> Self {
        Self {
            ingestor,
            talker_topic: config.talker_topic.clone(),
            nodes_topic: config.nodes_topic.clone(),
        }
    }

    pub fn handle(&self, message: &FeedMessage) -> Result<Routed> {
        if message.topic.starts_with(&self.nodes_topic) {
            let payload = NodePayload::from_json(json_object(&message.payload)?)?;
            let node = NodeInfo::from_payload(payload)?;
            self.ingestor.ingest_node(&node)?;
            return Ok(Routed::Node);
        }

        if message.topic.starts_with(&self.talker_topic) {
            let payload = TalkerPayload::from_json(json_object(&message.payload)?)?;
            let event = normalize(payload, self.ingestor.today())?;
            let outcome = self.ingestor.ingest(&event)?;
            return Ok(Routed::Talker(outcome));
        }

        log::debug!("Ignoring message on topic {}", message.topic);
        Ok(Routed::Ignored)
    }
}

/// Leading whitespace is tolerated; anything but an object is rejected
fn json_object(payload: &str) -> Result<&str> {
    let trimmed = payload.trim_start();
    if trimmed.starts_with('{') {
        Ok(trimmed)
    } else {
        Err(HeardError::Decode("payload is not a JSON object".to_string()))
    }
}

/// Handle to the running ingestion task
pub struct FeedListener {
    tx: mpsc::Sender<FeedMessage>,
    handle: JoinHandle<ListenerStats>,
}

impl FeedListener {
    pub fn spawn(handler: FeedHandler, channel_buffer: usize) -> Self {
        let (tx, rx) = mpsc::channel(channel_buffer);
        let handle = tokio::spawn(feed_ingestion_task(rx, handler, channel_buffer));
        Self { tx, handle }
    }

    /// Additional producer handle; the listener stops only once all are dropped
    pub fn sender(&self) -> mpsc::Sender<FeedMessage> {
        self.tx.clone()
    }

    pub async fn send(&self, message: FeedMessage) -> Result<()> {
        self.tx
            .send(message)
            .await
            .map_err(|_| HeardError::ListenerClosed)
    }

    /// Close the channel, drain what is queued, and return the totals
    pub async fn shutdown(self) -> ListenerStats {
        drop(self.tx);
        match self.handle.await {
            Ok(stats) => stats,
            Err(e) => {
                log::error!("❌ Feed listener task failed: {}", e);
                ListenerStats::default()
            }
        }
    }
}

async fn feed_ingestion_task(
    mut rx: mpsc::Receiver<FeedMessage>,
    handler: FeedHandler,
    channel_capacity: usize,
) -> ListenerStats {
    log::info!("🚀 Starting feed ingestion");
    log::info!("   ├─ Talker topic: {}", handler.talker_topic);
    log::info!("   ├─ Nodes topic: {}", handler.nodes_topic);
    log::info!("   └─ Waiting for messages...");

    let mut stats = ListenerStats::default();
    let mut window_count = 0u64;
    let mut last_log_time = Instant::now();

    while let Some(message) = rx.recv().await {
        let result = handler.handle(&message);
        if let Err(e) = &result {
            log::warn!("⚠️  Dropped message on {}: {}", message.topic, e);
        }
        stats.record(&result);
        window_count += 1;

        if last_log_time.elapsed().as_secs() >= RATE_LOG_SECS {
            let channel_usage = rx.len();
            log::info!(
                "📊 Feed: {} messages in {}s | channel: {}/{}",
                window_count,
                last_log_time.elapsed().as_secs(),
                channel_usage,
                channel_capacity
            );
            if channel_usage > channel_capacity / 2 {
                log::warn!(
                    "⚠️  Channel usage high: {}/{} ({}%)",
                    channel_usage,
                    channel_capacity,
                    (channel_usage * 100) / channel_capacity.max(1)
                );
            }
            window_count = 0;
            last_log_time = Instant::now();
        }
    }

    log::info!(
        "✅ Feed ingestion stopped: {} received, {} logged, {} excluded, {} duplicate stops, {} nodes, {} dropped",
        stats.received,
        stats.logged,
        stats.excluded,
        stats.duplicate_stops,
        stats.nodes,
        stats.dropped
    );
    stats
}
