//! Snapshot publication backends

use crate::aggregate::AggregateSnapshot;
use crate::error::{HeardError, Result};
use crate::store::{stats, HeardStore};
use async_trait::async_trait;
use std::sync::Arc;

/// Destination for freshly computed snapshots
///
/// A failed publish must leave the previously published snapshot readable.
#[async_trait]
pub trait SnapshotWriter: Send + Sync {
    /// Replace the published snapshot; returns the number of rows written
    async fn publish(&self, snapshot: &AggregateSnapshot) -> Result<usize>;

    /// Backend name for logging
    fn backend_type(&self) -> &'static str;
}

/// Writes snapshots to the `fmstats` table in one transaction
pub struct SqliteSnapshotWriter {
    store: Arc<HeardStore>,
}

impl SqliteSnapshotWriter {
    pub fn new(store: Arc<HeardStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SnapshotWriter for SqliteSnapshotWriter {
    async fn publish(&self, snapshot: &AggregateSnapshot) -> Result<usize> {
        let rows = snapshot.to_rows();
        let mut conn = self
            .store
            .lock()
            .map_err(|e| HeardError::aggregation("publish", e))?;

        stats::replace_snapshot(&mut conn, &rows, snapshot.generated_at)
            .map_err(|e| HeardError::aggregation("publish", e))
    }

    fn backend_type(&self) -> &'static str {
        "SQLite"
    }
}
