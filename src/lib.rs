//! fmheard: talker activity log, live presence and usage statistics for an
//! FM relay network
//!
//! Data flow:
//!
//! ```text
//! relay feed → listener → event::normalize → ingest (event log + presence)
//! scheduler → store window → session → aggregate → publisher (fmstats)
//! ```

pub mod aggregate;
pub mod clock;
pub mod config;
pub mod country;
pub mod error;
pub mod event;
pub mod ingest;
pub mod listener;
pub mod publisher;
pub mod scheduler;
pub mod session;
pub mod sqlite_pragma;
pub mod store;

pub use config::HeardConfig;
pub use error::{HeardError, Result};
pub use event::{CanonicalEvent, TalkKind};
pub use ingest::{EventIngestor, IngestOutcome};
pub use listener::{FeedHandler, FeedListener, FeedMessage};
pub use publisher::{SnapshotWriter, SqliteSnapshotWriter};
pub use scheduler::{RecomputeThrottle, StatsEngine, StatsScheduler};
pub use store::HeardStore;
