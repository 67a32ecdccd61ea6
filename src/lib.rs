//! # Search Sync Engine
//!
//! Incremental, checkpoint-driven synchronization of the PostgreSQL `content`
//! schema into a search index.
//!
//! ## Architecture
//!
//! Every cycle walks three change streams in order. Dependent streams (persons,
//! genres) resolve their changes to the films that reference them; all streams
//! feed one per-cycle dedup set so each film is published at most once:
//!
//! ```text
//!   Redis                       PostgreSQL                         Elasticsearch
//! ┌───────────────────┐      ┌──────────────────────┐
//! │ CheckpointTracker │      │ SourceSession        │
//! │ (watermark/stream)│      │ (reconnect + backoff)│
//! └─────────┬─────────┘      └──────────┬───────────┘
//!           │ watermark                 │
//!           ▼                           ▼
//!      poll (detect) ──► resolve ──► DedupSet::claim ──► aggregate ──► BulkPublisher ──► _bulk
//!           ▲                                                              │
//!           └──────────────────── advance watermark ◄──────────────────────┘
//! ```
//!
//! ## Delivery
//!
//! Index writes are upserts by film id, so delivery is at-least-once and
//! replays are harmless. See [`config::CommitPoint`] for when watermarks move.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use search_sync::{Synchronizer, SyncConfig};
//! use search_sync::checkpoint::RedisCheckpointStore;
//! use search_sync::publisher::ElasticsearchSink;
//! use search_sync::source::PgConnector;
//! use tokio::sync::watch;
//!
//! #[tokio::main]
//! async fn main() -> search_sync::Result<()> {
//!     let config = SyncConfig::default();
//!     let store = RedisCheckpointStore::connect(&config.redis.url).await?;
//!     let sink = ElasticsearchSink::new(&config.elasticsearch)?;
//!     let connector = PgConnector::from_config(&config.postgres);
//!
//!     let (_tx, rx) = watch::channel(false);
//!     let mut sync = Synchronizer::new(config, connector, store, sink);
//!     sync.run(rx).await
//! }
//! ```

pub mod aggregator;
pub mod checkpoint;
pub mod config;
pub mod coordinator;
pub mod dedup;
pub mod detector;
pub mod error;
pub mod metrics;
pub mod model;
pub mod publisher;
pub mod resilience;
pub mod source;

// Re-exports for convenience
pub use checkpoint::{CheckpointStore, CheckpointTracker, MemoryCheckpointStore, RedisCheckpointStore};
pub use config::{CommitPoint, SyncConfig, SyncSettings};
pub use coordinator::{CycleReport, StreamDescriptor, StreamReport, SyncPhase, Synchronizer};
pub use dedup::DedupSet;
pub use detector::Resolver;
pub use error::{Result, SyncError};
pub use model::{FilmRecord, PersonRef};
pub use publisher::{BulkPublisher, BulkSink, ElasticsearchSink, PublishOutcome, PublishResult};
pub use resilience::BackoffPolicy;
pub use source::{BoxFuture, PgConnector, SourceConnection, SourceConnector, SourceSession};
