//! Shared test utilities for pipeline and integration tests.
//!
//! This module provides:
//! - Redis testcontainer setup
//! - In-memory source database with call recording and fault injection
//! - Recording bulk sink
//! - Synchronizer wiring over the mocks

#![allow(dead_code)]

pub mod containers;
pub mod mock_sink;
pub mod mock_source;

pub use mock_sink::*;
pub use mock_source::*;

use search_sync::{MemoryCheckpointStore, SyncConfig, Synchronizer};

pub type TestSynchronizer = Synchronizer<MockConnector, MemoryCheckpointStore, RecordingSink>;

/// A synchronizer over `db` and `sink` with fast test backoff.
pub fn synchronizer(db: &MockDb, sink: &RecordingSink) -> TestSynchronizer {
    synchronizer_with(SyncConfig::for_testing(), db, sink)
}

pub fn synchronizer_with(config: SyncConfig, db: &MockDb, sink: &RecordingSink) -> TestSynchronizer {
    Synchronizer::new(config, db.connector(), MemoryCheckpointStore::new(), sink.clone())
}
