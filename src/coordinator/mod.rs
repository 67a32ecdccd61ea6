// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Synchronizer coordinator.
//!
//! The orchestrator that ties together:
//! - The shared source connection via [`SourceSession`]
//! - Watermarks via [`CheckpointTracker`]
//! - Publishing via [`BulkPublisher`]
//! - Per-stream loops via [`stream::sync_stream`]
//!
//! # Lifecycle
//!
//! 1. [`Synchronizer::run`] starts a cycle with a fresh [`DedupSet`]
//! 2. Streams run in order: persons, genres, films
//! 3. The synchronizer sleeps `update_period`, or stops on shutdown
//!
//! Everything is awaited in sequence on the caller's task; nothing is
//! spawned. A failed cycle is logged and the next one starts after the sleep.

pub mod stream;
mod types;

pub use stream::StreamDescriptor;
pub use types::{CycleReport, StreamReport, SyncPhase};

use crate::checkpoint::{CheckpointStore, CheckpointTracker};
use crate::config::SyncConfig;
use crate::dedup::DedupSet;
use crate::error::{Result, SyncError};
use crate::metrics;
use crate::publisher::{BulkPublisher, BulkSink};
use crate::source::{SourceConnector, SourceSession};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Incremental PostgreSQL → search index synchronizer.
pub struct Synchronizer<C: SourceConnector, K: CheckpointStore, S: BulkSink> {
    config: SyncConfig,

    /// Streams in cycle order
    streams: Vec<StreamDescriptor>,

    /// Source connection shared by all streams
    session: SourceSession<C>,

    checkpoints: CheckpointTracker<K>,

    publisher: BulkPublisher<S>,

    /// Current phase (broadcast to watchers)
    phase_tx: watch::Sender<SyncPhase>,
    phase_rx: watch::Receiver<SyncPhase>,

    /// Cycles started so far
    cycles: u64,
}

impl<C: SourceConnector, K: CheckpointStore, S: BulkSink> Synchronizer<C, K, S> {
    /// Create a synchronizer. No connection is opened until the first cycle.
    pub fn new(config: SyncConfig, connector: C, store: K, sink: S) -> Self {
        let policy = config.backoff.policy();
        let session = SourceSession::new(connector, policy.clone());
        Self::with_session(config, session, store, sink)
    }

    /// Create a synchronizer around an existing source session.
    pub fn with_session(config: SyncConfig, session: SourceSession<C>, store: K, sink: S) -> Self {
        let policy = config.backoff.policy();
        let checkpoints = CheckpointTracker::new(store, policy.clone(), config.sync.initial_watermark());
        let publisher = BulkPublisher::new(sink, config.elasticsearch.index.clone(), policy);
        let streams = StreamDescriptor::from_settings(&config.sync);
        let (phase_tx, phase_rx) = watch::channel(SyncPhase::Idle);

        Self {
            config,
            streams,
            session,
            checkpoints,
            publisher,
            phase_tx,
            phase_rx,
            cycles: 0,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn streams(&self) -> &[StreamDescriptor] {
        &self.streams
    }

    pub fn session(&self) -> &SourceSession<C> {
        &self.session
    }

    pub fn checkpoints(&self) -> &CheckpointTracker<K> {
        &self.checkpoints
    }

    pub fn publisher(&self) -> &BulkPublisher<S> {
        &self.publisher
    }

    /// Get current phase.
    pub fn phase(&self) -> SyncPhase {
        *self.phase_rx.borrow()
    }

    /// Get a receiver to watch phase changes.
    pub fn phase_receiver(&self) -> watch::Receiver<SyncPhase> {
        self.phase_rx.clone()
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    fn set_phase(&self, phase: SyncPhase) {
        let _ = self.phase_tx.send(phase);
        metrics::record_phase(phase.label());
    }

    /// Run every stream once, in order, sharing one dedup set.
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        self.cycles += 1;
        let cycle = self.cycles;
        let start = Instant::now();
        let mut dedup = DedupSet::new();
        let mut report = CycleReport {
            cycle,
            ..Default::default()
        };

        let Self {
            config,
            streams,
            session,
            checkpoints,
            publisher,
            phase_tx,
            ..
        } = self;

        for stream in streams.iter() {
            let phase = stream.phase();
            let _ = phase_tx.send(phase);
            metrics::record_phase(phase.label());

            match stream::sync_stream(
                session,
                checkpoints,
                publisher,
                config.sync.commit_point,
                stream,
                &mut dedup,
            )
            .await
            {
                Ok(stream_report) => report.streams.push(stream_report),
                Err(e) => {
                    metrics::record_error(stream.name, e.kind());
                    metrics::record_cycle(start.elapsed(), false);
                    return Err(e);
                }
            }
        }

        report.elapsed = start.elapsed();
        metrics::record_cycle(report.elapsed, true);
        metrics::record_cycle_documents(report.documents_published());
        info!(
            cycle,
            films = dedup.len(),
            published = report.documents_published(),
            failed_batches = report.failed_batches(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Cycle complete"
        );
        Ok(report)
    }

    /// Run cycles until `shutdown` turns true (or its sender is dropped).
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let period = self.config.sync.update_period_duration();
        info!(
            streams = self.streams.len(),
            update_period_ms = period.as_millis() as u64,
            commit_point = ?self.config.sync.commit_point,
            "Starting synchronizer"
        );

        while !*shutdown.borrow() {
            match self.run_cycle().await {
                Ok(_) => {}
                Err(e @ SyncError::PermanentQuery { .. }) => {
                    error!(cycle = self.cycles, error = %e, fatal = true, "Cycle aborted by a permanent query error");
                }
                Err(e) => {
                    error!(cycle = self.cycles, error = %e, error_type = e.kind(), "Cycle aborted");
                }
            }

            self.set_phase(SyncPhase::CycleSleep);
            if sleep_or_shutdown(period, &mut shutdown).await {
                break;
            }
        }

        self.set_phase(SyncPhase::Stopped);
        info!(cycles = self.cycles, "Synchronizer stopped");
        Ok(())
    }
}

/// Sleep for `period`. Returns `true` if shutdown was requested first.
async fn sleep_or_shutdown(period: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    let sleep = tokio::time::sleep(period);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return *shutdown.borrow(),
            changed = shutdown.changed() => {
                if changed.is_err() {
                    warn!("Shutdown channel closed, stopping");
                    return true;
                }
                if *shutdown.borrow() {
                    return true;
                }
            }
        }
    }
}
